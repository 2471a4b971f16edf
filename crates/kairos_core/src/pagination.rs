//! Keeps the histories of several attributes consistent when one of them is cut by the
//! per-attribute instance limit.
//!
//! Search caps every attribute independently. An attribute sampled every minute hits the
//! cap after a few hours while a daily attribute may return weeks of data; shown side by
//! side they would suggest coverage that does not exist. The functions here derive a single
//! [`Range`] from the truncated attributes and cut every attribute to it.

use log::debug;

use crate::{Attribute, AttributeInstanceResult, Range, TemporalQuery, Timerel, Timestamp};

pub type AttributesWithInstances = Vec<(Attribute, Vec<AttributeInstanceResult>)>;

/// Applies the shared pagination window.
///
/// Instance lists are expected in fetch order: descending for backward (lastN) queries,
/// ascending otherwise. No range is produced when the query is a pure lastN query or when
/// no attribute reached the instance limit.
pub fn paginate(
    attributes: AttributesWithInstances,
    query: &TemporalQuery,
) -> (AttributesWithInstances, Option<Range>) {
    if query.is_pure_last_n() {
        return (attributes, None);
    }
    let limit = query.instance_limit as usize;
    let spans: Vec<(Timestamp, Timestamp)> = attributes
        .iter()
        .filter(|(_, instances)| limit > 0 && instances.len() == limit)
        .filter_map(|(_, instances)| covered_span(instances))
        .collect();
    let Some(range) = discriminating_range(&spans, query) else {
        return (attributes, None);
    };
    debug!(
        "pagination: {} truncated attribute(s), range {} .. {}",
        spans.len(),
        range.start,
        range.end
    );
    let filtered = attributes
        .into_iter()
        .map(|(attribute, instances)| {
            let kept = instances
                .into_iter()
                .filter(|instance| range.contains(instance.time()))
                .collect();
            (attribute, kept)
        })
        .collect();
    (filtered, Some(range))
}

/// First fetched time and last fetched end time of an instance list.
fn covered_span(instances: &[AttributeInstanceResult]) -> Option<(Timestamp, Timestamp)> {
    let first = instances.first()?;
    let last = instances.last()?;
    Some((first.time(), last.end_time()))
}

fn discriminating_range(spans: &[(Timestamp, Timestamp)], query: &TemporalQuery) -> Option<Range> {
    let near_bounds = spans.iter().map(|(near, _)| *near);
    let far_bounds = spans.iter().map(|(_, far)| *far);
    if query.is_backward() {
        let far = far_bounds.max()?;
        let near = near_bounds.min()?;
        let near = match query.timerel {
            Some(Timerel::Before) => query.time_at.unwrap_or(near),
            Some(Timerel::Between) => query.end_time_at.unwrap_or(near),
            _ => near,
        };
        Some(Range::new(far, near))
    } else {
        let near = near_bounds.min()?;
        let far = far_bounds.min()?;
        let near = match query.timerel {
            Some(Timerel::After) | Some(Timerel::Between) => query.time_at.unwrap_or(near),
            _ => near,
        };
        Some(Range::new(near, far))
    }
}
