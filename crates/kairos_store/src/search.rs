//! Temporal search over the instance timelines.
//!
//! Attributes are grouped by value type and each group is fetched with one statement.
//! Every statement ranks rows per attribute with `ROW_NUMBER()` so the instance limit caps
//! each attribute on its own instead of the batch as a whole.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, warn};
use sea_orm::sea_query::{Alias, Expr, ExprTrait, Order, Query, SelectStatement, Value as SeaValue};
use sea_orm::{DatabaseBackend, QueryResult};
use serde_json::{Number, Value as JsonValue};

use crate::KairosStore;
use crate::db::*;
use crate::store::{Timeline, col_name, id_value, query_all, read_id};
use kairos_core::{
    AggregateMethod, AggregateValue, Attribute, AttributeInstanceResult,
    AttributeInstanceSearchApi, AttributeValueType, InstanceValue, KairosError, KairosResult,
    TemporalEntityQuery, TemporalQuery, TemporalRepresentation, Timerel, Timestamp, from_micros,
    to_micros,
};

const RANK: &str = "rn";
const BUCKET_START: &str = "bucket_start";
const FIRST_TIME: &str = "first_time";
const LAST_TIME: &str = "last_time";
const TOTAL: &str = "agg_total";
const COUNT: &str = "agg_count";
const DISTINCT: &str = "agg_distinct";
const MIN: &str = "agg_min";
const MAX: &str = "agg_max";
const SUM: &str = "agg_sum";
const SUMSQ: &str = "agg_sumsq";

#[async_trait]
impl AttributeInstanceSearchApi for KairosStore {
    async fn search(
        &self,
        query: &TemporalEntityQuery,
        attributes: &[Attribute],
        origin: Option<Timestamp>,
    ) -> KairosResult<Vec<AttributeInstanceResult>> {
        if attributes.is_empty() || query.temporal.instance_limit == 0 {
            return Ok(Vec::new());
        }
        let mut groups: BTreeMap<AttributeValueType, Vec<&Attribute>> = BTreeMap::new();
        for attribute in attributes {
            groups
                .entry(attribute.value_type)
                .or_default()
                .push(attribute);
        }
        debug!(
            "temporal search: {} attribute(s) in {} value type group(s), {:?}",
            attributes.len(),
            groups.len(),
            query.representation
        );
        let fetches = groups.into_iter().map(|(value_type, group)| async move {
            match query.representation {
                TemporalRepresentation::Aggregated => {
                    self.search_aggregated(query, value_type, &group, origin)
                        .await
                }
                _ => self.search_instances(query, value_type, &group).await,
            }
        });
        let results = try_join_all(fetches).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

impl KairosStore {
    async fn search_instances(
        &self,
        query: &TemporalEntityQuery,
        value_type: AttributeValueType,
        attributes: &[&Attribute],
    ) -> KairosResult<Vec<AttributeInstanceResult>> {
        let temporal = &query.temporal;
        let timeline = Timeline::for_property(temporal.time_property);
        let full = query.representation == TemporalRepresentation::Full;
        let order = direction(temporal);

        let mut columns = vec![
            col_name(KairosAttributeInstances::AttributeId),
            col_name(KairosAttributeInstances::InstanceTime),
            col_name(KairosAttributeInstances::Value),
            col_name(KairosAttributeInstances::MeasuredValue),
            col_name(KairosAttributeInstances::GeoValue),
        ];
        if full {
            columns.push(col_name(KairosAttributeInstances::Payload));
            if matches!(timeline, Timeline::Audit(_)) {
                columns.push(col_name(KairosAttributeInstancesAudit::Sub));
            }
        }

        let mut ranked = self.timeline_select(temporal, timeline, attributes);
        for column in &columns {
            ranked.column(Alias::new(column.as_str()));
        }
        ranked.expr_as(
            Expr::cust(rank_sql(&order, "instance_time")),
            Alias::new(RANK),
        );

        let mut select = Query::select();
        for column in &columns {
            select.column(Alias::new(column.as_str()));
        }
        select
            .from_subquery(ranked, Alias::new("ranked"))
            .and_where(Expr::col(Alias::new(RANK)).lte(temporal.instance_limit as i64))
            .order_by(KairosAttributeInstances::AttributeId, Order::Asc)
            .order_by(KairosAttributeInstances::InstanceTime, order);

        let rows = query_all(&self.conn, &select).await?;
        rows.iter()
            .map(|row| read_instance(row, value_type, full))
            .collect()
    }

    async fn search_aggregated(
        &self,
        query: &TemporalEntityQuery,
        value_type: AttributeValueType,
        attributes: &[&Attribute],
        origin: Option<Timestamp>,
    ) -> KairosResult<Vec<AttributeInstanceResult>> {
        let temporal = &query.temporal;
        let timeline = Timeline::for_property(temporal.time_property);
        let order = direction(temporal);
        let operand = AggregateOperand::for_value_type(value_type, self.backend);
        let bucket = temporal
            .aggr_period
            .width_micros()
            .filter(|width| *width > 0)
            .zip(origin);

        let mut grouped = self.timeline_select(temporal, timeline, attributes);
        grouped.column(KairosAttributeInstances::AttributeId);
        match bucket {
            Some((width, origin)) => {
                grouped
                    .expr_as(
                        bucket_expr(self.backend, to_micros(origin), width),
                        Alias::new(BUCKET_START),
                    )
                    .group_by_col(KairosAttributeInstances::AttributeId)
                    .group_by_col(Alias::new(BUCKET_START));
            }
            None => {
                grouped
                    .expr_as(Expr::cust("MIN(instance_time)"), Alias::new(BUCKET_START))
                    .group_by_col(KairosAttributeInstances::AttributeId);
            }
        }
        grouped
            .expr_as(Expr::cust("MIN(instance_time)"), Alias::new(FIRST_TIME))
            .expr_as(Expr::cust("MAX(instance_time)"), Alias::new(LAST_TIME))
            .expr_as(Expr::cust("COUNT(*)"), Alias::new(TOTAL))
            .expr_as(
                Expr::cust(format!("COUNT({})", operand.value)),
                Alias::new(COUNT),
            )
            .expr_as(
                Expr::cust(format!("COUNT(DISTINCT {})", operand.value)),
                Alias::new(DISTINCT),
            )
            .expr_as(
                Expr::cust(rank_sql(&order, "MIN(instance_time)")),
                Alias::new(RANK),
            );
        if operand.ordered {
            grouped
                .expr_as(
                    Expr::cust(format!("MIN({})", operand.value)),
                    Alias::new(MIN),
                )
                .expr_as(
                    Expr::cust(format!("MAX({})", operand.value)),
                    Alias::new(MAX),
                );
        }
        if operand.numeric {
            grouped
                .expr_as(
                    Expr::cust(format!("SUM({})", operand.value)),
                    Alias::new(SUM),
                )
                .expr_as(
                    Expr::cust(format!("SUM({v} * {v})", v = operand.value)),
                    Alias::new(SUMSQ),
                );
        }

        let select = Query::select()
            .expr(Expr::cust("*"))
            .from_subquery(grouped, Alias::new("buckets"))
            .and_where(Expr::col(Alias::new(RANK)).lte(temporal.instance_limit as i64))
            .order_by(KairosAttributeInstances::AttributeId, Order::Asc)
            .order_by(Alias::new(BUCKET_START), order)
            .to_owned();

        let rows = query_all(&self.conn, &select).await?;
        rows.iter()
            .map(|row| read_bucket(row, temporal, &operand, bucket.map(|(width, _)| width)))
            .collect()
    }

    /// Rows of one timeline restricted to the attributes and the time window.
    fn timeline_select(
        &self,
        temporal: &TemporalQuery,
        timeline: Timeline,
        attributes: &[&Attribute],
    ) -> SelectStatement {
        let mut select = Query::select()
            .from(timeline.table())
            .and_where(
                Expr::col(KairosAttributeInstances::AttributeId).is_in(
                    attributes
                        .iter()
                        .map(|attribute| id_value(self.backend, attribute.id)),
                ),
            )
            .to_owned();
        if let Timeline::Audit(time_property) = timeline {
            select.and_where(
                Expr::col(KairosAttributeInstancesAudit::TimeProperty).eq(time_property.as_i16()),
            );
        }
        let time = || Expr::col(KairosAttributeInstances::InstanceTime);
        match (temporal.timerel, temporal.time_at) {
            (Some(Timerel::Before), Some(time_at)) => {
                select.and_where(time().lt(to_micros(time_at)));
            }
            (Some(Timerel::After), Some(time_at)) => {
                select.and_where(time().gte(to_micros(time_at)));
            }
            (Some(Timerel::Between), Some(time_at)) => {
                select.and_where(time().gte(to_micros(time_at)));
                if let Some(end_time_at) = temporal.end_time_at {
                    select.and_where(time().lt(to_micros(end_time_at)));
                }
            }
            _ => {}
        }
        select
    }
}

/// LastN walks back from the newest sample; everything else reads forward.
fn direction(temporal: &TemporalQuery) -> Order {
    if temporal.is_backward() {
        Order::Desc
    } else {
        Order::Asc
    }
}

fn rank_sql(order: &Order, ordering: &str) -> String {
    let direction = match order {
        Order::Desc => "DESC",
        _ => "ASC",
    };
    format!("ROW_NUMBER() OVER (PARTITION BY attribute_id ORDER BY {ordering} {direction})")
}

/// Start of the fixed-width bucket holding `instance_time`, floored towards negative
/// infinity so samples before the origin land in their own buckets.
fn bucket_expr(backend: DatabaseBackend, origin: i64, width: i64) -> Expr {
    let div = match backend {
        DatabaseBackend::MySql => "DIV",
        _ => "/",
    };
    Expr::cust_with_values(
        format!(
            "(? + (CASE WHEN instance_time >= ? THEN (instance_time - ?) {div} ? \
             ELSE -(((? - instance_time) + ? - 1) {div} ?) END) * ?)"
        ),
        [origin, origin, origin, width, origin, width, width, width]
            .into_iter()
            .map(SeaValue::from),
    )
}

/// SQL operand an aggregation runs over, by stored value type.
struct AggregateOperand {
    value: String,
    value_type: AttributeValueType,
    /// MIN/MAX are meaningful.
    ordered: bool,
    /// SUM/AVG/STDDEV/SUMSQ are meaningful.
    numeric: bool,
}

impl AggregateOperand {
    fn for_value_type(value_type: AttributeValueType, backend: DatabaseBackend) -> Self {
        let (value, ordered, numeric) = match value_type {
            AttributeValueType::Number => ("measured_value".to_string(), true, true),
            AttributeValueType::Boolean => {
                let (one, zero) = match backend {
                    DatabaseBackend::Postgres => (
                        "CAST(1 AS DOUBLE PRECISION)",
                        "CAST(0 AS DOUBLE PRECISION)",
                    ),
                    DatabaseBackend::MySql => ("CAST(1 AS DOUBLE)", "CAST(0 AS DOUBLE)"),
                    _ => ("1.0", "0.0"),
                };
                (
                    format!(
                        "(CASE WHEN value = 'true' THEN {one} WHEN value = 'false' THEN {zero} END)"
                    ),
                    true,
                    true,
                )
            }
            AttributeValueType::String
            | AttributeValueType::Date
            | AttributeValueType::DateTime
            | AttributeValueType::Time
            | AttributeValueType::Uri => ("value".to_string(), true, false),
            AttributeValueType::Geometry => ("geo_value".to_string(), false, false),
            AttributeValueType::Json
            | AttributeValueType::Object
            | AttributeValueType::Array
            | AttributeValueType::Any => ("value".to_string(), false, false),
        };
        Self {
            value,
            value_type,
            ordered,
            numeric,
        }
    }

    fn supports(&self, method: AggregateMethod) -> bool {
        match method {
            AggregateMethod::Count
            | AggregateMethod::TotalCount
            | AggregateMethod::DistinctCount => true,
            AggregateMethod::Min | AggregateMethod::Max => self.ordered,
            AggregateMethod::Avg
            | AggregateMethod::Sum
            | AggregateMethod::Stddev
            | AggregateMethod::Sumsq => self.numeric,
        }
    }
}

fn read_instance(
    row: &QueryResult,
    value_type: AttributeValueType,
    full: bool,
) -> KairosResult<AttributeInstanceResult> {
    let attribute_id = read_id(row, KairosAttributeInstances::AttributeId)?;
    let time: i64 = row.try_get("", &col_name(KairosAttributeInstances::InstanceTime))?;
    let time = from_micros(time)?;
    if full {
        let payload: String = row.try_get("", &col_name(KairosAttributeInstances::Payload))?;
        let sub: Option<String> = row
            .try_get("", &col_name(KairosAttributeInstancesAudit::Sub))
            .unwrap_or(None);
        return Ok(AttributeInstanceResult::Full {
            attribute_id,
            payload: serde_json::from_str(&payload)?,
            time,
            sub,
        });
    }
    let text: Option<String> = row.try_get("", &col_name(KairosAttributeInstances::Value))?;
    let measured: Option<f64> =
        row.try_get("", &col_name(KairosAttributeInstances::MeasuredValue))?;
    let geo: Option<String> = row.try_get("", &col_name(KairosAttributeInstances::GeoValue))?;
    let value = match (value_type, measured, geo, text) {
        (AttributeValueType::Number, Some(measured), _, _) => InstanceValue::Measured(measured),
        (AttributeValueType::Geometry, _, Some(geo), _) => InstanceValue::Geo(geo),
        (_, _, _, Some(text)) => InstanceValue::Text(text),
        (_, Some(measured), _, None) => InstanceValue::Measured(measured),
        (_, None, Some(geo), None) => InstanceValue::Geo(geo),
        (_, None, None, None) => {
            return Err(KairosError::storage(format!(
                "instance of attribute {attribute_id} has no value"
            )));
        }
    };
    Ok(AttributeInstanceResult::Simplified {
        attribute_id,
        value,
        time,
    })
}

fn read_bucket(
    row: &QueryResult,
    temporal: &TemporalQuery,
    operand: &AggregateOperand,
    width: Option<i64>,
) -> KairosResult<AttributeInstanceResult> {
    let attribute_id = read_id(row, KairosAttributeInstances::AttributeId)?;
    let start: i64 = row.try_get("", BUCKET_START)?;
    let last: i64 = row.try_get("", LAST_TIME)?;
    let first: i64 = row.try_get("", FIRST_TIME)?;
    let total: i64 = row.try_get("", TOTAL)?;
    let count: i64 = row.try_get("", COUNT)?;
    let distinct: i64 = row.try_get("", DISTINCT)?;

    let wants_values = temporal
        .aggr_methods
        .iter()
        .any(|method| !method.is_count() && operand.supports(*method));
    if wants_values && count < total {
        warn!(
            "refusing aggregation of attribute {attribute_id}: {} of {total} stored value(s) are not {}",
            total - count,
            operand.value_type.as_str()
        );
        return Err(KairosError::not_supported(format!(
            "cannot aggregate attribute {attribute_id}: stored values mix {} with other value types",
            operand.value_type.as_str()
        )));
    }

    let (min, max) = if operand.ordered {
        (read_ordered(row, MIN, operand)?, read_ordered(row, MAX, operand)?)
    } else {
        (JsonValue::Null, JsonValue::Null)
    };
    let (sum, sumsq) = if operand.numeric {
        let sum: Option<f64> = row.try_get("", SUM)?;
        let sumsq: Option<f64> = row.try_get("", SUMSQ)?;
        (sum, sumsq)
    } else {
        (None, None)
    };

    let values = temporal
        .aggr_methods
        .iter()
        .map(|method| {
            let value = match method {
                AggregateMethod::TotalCount => JsonValue::from(total),
                AggregateMethod::Count => JsonValue::from(count),
                AggregateMethod::DistinctCount => JsonValue::from(distinct),
                AggregateMethod::Min => min.clone(),
                AggregateMethod::Max => max.clone(),
                AggregateMethod::Sum => number(sum),
                AggregateMethod::Sumsq => number(sumsq),
                AggregateMethod::Avg => {
                    number(sum.filter(|_| count > 0).map(|sum| sum / count as f64))
                }
                AggregateMethod::Stddev => number(sample_stddev(sum, sumsq, count)),
            };
            AggregateValue {
                method: *method,
                value,
            }
        })
        .collect();

    let (start, end) = match width {
        Some(width) => (start, start + width),
        None => (first, last),
    };
    Ok(AttributeInstanceResult::Aggregated {
        attribute_id,
        start: from_micros(start)?,
        end: from_micros(end)?,
        values,
    })
}

fn read_ordered(
    row: &QueryResult,
    column: &str,
    operand: &AggregateOperand,
) -> KairosResult<JsonValue> {
    Ok(match operand.value_type {
        AttributeValueType::Number => number(row.try_get::<Option<f64>>("", column)?),
        AttributeValueType::Boolean => row
            .try_get::<Option<f64>>("", column)?
            .map_or(JsonValue::Null, |flag| JsonValue::Bool(flag >= 1.0)),
        _ => row
            .try_get::<Option<String>>("", column)?
            .map_or(JsonValue::Null, JsonValue::String),
    })
}

fn number(value: Option<f64>) -> JsonValue {
    value
        .and_then(Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}

fn sample_stddev(sum: Option<f64>, sumsq: Option<f64>, count: i64) -> Option<f64> {
    let (sum, sumsq) = (sum?, sumsq?);
    if count < 2 {
        return None;
    }
    let n = count as f64;
    let variance = (sumsq - sum * sum / n) / (n - 1.0);
    Some(variance.max(0.0).sqrt())
}
