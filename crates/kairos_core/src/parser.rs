//! Validation of raw temporal query parameters.
//!
//! Parameter names follow the NGSI-LD temporal API (`timerel`, `timeAt`, `endTimeAt`,
//! `aggrPeriodDuration`, `aggrMethods`, `lastN`, `timeproperty`, `options`, `format`).

use std::collections::{BTreeSet, HashMap};

use crate::{
    AggrPeriod, AggregateMethod, AttributeFilter, EntitiesQuery, KairosError, KairosResult,
    QueryLimits, TemporalEntitiesQuery, TemporalEntityQuery, TemporalQuery,
    TemporalRepresentation, TimeProperty, Timerel, Uri, parse_timestamp,
};

pub type QueryParams = HashMap<String, String>;

/// Parses the parameters of a single-entity request, where `timerel`/`timeAt` may be absent.
pub fn parse_temporal_entity_query(
    params: &QueryParams,
    limits: &QueryLimits,
) -> KairosResult<TemporalEntityQuery> {
    build_entity_query(params, limits, false)
}

/// Parses the parameters of an entity-list request.
pub fn parse_temporal_entities_query(
    params: &QueryParams,
    limits: &QueryLimits,
) -> KairosResult<TemporalEntitiesQuery> {
    let query = build_entity_query(params, limits, true)?;
    let ids = comma_list(params.get("id"))
        .iter()
        .map(|raw| Uri::parse(raw))
        .collect::<KairosResult<Vec<_>>>()?;
    let limit = match params.get("limit") {
        Some(raw) => parse_non_negative(raw, "limit")?,
        None => limits.entities_limit_default,
    };
    if limit > limits.entities_limit_max {
        return Err(KairosError::bad_request(format!(
            "you asked for {limit} results, but the supported maximum limit is {}",
            limits.entities_limit_max
        )));
    }
    let offset = match params.get("offset") {
        Some(raw) => parse_non_negative(raw, "offset")?,
        None => 0,
    };
    let count = match params.get("count").map(String::as_str) {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            return Err(KairosError::bad_request(format!(
                "'{other}' is not a valid value for count"
            )));
        }
    };
    let entities = EntitiesQuery {
        ids,
        types: comma_list(params.get("type")),
        id_pattern: params.get("idPattern").cloned(),
        q: params.get("q").cloned(),
        attrs: query.filter.attrs.clone(),
        limit,
        offset,
        count,
    };
    Ok(TemporalEntitiesQuery { entities, query })
}

fn build_entity_query(
    params: &QueryParams,
    limits: &QueryLimits,
    in_entities_query: bool,
) -> KairosResult<TemporalEntityQuery> {
    let options: BTreeSet<String> = comma_list(params.get("options")).into_iter().collect();
    let format = params.get("format").map(String::as_str);
    let simplified = options.contains("temporalValues") || format == Some("temporalValues");
    let aggregated = options.contains("aggregatedValues") || format == Some("aggregatedValues");
    let representation = match (simplified, aggregated) {
        (true, true) => {
            return Err(KairosError::bad_request(
                "temporalValues and aggregatedValues cannot be requested together",
            ));
        }
        (true, false) => TemporalRepresentation::Simplified,
        (false, true) => TemporalRepresentation::Aggregated,
        (false, false) => TemporalRepresentation::Full,
    };
    let temporal = parse_temporal_query(params, limits, in_entities_query, representation)?;
    let filter = AttributeFilter {
        attrs: comma_list(params.get("attrs")).into_iter().collect(),
        dataset_ids: comma_list(params.get("datasetId")).into_iter().collect(),
    };
    Ok(TemporalEntityQuery {
        temporal,
        representation,
        with_audit: options.contains("audit"),
        filter,
    })
}

fn parse_temporal_query(
    params: &QueryParams,
    limits: &QueryLimits,
    in_entities_query: bool,
    representation: TemporalRepresentation,
) -> KairosResult<TemporalQuery> {
    let timerel = params
        .get("timerel")
        .map(|raw| match raw.as_str() {
            "before" => Ok(Timerel::Before),
            "after" => Ok(Timerel::After),
            "between" => Ok(Timerel::Between),
            other => Err(KairosError::bad_request(format!(
                "'{other}' is not a valid timerel (expected before, after or between)"
            ))),
        })
        .transpose()?;
    let time_at = params
        .get("timeAt")
        .map(|raw| parse_timestamp(raw))
        .transpose()?;
    let end_time_at = params
        .get("endTimeAt")
        .map(|raw| parse_timestamp(raw))
        .transpose()?;

    match (timerel, time_at) {
        (Some(_), None) | (None, Some(_)) => {
            return Err(KairosError::bad_request(
                "'timerel' and 'timeAt' must be used in conjunction",
            ));
        }
        (None, None) if in_entities_query => {
            return Err(KairosError::bad_request(
                "'timerel' and 'timeAt' are mandatory when querying temporal entities",
            ));
        }
        _ => {}
    }
    if timerel == Some(Timerel::Between) {
        let Some(end) = end_time_at else {
            return Err(KairosError::bad_request(
                "'endTimeAt' is mandatory when 'timerel' is 'between'",
            ));
        };
        if time_at.is_some_and(|start| end <= start) {
            return Err(KairosError::bad_request(
                "'endTimeAt' must be after 'timeAt'",
            ));
        }
    }

    let aggr_period = match params.get("aggrPeriodDuration") {
        Some(raw) => AggrPeriod::parse(raw)?,
        None => AggrPeriod::WholeRange,
    };
    let mut aggr_methods = Vec::new();
    for raw in comma_list(params.get("aggrMethods")) {
        let method = AggregateMethod::parse(&raw)?;
        if !aggr_methods.contains(&method) {
            aggr_methods.push(method);
        }
    }
    if representation == TemporalRepresentation::Aggregated && aggr_methods.is_empty() {
        return Err(KairosError::bad_request(
            "'aggrMethods' is mandatory when requesting aggregated values",
        ));
    }

    let last_n = params
        .get("lastN")
        .map(|raw| match raw.parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(KairosError::bad_request(format!(
                "'lastN' must be a strictly positive integer, got '{raw}'"
            ))),
        })
        .transpose()?;
    let time_property = match params.get("timeproperty") {
        Some(raw) => TimeProperty::parse(raw)?,
        None => TimeProperty::ObservedAt,
    };
    let instance_limit = match last_n {
        Some(last_n) => last_n.min(limits.temporal_instance_limit),
        None => limits.temporal_instance_limit,
    };

    Ok(TemporalQuery {
        timerel,
        time_at,
        end_time_at,
        aggr_period,
        aggr_methods,
        last_n,
        time_property,
        instance_limit,
    })
}

fn comma_list(raw: Option<&String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_non_negative(raw: &str, name: &str) -> KairosResult<u32> {
    raw.parse::<u32>().map_err(|_| {
        KairosError::bad_request(format!("'{name}' must be a non-negative integer, got '{raw}'"))
    })
}
