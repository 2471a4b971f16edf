//! Renders fetched instances as temporal entity documents.
//!
//! Attributes sharing a name are merged under one key: a single dataset renders as an
//! object, several as an array. Full mode always renders the array of instance payloads.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Number, Value as JsonValue, json};

use crate::{
    AggregateMethod, Attribute, AttributeInstanceResult, AttributeType, AttributeValueType,
    AttributesWithInstances, InstanceValue, KairosError, KairosResult, SCOPE_ATTRIBUTE,
    ScopeInstance, TemporalEntityQuery, TemporalRepresentation, Timestamp, Uri, format_timestamp,
    from_micros, to_micros, wkt_to_geojson,
};

/// Builds one document per entity, in the order of `entity_ids`.
///
/// Entities without attributes or scope history still produce a document holding their id.
pub fn build_temporal_entities(
    entity_ids: &[Uri],
    attributes: AttributesWithInstances,
    scope_history: &[ScopeInstance],
    query: &TemporalEntityQuery,
    origin: Option<Timestamp>,
) -> KairosResult<Vec<JsonValue>> {
    let mut by_entity: HashMap<&Uri, AttributesWithInstances> = HashMap::new();
    for (attribute, instances) in attributes {
        if let Some(entity_id) = entity_ids.iter().find(|id| **id == attribute.entity_id) {
            by_entity
                .entry(entity_id)
                .or_default()
                .push((attribute, instances));
        }
    }
    entity_ids
        .iter()
        .map(|entity_id| {
            let attributes = by_entity.remove(entity_id).unwrap_or_default();
            let scopes: Vec<ScopeInstance> = scope_history
                .iter()
                .filter(|scope| scope.entity_id == *entity_id)
                .cloned()
                .collect();
            build_temporal_entity(entity_id, &attributes, &scopes, query, origin)
        })
        .collect()
}

pub fn build_temporal_entity(
    entity_id: &Uri,
    attributes: &AttributesWithInstances,
    scope_history: &[ScopeInstance],
    query: &TemporalEntityQuery,
    origin: Option<Timestamp>,
) -> KairosResult<JsonValue> {
    let mut merged: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
    for (attribute, instances) in attributes {
        let entries = merged.entry(attribute.name.clone()).or_default();
        match query.representation {
            TemporalRepresentation::Full => {
                for instance in instances {
                    entries.push(full_instance(attribute, instance, query)?);
                }
            }
            TemporalRepresentation::Simplified => {
                entries.push(simplified_attribute(attribute, instances)?);
            }
            TemporalRepresentation::Aggregated => {
                entries.push(aggregated_attribute(attribute, instances, query));
            }
        }
    }

    let mut document = Map::new();
    document.insert("id".to_string(), JsonValue::String(entity_id.to_string()));
    for (name, entries) in merged {
        let rendered = match query.representation {
            TemporalRepresentation::Full => JsonValue::Array(entries),
            _ if entries.len() == 1 => entries.into_iter().next().unwrap_or(JsonValue::Null),
            _ => JsonValue::Array(entries),
        };
        document.insert(name, rendered);
    }
    if query.with_scope() && !scope_history.is_empty() {
        document.insert(
            SCOPE_ATTRIBUTE.to_string(),
            scope_document(scope_history, query, origin),
        );
    }
    Ok(JsonValue::Object(document))
}

fn full_instance(
    attribute: &Attribute,
    instance: &AttributeInstanceResult,
    query: &TemporalEntityQuery,
) -> KairosResult<JsonValue> {
    let AttributeInstanceResult::Full {
        payload, time, sub, ..
    } = instance
    else {
        return Err(KairosError::storage(format!(
            "expected full instances for attribute '{}'",
            attribute.name
        )));
    };
    let mut payload = match payload {
        JsonValue::Object(object) => object.clone(),
        _ => return Err(KairosError::storage("stored payload is not a JSON object")),
    };
    if attribute.attribute_type == AttributeType::GeoProperty
        && let Some(JsonValue::String(wkt)) = payload.get("value")
    {
        let geometry = wkt_to_geojson(wkt)?;
        payload.insert("value".to_string(), geometry);
    }
    let time_property = query.temporal.time_property;
    payload.insert(
        time_property.key().to_string(),
        JsonValue::String(format_timestamp(*time)),
    );
    if query.with_audit
        && time_property.is_audit()
        && let Some(sub) = sub
    {
        payload.insert("sub".to_string(), JsonValue::String(sub.clone()));
    }
    Ok(JsonValue::Object(payload))
}

fn attribute_header(attribute: &Attribute) -> Map<String, JsonValue> {
    let mut header = Map::new();
    header.insert(
        "type".to_string(),
        JsonValue::String(attribute.attribute_type.as_str().to_string()),
    );
    if let Some(dataset_id) = &attribute.dataset_id {
        header.insert(
            "datasetId".to_string(),
            JsonValue::String(dataset_id.to_string()),
        );
    }
    header
}

fn simplified_attribute(
    attribute: &Attribute,
    instances: &[AttributeInstanceResult],
) -> KairosResult<JsonValue> {
    let mut pairs = Vec::with_capacity(instances.len());
    for instance in instances {
        let AttributeInstanceResult::Simplified { value, time, .. } = instance else {
            return Err(KairosError::storage(format!(
                "expected simplified instances for attribute '{}'",
                attribute.name
            )));
        };
        pairs.push(json!([
            simplified_value(attribute, value)?,
            format_timestamp(*time)
        ]));
    }
    let mut document = attribute_header(attribute);
    document.insert(
        attribute.attribute_type.simplified_member().to_string(),
        JsonValue::Array(pairs),
    );
    Ok(JsonValue::Object(document))
}

fn simplified_value(attribute: &Attribute, value: &InstanceValue) -> KairosResult<JsonValue> {
    match value {
        InstanceValue::Measured(measured) => {
            Ok(Number::from_f64(*measured).map_or(JsonValue::Null, JsonValue::Number))
        }
        InstanceValue::Geo(wkt) => wkt_to_geojson(wkt),
        InstanceValue::Text(raw) => match attribute.attribute_type {
            AttributeType::JsonProperty => Ok(as_json_array_or_object(raw)),
            AttributeType::LanguageProperty | AttributeType::VocabProperty => {
                Ok(as_json_array(raw))
            }
            _ => Ok(text_value(attribute.value_type, raw)),
        },
    }
}

fn as_json_array_or_object(raw: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(object)) => JsonValue::Object(object),
        Ok(JsonValue::Array(items)) => JsonValue::Array(items),
        Ok(other) => JsonValue::Array(vec![other]),
        Err(_) => JsonValue::String(raw.to_string()),
    }
}

// Language maps and vocabs always render as arrays of objects.
fn as_json_array(raw: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Array(items)) => JsonValue::Array(items),
        Ok(other) => JsonValue::Array(vec![other]),
        Err(_) => JsonValue::String(raw.to_string()),
    }
}

fn text_value(value_type: AttributeValueType, raw: &str) -> JsonValue {
    match value_type {
        AttributeValueType::Boolean => match raw {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            other => JsonValue::String(other.to_string()),
        },
        AttributeValueType::Object | AttributeValueType::Array | AttributeValueType::Json => {
            serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
        }
        _ => JsonValue::String(raw.to_string()),
    }
}

fn aggregated_attribute(
    attribute: &Attribute,
    instances: &[AttributeInstanceResult],
    query: &TemporalEntityQuery,
) -> JsonValue {
    let mut document = attribute_header(attribute);
    for method in &query.temporal.aggr_methods {
        let mut entries = Vec::new();
        for instance in instances {
            if let AttributeInstanceResult::Aggregated {
                start, end, values, ..
            } = instance
            {
                let value = values
                    .iter()
                    .find(|aggregate| aggregate.method == *method)
                    .map(|aggregate| aggregate.value.clone())
                    .unwrap_or(JsonValue::Null);
                entries.push(json!([value, format_timestamp(*start), format_timestamp(*end)]));
            }
        }
        document.insert(method.as_str().to_string(), JsonValue::Array(entries));
    }
    JsonValue::Object(document)
}

fn scope_document(
    scope_history: &[ScopeInstance],
    query: &TemporalEntityQuery,
    origin: Option<Timestamp>,
) -> JsonValue {
    let mut sorted: Vec<&ScopeInstance> = scope_history.iter().collect();
    sorted.sort_by_key(|scope| scope.time);
    let key = query.temporal.time_property.key();
    match query.representation {
        TemporalRepresentation::Full => JsonValue::Array(
            sorted
                .into_iter()
                .map(|scope| {
                    let mut entry = Map::new();
                    entry.insert("type".to_string(), json!("Property"));
                    entry.insert("value".to_string(), scope.value.clone());
                    entry.insert(key.to_string(), json!(format_timestamp(scope.time)));
                    JsonValue::Object(entry)
                })
                .collect(),
        ),
        TemporalRepresentation::Simplified => json!({
            "type": "Property",
            "values": sorted
                .into_iter()
                .map(|scope| json!([scope.value, format_timestamp(scope.time)]))
                .collect::<Vec<_>>(),
        }),
        TemporalRepresentation::Aggregated => aggregated_scope(&sorted, query, origin),
    }
}

// Scope values are only counted; other methods yield null.
fn aggregated_scope(
    sorted: &[&ScopeInstance],
    query: &TemporalEntityQuery,
    origin: Option<Timestamp>,
) -> JsonValue {
    let mut buckets: BTreeMap<i64, (i64, Vec<&JsonValue>)> = BTreeMap::new();
    let width = query.temporal.aggr_period.width_micros();
    let first = sorted.first().map(|scope| to_micros(scope.time));
    let last = sorted.last().map(|scope| to_micros(scope.time));
    for scope in sorted {
        let time = to_micros(scope.time);
        let (start, end) = match (width, origin.map(to_micros).or(first)) {
            (Some(width), Some(origin)) if width > 0 => {
                let start = origin + (time - origin).div_euclid(width) * width;
                (start, start + width)
            }
            _ => (first.unwrap_or(time), last.unwrap_or(time)),
        };
        buckets
            .entry(start)
            .or_insert_with(|| (end, Vec::new()))
            .1
            .push(&scope.value);
    }

    let mut document = Map::new();
    document.insert("type".to_string(), json!("Property"));
    for method in &query.temporal.aggr_methods {
        let entries: Vec<JsonValue> = buckets
            .iter()
            .filter_map(|(start, (end, values))| {
                let start = from_micros(*start).ok()?;
                let end = from_micros(*end).ok()?;
                Some(json!([
                    count_values(*method, values),
                    format_timestamp(start),
                    format_timestamp(end)
                ]))
            })
            .collect();
        document.insert(method.as_str().to_string(), JsonValue::Array(entries));
    }
    JsonValue::Object(document)
}

fn count_values(method: AggregateMethod, values: &[&JsonValue]) -> JsonValue {
    match method {
        AggregateMethod::TotalCount => json!(values.len()),
        AggregateMethod::Count => json!(values.iter().filter(|value| !value.is_null()).count()),
        AggregateMethod::DistinctCount => {
            let mut distinct: Vec<String> = values
                .iter()
                .filter(|value| !value.is_null())
                .map(|value| value.to_string())
                .collect();
            distinct.sort();
            distinct.dedup();
            json!(distinct.len())
        }
        _ => JsonValue::Null,
    }
}
