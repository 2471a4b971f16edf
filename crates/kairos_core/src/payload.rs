//! Turns an incoming attribute instance document into a storable value.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::{
    AttributeType, AttributeValueType, InstanceValue, KairosError, KairosResult, Timestamp, Uri,
    normalize_geometry, parse_timestamp,
};

/// One attribute instance submitted for writing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeInstanceWrite {
    pub attribute_name: String,
    pub attribute_type: AttributeType,
    pub dataset_id: Option<Uri>,
    pub payload: JsonValue,
    pub observed_at: Option<Timestamp>,
}

impl AttributeInstanceWrite {
    /// Reads `type`, `datasetId` and `observedAt` from the instance document itself.
    pub fn from_payload(attribute_name: impl Into<String>, payload: JsonValue) -> KairosResult<Self> {
        let attribute_type = match payload.get("type").and_then(JsonValue::as_str) {
            Some(raw) => AttributeType::parse(raw)?,
            None => return Err(KairosError::bad_request("attribute instance has no type")),
        };
        let dataset_id = payload
            .get("datasetId")
            .and_then(JsonValue::as_str)
            .map(Uri::parse)
            .transpose()?;
        let observed_at = payload
            .get("observedAt")
            .and_then(JsonValue::as_str)
            .map(parse_timestamp)
            .transpose()?;
        Ok(Self {
            attribute_name: attribute_name.into(),
            attribute_type,
            dataset_id,
            payload,
            observed_at,
        })
    }
}

/// Value, value type and normalized payload of one instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedValue {
    pub value: InstanceValue,
    pub value_type: AttributeValueType,
    pub payload: JsonValue,
}

pub fn extract_value(write: &AttributeInstanceWrite) -> KairosResult<ExtractedValue> {
    let member = write.attribute_type.value_member();
    let mut payload = match &write.payload {
        JsonValue::Object(object) => object.clone(),
        _ => {
            return Err(KairosError::bad_request(format!(
                "instance of '{}' must be a JSON object",
                write.attribute_name
            )));
        }
    };
    let raw = payload.get(member).cloned().ok_or_else(|| {
        KairosError::bad_request(format!(
            "instance of '{}' has no '{member}' member",
            write.attribute_name
        ))
    })?;

    let (value, value_type, stored) = match write.attribute_type {
        AttributeType::Property => property_value(&raw)?,
        AttributeType::Relationship => {
            let object = raw.as_str().ok_or_else(|| {
                KairosError::bad_request("relationship object must be a URI string")
            })?;
            let object = Uri::parse(object)?;
            (
                InstanceValue::Text(object.to_string()),
                AttributeValueType::Uri,
                raw,
            )
        }
        AttributeType::GeoProperty => {
            let wkt = normalize_geometry(&raw)?;
            (
                InstanceValue::Geo(wkt.clone()),
                AttributeValueType::Geometry,
                JsonValue::String(wkt),
            )
        }
        AttributeType::JsonProperty => {
            if !(raw.is_object() || raw.is_array()) {
                return Err(KairosError::bad_request(
                    "json member must be a JSON object or array",
                ));
            }
            (
                InstanceValue::Text(raw.to_string()),
                AttributeValueType::Json,
                raw,
            )
        }
        AttributeType::LanguageProperty => {
            let entries = language_entries(&raw)?;
            (
                InstanceValue::Text(entries.to_string()),
                AttributeValueType::Object,
                raw,
            )
        }
        AttributeType::VocabProperty => {
            let entries = vocab_entries(&raw)?;
            (
                InstanceValue::Text(entries.to_string()),
                AttributeValueType::Array,
                raw,
            )
        }
    };

    payload.insert(member.to_string(), stored);
    payload.insert(
        "type".to_string(),
        JsonValue::String(write.attribute_type.as_str().to_string()),
    );
    if let Some(dataset_id) = &write.dataset_id {
        payload.insert(
            "datasetId".to_string(),
            JsonValue::String(dataset_id.to_string()),
        );
    }
    Ok(ExtractedValue {
        value,
        value_type,
        payload: JsonValue::Object(payload),
    })
}

fn property_value(raw: &JsonValue) -> KairosResult<(InstanceValue, AttributeValueType, JsonValue)> {
    let extracted = match raw {
        JsonValue::Number(number) => {
            let measured = number
                .as_f64()
                .ok_or_else(|| KairosError::bad_request("numeric value out of range"))?;
            (InstanceValue::Measured(measured), AttributeValueType::Number)
        }
        JsonValue::Bool(flag) => (
            InstanceValue::Text(flag.to_string()),
            AttributeValueType::Boolean,
        ),
        JsonValue::String(text) => (InstanceValue::Text(text.clone()), guess_text_type(text)),
        JsonValue::Object(_) => (
            InstanceValue::Text(raw.to_string()),
            AttributeValueType::Object,
        ),
        JsonValue::Array(_) => (
            InstanceValue::Text(raw.to_string()),
            AttributeValueType::Array,
        ),
        JsonValue::Null => return Err(KairosError::bad_request("property value cannot be null")),
    };
    Ok((extracted.0, extracted.1, raw.clone()))
}

fn guess_text_type(text: &str) -> AttributeValueType {
    if parse_timestamp(text).is_ok() {
        AttributeValueType::DateTime
    } else if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() {
        AttributeValueType::Date
    } else if NaiveTime::parse_from_str(text.trim_end_matches('Z'), "%H:%M:%S%.f").is_ok() {
        AttributeValueType::Time
    } else {
        AttributeValueType::String
    }
}

// {"fr": "bonjour"} becomes [{"@language": "fr", "@value": "bonjour"}].
fn language_entries(raw: &JsonValue) -> KairosResult<JsonValue> {
    let map = raw
        .as_object()
        .ok_or_else(|| KairosError::bad_request("languageMap must be a JSON object"))?;
    let mut entries = Vec::with_capacity(map.len());
    for (language, value) in map {
        let values = match value {
            JsonValue::Array(values) => values.clone(),
            other => vec![other.clone()],
        };
        for value in values {
            if !value.is_string() {
                return Err(KairosError::bad_request(format!(
                    "languageMap entry '{language}' must be a string"
                )));
            }
            entries.push(json!({ "@language": language, "@value": value }));
        }
    }
    Ok(JsonValue::Array(entries))
}

// "term" or ["a", "b"] becomes [{"@id": "a"}, {"@id": "b"}].
fn vocab_entries(raw: &JsonValue) -> KairosResult<JsonValue> {
    let terms = match raw {
        JsonValue::String(term) => vec![term.clone()],
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| KairosError::bad_request("vocab entries must be strings"))
            })
            .collect::<KairosResult<Vec<_>>>()?,
        _ => return Err(KairosError::bad_request("vocab must be a string or an array")),
    };
    Ok(JsonValue::Array(
        terms
            .into_iter()
            .map(|term| {
                let mut entry = Map::new();
                entry.insert("@id".to_string(), JsonValue::String(term));
                JsonValue::Object(entry)
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(attribute_type: AttributeType, payload: JsonValue) -> AttributeInstanceWrite {
        AttributeInstanceWrite {
            attribute_name: "attr".to_string(),
            attribute_type,
            dataset_id: None,
            payload,
            observed_at: None,
        }
    }

    #[test]
    fn numeric_property_goes_to_measured_column() {
        let extracted =
            extract_value(&write(AttributeType::Property, json!({ "value": 21.5 }))).unwrap();
        assert_eq!(extracted.value, InstanceValue::Measured(21.5));
        assert_eq!(extracted.value_type, AttributeValueType::Number);
        assert_eq!(extracted.payload["type"], json!("Property"));
    }

    #[test]
    fn guesses_text_value_types() {
        for (raw, expected) in [
            ("2024-01-01T10:00:00Z", AttributeValueType::DateTime),
            ("2024-01-01", AttributeValueType::Date),
            ("10:00:00", AttributeValueType::Time),
            ("open", AttributeValueType::String),
        ] {
            let extracted =
                extract_value(&write(AttributeType::Property, json!({ "value": raw }))).unwrap();
            assert_eq!(extracted.value_type, expected, "{raw}");
        }
        let extracted =
            extract_value(&write(AttributeType::Property, json!({ "value": true }))).unwrap();
        assert_eq!(extracted.value, InstanceValue::Text("true".to_string()));
        assert_eq!(extracted.value_type, AttributeValueType::Boolean);
    }

    #[test]
    fn geo_property_is_stored_as_wkt() {
        let extracted = extract_value(&write(
            AttributeType::GeoProperty,
            json!({ "value": { "type": "Point", "coordinates": [1.0, 2.0] } }),
        ))
        .unwrap();
        let InstanceValue::Geo(wkt) = &extracted.value else {
            panic!("expected geo value");
        };
        assert!(wkt.starts_with("POINT"));
        assert_eq!(extracted.payload["value"], json!(wkt));
        assert_eq!(extracted.value_type, AttributeValueType::Geometry);
    }

    #[test]
    fn language_and_vocab_are_normalized_to_object_arrays() {
        let extracted = extract_value(&write(
            AttributeType::LanguageProperty,
            json!({ "languageMap": { "fr": "bonjour" } }),
        ))
        .unwrap();
        assert_eq!(
            extracted.value,
            InstanceValue::Text(r#"[{"@language":"fr","@value":"bonjour"}]"#.to_string())
        );
        let extracted = extract_value(&write(
            AttributeType::VocabProperty,
            json!({ "vocab": "Open" }),
        ))
        .unwrap();
        assert_eq!(
            extracted.value,
            InstanceValue::Text(r#"[{"@id":"Open"}]"#.to_string())
        );
    }

    #[test]
    fn missing_member_is_rejected() {
        let result = extract_value(&write(AttributeType::Relationship, json!({ "value": 1 })));
        assert!(matches!(result, Err(KairosError::BadRequest { .. })));
        let result = extract_value(&write(
            AttributeType::JsonProperty,
            json!({ "json": "scalar" }),
        ));
        assert!(matches!(result, Err(KairosError::BadRequest { .. })));
    }

    #[test]
    fn reads_write_metadata_from_payload() {
        let write = AttributeInstanceWrite::from_payload(
            "temperature",
            json!({
                "type": "Property",
                "value": 20,
                "observedAt": "2024-01-01T10:00:00Z",
                "datasetId": "urn:dataset:a"
            }),
        )
        .unwrap();
        assert_eq!(write.attribute_type, AttributeType::Property);
        assert_eq!(write.dataset_id.unwrap().as_str(), "urn:dataset:a");
        assert!(write.observed_at.is_some());
    }
}
