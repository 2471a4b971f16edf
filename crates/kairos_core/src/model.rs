use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{Id, KairosError, KairosResult, Timestamp, Uri};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Property,
    Relationship,
    GeoProperty,
    JsonProperty,
    LanguageProperty,
    VocabProperty,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::Property => "Property",
            AttributeType::Relationship => "Relationship",
            AttributeType::GeoProperty => "GeoProperty",
            AttributeType::JsonProperty => "JsonProperty",
            AttributeType::LanguageProperty => "LanguageProperty",
            AttributeType::VocabProperty => "VocabProperty",
        }
    }

    pub fn parse(value: &str) -> KairosResult<Self> {
        match value {
            "Property" => Ok(AttributeType::Property),
            "Relationship" => Ok(AttributeType::Relationship),
            "GeoProperty" => Ok(AttributeType::GeoProperty),
            "JsonProperty" => Ok(AttributeType::JsonProperty),
            "LanguageProperty" => Ok(AttributeType::LanguageProperty),
            "VocabProperty" => Ok(AttributeType::VocabProperty),
            other => Err(KairosError::bad_request(format!(
                "unknown attribute type '{other}'"
            ))),
        }
    }

    /// Payload member holding the value of an instance of this type.
    pub fn value_member(self) -> &'static str {
        match self {
            AttributeType::Property | AttributeType::GeoProperty => "value",
            AttributeType::Relationship => "object",
            AttributeType::JsonProperty => "json",
            AttributeType::LanguageProperty => "languageMap",
            AttributeType::VocabProperty => "vocab",
        }
    }

    /// Member carrying `[value, time]` pairs in the simplified representation.
    pub fn simplified_member(self) -> &'static str {
        match self {
            AttributeType::Property | AttributeType::GeoProperty => "values",
            AttributeType::Relationship => "objects",
            AttributeType::JsonProperty => "jsons",
            AttributeType::LanguageProperty => "languageMaps",
            AttributeType::VocabProperty => "vocabs",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeValueType {
    Number,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Geometry,
    Json,
    Object,
    Array,
    Uri,
    Any,
}

impl AttributeValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeValueType::Number => "NUMBER",
            AttributeValueType::String => "STRING",
            AttributeValueType::Boolean => "BOOLEAN",
            AttributeValueType::Date => "DATE",
            AttributeValueType::DateTime => "DATETIME",
            AttributeValueType::Time => "TIME",
            AttributeValueType::Geometry => "GEOMETRY",
            AttributeValueType::Json => "JSON",
            AttributeValueType::Object => "OBJECT",
            AttributeValueType::Array => "ARRAY",
            AttributeValueType::Uri => "URI",
            AttributeValueType::Any => "ANY",
        }
    }

    pub fn parse(value: &str) -> KairosResult<Self> {
        Ok(match value {
            "NUMBER" => AttributeValueType::Number,
            "STRING" => AttributeValueType::String,
            "BOOLEAN" => AttributeValueType::Boolean,
            "DATE" => AttributeValueType::Date,
            "DATETIME" => AttributeValueType::DateTime,
            "TIME" => AttributeValueType::Time,
            "GEOMETRY" => AttributeValueType::Geometry,
            "JSON" => AttributeValueType::Json,
            "OBJECT" => AttributeValueType::Object,
            "ARRAY" => AttributeValueType::Array,
            "URI" => AttributeValueType::Uri,
            "ANY" => AttributeValueType::Any,
            other => {
                return Err(KairosError::storage(format!(
                    "unknown attribute value type '{other}'"
                )));
            }
        })
    }

    pub fn value_column(self) -> ValueColumn {
        match self {
            AttributeValueType::Number => ValueColumn::Measured,
            AttributeValueType::Geometry => ValueColumn::Geo,
            _ => ValueColumn::Text,
        }
    }
}

/// Physical column an instance value lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueColumn {
    Text,
    Measured,
    Geo,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeProperty {
    #[default]
    ObservedAt,
    CreatedAt,
    ModifiedAt,
}

impl TimeProperty {
    pub fn key(self) -> &'static str {
        match self {
            TimeProperty::ObservedAt => "observedAt",
            TimeProperty::CreatedAt => "createdAt",
            TimeProperty::ModifiedAt => "modifiedAt",
        }
    }

    pub fn parse(value: &str) -> KairosResult<Self> {
        match value {
            "observedAt" => Ok(TimeProperty::ObservedAt),
            "createdAt" => Ok(TimeProperty::CreatedAt),
            "modifiedAt" => Ok(TimeProperty::ModifiedAt),
            other => Err(KairosError::bad_request(format!(
                "'{other}' is not a valid timeproperty (expected observedAt, createdAt or modifiedAt)"
            ))),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            TimeProperty::ObservedAt => 1,
            TimeProperty::CreatedAt => 2,
            TimeProperty::ModifiedAt => 3,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(TimeProperty::ObservedAt),
            2 => Some(TimeProperty::CreatedAt),
            3 => Some(TimeProperty::ModifiedAt),
            _ => None,
        }
    }

    /// Created/modified events live on the append-only audit timeline.
    pub fn is_audit(self) -> bool {
        !matches!(self, TimeProperty::ObservedAt)
    }
}

/// Identity of one attribute time series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: Id,
    pub entity_id: Uri,
    pub name: String,
    pub dataset_id: Option<Uri>,
    pub attribute_type: AttributeType,
    pub value_type: AttributeValueType,
    pub created_at: Timestamp,
    pub modified_at: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InstanceValue {
    Text(String),
    Measured(f64),
    /// Geometry as WKT.
    Geo(String),
}

impl InstanceValue {
    pub fn column(&self) -> ValueColumn {
        match self {
            InstanceValue::Text(_) => ValueColumn::Text,
            InstanceValue::Measured(_) => ValueColumn::Measured,
            InstanceValue::Geo(_) => ValueColumn::Geo,
        }
    }
}

/// One time-stamped sample or audit event of an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInstance {
    pub attribute_id: Id,
    pub time: Timestamp,
    pub time_property: TimeProperty,
    pub value: InstanceValue,
    pub payload: JsonValue,
    pub instance_id: Uri,
    pub sub: Option<String>,
}

impl AttributeInstance {
    /// Builds an instance whose payload carries its `instanceId`, generating one when absent.
    pub fn new(
        attribute_id: Id,
        time: Timestamp,
        time_property: TimeProperty,
        value: InstanceValue,
        mut payload: JsonValue,
    ) -> KairosResult<Self> {
        let instance_id = match payload.get("instanceId").and_then(JsonValue::as_str) {
            Some(raw) => Uri::parse(raw)?,
            None => Uri::new_instance_id(),
        };
        let object = payload
            .as_object_mut()
            .ok_or_else(|| KairosError::bad_request("attribute instance must be a JSON object"))?;
        object.insert(
            "instanceId".to_string(),
            JsonValue::String(instance_id.to_string()),
        );
        Ok(Self {
            attribute_id,
            time,
            time_property,
            value,
            payload,
            instance_id,
            sub: None,
        })
    }

    pub fn with_sub(mut self, sub: Option<String>) -> Self {
        self.sub = sub;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateMethod {
    Min,
    Max,
    Avg,
    Sum,
    Count,
    TotalCount,
    DistinctCount,
    Stddev,
    Sumsq,
}

impl AggregateMethod {
    pub const ALL: [AggregateMethod; 9] = [
        AggregateMethod::Min,
        AggregateMethod::Max,
        AggregateMethod::Avg,
        AggregateMethod::Sum,
        AggregateMethod::Count,
        AggregateMethod::TotalCount,
        AggregateMethod::DistinctCount,
        AggregateMethod::Stddev,
        AggregateMethod::Sumsq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateMethod::Min => "min",
            AggregateMethod::Max => "max",
            AggregateMethod::Avg => "avg",
            AggregateMethod::Sum => "sum",
            AggregateMethod::Count => "count",
            AggregateMethod::TotalCount => "totalCount",
            AggregateMethod::DistinctCount => "distinctCount",
            AggregateMethod::Stddev => "stddev",
            AggregateMethod::Sumsq => "sumsq",
        }
    }

    pub fn parse(value: &str) -> KairosResult<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == value)
            .ok_or_else(|| {
                KairosError::bad_request(format!("'{value}' is not a supported aggregate method"))
            })
    }

    /// Counting methods apply to every value type.
    pub fn is_count(self) -> bool {
        matches!(
            self,
            AggregateMethod::Count | AggregateMethod::TotalCount | AggregateMethod::DistinctCount
        )
    }
}

impl fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    pub method: AggregateMethod,
    pub value: JsonValue,
}

/// A fetched row in the shape the requested representation needs.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeInstanceResult {
    Full {
        attribute_id: Id,
        payload: JsonValue,
        time: Timestamp,
        sub: Option<String>,
    },
    Simplified {
        attribute_id: Id,
        value: InstanceValue,
        time: Timestamp,
    },
    Aggregated {
        attribute_id: Id,
        start: Timestamp,
        end: Timestamp,
        values: Vec<AggregateValue>,
    },
}

impl AttributeInstanceResult {
    pub fn attribute_id(&self) -> Id {
        match self {
            AttributeInstanceResult::Full { attribute_id, .. }
            | AttributeInstanceResult::Simplified { attribute_id, .. }
            | AttributeInstanceResult::Aggregated { attribute_id, .. } => *attribute_id,
        }
    }

    /// Representative time: the sample time, or the bucket start.
    pub fn time(&self) -> Timestamp {
        match self {
            AttributeInstanceResult::Full { time, .. }
            | AttributeInstanceResult::Simplified { time, .. } => *time,
            AttributeInstanceResult::Aggregated { start, .. } => *start,
        }
    }

    pub fn end_time(&self) -> Timestamp {
        match self {
            AttributeInstanceResult::Aggregated { end, .. } => *end,
            other => other.time(),
        }
    }
}

/// Time window every attribute of a paginated response is truncated to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Range {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Inclusive on both bounds, whichever way the range is oriented.
    pub fn contains(&self, time: Timestamp) -> bool {
        let (low, high) = if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        };
        low <= time && time <= high
    }
}

/// One entry of an entity's scope history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopeInstance {
    pub entity_id: Uri,
    pub time: Timestamp,
    pub value: JsonValue,
}
