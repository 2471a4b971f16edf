use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{KairosError, KairosResult};

/// Surrogate key of an attribute time series.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Id(pub [u8; 16]);

impl Id {
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn from_uuid_str(value: &str) -> KairosResult<Self> {
        let uuid = Uuid::parse_str(value)
            .map_err(|err| KairosError::bad_request(format!("invalid uuid '{value}': {err}")))?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn to_uuid_string(self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn as_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = Uuid::from_bytes(self.0);
        write!(f, "{uuid}")
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Uuid::parse_str(&value)
            .map(|uuid| Id::from_bytes(*uuid.as_bytes()))
            .map_err(|_| serde::de::Error::custom("invalid Id string"))
    }
}

/// Absolute URI naming an entity, a dataset or an attribute instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Uri(String);

impl Uri {
    pub fn parse(value: &str) -> KairosResult<Self> {
        let Some((scheme, rest)) = value.split_once(':') else {
            return Err(KairosError::bad_request(format!(
                "'{value}' is not a valid URI"
            )));
        };
        let scheme_ok = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok || rest.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(KairosError::bad_request(format!(
                "'{value}' is not a valid URI"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn new_instance_id() -> Self {
        Self(format!("urn:ngsi-ld:Instance:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Uri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Uri::parse(&value).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Id, Uri};

    #[test]
    fn id_roundtrips_uuid() {
        let id = Id::new();
        let parsed = Id::from_uuid_str(&id.to_uuid_string()).expect("uuid parse");
        assert_eq!(parsed, id);
        assert!(Id::from_uuid_str("not-a-uuid").is_err());
    }

    #[test]
    fn uri_requires_scheme() {
        assert!(Uri::parse("urn:ngsi-ld:Sensor:01").is_ok());
        assert!(Uri::parse("https://example.org/a").is_ok());
        assert!(Uri::parse("Sensor01").is_err());
        assert!(Uri::parse("1urn:x").is_err());
        assert!(Uri::parse("urn:").is_err());
        assert!(Uri::parse("urn:a b").is_err());
    }

    #[test]
    fn generated_instance_ids_are_distinct() {
        let first = Uri::new_instance_id();
        let second = Uri::new_instance_id();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("urn:ngsi-ld:Instance:"));
    }
}
