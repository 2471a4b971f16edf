use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{AggrPeriod, AggregateMethod, TimeProperty, Timestamp, Uri};

/// Dataset id filter value selecting the default instance of an attribute.
pub const NONE_DATASET_ID: &str = "@none";

/// Attribute name under which scope history is exposed.
pub const SCOPE_ATTRIBUTE: &str = "scope";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timerel {
    Before,
    After,
    Between,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemporalRepresentation {
    #[default]
    Full,
    Simplified,
    Aggregated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalQuery {
    pub timerel: Option<Timerel>,
    pub time_at: Option<Timestamp>,
    pub end_time_at: Option<Timestamp>,
    pub aggr_period: AggrPeriod,
    pub aggr_methods: Vec<AggregateMethod>,
    pub last_n: Option<u32>,
    pub time_property: TimeProperty,
    /// Per-attribute row cap: `min(lastN, configured max)`.
    pub instance_limit: u32,
}

impl TemporalQuery {
    pub fn new(instance_limit: u32) -> Self {
        Self {
            timerel: None,
            time_at: None,
            end_time_at: None,
            aggr_period: AggrPeriod::WholeRange,
            aggr_methods: Vec::new(),
            last_n: None,
            time_property: TimeProperty::ObservedAt,
            instance_limit,
        }
    }

    /// LastN requests walk the timeline backwards from the most recent sample.
    pub fn is_backward(&self) -> bool {
        self.last_n.is_some()
    }

    /// The row cap comes from `lastN` alone, so truncation is what the caller asked for.
    pub fn is_pure_last_n(&self) -> bool {
        matches!(self.last_n, Some(last_n) if last_n <= self.instance_limit)
    }
}

/// Attribute name / dataset id restriction; empty sets select everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub attrs: BTreeSet<String>,
    pub dataset_ids: BTreeSet<String>,
}

impl AttributeFilter {
    /// Scope history rides along unless attrs names other attributes only.
    pub fn includes_scope(&self) -> bool {
        self.attrs.is_empty() || self.attrs.contains(SCOPE_ATTRIBUTE)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalEntityQuery {
    pub temporal: TemporalQuery,
    pub representation: TemporalRepresentation,
    pub with_audit: bool,
    pub filter: AttributeFilter,
}

impl TemporalEntityQuery {
    pub fn new(temporal: TemporalQuery, representation: TemporalRepresentation) -> Self {
        Self {
            temporal,
            representation,
            with_audit: false,
            filter: AttributeFilter::default(),
        }
    }

    pub fn with_scope(&self) -> bool {
        self.filter.includes_scope()
    }
}

/// Entity selection handed to the entity resolver; `q` and `id_pattern` are opaque here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitiesQuery {
    pub ids: Vec<Uri>,
    pub types: Vec<String>,
    pub id_pattern: Option<String>,
    pub q: Option<String>,
    pub attrs: BTreeSet<String>,
    pub limit: u32,
    pub offset: u32,
    pub count: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalEntitiesQuery {
    pub entities: EntitiesQuery,
    pub query: TemporalEntityQuery,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryLimits {
    pub temporal_instance_limit: u32,
    pub entities_limit_default: u32,
    pub entities_limit_max: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            temporal_instance_limit: 10_000,
            entities_limit_default: 30,
            entities_limit_max: 100,
        }
    }
}
