use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Attribute, AttributeFilter, AttributeInstance, AttributeInstanceResult, AttributeType,
    AttributeValueType, EntitiesQuery, KairosResult, ScopeInstance, TemporalEntityQuery,
    TemporalQuery, Timestamp, Uri,
};

/// Durable writes and deletions on both instance timelines.
#[async_trait]
pub trait AttributeInstanceApi: Send + Sync {
    /// Upserts on the observed timeline (keyed by attribute and time), appends on the audit one.
    async fn create_instance(&self, instance: AttributeInstance) -> KairosResult<()>;

    /// Atomically removes the observed instance carrying `instance.instance_id` from the
    /// series of `instance.attribute_id` and writes `instance` in its place. Fails with
    /// NotFound when that series holds no such instance.
    async fn replace_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance: AttributeInstance,
    ) -> KairosResult<()>;

    /// Fails with NotFound when no instance with this id exists on either timeline.
    async fn delete_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance_id: &Uri,
    ) -> KairosResult<()>;

    async fn delete_instances_of_attribute(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        dataset_id: Option<&Uri>,
    ) -> KairosResult<u64>;

    /// Every dataset of the attribute.
    async fn delete_all_instances_of_attribute(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
    ) -> KairosResult<u64>;

    async fn delete_instances_of_entity(&self, entity_id: &Uri) -> KairosResult<u64>;

    async fn select_oldest_timestamp(
        &self,
        query: &TemporalQuery,
        attributes: &[Attribute],
    ) -> KairosResult<Option<Timestamp>>;
}

#[async_trait]
pub trait AttributeInstanceSearchApi: Send + Sync {
    /// Rows for every attribute, capped per attribute at `instance_limit`.
    ///
    /// Backward (lastN) queries come back newest first; callers restore ascending order.
    async fn search(
        &self,
        query: &TemporalEntityQuery,
        attributes: &[Attribute],
        origin: Option<Timestamp>,
    ) -> KairosResult<Vec<AttributeInstanceResult>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpsertAttributeInput {
    pub entity_id: Uri,
    pub name: String,
    pub dataset_id: Option<Uri>,
    pub attribute_type: AttributeType,
    pub value_type: AttributeValueType,
    pub at: Timestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeUpsert {
    pub attribute: Attribute,
    pub created: bool,
}

#[async_trait]
pub trait AttributeMetadataApi: Send + Sync {
    async fn get_attributes(
        &self,
        entity_ids: &[Uri],
        filter: &AttributeFilter,
    ) -> KairosResult<Vec<Attribute>>;

    async fn get_attribute(
        &self,
        entity_id: &Uri,
        name: &str,
        dataset_id: Option<&Uri>,
    ) -> KairosResult<Option<Attribute>>;

    async fn upsert_attribute(&self, input: UpsertAttributeInput) -> KairosResult<AttributeUpsert>;

    /// Removes metadata rows only; instances are deleted through [`AttributeInstanceApi`].
    async fn delete_attribute(
        &self,
        entity_id: &Uri,
        name: &str,
        dataset_id: Option<&Uri>,
        all_datasets: bool,
    ) -> KairosResult<u64>;

    async fn delete_attributes_of_entity(&self, entity_id: &Uri) -> KairosResult<u64>;
}

/// Row-level restriction handed through to the entity resolver untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFilter(pub Option<String>);

/// Existence and authorization decisions owned by the current-state store.
#[async_trait]
pub trait EntityAccessApi: Send + Sync {
    async fn entity_exists(&self, entity_id: &Uri) -> KairosResult<bool>;
    /// Returns AccessDenied when the caller may not read the entity.
    async fn check_read(&self, entity_id: &Uri) -> KairosResult<()>;
    async fn check_write(&self, entity_id: &Uri) -> KairosResult<()>;
    async fn access_filter(&self) -> KairosResult<AccessFilter>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPage {
    pub entity_ids: Vec<Uri>,
    /// Total matches irrespective of limit/offset.
    pub count: u64,
}

#[async_trait]
pub trait EntityResolverApi: Send + Sync {
    async fn resolve_entities(
        &self,
        query: &EntitiesQuery,
        access: &AccessFilter,
    ) -> KairosResult<EntityPage>;
}

#[async_trait]
pub trait ScopeHistoryApi: Send + Sync {
    async fn scope_history(
        &self,
        entity_ids: &[Uri],
        query: &TemporalEntityQuery,
    ) -> KairosResult<Vec<ScopeInstance>>;

    async fn oldest_scope_timestamp(
        &self,
        entity_ids: &[Uri],
        query: &TemporalEntityQuery,
    ) -> KairosResult<Option<Timestamp>>;
}

/// Scope history source for deployments that do not track scopes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScopeHistory;

#[async_trait]
impl ScopeHistoryApi for NoScopeHistory {
    async fn scope_history(
        &self,
        _entity_ids: &[Uri],
        _query: &TemporalEntityQuery,
    ) -> KairosResult<Vec<ScopeInstance>> {
        Ok(Vec::new())
    }

    async fn oldest_scope_timestamp(
        &self,
        _entity_ids: &[Uri],
        _query: &TemporalEntityQuery,
    ) -> KairosResult<Option<Timestamp>> {
        Ok(None)
    }
}
