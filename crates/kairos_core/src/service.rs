//! Temporal use cases: guarded reads over search, pagination and rendering, plus the
//! instance write and delete paths.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    Attribute, AttributeFilter, AttributeInstance, AttributeInstanceApi, AttributeInstanceResult,
    AttributeInstanceSearchApi, AttributeInstanceWrite, AttributeMetadataApi,
    AttributesWithInstances, EntityAccessApi, EntityResolverApi, Id, KairosError, KairosResult,
    NoScopeHistory, Range, ScopeHistoryApi, ScopeInstance, TemporalEntitiesQuery,
    TemporalEntityQuery, TemporalRepresentation, TimeProperty, Timestamp, UpsertAttributeInput,
    Uri, build_temporal_entities, build_temporal_entity, extract_value, paginate,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedDetails {
    pub attribute_name: String,
    pub dataset_id: Option<Uri>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotUpdatedDetails {
    pub attribute_name: String,
    pub dataset_id: Option<Uri>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub updated: Vec<UpdatedDetails>,
    pub not_updated: Vec<NotUpdatedDetails>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemporalEntitiesPage {
    pub entities: Vec<JsonValue>,
    pub range: Option<Range>,
    /// Total matching entities, when requested.
    pub count: Option<u64>,
}

struct History {
    instances: AttributesWithInstances,
    scopes: Vec<ScopeInstance>,
    origin: Option<Timestamp>,
    range: Option<Range>,
}

pub struct TemporalQueryService {
    instances: Arc<dyn AttributeInstanceApi>,
    search: Arc<dyn AttributeInstanceSearchApi>,
    metadata: Arc<dyn AttributeMetadataApi>,
    access: Arc<dyn EntityAccessApi>,
    resolver: Arc<dyn EntityResolverApi>,
    scopes: Arc<dyn ScopeHistoryApi>,
}

impl TemporalQueryService {
    pub fn new<S>(
        store: Arc<S>,
        access: Arc<dyn EntityAccessApi>,
        resolver: Arc<dyn EntityResolverApi>,
    ) -> Self
    where
        S: AttributeInstanceApi + AttributeInstanceSearchApi + AttributeMetadataApi + 'static,
    {
        Self {
            instances: store.clone(),
            search: store.clone(),
            metadata: store,
            access,
            resolver,
            scopes: Arc::new(NoScopeHistory),
        }
    }

    pub fn with_scope_history(mut self, scopes: Arc<dyn ScopeHistoryApi>) -> Self {
        self.scopes = scopes;
        self
    }

    async fn guard_read(&self, entity_id: &Uri) -> KairosResult<()> {
        if !self.access.entity_exists(entity_id).await? {
            return Err(KairosError::not_found(format!("entity {entity_id} does not exist")));
        }
        self.access.check_read(entity_id).await
    }

    async fn guard_write(&self, entity_id: &Uri) -> KairosResult<()> {
        if !self.access.entity_exists(entity_id).await? {
            return Err(KairosError::not_found(format!("entity {entity_id} does not exist")));
        }
        self.access.check_write(entity_id).await
    }

    /// Temporal view of one entity and the range it was truncated to, if any.
    pub async fn query_temporal_entity(
        &self,
        entity_id: &Uri,
        query: &TemporalEntityQuery,
    ) -> KairosResult<(JsonValue, Option<Range>)> {
        self.guard_read(entity_id).await?;
        let entity_ids = std::slice::from_ref(entity_id);
        let attributes = self
            .metadata
            .get_attributes(entity_ids, &query.filter)
            .await?;
        if attributes.is_empty() {
            return Err(KairosError::not_found(format!(
                "no matching attribute on entity {entity_id}"
            )));
        }
        let history = self.fetch_history(entity_ids, &attributes, query).await?;
        let document = build_temporal_entity(
            entity_id,
            &history.instances,
            &history.scopes,
            query,
            history.origin,
        )?;
        Ok((document, history.range))
    }

    pub async fn query_temporal_entities(
        &self,
        query: &TemporalEntitiesQuery,
    ) -> KairosResult<TemporalEntitiesPage> {
        let access = self.access.access_filter().await?;
        let page = self
            .resolver
            .resolve_entities(&query.entities, &access)
            .await?;
        let count = query.entities.count.then_some(page.count);
        if page.entity_ids.is_empty() {
            debug!("temporal entities: empty page, {} total", page.count);
            return Ok(TemporalEntitiesPage {
                entities: Vec::new(),
                range: None,
                count,
            });
        }

        let attributes = self
            .metadata
            .get_attributes(&page.entity_ids, &query.query.filter)
            .await?;
        let history = self
            .fetch_history(&page.entity_ids, &attributes, &query.query)
            .await?;
        let entities = build_temporal_entities(
            &page.entity_ids,
            history.instances,
            &history.scopes,
            &query.query,
            history.origin,
        )?;
        Ok(TemporalEntitiesPage {
            entities,
            range: history.range,
            count,
        })
    }

    /// Bucket origin for aggregated queries: `timeAt` when given, else the oldest known
    /// instance or scope time.
    pub async fn calculate_oldest_timestamp(
        &self,
        entity_ids: &[Uri],
        attributes: &[Attribute],
        query: &TemporalEntityQuery,
    ) -> KairosResult<Option<Timestamp>> {
        if query.representation != TemporalRepresentation::Aggregated {
            return Ok(None);
        }
        if let Some(time_at) = query.temporal.time_at {
            return Ok(Some(time_at));
        }
        let oldest_instance = self
            .instances
            .select_oldest_timestamp(&query.temporal, attributes)
            .await?;
        let oldest_scope = if query.with_scope() {
            self.scopes.oldest_scope_timestamp(entity_ids, query).await?
        } else {
            None
        };
        Ok(match (oldest_instance, oldest_scope) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    async fn fetch_history(
        &self,
        entity_ids: &[Uri],
        attributes: &[Attribute],
        query: &TemporalEntityQuery,
    ) -> KairosResult<History> {
        let origin = self
            .calculate_oldest_timestamp(entity_ids, attributes, query)
            .await?;
        let unbucketed = query.representation == TemporalRepresentation::Aggregated
            && origin.is_none();
        if unbucketed {
            debug!("aggregated query without origin: nothing to bucket");
            let empty = attributes
                .iter()
                .map(|attribute| (attribute.clone(), Vec::new()))
                .collect();
            return Ok(History {
                instances: empty,
                scopes: Vec::new(),
                origin: None,
                range: None,
            });
        }

        let search = self.search.search(query, attributes, origin);
        let scopes = async {
            if query.with_scope() {
                self.scopes.scope_history(entity_ids, query).await
            } else {
                Ok(Vec::new())
            }
        };
        let (results, scopes) = futures::try_join!(search, scopes)?;
        let grouped = group_by_attribute(attributes, results);
        let (mut paginated, range) = paginate(grouped, &query.temporal);
        for (_, instances) in &mut paginated {
            instances.sort_by_key(AttributeInstanceResult::time);
        }
        Ok(History {
            instances: paginated,
            scopes,
            origin,
            range,
        })
    }

    /// Writes each instance independently; one failure does not stop the others.
    pub async fn upsert_attributes(
        &self,
        entity_id: &Uri,
        writes: Vec<AttributeInstanceWrite>,
        sub: Option<String>,
    ) -> KairosResult<UpdateResult> {
        self.guard_write(entity_id).await?;
        let mut result = UpdateResult::default();
        for write in writes {
            match self.upsert_one(entity_id, &write, sub.clone()).await {
                Ok(()) => result.updated.push(UpdatedDetails {
                    attribute_name: write.attribute_name,
                    dataset_id: write.dataset_id,
                }),
                Err(err) => result.not_updated.push(NotUpdatedDetails {
                    attribute_name: write.attribute_name,
                    dataset_id: write.dataset_id,
                    reason: err.to_string(),
                }),
            }
        }
        info!(
            "upsert on {entity_id}: {} updated, {} not updated",
            result.updated.len(),
            result.not_updated.len()
        );
        Ok(result)
    }

    async fn upsert_one(
        &self,
        entity_id: &Uri,
        write: &AttributeInstanceWrite,
        sub: Option<String>,
    ) -> KairosResult<()> {
        let extracted = extract_value(write)?;
        let now = Utc::now();
        // The instance is validated before the attribute row exists; its id is bound below.
        let mut observed = AttributeInstance::new(
            Id::from_bytes([0; 16]),
            write.observed_at.unwrap_or(now),
            TimeProperty::ObservedAt,
            extracted.value,
            extracted.payload,
        )?;
        let upsert = self
            .metadata
            .upsert_attribute(UpsertAttributeInput {
                entity_id: entity_id.clone(),
                name: write.attribute_name.clone(),
                dataset_id: write.dataset_id.clone(),
                attribute_type: write.attribute_type,
                value_type: extracted.value_type,
                at: now,
            })
            .await?;
        observed.attribute_id = upsert.attribute.id;
        let audit_property = if upsert.created {
            TimeProperty::CreatedAt
        } else {
            TimeProperty::ModifiedAt
        };
        let audit = AttributeInstance {
            time: now,
            time_property: audit_property,
            ..observed.clone()
        }
        .with_sub(sub);
        if write.observed_at.is_some() {
            self.instances.create_instance(observed).await?;
        }
        self.instances.create_instance(audit).await
    }

    /// Replaces one observed instance, keeping its instance id.
    ///
    /// The instance must belong to the series selected by the write's `datasetId`; an
    /// instance of another dataset is NotFound.
    pub async fn modify_attribute_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance_id: &Uri,
        write: AttributeInstanceWrite,
        sub: Option<String>,
    ) -> KairosResult<()> {
        self.guard_write(entity_id).await?;
        let attribute = self
            .metadata
            .get_attribute(entity_id, attribute_name, write.dataset_id.as_ref())
            .await?
            .ok_or_else(|| {
                KairosError::not_found(format!(
                    "attribute {attribute_name} not found on entity {entity_id}"
                ))
            })?;
        let observed_at = write.observed_at.ok_or_else(|| {
            KairosError::bad_request("a modified instance must carry observedAt")
        })?;
        let mut extracted = extract_value(&write)?;
        if let Some(payload) = extracted.payload.as_object_mut() {
            payload.insert(
                "instanceId".to_string(),
                JsonValue::String(instance_id.to_string()),
            );
        }
        let instance = AttributeInstance::new(
            attribute.id,
            observed_at,
            TimeProperty::ObservedAt,
            extracted.value,
            extracted.payload,
        )?;
        let now = Utc::now();
        let audit = AttributeInstance {
            time: now,
            time_property: TimeProperty::ModifiedAt,
            ..instance.clone()
        }
        .with_sub(sub);
        self.instances
            .replace_instance(entity_id, attribute_name, instance)
            .await?;
        self.metadata
            .upsert_attribute(UpsertAttributeInput {
                entity_id: entity_id.clone(),
                name: attribute.name,
                dataset_id: attribute.dataset_id,
                attribute_type: attribute.attribute_type,
                value_type: extracted.value_type,
                at: now,
            })
            .await?;
        self.instances.create_instance(audit).await?;
        info!("modified instance {instance_id} of {attribute_name} on {entity_id}");
        Ok(())
    }

    pub async fn delete_attribute_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance_id: &Uri,
    ) -> KairosResult<()> {
        self.guard_write(entity_id).await?;
        self.instances
            .delete_instance(entity_id, attribute_name, instance_id)
            .await?;
        info!("deleted instance {instance_id} of {attribute_name} on {entity_id}");
        Ok(())
    }

    /// Drops the history and metadata of one attribute, or of all its datasets.
    pub async fn delete_attribute_history(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        dataset_id: Option<&Uri>,
        delete_all: bool,
    ) -> KairosResult<()> {
        self.guard_write(entity_id).await?;
        let exists = if delete_all {
            let filter = AttributeFilter {
                attrs: [attribute_name.to_string()].into_iter().collect(),
                ..AttributeFilter::default()
            };
            !self
                .metadata
                .get_attributes(std::slice::from_ref(entity_id), &filter)
                .await?
                .is_empty()
        } else {
            self.metadata
                .get_attribute(entity_id, attribute_name, dataset_id)
                .await?
                .is_some()
        };
        if !exists {
            return Err(KairosError::not_found(format!(
                "attribute {attribute_name} not found on entity {entity_id}"
            )));
        }
        let removed = if delete_all {
            self.instances
                .delete_all_instances_of_attribute(entity_id, attribute_name)
                .await?
        } else {
            self.instances
                .delete_instances_of_attribute(entity_id, attribute_name, dataset_id)
                .await?
        };
        self.metadata
            .delete_attribute(entity_id, attribute_name, dataset_id, delete_all)
            .await?;
        info!("deleted {removed} instance(s) of {attribute_name} on {entity_id}");
        Ok(())
    }

    /// Purges both timelines and metadata of every entity; entities are processed in parallel.
    pub async fn delete_entities_history(&self, entity_ids: &[Uri]) -> KairosResult<u64> {
        let removed = try_join_all(entity_ids.iter().map(|entity_id| async move {
            let removed = self.instances.delete_instances_of_entity(entity_id).await?;
            self.metadata.delete_attributes_of_entity(entity_id).await?;
            Ok::<_, KairosError>(removed)
        }))
        .await?;
        let total: u64 = removed.iter().sum();
        info!(
            "deleted history of {} entit(ies), {total} instance(s)",
            entity_ids.len()
        );
        Ok(total)
    }
}

/// Pairs each attribute with its rows, keeping attribute order.
fn group_by_attribute(
    attributes: &[Attribute],
    results: Vec<AttributeInstanceResult>,
) -> AttributesWithInstances {
    let mut by_id: HashMap<Id, Vec<AttributeInstanceResult>> = HashMap::new();
    for result in results {
        by_id.entry(result.attribute_id()).or_default().push(result);
    }
    attributes
        .iter()
        .map(|attribute| {
            let instances = by_id.remove(&attribute.id).unwrap_or_default();
            (attribute.clone(), instances)
        })
        .collect()
}
