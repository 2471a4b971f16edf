use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use kairos_store::{
    AccessFilter, AttributeInstanceWrite, EntitiesQuery, EntityAccessApi, EntityPage,
    EntityResolverApi, KairosError, KairosResult, KairosStore, QueryLimits, QueryParams,
    ScopeHistoryApi, ScopeInstance, TemporalEntityQuery, TemporalQueryService, Timestamp, Uri,
    format_timestamp, parse_temporal_entities_query, parse_temporal_entity_query,
    parse_timestamp,
};
use serde_json::{Value as JsonValue, json};
use tempfile::{TempDir, tempdir};

/// Fixed set of entities with per-entity denials.
struct Directory {
    entities: Vec<Uri>,
    denied: Vec<Uri>,
}

impl Directory {
    fn guard(&self, entity_id: &Uri) -> KairosResult<()> {
        if self.denied.contains(entity_id) {
            return Err(KairosError::access_denied(format!(
                "no access to {entity_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityAccessApi for Directory {
    async fn entity_exists(&self, entity_id: &Uri) -> KairosResult<bool> {
        Ok(self.entities.contains(entity_id))
    }

    async fn check_read(&self, entity_id: &Uri) -> KairosResult<()> {
        self.guard(entity_id)
    }

    async fn check_write(&self, entity_id: &Uri) -> KairosResult<()> {
        self.guard(entity_id)
    }

    async fn access_filter(&self) -> KairosResult<AccessFilter> {
        Ok(AccessFilter::default())
    }
}

#[async_trait]
impl EntityResolverApi for Directory {
    async fn resolve_entities(
        &self,
        query: &EntitiesQuery,
        _access: &AccessFilter,
    ) -> KairosResult<EntityPage> {
        let matching: Vec<Uri> = self
            .entities
            .iter()
            .filter(|entity_id| query.ids.is_empty() || query.ids.contains(entity_id))
            .cloned()
            .collect();
        let count = matching.len() as u64;
        let entity_ids = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(EntityPage { entity_ids, count })
    }
}

/// Recorded scope changes, served for whichever entities are asked for.
struct ScopeTrail {
    scopes: Vec<ScopeInstance>,
}

impl ScopeTrail {
    fn of<'a>(&'a self, entity_ids: &'a [Uri]) -> impl Iterator<Item = &'a ScopeInstance> {
        self.scopes
            .iter()
            .filter(move |scope| entity_ids.contains(&scope.entity_id))
    }
}

#[async_trait]
impl ScopeHistoryApi for ScopeTrail {
    async fn scope_history(
        &self,
        entity_ids: &[Uri],
        _query: &TemporalEntityQuery,
    ) -> KairosResult<Vec<ScopeInstance>> {
        Ok(self.of(entity_ids).cloned().collect())
    }

    async fn oldest_scope_timestamp(
        &self,
        entity_ids: &[Uri],
        _query: &TemporalEntityQuery,
    ) -> KairosResult<Option<Timestamp>> {
        Ok(self.of(entity_ids).map(|scope| scope.time).min())
    }
}

struct Fixture {
    _dir: TempDir,
    service: TemporalQueryService,
}

fn sensor(n: u32) -> Uri {
    Uri::parse(&format!("urn:ngsi-ld:Sensor:{n:02}")).expect("uri")
}

fn base() -> Timestamp {
    parse_timestamp("2024-05-01T00:00:00Z").expect("time")
}

async fn fixture() -> KairosResult<Fixture> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(KairosStore::connect_sqlite(&dir.path().join("service.sqlite")).await?);
    let directory = Arc::new(Directory {
        entities: vec![sensor(1), sensor(2), sensor(3)],
        denied: vec![sensor(3)],
    });
    let service = TemporalQueryService::new(store, directory.clone(), directory);
    Ok(Fixture { _dir: dir, service })
}

fn params(pairs: &[(&str, &str)]) -> QueryParams {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn limits(temporal_instance_limit: u32) -> QueryLimits {
    QueryLimits {
        temporal_instance_limit,
        ..QueryLimits::default()
    }
}

fn measurement(name: &str, value: f64, time: Timestamp) -> AttributeInstanceWrite {
    AttributeInstanceWrite::from_payload(
        name,
        json!({ "type": "Property", "value": value, "observedAt": format_timestamp(time) }),
    )
    .expect("write")
}

async fn record(
    service: &TemporalQueryService,
    entity_id: &Uri,
    writes: Vec<AttributeInstanceWrite>,
) -> KairosResult<()> {
    let result = service.upsert_attributes(entity_id, writes, None).await?;
    assert!(result.not_updated.is_empty(), "{:?}", result.not_updated);
    Ok(())
}

fn values(document: &JsonValue, name: &str) -> Vec<JsonValue> {
    document[name]["values"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[tokio::test]
async fn truncated_attributes_share_one_range() -> KairosResult<()> {
    let fixture = fixture().await?;
    let writes = (0..30)
        .map(|i| measurement("temp", 20.0 + i as f64, base() + Duration::minutes(12 * i)))
        .chain((0..3).map(|day| {
            measurement(
                "battery",
                90.0 - day as f64,
                base() + Duration::hours(1) + Duration::days(day),
            )
        }))
        .collect();
    record(&fixture.service, &sensor(1), writes).await?;

    let query = parse_temporal_entity_query(
        &params(&[
            ("timerel", "after"),
            ("timeAt", "2024-05-01T00:00:00Z"),
            ("options", "temporalValues"),
        ]),
        &limits(10),
    )?;
    let (document, range) = fixture
        .service
        .query_temporal_entity(&sensor(1), &query)
        .await?;
    let range = range.expect("truncated");
    assert_eq!(range.start, base());
    assert_eq!(range.end, base() + Duration::minutes(108));

    let temp = values(&document, "temp");
    assert_eq!(temp.len(), 10);
    assert_eq!(temp[0], json!([20.0, "2024-05-01T00:00:00Z"]));
    let battery = values(&document, "battery");
    assert_eq!(battery, vec![json!([90.0, "2024-05-01T01:00:00Z"])]);
    Ok(())
}

#[tokio::test]
async fn last_n_comes_back_in_ascending_order() -> KairosResult<()> {
    let fixture = fixture().await?;
    let writes = (0..4)
        .map(|i| measurement("temp", i as f64, base() + Duration::hours(i)))
        .collect();
    record(&fixture.service, &sensor(1), writes).await?;

    let query = parse_temporal_entity_query(
        &params(&[("lastN", "2"), ("options", "temporalValues")]),
        &limits(100),
    )?;
    let (document, range) = fixture
        .service
        .query_temporal_entity(&sensor(1), &query)
        .await?;
    assert!(range.is_none());
    assert_eq!(
        values(&document, "temp"),
        vec![
            json!([2.0, "2024-05-01T02:00:00Z"]),
            json!([3.0, "2024-05-01T03:00:00Z"]),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn reads_are_guarded() -> KairosResult<()> {
    let fixture = fixture().await?;
    let query = parse_temporal_entity_query(&params(&[]), &limits(100))?;

    let unknown = Uri::parse("urn:ngsi-ld:Sensor:99")?;
    let err = fixture
        .service
        .query_temporal_entity(&unknown, &query)
        .await
        .expect_err("unknown entity");
    assert!(matches!(err, KairosError::NotFound { .. }));

    let err = fixture
        .service
        .query_temporal_entity(&sensor(3), &query)
        .await
        .expect_err("denied entity");
    assert!(matches!(err, KairosError::AccessDenied { .. }));

    // Known entity without any temporal attribute.
    let err = fixture
        .service
        .query_temporal_entity(&sensor(2), &query)
        .await
        .expect_err("no attributes");
    assert!(matches!(err, KairosError::NotFound { .. }));

    let err = fixture
        .service
        .upsert_attributes(&sensor(3), vec![measurement("temp", 1.0, base())], None)
        .await
        .expect_err("denied write");
    assert!(matches!(err, KairosError::AccessDenied { .. }));
    Ok(())
}

#[tokio::test]
async fn upserts_report_each_write_and_audit_changes() -> KairosResult<()> {
    let fixture = fixture().await?;
    let broken = AttributeInstanceWrite::from_payload("label", json!({ "type": "Property" }))?;
    let result = fixture
        .service
        .upsert_attributes(
            &sensor(1),
            vec![measurement("temp", 21.5, base()), broken],
            Some("alice".to_string()),
        )
        .await?;
    assert_eq!(result.updated.len(), 1);
    assert_eq!(result.updated[0].attribute_name, "temp");
    assert_eq!(result.not_updated.len(), 1);
    assert_eq!(result.not_updated[0].attribute_name, "label");

    fixture
        .service
        .upsert_attributes(
            &sensor(1),
            vec![measurement("temp", 22.0, base() + Duration::minutes(5))],
            Some("bob".to_string()),
        )
        .await?;

    let created = parse_temporal_entity_query(
        &params(&[("timeproperty", "createdAt"), ("options", "audit")]),
        &limits(100),
    )?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &created)
        .await?;
    let entries = document["temp"].as_array().expect("full instances");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["sub"], json!("alice"));
    assert_eq!(entries[0]["value"], json!(21.5));
    assert!(entries[0]["createdAt"].is_string());

    let modified = parse_temporal_entity_query(
        &params(&[("timeproperty", "modifiedAt")]),
        &limits(100),
    )?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &modified)
        .await?;
    let entries = document["temp"].as_array().expect("full instances");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].get("sub").is_none());
    assert!(entries[0]["modifiedAt"].is_string());

    let modified = parse_temporal_entity_query(
        &params(&[("timeproperty", "modifiedAt"), ("options", "audit")]),
        &limits(100),
    )?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &modified)
        .await?;
    assert_eq!(document["temp"][0]["sub"], json!("bob"));
    Ok(())
}

#[tokio::test]
async fn rejected_write_leaves_no_attribute_behind() -> KairosResult<()> {
    let fixture = fixture().await?;
    let invalid = AttributeInstanceWrite::from_payload(
        "temp",
        json!({
            "type": "Property",
            "value": 1.0,
            "observedAt": format_timestamp(base()),
            "instanceId": "not a uri",
        }),
    )?;
    let result = fixture
        .service
        .upsert_attributes(&sensor(1), vec![invalid], Some("alice".to_string()))
        .await?;
    assert!(result.updated.is_empty());
    assert_eq!(result.not_updated.len(), 1);

    let full = parse_temporal_entity_query(&params(&[]), &limits(100))?;
    let err = fixture
        .service
        .query_temporal_entity(&sensor(1), &full)
        .await
        .expect_err("no attribute was stored");
    assert!(matches!(err, KairosError::NotFound { .. }));

    fixture
        .service
        .upsert_attributes(
            &sensor(1),
            vec![measurement("temp", 2.0, base())],
            Some("alice".to_string()),
        )
        .await?;
    let created = parse_temporal_entity_query(
        &params(&[("timeproperty", "createdAt"), ("options", "audit")]),
        &limits(100),
    )?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &created)
        .await?;
    let entries = document["temp"].as_array().expect("full instances");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["sub"], json!("alice"));
    Ok(())
}

#[tokio::test]
async fn modify_and_delete_single_instances() -> KairosResult<()> {
    let fixture = fixture().await?;
    record(
        &fixture.service,
        &sensor(1),
        vec![measurement("temp", 20.0, base())],
    )
    .await?;
    let full = parse_temporal_entity_query(&params(&[]), &limits(100))?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &full)
        .await?;
    let instance_id = document["temp"][0]["instanceId"]
        .as_str()
        .map(Uri::parse)
        .transpose()?
        .expect("instance id");
    assert_eq!(document["temp"][0]["observedAt"], json!("2024-05-01T00:00:00Z"));

    fixture
        .service
        .modify_attribute_instance(
            &sensor(1),
            "temp",
            &instance_id,
            measurement("temp", 25.0, base() + Duration::minutes(1)),
            None,
        )
        .await?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &full)
        .await?;
    let entries = document["temp"].as_array().expect("full instances");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["value"], json!(25.0));
    assert_eq!(entries[0]["instanceId"], json!(instance_id.as_str()));
    assert_eq!(entries[0]["observedAt"], json!("2024-05-01T00:01:00Z"));

    fixture
        .service
        .delete_attribute_instance(&sensor(1), "temp", &instance_id)
        .await?;
    let err = fixture
        .service
        .delete_attribute_instance(&sensor(1), "temp", &instance_id)
        .await
        .expect_err("already deleted");
    assert!(matches!(err, KairosError::NotFound { .. }));

    let missing = Uri::parse("urn:ngsi-ld:Instance:missing")?;
    let err = fixture
        .service
        .modify_attribute_instance(
            &sensor(1),
            "temp",
            &missing,
            measurement("temp", 1.0, base()),
            None,
        )
        .await
        .expect_err("unknown instance");
    assert!(matches!(err, KairosError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn attribute_and_entity_history_deletion() -> KairosResult<()> {
    let fixture = fixture().await?;
    record(
        &fixture.service,
        &sensor(1),
        vec![
            measurement("temp", 20.0, base()),
            measurement("temp", 21.0, base() + Duration::minutes(1)),
            measurement("battery", 80.0, base()),
        ],
    )
    .await?;
    record(
        &fixture.service,
        &sensor(2),
        vec![measurement("temp", 10.0, base())],
    )
    .await?;

    let err = fixture
        .service
        .delete_attribute_history(&sensor(1), "pressure", None, false)
        .await
        .expect_err("unknown attribute");
    assert!(matches!(err, KairosError::NotFound { .. }));

    fixture
        .service
        .delete_attribute_history(&sensor(1), "temp", None, true)
        .await?;
    let full = parse_temporal_entity_query(&params(&[]), &limits(100))?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &full)
        .await?;
    assert!(document.get("temp").is_none());
    assert_eq!(document["battery"].as_array().map(Vec::len), Some(1));

    // One observed and one audit row remain on sensor 1, two on sensor 2.
    let removed = fixture
        .service
        .delete_entities_history(&[sensor(1), sensor(2)])
        .await?;
    assert_eq!(removed, 4);
    let err = fixture
        .service
        .query_temporal_entity(&sensor(2), &full)
        .await
        .expect_err("history gone");
    assert!(matches!(err, KairosError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn entity_pages_follow_resolver_and_report_count() -> KairosResult<()> {
    let fixture = fixture().await?;
    record(
        &fixture.service,
        &sensor(1),
        vec![measurement("temp", 20.0, base())],
    )
    .await?;
    record(
        &fixture.service,
        &sensor(2),
        vec![measurement("temp", 10.0, base() + Duration::minutes(30))],
    )
    .await?;

    let query = parse_temporal_entities_query(
        &params(&[
            ("timerel", "after"),
            ("timeAt", "2024-04-30T00:00:00Z"),
            ("options", "temporalValues"),
            ("count", "true"),
            ("limit", "2"),
        ]),
        &limits(100),
    )?;
    let page = fixture.service.query_temporal_entities(&query).await?;
    assert_eq!(page.count, Some(3));
    assert!(page.range.is_none());
    let ids: Vec<_> = page
        .entities
        .iter()
        .map(|entity| entity["id"].clone())
        .collect();
    assert_eq!(
        ids,
        vec![json!("urn:ngsi-ld:Sensor:01"), json!("urn:ngsi-ld:Sensor:02")]
    );
    assert_eq!(
        values(&page.entities[1], "temp"),
        vec![json!([10.0, "2024-05-01T00:30:00Z"])]
    );

    let empty = parse_temporal_entities_query(
        &params(&[
            ("timerel", "after"),
            ("timeAt", "2024-04-30T00:00:00Z"),
            ("count", "true"),
            ("offset", "5"),
        ]),
        &limits(100),
    )?;
    let page = fixture.service.query_temporal_entities(&empty).await?;
    assert!(page.entities.is_empty());
    assert_eq!(page.count, Some(3));
    Ok(())
}

#[tokio::test]
async fn aggregated_view_buckets_from_oldest_sample() -> KairosResult<()> {
    let fixture = fixture().await?;
    let start = base() + Duration::minutes(15);
    let writes = (0..4)
        .map(|i| measurement("temp", 10.0 * (i + 1) as f64, start + Duration::minutes(30 * i)))
        .collect();
    record(&fixture.service, &sensor(1), writes).await?;

    let query = parse_temporal_entity_query(
        &params(&[
            ("options", "aggregatedValues"),
            ("aggrMethods", "min,max,totalCount"),
            ("aggrPeriodDuration", "PT1H"),
        ]),
        &limits(100),
    )?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &query)
        .await?;
    assert_eq!(
        document["temp"]["min"],
        json!([
            [10.0, "2024-05-01T00:15:00Z", "2024-05-01T01:15:00Z"],
            [30.0, "2024-05-01T01:15:00Z", "2024-05-01T02:15:00Z"],
        ])
    );
    assert_eq!(
        document["temp"]["max"][1],
        json!([40.0, "2024-05-01T01:15:00Z", "2024-05-01T02:15:00Z"])
    );
    assert_eq!(document["temp"]["totalCount"][0][0], json!(2));
    assert_eq!(document["temp"]["type"], json!("Property"));
    Ok(())
}

#[tokio::test]
async fn modify_stays_within_the_dataset_series() -> KairosResult<()> {
    let fixture = fixture().await?;
    let dataset_sample = AttributeInstanceWrite::from_payload(
        "temp",
        json!({
            "type": "Property",
            "value": 2.0,
            "observedAt": format_timestamp(base() + Duration::minutes(5)),
            "datasetId": "urn:dataset:a",
            "instanceId": "urn:inst:a1",
        }),
    )?;
    record(
        &fixture.service,
        &sensor(1),
        vec![measurement("temp", 1.0, base()), dataset_sample],
    )
    .await?;
    let instance_id = Uri::parse("urn:inst:a1")?;

    // Without datasetId the write targets the default series, which lacks this instance.
    let err = fixture
        .service
        .modify_attribute_instance(
            &sensor(1),
            "temp",
            &instance_id,
            measurement("temp", 3.0, base() + Duration::minutes(5)),
            None,
        )
        .await
        .expect_err("instance belongs to another dataset");
    assert!(matches!(err, KairosError::NotFound { .. }));

    let in_dataset = AttributeInstanceWrite::from_payload(
        "temp",
        json!({
            "type": "Property",
            "value": 3.0,
            "observedAt": format_timestamp(base() + Duration::minutes(6)),
            "datasetId": "urn:dataset:a",
        }),
    )?;
    fixture
        .service
        .modify_attribute_instance(&sensor(1), "temp", &instance_id, in_dataset, None)
        .await?;

    let full = parse_temporal_entity_query(&params(&[]), &limits(100))?;
    let (document, _) = fixture
        .service
        .query_temporal_entity(&sensor(1), &full)
        .await?;
    let entries = document["temp"].as_array().expect("full instances");
    assert_eq!(entries.len(), 2);
    let default = entries
        .iter()
        .find(|entry| entry.get("datasetId").is_none())
        .expect("default sample");
    assert_eq!(default["value"], json!(1.0));
    let moved = entries
        .iter()
        .find(|entry| entry["instanceId"] == json!("urn:inst:a1"))
        .expect("dataset sample");
    assert_eq!(moved["datasetId"], json!("urn:dataset:a"));
    assert_eq!(moved["value"], json!(3.0));
    assert_eq!(moved["observedAt"], json!("2024-05-01T00:06:00Z"));
    Ok(())
}

#[tokio::test]
async fn scope_history_sets_origin_when_older_than_samples() -> KairosResult<()> {
    let Fixture { _dir, service } = fixture().await?;
    let scope = |entity_id: Uri, minutes: i64| ScopeInstance {
        entity_id,
        time: base() + Duration::minutes(minutes),
        value: json!(["/Nantes"]),
    };
    let service = service.with_scope_history(Arc::new(ScopeTrail {
        scopes: vec![scope(sensor(1), 0), scope(sensor(1), 70), scope(sensor(2), 0)],
    }));
    let writes = [15, 45, 75]
        .into_iter()
        .enumerate()
        .map(|(i, minutes)| {
            measurement("temp", 10.0 * (i + 1) as f64, base() + Duration::minutes(minutes))
        })
        .collect();
    record(&service, &sensor(1), writes).await?;

    let query = parse_temporal_entity_query(
        &params(&[
            ("options", "aggregatedValues"),
            ("aggrMethods", "totalCount,max"),
            ("aggrPeriodDuration", "PT1H"),
        ]),
        &limits(100),
    )?;
    let (document, _) = service.query_temporal_entity(&sensor(1), &query).await?;
    // Buckets start at the scope change at 00:00, not at the first sample at 00:15.
    assert_eq!(
        document["temp"]["totalCount"],
        json!([
            [2, "2024-05-01T00:00:00Z", "2024-05-01T01:00:00Z"],
            [1, "2024-05-01T01:00:00Z", "2024-05-01T02:00:00Z"],
        ])
    );
    assert_eq!(document["temp"]["max"][0][0], json!(20.0));
    assert_eq!(
        document["scope"]["totalCount"],
        json!([
            [1, "2024-05-01T00:00:00Z", "2024-05-01T01:00:00Z"],
            [1, "2024-05-01T01:00:00Z", "2024-05-01T02:00:00Z"],
        ])
    );
    assert_eq!(document["scope"]["max"][0][0], JsonValue::Null);

    // Without instances the scope history alone provides the origin.
    assert_eq!(
        service
            .calculate_oldest_timestamp(&[sensor(1)], &[], &query)
            .await?,
        Some(base())
    );
    assert_eq!(
        service
            .calculate_oldest_timestamp(&[sensor(3)], &[], &query)
            .await?,
        None
    );

    let simplified = parse_temporal_entity_query(
        &params(&[("options", "temporalValues"), ("attrs", "temp,scope")]),
        &limits(100),
    )?;
    let (document, _) = service
        .query_temporal_entity(&sensor(1), &simplified)
        .await?;
    assert_eq!(
        document["scope"]["values"],
        json!([
            [["/Nantes"], "2024-05-01T00:00:00Z"],
            [["/Nantes"], "2024-05-01T01:10:00Z"],
        ])
    );
    Ok(())
}
