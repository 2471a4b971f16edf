use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, Cond, Expr, ExprTrait, Func, MysqlQueryBuilder, OnConflict, PostgresQueryBuilder,
    Query, QueryStatementWriter, SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::KairosConfig;
use crate::db::*;
use crate::migration::Migrator;
use kairos_core::{
    Attribute, AttributeFilter, AttributeInstance, AttributeInstanceApi, AttributeMetadataApi,
    AttributeType, AttributeUpsert, AttributeValueType, Id, InstanceValue, KairosError,
    KairosResult, NONE_DATASET_ID, TemporalQuery, TimeProperty, Timestamp, UpsertAttributeInput,
    Uri, from_micros, to_micros,
};

/// Relational home of attribute metadata and both instance timelines.
#[derive(Clone)]
pub struct KairosStore {
    pub(crate) conn: DatabaseConnection,
    pub(crate) backend: DatabaseBackend,
}

impl KairosStore {
    pub async fn connect(config: &KairosConfig, base_dir: &Path) -> KairosResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(KairosError::from)?;
        let backend = conn.get_database_backend();
        let store = Self { conn, backend };
        Migrator::up(&store.conn, None)
            .await
            .map_err(KairosError::from)?;
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> KairosResult<Self> {
        let config = KairosConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            DatabaseBackend::Postgres => "postgres",
            DatabaseBackend::MySql => "mysql",
            _ => "sqlite",
        }
    }

    async fn find_attribute<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_id: &Uri,
        name: &str,
        dataset_id: Option<&Uri>,
    ) -> KairosResult<Option<Attribute>> {
        let select = attribute_select()
            .and_where(Expr::col(KairosAttributes::EntityId).eq(entity_id.as_str()))
            .and_where(Expr::col(KairosAttributes::AttributeName).eq(name))
            .and_where(dataset_expr(dataset_id))
            .limit(1)
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_attribute(&row))
            .transpose()
    }

    /// Deletes instances of the selected attributes on both timelines.
    async fn delete_instances_where<C: ConnectionTrait>(
        &self,
        conn: &C,
        attribute_ids: SelectStatement,
        instance_id: Option<&Uri>,
    ) -> KairosResult<u64> {
        let mut observed = Query::delete()
            .from_table(KairosAttributeInstances::Table)
            .and_where(
                Expr::col(KairosAttributeInstances::AttributeId).in_subquery(attribute_ids.clone()),
            )
            .to_owned();
        let mut audit = Query::delete()
            .from_table(KairosAttributeInstancesAudit::Table)
            .and_where(
                Expr::col(KairosAttributeInstancesAudit::AttributeId).in_subquery(attribute_ids),
            )
            .to_owned();
        if let Some(instance_id) = instance_id {
            observed.and_where(
                Expr::col(KairosAttributeInstances::InstanceId).eq(instance_id.as_str()),
            );
            audit.and_where(
                Expr::col(KairosAttributeInstancesAudit::InstanceId).eq(instance_id.as_str()),
            );
        }
        let removed = exec_count(conn, &observed).await? + exec_count(conn, &audit).await?;
        Ok(removed)
    }
}

#[async_trait]
impl AttributeInstanceApi for KairosStore {
    async fn create_instance(&self, instance: AttributeInstance) -> KairosResult<()> {
        insert_instance(&self.conn, self.backend, &instance).await
    }

    async fn replace_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance: AttributeInstance,
    ) -> KairosResult<()> {
        let tx = self.conn.begin().await?;
        let delete = Query::delete()
            .from_table(KairosAttributeInstances::Table)
            .and_where(
                Expr::col(KairosAttributeInstances::AttributeId)
                    .eq(id_value(self.backend, instance.attribute_id)),
            )
            .and_where(
                Expr::col(KairosAttributeInstances::InstanceId).eq(instance.instance_id.as_str()),
            )
            .to_owned();
        if exec_count(&tx, &delete).await? == 0 {
            return Err(KairosError::not_found(format!(
                "instance {} of {attribute_name} not found on entity {entity_id}",
                instance.instance_id
            )));
        }
        insert_instance(&tx, self.backend, &instance).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_instance(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        instance_id: &Uri,
    ) -> KairosResult<()> {
        let tx = self.conn.begin().await?;
        let removed = self
            .delete_instances_where(
                &tx,
                attribute_ids(entity_id, Some(attribute_name)),
                Some(instance_id),
            )
            .await?;
        if removed == 0 {
            return Err(KairosError::not_found(format!(
                "instance {instance_id} of {attribute_name} not found on entity {entity_id}"
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_instances_of_attribute(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
        dataset_id: Option<&Uri>,
    ) -> KairosResult<u64> {
        let ids = attribute_ids(entity_id, Some(attribute_name))
            .and_where(dataset_expr(dataset_id))
            .to_owned();
        let tx = self.conn.begin().await?;
        let removed = self.delete_instances_where(&tx, ids, None).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_all_instances_of_attribute(
        &self,
        entity_id: &Uri,
        attribute_name: &str,
    ) -> KairosResult<u64> {
        let tx = self.conn.begin().await?;
        let removed = self
            .delete_instances_where(&tx, attribute_ids(entity_id, Some(attribute_name)), None)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_instances_of_entity(&self, entity_id: &Uri) -> KairosResult<u64> {
        let tx = self.conn.begin().await?;
        let removed = self
            .delete_instances_where(&tx, attribute_ids(entity_id, None), None)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn select_oldest_timestamp(
        &self,
        query: &TemporalQuery,
        attributes: &[Attribute],
    ) -> KairosResult<Option<Timestamp>> {
        if attributes.is_empty() {
            return Ok(None);
        }
        let timeline = Timeline::for_property(query.time_property);
        let mut select = Query::select()
            .from(timeline.table())
            .expr_as(
                Func::min(Expr::col(KairosAttributeInstances::InstanceTime)),
                Alias::new("oldest"),
            )
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
                Expr::col(KairosAttributeInstancesAudit::TimeProperty)
                    .eq(time_property.as_i16()),
            );
        }
        let Some(row) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };
        let oldest: Option<i64> = row.try_get("", "oldest")?;
        oldest.map(from_micros).transpose()
    }
}

#[async_trait]
impl AttributeMetadataApi for KairosStore {
    async fn get_attributes(
        &self,
        entity_ids: &[Uri],
        filter: &AttributeFilter,
    ) -> KairosResult<Vec<Attribute>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut select = attribute_select()
            .and_where(
                Expr::col(KairosAttributes::EntityId)
                    .is_in(entity_ids.iter().map(|entity_id| entity_id.as_str())),
            )
            .to_owned();
        if !filter.attrs.is_empty() {
            select.and_where(
                Expr::col(KairosAttributes::AttributeName)
                    .is_in(filter.attrs.iter().map(String::as_str)),
            );
        }
        if !filter.dataset_ids.is_empty() {
            let mut datasets = Cond::any();
            let named: Vec<&str> = filter
                .dataset_ids
                .iter()
                .map(String::as_str)
                .filter(|dataset_id| *dataset_id != NONE_DATASET_ID)
                .collect();
            if !named.is_empty() {
                datasets = datasets.add(Expr::col(KairosAttributes::DatasetId).is_in(named));
            }
            if filter.dataset_ids.contains(NONE_DATASET_ID) {
                datasets = datasets.add(Expr::col(KairosAttributes::DatasetId).is_null());
            }
            select.cond_where(datasets);
        }
        let rows = query_all(&self.conn, &select).await?;
        let mut attributes = rows
            .iter()
            .map(read_attribute)
            .collect::<KairosResult<Vec<_>>>()?;
        let position = |attribute: &Attribute| {
            entity_ids
                .iter()
                .position(|entity_id| *entity_id == attribute.entity_id)
        };
        attributes.sort_by(|a, b| {
            position(a)
                .cmp(&position(b))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.dataset_id.cmp(&b.dataset_id))
        });
        debug!(
            "resolved {} attribute(s) for {} entit(ies)",
            attributes.len(),
            entity_ids.len()
        );
        Ok(attributes)
    }

    async fn get_attribute(
        &self,
        entity_id: &Uri,
        name: &str,
        dataset_id: Option<&Uri>,
    ) -> KairosResult<Option<Attribute>> {
        self.find_attribute(&self.conn, entity_id, name, dataset_id)
            .await
    }

    async fn upsert_attribute(&self, input: UpsertAttributeInput) -> KairosResult<AttributeUpsert> {
        let tx = self.conn.begin().await?;
        let existing = self
            .find_attribute(&tx, &input.entity_id, &input.name, input.dataset_id.as_ref())
            .await?;
        let upsert = match existing {
            Some(mut attribute) => {
                let update = Query::update()
                    .table(KairosAttributes::Table)
                    .values([
                        (
                            KairosAttributes::AttributeType,
                            input.attribute_type.as_str().into(),
                        ),
                        (
                            KairosAttributes::AttributeValueType,
                            input.value_type.as_str().into(),
                        ),
                        (KairosAttributes::ModifiedAt, to_micros(input.at).into()),
                    ])
                    .and_where(
                        Expr::col(KairosAttributes::Id).eq(id_value(self.backend, attribute.id)),
                    )
                    .to_owned();
                exec(&tx, &update).await?;
                attribute.attribute_type = input.attribute_type;
                attribute.value_type = input.value_type;
                attribute.modified_at = Some(input.at);
                AttributeUpsert {
                    attribute,
                    created: false,
                }
            }
            None => {
                let attribute = Attribute {
                    id: Id::new(),
                    entity_id: input.entity_id,
                    name: input.name,
                    dataset_id: input.dataset_id,
                    attribute_type: input.attribute_type,
                    value_type: input.value_type,
                    created_at: input.at,
                    modified_at: None,
                };
                let insert = Query::insert()
                    .into_table(KairosAttributes::Table)
                    .columns([
                        KairosAttributes::Id,
                        KairosAttributes::EntityId,
                        KairosAttributes::AttributeName,
                        KairosAttributes::DatasetId,
                        KairosAttributes::AttributeType,
                        KairosAttributes::AttributeValueType,
                        KairosAttributes::CreatedAt,
                    ])
                    .values_panic([
                        id_value(self.backend, attribute.id).into(),
                        attribute.entity_id.as_str().into(),
                        attribute.name.as_str().into(),
                        SeaValue::String(
                            attribute
                                .dataset_id
                                .as_ref()
                                .map(|dataset_id| dataset_id.to_string()),
                        )
                        .into(),
                        attribute.attribute_type.as_str().into(),
                        attribute.value_type.as_str().into(),
                        to_micros(attribute.created_at).into(),
                    ])
                    .to_owned();
                exec(&tx, &insert).await?;
                AttributeUpsert {
                    attribute,
                    created: true,
                }
            }
        };
        tx.commit().await?;
        Ok(upsert)
    }

    async fn delete_attribute(
        &self,
        entity_id: &Uri,
        name: &str,
        dataset_id: Option<&Uri>,
        all_datasets: bool,
    ) -> KairosResult<u64> {
        let mut delete = Query::delete()
            .from_table(KairosAttributes::Table)
            .and_where(Expr::col(KairosAttributes::EntityId).eq(entity_id.as_str()))
            .and_where(Expr::col(KairosAttributes::AttributeName).eq(name))
            .to_owned();
        if !all_datasets {
            delete.and_where(dataset_expr(dataset_id));
        }
        exec_count(&self.conn, &delete).await
    }

    async fn delete_attributes_of_entity(&self, entity_id: &Uri) -> KairosResult<u64> {
        let delete = Query::delete()
            .from_table(KairosAttributes::Table)
            .and_where(Expr::col(KairosAttributes::EntityId).eq(entity_id.as_str()))
            .to_owned();
        exec_count(&self.conn, &delete).await
    }
}

/// Which instance table a time property reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Timeline {
    Observed,
    Audit(TimeProperty),
}

impl Timeline {
    pub(crate) fn for_property(time_property: TimeProperty) -> Self {
        if time_property.is_audit() {
            Timeline::Audit(time_property)
        } else {
            Timeline::Observed
        }
    }

    // Both tables share column names, so queries address columns through
    // `KairosAttributeInstances` and only switch the table.
    pub(crate) fn table(self) -> Alias {
        match self {
            Timeline::Observed => Alias::new(col_name(KairosAttributeInstances::Table)),
            Timeline::Audit(_) => Alias::new(col_name(KairosAttributeInstancesAudit::Table)),
        }
    }
}

async fn insert_instance<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    instance: &AttributeInstance,
) -> KairosResult<()> {
    let (text, measured, geo) = value_columns(&instance.value);
    let payload = serde_json::to_string(&instance.payload)?;
    match instance.time_property {
        TimeProperty::ObservedAt => {
            let insert = Query::insert()
                .into_table(KairosAttributeInstances::Table)
                .columns([
                    KairosAttributeInstances::AttributeId,
                    KairosAttributeInstances::InstanceTime,
                    KairosAttributeInstances::Value,
                    KairosAttributeInstances::MeasuredValue,
                    KairosAttributeInstances::GeoValue,
                    KairosAttributeInstances::Payload,
                    KairosAttributeInstances::InstanceId,
                ])
                .values_panic([
                    id_value(backend, instance.attribute_id).into(),
                    to_micros(instance.time).into(),
                    text.into(),
                    measured.into(),
                    geo.into(),
                    payload.into(),
                    instance.instance_id.as_str().into(),
                ])
                .on_conflict(
                    OnConflict::columns([
                        KairosAttributeInstances::AttributeId,
                        KairosAttributeInstances::InstanceTime,
                    ])
                    .update_columns([
                        KairosAttributeInstances::Value,
                        KairosAttributeInstances::MeasuredValue,
                        KairosAttributeInstances::GeoValue,
                        KairosAttributeInstances::Payload,
                        KairosAttributeInstances::InstanceId,
                    ])
                    .to_owned(),
                )
                .to_owned();
            exec(conn, &insert).await
        }
        time_property => {
            let insert = Query::insert()
                .into_table(KairosAttributeInstancesAudit::Table)
                .columns([
                    KairosAttributeInstancesAudit::AttributeId,
                    KairosAttributeInstancesAudit::InstanceTime,
                    KairosAttributeInstancesAudit::TimeProperty,
                    KairosAttributeInstancesAudit::Value,
                    KairosAttributeInstancesAudit::MeasuredValue,
                    KairosAttributeInstancesAudit::GeoValue,
                    KairosAttributeInstancesAudit::Payload,
                    KairosAttributeInstancesAudit::InstanceId,
                    KairosAttributeInstancesAudit::Sub,
                ])
                .values_panic([
                    id_value(backend, instance.attribute_id).into(),
                    to_micros(instance.time).into(),
                    time_property.as_i16().into(),
                    text.into(),
                    measured.into(),
                    geo.into(),
                    payload.into(),
                    instance.instance_id.as_str().into(),
                    SeaValue::String(instance.sub.clone()).into(),
                ])
                .to_owned();
            exec(conn, &insert).await
        }
    }
}

fn value_columns(value: &InstanceValue) -> (SeaValue, SeaValue, SeaValue) {
    match value {
        InstanceValue::Text(text) => (
            SeaValue::String(Some(text.clone())),
            SeaValue::Double(None),
            SeaValue::String(None),
        ),
        InstanceValue::Measured(measured) => (
            SeaValue::String(None),
            SeaValue::Double(Some(*measured)),
            SeaValue::String(None),
        ),
        InstanceValue::Geo(wkt) => (
            SeaValue::String(None),
            SeaValue::Double(None),
            SeaValue::String(Some(wkt.clone())),
        ),
    }
}

fn attribute_select() -> SelectStatement {
    Query::select()
        .from(KairosAttributes::Table)
        .columns([
            KairosAttributes::Id,
            KairosAttributes::EntityId,
            KairosAttributes::AttributeName,
            KairosAttributes::DatasetId,
            KairosAttributes::AttributeType,
            KairosAttributes::AttributeValueType,
            KairosAttributes::CreatedAt,
            KairosAttributes::ModifiedAt,
        ])
        .to_owned()
}

/// Ids of an entity's attributes, optionally restricted to one name.
fn attribute_ids(entity_id: &Uri, name: Option<&str>) -> SelectStatement {
    let mut select = Query::select()
        .from(KairosAttributes::Table)
        .column(KairosAttributes::Id)
        .and_where(Expr::col(KairosAttributes::EntityId).eq(entity_id.as_str()))
        .to_owned();
    if let Some(name) = name {
        select.and_where(Expr::col(KairosAttributes::AttributeName).eq(name));
    }
    select
}

fn dataset_expr(dataset_id: Option<&Uri>) -> Expr {
    match dataset_id {
        Some(dataset_id) => Expr::col(KairosAttributes::DatasetId).eq(dataset_id.as_str()),
        None => Expr::col(KairosAttributes::DatasetId).is_null(),
    }
}

fn read_attribute(row: &QueryResult) -> KairosResult<Attribute> {
    let entity_id: String = row.try_get("", &col_name(KairosAttributes::EntityId))?;
    let dataset_id: Option<String> = row.try_get("", &col_name(KairosAttributes::DatasetId))?;
    let attribute_type: String = row.try_get("", &col_name(KairosAttributes::AttributeType))?;
    let value_type: String = row.try_get("", &col_name(KairosAttributes::AttributeValueType))?;
    let created_at: i64 = row.try_get("", &col_name(KairosAttributes::CreatedAt))?;
    let modified_at: Option<i64> = row.try_get("", &col_name(KairosAttributes::ModifiedAt))?;
    Ok(Attribute {
        id: read_id(row, KairosAttributes::Id)?,
        entity_id: stored_uri(&entity_id)?,
        name: row.try_get("", &col_name(KairosAttributes::AttributeName))?,
        dataset_id: dataset_id.as_deref().map(stored_uri).transpose()?,
        attribute_type: AttributeType::parse(&attribute_type)
            .map_err(|err| KairosError::storage(err.message()))?,
        value_type: AttributeValueType::parse(&value_type)?,
        created_at: from_micros(created_at)?,
        modified_at: modified_at.map(from_micros).transpose()?,
    })
}

fn stored_uri(raw: &str) -> KairosResult<Uri> {
    Uri::parse(raw).map_err(|err| KairosError::storage(err.message()))
}

pub(crate) fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => {
            let uuid = Uuid::from_bytes(id.as_bytes());
            SeaValue::Uuid(Some(uuid))
        }
        DatabaseBackend::MySql => SeaValue::Bytes(Some(id.as_vec())),
        DatabaseBackend::Sqlite => SeaValue::String(Some(id.to_uuid_string())),
        _ => SeaValue::String(Some(id.to_uuid_string())),
    }
}

fn bytes_to_id(bytes: Vec<u8>) -> Option<Id> {
    if bytes.len() == 16 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Some(Id::from_bytes(buf))
    } else {
        None
    }
}

pub(crate) fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> KairosResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value).map_err(|err| KairosError::storage(err.message()));
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return bytes_to_id(value).ok_or_else(|| KairosError::storage("invalid id length"));
    }
    Err(KairosError::storage("unsupported id format"))
}

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> KairosResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    exec_count(conn, stmt).await.map(|_| ())
}

async fn exec_count<C, S>(conn: &C, stmt: &S) -> KairosResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> KairosResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> KairosResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

fn build_connection_url(config: &KairosConfig, base_dir: &Path) -> KairosResult<String> {
    match &config.database {
        crate::DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        crate::DatabaseConfig::Postgres { url } => Ok(url.clone()),
        crate::DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}
