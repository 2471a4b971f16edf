use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(KairosAttributes::Table)
                    .if_not_exists()
                    .col(id_col(backend, KairosAttributes::Id, false))
                    .col(
                        ColumnDef::new(KairosAttributes::EntityId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributes::AttributeName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(KairosAttributes::DatasetId).string_len(255))
                    .col(
                        ColumnDef::new(KairosAttributes::AttributeType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributes::AttributeValueType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributes::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KairosAttributes::ModifiedAt).big_integer())
                    .primary_key(
                        Index::create()
                            .name("pk_kairos_attributes")
                            .col(KairosAttributes::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kairos_attributes_entity_name_idx")
                    .table(KairosAttributes::Table)
                    .col(KairosAttributes::EntityId)
                    .col(KairosAttributes::AttributeName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KairosAttributeInstances::Table)
                    .if_not_exists()
                    .col(id_col(backend, KairosAttributeInstances::AttributeId, false))
                    .col(
                        ColumnDef::new(KairosAttributeInstances::InstanceTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KairosAttributeInstances::Value).text())
                    .col(ColumnDef::new(KairosAttributeInstances::MeasuredValue).double())
                    .col(ColumnDef::new(KairosAttributeInstances::GeoValue).text())
                    .col(
                        ColumnDef::new(KairosAttributeInstances::Payload)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributeInstances::InstanceId)
                            .string_len(255)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_kairos_attribute_instances")
                            .col(KairosAttributeInstances::AttributeId)
                            .col(KairosAttributeInstances::InstanceTime),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kairos_attribute_instances_instance_id_idx")
                    .table(KairosAttributeInstances::Table)
                    .col(KairosAttributeInstances::InstanceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KairosAttributeInstancesAudit::Table)
                    .if_not_exists()
                    .col(id_col(
                        backend,
                        KairosAttributeInstancesAudit::AttributeId,
                        false,
                    ))
                    .col(
                        ColumnDef::new(KairosAttributeInstancesAudit::InstanceTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributeInstancesAudit::TimeProperty)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KairosAttributeInstancesAudit::Value).text())
                    .col(ColumnDef::new(KairosAttributeInstancesAudit::MeasuredValue).double())
                    .col(ColumnDef::new(KairosAttributeInstancesAudit::GeoValue).text())
                    .col(
                        ColumnDef::new(KairosAttributeInstancesAudit::Payload)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KairosAttributeInstancesAudit::InstanceId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(KairosAttributeInstancesAudit::Sub).string_len(255))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("kairos_attribute_instances_audit_time_idx")
                    .table(KairosAttributeInstancesAudit::Table)
                    .col(KairosAttributeInstancesAudit::AttributeId)
                    .col(KairosAttributeInstancesAudit::InstanceTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(KairosAttributeInstancesAudit::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(KairosAttributeInstances::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(KairosAttributes::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

fn id_col(backend: DatabaseBackend, col: impl Iden, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}
