use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum KairosAttributes {
    Table,
    Id,
    EntityId,
    AttributeName,
    DatasetId,
    AttributeType,
    AttributeValueType,
    CreatedAt,
    ModifiedAt,
}

/// Observed timeline: one row per attribute and instant.
#[derive(Iden, Clone, Copy)]
pub enum KairosAttributeInstances {
    Table,
    AttributeId,
    InstanceTime,
    Value,
    MeasuredValue,
    GeoValue,
    Payload,
    InstanceId,
}

/// Append-only created/modified timeline.
#[derive(Iden, Clone, Copy)]
pub enum KairosAttributeInstancesAudit {
    Table,
    AttributeId,
    InstanceTime,
    TimeProperty,
    Value,
    MeasuredValue,
    GeoValue,
    Payload,
    InstanceId,
    Sub,
}
