use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category of a notification.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum NotificationType {
    #[sea_orm(string_value = "Info")]
    Info,
    #[sea_orm(string_value = "Warning")]
    Warning,
    #[sea_orm(string_value = "Critical")]
    Critical,
    /// Low-stock / out-of-stock alerts, related to a medicine.
    #[sea_orm(string_value = "StockAlert")]
    StockAlert,
    #[sea_orm(string_value = "ExpiryAlert")]
    ExpiryAlert,
}

/// What an alert points at. `ExpiredBatch` is a distinct tag so that
/// disposal-required alerts resolve independently of ordinary batch
/// expiry warnings.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RelatedEntity {
    #[sea_orm(string_value = "Batch")]
    Batch,
    #[sea_orm(string_value = "Medicine")]
    Medicine,
    #[sea_orm(string_value = "ExpiredBatch")]
    ExpiredBatch,
}

/// A user-facing message or an unresolved system-wide alert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// None for system-wide alerts.
    pub user_id: Option<i64>,
    pub is_system_alert: bool,
    /// Resolution flag; set once the triggering condition clears. The row
    /// itself is kept as history.
    pub is_action_taken: bool,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    /// 1 (lowest) to 5 (highest).
    pub priority: i32,
    pub is_read: bool,
    pub related_entity_id: Option<i64>,
    pub related_entity_type: Option<RelatedEntity>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
