use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a batch.
///
/// `Quarantined` and `Closed` are manual overrides: the status engine never
/// moves a batch out of them on its own. The remaining states are derived
/// from quantity and expiry date.
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
pub enum BatchStatus {
    /// Ready for dispensing.
    #[sea_orm(string_value = "Active")]
    Active,
    /// Stopped manually (recall, damage, inspection).
    #[sea_orm(string_value = "Quarantined")]
    Quarantined,
    /// Expiry date passed with quantity remaining; needs disposal.
    #[sea_orm(string_value = "Expired")]
    Expired,
    /// Quantity reached zero through normal use.
    #[sea_orm(string_value = "Depleted")]
    Depleted,
    /// Removed from inventory (returned to supplier or fully disposed).
    /// Terminal.
    #[sea_orm(string_value = "Closed")]
    Closed,
}

/// A received lot of a medicine with its own expiry date and quantity.
/// The central mutable entity of the engine.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "medicine_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub medicine_id: i64,
    pub supplier_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub received_date: NaiveDate,
    /// Total ever received into this batch; grows on receipt appends.
    pub initial_quantity: i32,
    /// Units on hand. Never negative; every change writes one ledger row.
    pub current_quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub purchase_price: rust_decimal::Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub selling_price: rust_decimal::Decimal,
    pub status: BatchStatus,
    /// Optimistic-concurrency token; incremented on every write.
    pub row_version: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::medicine::Entity",
        from = "Column::MedicineId",
        to = "super::medicine::Column::Id"
    )]
    Medicine,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::stock_audit::Entity")]
    StockAudits,
}

impl Related<super::medicine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Medicine.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::stock_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAudits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
