use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed vocabulary of quantity-changing events.
///
/// String values match the ledger rows the original deployment wrote, so
/// historical data stays readable by this engine.
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
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum MovementType {
    #[sea_orm(string_value = "IN_Purchase")]
    #[strum(serialize = "IN_Purchase")]
    InPurchase,
    #[sea_orm(string_value = "OUT_Dispense")]
    #[strum(serialize = "OUT_Dispense")]
    OutDispense,
    #[sea_orm(string_value = "OUT_Expired")]
    #[strum(serialize = "OUT_Expired")]
    OutExpired,
    #[sea_orm(string_value = "OUT_Return")]
    #[strum(serialize = "OUT_Return")]
    OutReturn,
    #[sea_orm(string_value = "ADJUSTMENT")]
    #[strum(serialize = "ADJUSTMENT")]
    Adjustment,
}

/// One immutable ledger row. Rows are only ever inserted; the engine has
/// no update or delete path for this table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub medicine_batch_id: i64,
    pub movement_type: MovementType,
    /// Signed delta: negative for outbound movements.
    pub quantity: i32,
    /// Resulting quantity after the change; recorded by adjustments.
    pub snapshot_quantity: Option<i32>,
    pub reason: Option<String>,
    pub reference_no: Option<String>,
    pub performed_by_user_id: i64,
    pub performed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::medicine_batch::Entity",
        from = "Column::MedicineBatchId",
        to = "super::medicine_batch::Column::Id"
    )]
    MedicineBatch,
}

impl Related<super::medicine_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MedicineBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
