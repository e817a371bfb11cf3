use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Field-level change record for batch edits (batch number corrections,
/// expiry corrections, price changes). Quantity changes go to the
/// stock-movement ledger instead.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_audits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub medicine_batch_id: i64,
    /// Batch number at the time of the change.
    pub batch_number: String,
    pub property_name: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by_user_id: i64,
    pub changed_by_user_name: String,
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
