use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog item. Managed outside the inventory core; read-only here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "medicines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub category_id: i64,
    #[sea_orm(unique)]
    pub medicine_code: String,
    pub name: String,
    /// Used for alternative-medicine matching; medicines sharing a generic
    /// name are interchangeable candidates.
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
    pub storage_condition: Option<String>,
    pub unit_of_measure: String,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::medicine_batch::Entity")]
    MedicineBatches,
}

impl Related<super::medicine_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MedicineBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
