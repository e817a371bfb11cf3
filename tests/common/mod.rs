//! Shared test harness: in-memory SQLite with migrations, an in-memory
//! cache and a live event channel.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectOptions, Database, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio::sync::mpsc;

use pharmacy_stock_api::actor::ActorContext;
use pharmacy_stock_api::cache::{CacheBackend, InMemoryCache};
use pharmacy_stock_api::db::DbPool;
use pharmacy_stock_api::entities::medicine_batch::BatchStatus;
use pharmacy_stock_api::entities::{medicine, medicine_batch, notification, stock_movement};
use pharmacy_stock_api::events::{self, Event, EventSender};
use pharmacy_stock_api::services::inventory::InventoryService;
use pharmacy_stock_api::services::notification_generator::NotificationGeneratorService;
use pharmacy_stock_api::services::notifications::NotificationService;
use pharmacy_stock_api::services::stock_operations::StockOperationService;

pub struct TestContext {
    pub db: Arc<DbPool>,
    pub cache: Arc<dyn CacheBackend>,
    pub events: EventSender,
    pub event_rx: mpsc::Receiver<Event>,
}

pub async fn setup() -> TestContext {
    // A single connection keeps the in-memory database alive for the
    // whole test.
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(opts).await.expect("Failed to connect");
    pharmacy_stock_api::db::run_migrations(&db)
        .await
        .expect("Failed to run migrations");

    let (events, event_rx) = events::channel(256);

    TestContext {
        db: Arc::new(db),
        cache: Arc::new(InMemoryCache::new()),
        events,
        event_rx,
    }
}

impl TestContext {
    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.db.clone(), self.cache.clone(), self.events.clone())
    }

    pub fn stock_operations(&self) -> StockOperationService {
        StockOperationService::new(self.db.clone(), self.cache.clone(), self.events.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.clone(), self.cache.clone(), self.events.clone())
    }

    pub fn generator(&self) -> NotificationGeneratorService {
        NotificationGeneratorService::new(self.db.clone(), self.events.clone())
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn actor() -> ActorContext {
    ActorContext::user(7, "test-pharmacist")
}

pub fn days_from_now(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}

pub async fn seed_medicine(db: &DbPool, name: &str, low_stock_threshold: i32) -> medicine::Model {
    seed_medicine_full(db, name, low_stock_threshold, 1, None).await
}

pub async fn seed_medicine_full(
    db: &DbPool,
    name: &str,
    low_stock_threshold: i32,
    category_id: i64,
    generic_name: Option<&str>,
) -> medicine::Model {
    medicine::ActiveModel {
        category_id: Set(category_id),
        medicine_code: Set(format!("MED-{}", name.to_uppercase())),
        name: Set(name.to_string()),
        generic_name: Set(generic_name.map(|g| g.to_string())),
        manufacturer: Set(None),
        storage_condition: Set(None),
        unit_of_measure: Set("tablet".to_string()),
        low_stock_threshold: Set(low_stock_threshold),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        created_by: Set(Some("System".to_string())),
        updated_at: Set(None),
        updated_by: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to seed medicine")
}

pub async fn seed_batch(
    db: &DbPool,
    medicine_id: i64,
    batch_number: &str,
    expiry_date: NaiveDate,
    quantity: i32,
) -> medicine_batch::Model {
    seed_batch_with_status(
        db,
        medicine_id,
        batch_number,
        expiry_date,
        quantity,
        BatchStatus::Active,
    )
    .await
}

pub async fn seed_batch_with_status(
    db: &DbPool,
    medicine_id: i64,
    batch_number: &str,
    expiry_date: NaiveDate,
    quantity: i32,
    status: BatchStatus,
) -> medicine_batch::Model {
    medicine_batch::ActiveModel {
        medicine_id: Set(medicine_id),
        supplier_id: Set(1),
        batch_number: Set(batch_number.to_string()),
        expiry_date: Set(expiry_date),
        received_date: Set(Utc::now().date_naive()),
        initial_quantity: Set(quantity),
        current_quantity: Set(quantity),
        purchase_price: Set(dec!(2.50)),
        selling_price: Set(dec!(4.00)),
        status: Set(status),
        row_version: Set(1),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        created_by: Set(Some("System".to_string())),
        updated_at: Set(None),
        updated_by: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to seed batch")
}

pub async fn reload_batch(db: &DbPool, batch_id: i64) -> medicine_batch::Model {
    medicine_batch::Entity::find_by_id(batch_id)
        .one(db)
        .await
        .expect("Failed to query batch")
        .expect("Batch vanished")
}

pub async fn movements_for(db: &DbPool, batch_id: i64) -> Vec<stock_movement::Model> {
    stock_movement::Entity::find()
        .filter(stock_movement::Column::MedicineBatchId.eq(batch_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(db)
        .await
        .expect("Failed to query movements")
}

pub async fn open_system_alerts(db: &DbPool) -> Vec<notification::Model> {
    notification::Entity::find()
        .filter(notification::Column::IsSystemAlert.eq(true))
        .filter(notification::Column::IsActionTaken.eq(false))
        .order_by_asc(notification::Column::Id)
        .all(db)
        .await
        .expect("Failed to query alerts")
}

pub async fn all_system_alerts(db: &DbPool) -> Vec<notification::Model> {
    notification::Entity::find()
        .filter(notification::Column::IsSystemAlert.eq(true))
        .order_by_asc(notification::Column::Id)
        .all(db)
        .await
        .expect("Failed to query alerts")
}
