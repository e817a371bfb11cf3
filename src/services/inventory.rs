//! Inventory operations: receiving, dispensing, adjusting, quarantine and
//! the read surfaces built on top of the batch store.
//!
//! Every mutating operation runs in a single transaction covering the
//! batch write, the ledger append and any alert changes. Batch writes go
//! through [`apply_batch_patch`], which enforces the optimistic
//! row-version check. Cache invalidation and broadcast events happen
//! strictly after commit and are best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use validator::Validate;

use crate::actor::ActorContext;
use crate::cache::{keys, CacheBackend};
use crate::db::DbPool;
use crate::entities::medicine_batch::{self, BatchStatus};
use crate::entities::stock_movement::{self, MovementType};
use crate::entities::{medicine, stock_audit};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::allocator::{self, AllocationPlan, BatchAllocation};
use crate::services::batch_status;
use crate::services::expiry_rules::{self, ExpiryUrgency};
use crate::services::notifications::{
    self, NewSystemAlert, StockAlertOutcome,
};
use crate::entities::{NotificationType, RelatedEntity};

lazy_static! {
    static ref DISPENSES_TOTAL: IntCounter = IntCounter::new(
        "pharmacy_stock_dispenses_total",
        "Total number of committed dispense operations"
    )
    .expect("metric can be created");
    static ref DISPENSE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "pharmacy_stock_dispense_failures_total",
            "Total number of failed dispense operations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref DISPENSED_UNITS: IntCounter = IntCounter::new(
        "pharmacy_stock_dispensed_units_total",
        "Total units dispensed across all medicines"
    )
    .expect("metric can be created");
}

/// TTL for the cached stock-check aggregate.
const STOCK_CHECK_TTL: std::time::Duration = std::time::Duration::from_secs(300);

fn error_label(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::NotFound(_) => "not_found",
        ServiceError::ValidationError(_) => "validation",
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::ConcurrentModification(_) => "concurrency_conflict",
        ServiceError::Conflict(_) => "conflict",
        _ => "internal",
    }
}

/// Maps a transaction error back to the service taxonomy.
pub(crate) fn unwrap_txn_err(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// Column changes to apply to a batch row in one versioned write.
#[derive(Debug, Default, Clone)]
pub struct BatchPatch {
    pub current_quantity: Option<i32>,
    pub initial_quantity: Option<i32>,
    pub status: Option<BatchStatus>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub purchase_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Applies a patch to the batch row `batch` was read from, guarded by the
/// optimistic row-version token. Zero rows affected means another writer
/// got there first; surfaced as a retryable conflict.
pub async fn apply_batch_patch<C: ConnectionTrait>(
    conn: &C,
    batch: &medicine_batch::Model,
    patch: BatchPatch,
    actor: &ActorContext,
) -> Result<(), ServiceError> {
    let mut update = medicine_batch::Entity::update_many()
        .col_expr(
            medicine_batch::Column::RowVersion,
            Expr::value(batch.row_version + 1),
        )
        .col_expr(medicine_batch::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(
            medicine_batch::Column::UpdatedBy,
            Expr::value(Some(actor.username.clone())),
        );

    if let Some(quantity) = patch.current_quantity {
        update = update.col_expr(
            medicine_batch::Column::CurrentQuantity,
            Expr::value(quantity),
        );
    }
    if let Some(quantity) = patch.initial_quantity {
        update = update.col_expr(
            medicine_batch::Column::InitialQuantity,
            Expr::value(quantity),
        );
    }
    if let Some(status) = patch.status {
        update = update.col_expr(medicine_batch::Column::Status, Expr::value(status));
    }
    if let Some(batch_number) = patch.batch_number {
        update = update.col_expr(
            medicine_batch::Column::BatchNumber,
            Expr::value(batch_number),
        );
    }
    if let Some(expiry_date) = patch.expiry_date {
        update = update.col_expr(medicine_batch::Column::ExpiryDate, Expr::value(expiry_date));
    }
    if let Some(price) = patch.purchase_price {
        update = update.col_expr(medicine_batch::Column::PurchasePrice, Expr::value(price));
    }
    if let Some(price) = patch.selling_price {
        update = update.col_expr(medicine_batch::Column::SellingPrice, Expr::value(price));
    }
    if let Some(is_active) = patch.is_active {
        update = update.col_expr(medicine_batch::Column::IsActive, Expr::value(is_active));
    }

    let result = update
        .filter(medicine_batch::Column::Id.eq(batch.id))
        .filter(medicine_batch::Column::RowVersion.eq(batch.row_version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(batch.id));
    }

    Ok(())
}

/// Batches eligible for dispensing: active, stocked, neither expired nor
/// quarantined by status.
pub async fn eligible_batches<C: ConnectionTrait>(
    conn: &C,
    medicine_id: i64,
) -> Result<Vec<medicine_batch::Model>, ServiceError> {
    medicine_batch::Entity::find()
        .filter(medicine_batch::Column::MedicineId.eq(medicine_id))
        .filter(medicine_batch::Column::IsActive.eq(true))
        .filter(medicine_batch::Column::CurrentQuantity.gt(0))
        .filter(medicine_batch::Column::Status.ne(BatchStatus::Expired))
        .filter(medicine_batch::Column::Status.ne(BatchStatus::Quarantined))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Total on-hand quantity across a medicine's active batches.
pub async fn total_active_stock<C: ConnectionTrait>(
    conn: &C,
    medicine_id: i64,
) -> Result<i32, ServiceError> {
    let batches = medicine_batch::Entity::find()
        .filter(medicine_batch::Column::MedicineId.eq(medicine_id))
        .filter(medicine_batch::Column::IsActive.eq(true))
        .filter(medicine_batch::Column::CurrentQuantity.gt(0))
        .all(conn)
        .await?;

    Ok(batches.iter().map(|b| b.current_quantity).sum())
}

async fn find_medicine<C: ConnectionTrait>(
    conn: &C,
    medicine_id: i64,
) -> Result<medicine::Model, ServiceError> {
    medicine::Entity::find_by_id(medicine_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Medicine {} not found", medicine_id)))
}

async fn find_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<medicine_batch::Model, ServiceError> {
    medicine_batch::Entity::find_by_id(batch_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_id)))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveBatchRequest {
    pub medicine_id: i64,
    pub supplier_id: i64,
    #[validate(length(min = 1))]
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub received_date: NaiveDate,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveBatchResult {
    pub batch: medicine_batch::Model,
    /// Set when the received stock is already inside its warning window.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispenseRequest {
    pub medicine_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispensePreview {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub requested_quantity: i32,
    pub total_available: i32,
    pub can_dispense: bool,
    pub message: Option<String>,
    pub allocations: Vec<BatchAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseResult {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub total_dispensed: i32,
    pub allocations: Vec<BatchAllocation>,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub batch_id: i64,
    #[validate(range(min = 0))]
    pub new_quantity: i32,
    /// Mandatory: adjustments are audit-sensitive.
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateBatchRequest {
    pub batch_id: i64,
    #[validate(length(min = 1))]
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub status: BatchStatus,
    pub is_active: bool,
}

/// Cached stock aggregate for one medicine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCheck {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub total_quantity: i32,
    pub batches: Vec<StockCheckBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCheckBatch {
    pub batch_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub current_quantity: i32,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeMedicine {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub medicine_code: String,
    pub manufacturer: Option<String>,
    pub total_available_stock: i32,
}

/// Filter for the expiry-management listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryStatusFilter {
    Expired,
    ExpiringSoon,
    InDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ExpiryStatusLabel {
    /// Already expired; urgency no longer applies.
    #[strum(serialize = "N/A")]
    NotApplicable,
    Critical,
    Warning,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryManagementEntry {
    pub batch_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub category_id: i64,
    pub supplier_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub current_quantity: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub status: BatchStatus,
    pub days_until_expiry: i64,
    pub expiry_status: ExpiryStatusLabel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub medicine_id: Option<i64>,
    pub movement_type: Option<MovementType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: i64,
    pub batch_id: i64,
    pub batch_number: String,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub snapshot_quantity: Option<i32>,
    pub reason: Option<String>,
    pub performed_by_user_id: i64,
    pub performed_at: DateTime<Utc>,
}

/// Service for batch receipt, dispensing and adjustment.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    cache: Arc<dyn CacheBackend>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, cache: Arc<dyn CacheBackend>, event_sender: EventSender) -> Self {
        Self {
            db,
            cache,
            event_sender,
        }
    }

    /// Cached stock aggregate for one medicine, FEFO-ordered.
    #[instrument(skip(self))]
    pub async fn stock_check(&self, medicine_id: i64) -> Result<Option<StockCheck>, ServiceError> {
        let cache_key = keys::stock_check(medicine_id);
        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(cached) = serde_json::from_str::<StockCheck>(&raw) {
                    return Ok(Some(cached));
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Stock check cache read failed: {}", e),
        }

        let medicine = match medicine::Entity::find_by_id(medicine_id)
            .one(self.db.as_ref())
            .await?
        {
            Some(m) => m,
            None => return Ok(None),
        };

        let mut batches = eligible_batches(self.db.as_ref(), medicine_id).await?;
        batches.sort_by_key(|b| (b.expiry_date, b.id));

        let result = StockCheck {
            medicine_id: medicine.id,
            medicine_name: medicine.name,
            total_quantity: batches.iter().map(|b| b.current_quantity).sum(),
            batches: batches
                .into_iter()
                .map(|b| StockCheckBatch {
                    batch_id: b.id,
                    batch_number: b.batch_number,
                    expiry_date: b.expiry_date,
                    current_quantity: b.current_quantity,
                    status: b.status,
                })
                .collect(),
        };

        match serde_json::to_string(&result) {
            Ok(serialized) => {
                if let Err(e) = self
                    .cache
                    .set(&cache_key, &serialized, Some(STOCK_CHECK_TTL))
                    .await
                {
                    warn!("Stock check cache write failed: {}", e);
                }
            }
            Err(e) => warn!("Stock check serialization failed: {}", e),
        }

        Ok(Some(result))
    }

    /// Runs the FEFO planner without mutating anything.
    #[instrument(skip(self))]
    pub async fn preview_dispense(
        &self,
        medicine_id: i64,
        quantity: i32,
    ) -> Result<DispensePreview, ServiceError> {
        let medicine = find_medicine(self.db.as_ref(), medicine_id).await?;
        let batches = eligible_batches(self.db.as_ref(), medicine_id).await?;
        let plan = allocator::plan(&batches, quantity, Utc::now().date_naive());

        Ok(DispensePreview {
            medicine_id,
            medicine_name: medicine.name,
            requested_quantity: quantity,
            total_available: plan.total_available,
            can_dispense: plan.can_dispense(),
            message: plan.message(),
            allocations: plan.allocations,
        })
    }

    /// Commits a FEFO dispense.
    #[instrument(skip(self, actor))]
    pub async fn dispense(
        &self,
        request: DispenseRequest,
        actor: &ActorContext,
    ) -> Result<DispenseResult, ServiceError> {
        let result = self.dispense_inner(request, actor).await;
        match &result {
            Ok(dispensed) => {
                DISPENSES_TOTAL.inc();
                DISPENSED_UNITS.inc_by(dispensed.total_dispensed as u64);
            }
            Err(e) => {
                DISPENSE_FAILURES.with_label_values(&[error_label(e)]).inc();
            }
        }
        result
    }

    async fn dispense_inner(
        &self,
        request: DispenseRequest,
        actor: &ActorContext,
    ) -> Result<DispenseResult, ServiceError> {
        request.validate()?;

        let medicine_id = request.medicine_id;
        let quantity = request.quantity;
        let reason = request.reason.clone().unwrap_or_else(|| "Dispensed".to_string());
        let actor_ctx = actor.clone();
        let today = Utc::now().date_naive();

        let (medicine, plan, movements, alert_outcome) = self
            .db
            .transaction::<_, (
                medicine::Model,
                AllocationPlan,
                Vec<stock_movement::Model>,
                StockAlertOutcome,
            ), ServiceError>(move |txn| {
                Box::pin(async move {
                    let medicine = find_medicine(txn, medicine_id).await?;

                    let batches = eligible_batches(txn, medicine_id).await?;
                    let plan = allocator::plan(&batches, quantity, today);
                    if let Some(message) = plan.message() {
                        return Err(ServiceError::InsufficientStock(message));
                    }

                    let by_id: HashMap<i64, &medicine_batch::Model> =
                        batches.iter().map(|b| (b.id, b)).collect();

                    let mut movements = Vec::with_capacity(plan.allocations.len());
                    let mut depleted_batch_ids = Vec::new();

                    for line in &plan.allocations {
                        let batch = by_id.get(&line.batch_id).ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "Planned batch {} missing from fetched set",
                                line.batch_id
                            ))
                        })?;

                        let new_status =
                            batch_status::status_after_change(batch, line.remaining_after, today);
                        apply_batch_patch(
                            txn,
                            batch,
                            BatchPatch {
                                current_quantity: Some(line.remaining_after),
                                status: Some(new_status),
                                ..Default::default()
                            },
                            &actor_ctx,
                        )
                        .await?;

                        if line.remaining_after == 0 {
                            depleted_batch_ids.push(line.batch_id);
                        }

                        let movement = stock_movement::ActiveModel {
                            medicine_batch_id: Set(line.batch_id),
                            movement_type: Set(MovementType::OutDispense),
                            quantity: Set(-line.quantity_allocated),
                            snapshot_quantity: Set(None),
                            reason: Set(Some(reason.clone())),
                            reference_no: Set(None),
                            performed_by_user_id: Set(actor_ctx.user_id),
                            performed_at: Set(Utc::now()),
                            ..Default::default()
                        };
                        movements.push(movement.insert(txn).await.map_err(ServiceError::db_error)?);
                    }

                    // A depleted batch no longer needs its expiry alerts.
                    for batch_id in &depleted_batch_ids {
                        notifications::resolve_alerts(
                            txn,
                            *batch_id,
                            RelatedEntity::Batch,
                            NotificationType::Warning,
                        )
                        .await?;
                        notifications::resolve_alerts(
                            txn,
                            *batch_id,
                            RelatedEntity::Batch,
                            NotificationType::Critical,
                        )
                        .await?;
                    }

                    let total_stock = total_active_stock(txn, medicine_id).await?;
                    let alert_outcome =
                        notifications::reconcile_stock_alert(txn, &medicine, total_stock).await?;

                    Ok((medicine, plan, movements, alert_outcome))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(medicine_id).await;
        self.broadcast_movements(&medicine, &plan.allocations, &movements, actor)
            .await;
        self.broadcast_alert_outcome(&alert_outcome).await;
        self.event_sender
            .emit(Event::StatsChanged { medicine_id })
            .await;

        Ok(DispenseResult {
            medicine_id,
            medicine_name: medicine.name,
            total_dispensed: quantity,
            allocations: plan.allocations,
            performed_by: actor.username.clone(),
            performed_at: Utc::now(),
        })
    }

    /// Receives stock: creates the batch for an unknown (medicine, batch
    /// number) pair, appends to the existing one otherwise. Appending to a
    /// batch whose stored expiry differs is a conflict, never a merge.
    #[instrument(skip(self, actor))]
    pub async fn receive_batch(
        &self,
        request: ReceiveBatchRequest,
        actor: &ActorContext,
    ) -> Result<ReceiveBatchResult, ServiceError> {
        request.validate()?;

        let req = request.clone();
        let actor_ctx = actor.clone();
        let today = Utc::now().date_naive();

        let (medicine, batch, movement, warning, created_alert) = self
            .db
            .transaction::<_, (
                medicine::Model,
                medicine_batch::Model,
                stock_movement::Model,
                Option<String>,
                Option<crate::entities::notification::Model>,
            ), ServiceError>(move |txn| {
                Box::pin(async move {
                    let medicine = find_medicine(txn, req.medicine_id).await?;

                    let existing = medicine_batch::Entity::find()
                        .filter(medicine_batch::Column::MedicineId.eq(req.medicine_id))
                        .filter(medicine_batch::Column::BatchNumber.eq(req.batch_number.clone()))
                        .one(txn)
                        .await?;

                    let is_new = existing.is_none();
                    let batch = match existing {
                        None => {
                            let model = medicine_batch::ActiveModel {
                                medicine_id: Set(req.medicine_id),
                                supplier_id: Set(req.supplier_id),
                                batch_number: Set(req.batch_number.clone()),
                                expiry_date: Set(req.expiry_date),
                                received_date: Set(req.received_date),
                                initial_quantity: Set(req.quantity),
                                current_quantity: Set(req.quantity),
                                purchase_price: Set(req.purchase_price),
                                selling_price: Set(req.selling_price),
                                status: Set(BatchStatus::Active),
                                row_version: Set(1),
                                is_active: Set(true),
                                created_at: Set(Utc::now()),
                                created_by: Set(Some(actor_ctx.username.clone())),
                                updated_at: Set(None),
                                updated_by: Set(None),
                                ..Default::default()
                            };
                            model.insert(txn).await.map_err(ServiceError::db_error)?
                        }
                        Some(batch) => {
                            if batch.expiry_date != req.expiry_date {
                                return Err(ServiceError::Conflict(format!(
                                    "Batch '{}' is already registered with expiry date {}. \
                                     You are trying to receive it with date {}. \
                                     Please verify your input.",
                                    req.batch_number,
                                    batch.expiry_date.format("%d/%m/%Y"),
                                    req.expiry_date.format("%d/%m/%Y"),
                                )));
                            }

                            let new_current = batch.current_quantity + req.quantity;
                            let new_initial = batch.initial_quantity + req.quantity;
                            // A previously depleted batch becomes active
                            // again once stock arrives.
                            let new_status =
                                batch_status::status_after_change(&batch, new_current, today);
                            apply_batch_patch(
                                txn,
                                &batch,
                                BatchPatch {
                                    current_quantity: Some(new_current),
                                    initial_quantity: Some(new_initial),
                                    status: Some(new_status),
                                    ..Default::default()
                                },
                                &actor_ctx,
                            )
                            .await?;

                            find_batch(txn, batch.id).await?
                        }
                    };

                    let movement = stock_movement::ActiveModel {
                        medicine_batch_id: Set(batch.id),
                        movement_type: Set(MovementType::InPurchase),
                        quantity: Set(req.quantity),
                        snapshot_quantity: Set(None),
                        reason: Set(Some(
                            if is_new {
                                "Initial Batch Purchase"
                            } else {
                                "Batch Quantity Append (Purchase)"
                            }
                            .to_string(),
                        )),
                        reference_no: Set(None),
                        performed_by_user_id: Set(actor_ctx.user_id),
                        performed_at: Set(Utc::now()),
                        ..Default::default()
                    };
                    let movement = movement.insert(txn).await.map_err(ServiceError::db_error)?;

                    // Replenishment may clear an open stock alert.
                    let total_stock = total_active_stock(txn, req.medicine_id).await?;
                    if total_stock >= medicine.low_stock_threshold {
                        notifications::resolve_alerts(
                            txn,
                            medicine.id,
                            RelatedEntity::Medicine,
                            NotificationType::StockAlert,
                        )
                        .await?;
                    }

                    // Short-dated receipt: warn the caller and raise an
                    // alert unless one of the same severity already exists
                    // today.
                    let rules = expiry_rules::active_rules(txn).await?;
                    let rule = expiry_rules::resolve(&rules, medicine.category_id);
                    let days_until_expiry = (req.expiry_date - today).num_days();

                    let mut warning = None;
                    let mut created_alert = None;
                    if days_until_expiry <= rule.warning_days as i64 {
                        warning = Some("Warning: Receiving short-dated stock.".to_string());

                        let is_critical = days_until_expiry <= rule.critical_days as i64;
                        let (notification_type, priority, title) = if is_critical {
                            (
                                NotificationType::Critical,
                                5,
                                "Critical Expiry Alert (New Stock)",
                            )
                        } else {
                            (NotificationType::Warning, 3, "Expiry Warning (New Stock)")
                        };

                        let duplicate = notifications::same_day_alert_exists(
                            txn,
                            batch.id,
                            RelatedEntity::Batch,
                            Some(notification_type),
                        )
                        .await?;

                        if !duplicate {
                            let alert = notifications::create_system_alert(
                                txn,
                                NewSystemAlert {
                                    title: title.to_string(),
                                    message: format!(
                                        "{} (Batch {}) received with short expiry ({} days). \
                                         Quantity: {} units.",
                                        medicine.name,
                                        batch.batch_number,
                                        days_until_expiry,
                                        req.quantity
                                    ),
                                    notification_type,
                                    priority,
                                    related_entity_id: batch.id,
                                    related_entity_type: RelatedEntity::Batch,
                                },
                            )
                            .await?;
                            created_alert = Some(alert);
                        }
                    }

                    Ok((medicine, batch, movement, warning, created_alert))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(request.medicine_id).await;

        self.event_sender
            .emit(Event::MovementRecorded {
                movement_id: movement.id,
                medicine_id: medicine.id,
                medicine_name: medicine.name.clone(),
                batch_number: batch.batch_number.clone(),
                movement_type: MovementType::InPurchase,
                quantity: movement.quantity,
                performed_by: actor.username.clone(),
                performed_at: movement.performed_at,
            })
            .await;
        if let Some(alert) = &created_alert {
            self.event_sender
                .emit(Event::SystemAlertRaised {
                    notification_id: alert.id,
                    notification_type: alert.notification_type,
                    priority: alert.priority,
                    title: alert.title.clone(),
                })
                .await;
        }
        self.event_sender
            .emit(Event::StatsChanged {
                medicine_id: medicine.id,
            })
            .await;

        Ok(ReceiveBatchResult { batch, warning })
    }

    /// Sets a batch's quantity to an absolute value, recording the signed
    /// delta. A zero delta is a no-op and writes no ledger row.
    #[instrument(skip(self, actor))]
    pub async fn adjust_stock(
        &self,
        request: AdjustStockRequest,
        actor: &ActorContext,
    ) -> Result<(), ServiceError> {
        request.validate()?;

        let req = request.clone();
        let actor_ctx = actor.clone();
        let today = Utc::now().date_naive();

        let outcome = self
            .db
            .transaction::<_, Option<(medicine::Model, stock_movement::Model, medicine_batch::Model, StockAlertOutcome)>, ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let batch = find_batch(txn, req.batch_id).await?;
                        let medicine = find_medicine(txn, batch.medicine_id).await?;

                        let delta = req.new_quantity - batch.current_quantity;
                        if delta == 0 {
                            return Ok(None);
                        }

                        let new_status =
                            batch_status::status_after_change(&batch, req.new_quantity, today);
                        apply_batch_patch(
                            txn,
                            &batch,
                            BatchPatch {
                                current_quantity: Some(req.new_quantity),
                                status: Some(new_status),
                                ..Default::default()
                            },
                            &actor_ctx,
                        )
                        .await?;

                        let movement = stock_movement::ActiveModel {
                            medicine_batch_id: Set(batch.id),
                            movement_type: Set(MovementType::Adjustment),
                            quantity: Set(delta),
                            snapshot_quantity: Set(Some(req.new_quantity)),
                            reason: Set(Some(req.reason.clone())),
                            reference_no: Set(None),
                            performed_by_user_id: Set(actor_ctx.user_id),
                            performed_at: Set(Utc::now()),
                            ..Default::default()
                        };
                        let movement =
                            movement.insert(txn).await.map_err(ServiceError::db_error)?;

                        let total_stock = total_active_stock(txn, batch.medicine_id).await?;
                        let alert_outcome =
                            notifications::reconcile_stock_alert(txn, &medicine, total_stock)
                                .await?;

                        Ok(Some((medicine, movement, batch, alert_outcome)))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)?;

        let Some((medicine, movement, batch, alert_outcome)) = outcome else {
            return Ok(());
        };

        self.invalidate_stock_cache(medicine.id).await;
        self.event_sender
            .emit(Event::MovementRecorded {
                movement_id: movement.id,
                medicine_id: medicine.id,
                medicine_name: medicine.name.clone(),
                batch_number: batch.batch_number.clone(),
                movement_type: MovementType::Adjustment,
                quantity: movement.quantity,
                performed_by: actor.username.clone(),
                performed_at: movement.performed_at,
            })
            .await;
        self.broadcast_alert_outcome(&alert_outcome).await;
        self.event_sender
            .emit(Event::StatsChanged {
                medicine_id: medicine.id,
            })
            .await;

        Ok(())
    }

    /// Quarantine override toggle. Setting quarantine forces the status;
    /// lifting it recomputes from batch data and may land on Active,
    /// Expired or Depleted.
    #[instrument(skip(self, actor))]
    pub async fn set_quarantine(
        &self,
        batch_id: i64,
        quarantine: bool,
        actor: &ActorContext,
    ) -> Result<BatchStatus, ServiceError> {
        let actor_ctx = actor.clone();
        let today = Utc::now().date_naive();

        let (medicine_id, new_status) = self
            .db
            .transaction::<_, (i64, BatchStatus), ServiceError>(move |txn| {
                Box::pin(async move {
                    let batch = find_batch(txn, batch_id).await?;

                    let new_status = if quarantine {
                        BatchStatus::Quarantined
                    } else {
                        batch_status::status_after_quarantine_lift(&batch, today)
                    };

                    apply_batch_patch(
                        txn,
                        &batch,
                        BatchPatch {
                            status: Some(new_status),
                            ..Default::default()
                        },
                        &actor_ctx,
                    )
                    .await?;

                    Ok((batch.medicine_id, new_status))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(medicine_id).await;

        Ok(new_status)
    }

    /// Edits batch fields, writing a stock-audit row per changed property.
    #[instrument(skip(self, actor))]
    pub async fn update_batch(
        &self,
        request: UpdateBatchRequest,
        actor: &ActorContext,
    ) -> Result<(), ServiceError> {
        request.validate()?;

        let req = request.clone();
        let actor_ctx = actor.clone();

        let medicine_id = self
            .db
            .transaction::<_, i64, ServiceError>(move |txn| {
                Box::pin(async move {
                    let batch = find_batch(txn, req.batch_id).await?;
                    let now = Utc::now();

                    let mut audits: Vec<stock_audit::ActiveModel> = Vec::new();
                    let mut audit = |property: &str, old: String, new: String| {
                        audits.push(stock_audit::ActiveModel {
                            medicine_batch_id: Set(batch.id),
                            batch_number: Set(batch.batch_number.clone()),
                            property_name: Set(property.to_string()),
                            old_value: Set(old),
                            new_value: Set(new),
                            changed_at: Set(now),
                            changed_by_user_id: Set(actor_ctx.user_id),
                            changed_by_user_name: Set(actor_ctx.username.clone()),
                            ..Default::default()
                        });
                    };

                    if batch.batch_number != req.batch_number {
                        audit(
                            "BatchNumber",
                            batch.batch_number.clone(),
                            req.batch_number.clone(),
                        );
                    }
                    if batch.expiry_date != req.expiry_date {
                        audit(
                            "ExpiryDate",
                            batch.expiry_date.format("%Y-%m-%d").to_string(),
                            req.expiry_date.format("%Y-%m-%d").to_string(),
                        );
                    }
                    if batch.purchase_price != req.purchase_price {
                        audit(
                            "PurchasePrice",
                            batch.purchase_price.to_string(),
                            req.purchase_price.to_string(),
                        );
                    }
                    if batch.selling_price != req.selling_price {
                        audit(
                            "SellingPrice",
                            batch.selling_price.to_string(),
                            req.selling_price.to_string(),
                        );
                    }

                    apply_batch_patch(
                        txn,
                        &batch,
                        BatchPatch {
                            batch_number: Some(req.batch_number.clone()),
                            expiry_date: Some(req.expiry_date),
                            purchase_price: Some(req.purchase_price),
                            selling_price: Some(req.selling_price),
                            status: Some(req.status),
                            is_active: Some(req.is_active),
                            ..Default::default()
                        },
                        &actor_ctx,
                    )
                    .await?;

                    for audit in audits {
                        audit.insert(txn).await.map_err(ServiceError::db_error)?;
                    }

                    Ok(batch.medicine_id)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(medicine_id).await;

        Ok(())
    }

    /// Active medicines sharing this medicine's generic name that have
    /// dispensable stock, best-stocked first.
    #[instrument(skip(self))]
    pub async fn alternatives(
        &self,
        medicine_id: i64,
    ) -> Result<Vec<AlternativeMedicine>, ServiceError> {
        let medicine = find_medicine(self.db.as_ref(), medicine_id).await?;
        let generic = match medicine.generic_name.as_deref() {
            Some(g) if !g.trim().is_empty() => g.to_string(),
            _ => return Ok(Vec::new()),
        };

        let candidates: Vec<medicine::Model> = medicine::Entity::find()
            .filter(medicine::Column::Id.ne(medicine_id))
            .filter(medicine::Column::IsActive.eq(true))
            .filter(medicine::Column::GenericName.is_not_null())
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .filter(|m| {
                m.generic_name
                    .as_deref()
                    .map(|g| g.eq_ignore_ascii_case(&generic))
                    .unwrap_or(false)
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_ids: Vec<i64> = candidates.iter().map(|m| m.id).collect();
        let batches = medicine_batch::Entity::find()
            .filter(medicine_batch::Column::MedicineId.is_in(candidate_ids))
            .filter(medicine_batch::Column::IsActive.eq(true))
            .filter(medicine_batch::Column::Status.eq(BatchStatus::Active))
            .filter(medicine_batch::Column::CurrentQuantity.gt(0))
            .all(self.db.as_ref())
            .await?;

        let mut stock_totals: HashMap<i64, i32> = HashMap::new();
        for batch in batches {
            *stock_totals.entry(batch.medicine_id).or_insert(0) += batch.current_quantity;
        }

        let mut alternatives: Vec<AlternativeMedicine> = candidates
            .into_iter()
            .filter_map(|m| {
                let stock = *stock_totals.get(&m.id)?;
                (stock > 0).then(|| AlternativeMedicine {
                    medicine_id: m.id,
                    medicine_name: m.name,
                    medicine_code: m.medicine_code,
                    manufacturer: m.manufacturer,
                    total_available_stock: stock,
                })
            })
            .collect();

        alternatives.sort_by(|a, b| b.total_available_stock.cmp(&a.total_available_stock));

        Ok(alternatives)
    }

    /// Expiry-management listing: every active, stocked batch classified
    /// against its resolved rule, most urgent first.
    #[instrument(skip(self))]
    pub async fn batches_by_expiry_status(
        &self,
        filter: Option<ExpiryStatusFilter>,
    ) -> Result<Vec<ExpiryManagementEntry>, ServiceError> {
        let db = self.db.as_ref();
        let batches = medicine_batch::Entity::find()
            .filter(medicine_batch::Column::IsActive.eq(true))
            .filter(medicine_batch::Column::CurrentQuantity.gt(0))
            .all(db)
            .await?;

        let medicine_ids: Vec<i64> = batches.iter().map(|b| b.medicine_id).collect();
        let medicines: HashMap<i64, medicine::Model> = medicine::Entity::find()
            .filter(medicine::Column::Id.is_in(medicine_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let rules = expiry_rules::active_rules(db).await?;
        let today = Utc::now().date_naive();

        let mut entries = Vec::new();
        for batch in batches {
            let Some(medicine) = medicines.get(&batch.medicine_id) else {
                continue;
            };

            let rule = expiry_rules::resolve(&rules, medicine.category_id);
            let days_until_expiry = (batch.expiry_date - today).num_days();

            let label = if days_until_expiry < 0 {
                ExpiryStatusLabel::NotApplicable
            } else {
                match rule.classify(days_until_expiry) {
                    ExpiryUrgency::Critical => ExpiryStatusLabel::Critical,
                    ExpiryUrgency::Warning => ExpiryStatusLabel::Warning,
                    ExpiryUrgency::Normal => ExpiryStatusLabel::Normal,
                }
            };

            let include = match filter {
                Some(ExpiryStatusFilter::Expired) => days_until_expiry < 0,
                Some(ExpiryStatusFilter::ExpiringSoon) => {
                    days_until_expiry >= 0
                        && matches!(
                            label,
                            ExpiryStatusLabel::Critical | ExpiryStatusLabel::Warning
                        )
                }
                Some(ExpiryStatusFilter::InDate) => label == ExpiryStatusLabel::Normal,
                None => true,
            };

            if include {
                entries.push(ExpiryManagementEntry {
                    batch_id: batch.id,
                    medicine_id: batch.medicine_id,
                    medicine_name: medicine.name.clone(),
                    category_id: medicine.category_id,
                    supplier_id: batch.supplier_id,
                    batch_number: batch.batch_number.clone(),
                    expiry_date: batch.expiry_date,
                    current_quantity: batch.current_quantity,
                    purchase_price: batch.purchase_price,
                    selling_price: batch.selling_price,
                    status: batch_status::compute_status(&batch, today),
                    days_until_expiry,
                    expiry_status: label,
                });
            }
        }

        entries.sort_by_key(|e| e.days_until_expiry);

        Ok(entries)
    }

    /// Ledger query by date range, medicine and movement type.
    #[instrument(skip(self))]
    pub async fn stock_movements(
        &self,
        query: MovementQuery,
    ) -> Result<Vec<MovementRecord>, ServiceError> {
        let db = self.db.as_ref();

        let mut finder = stock_movement::Entity::find().find_also_related(medicine_batch::Entity);
        if let Some(from) = query.from {
            finder = finder.filter(stock_movement::Column::PerformedAt.gte(from));
        }
        if let Some(to) = query.to {
            finder = finder.filter(stock_movement::Column::PerformedAt.lte(to));
        }
        if let Some(movement_type) = query.movement_type {
            finder = finder.filter(stock_movement::Column::MovementType.eq(movement_type));
        }
        if let Some(medicine_id) = query.medicine_id {
            finder = finder.filter(medicine_batch::Column::MedicineId.eq(medicine_id));
        }

        let rows = finder
            .order_by_desc(stock_movement::Column::PerformedAt)
            .all(db)
            .await?;

        let medicine_ids: Vec<i64> = rows
            .iter()
            .filter_map(|(_, b)| b.as_ref().map(|b| b.medicine_id))
            .collect();
        let medicine_names: HashMap<i64, String> = medicine::Entity::find()
            .filter(medicine::Column::Id.is_in(medicine_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        let records = rows
            .into_iter()
            .filter_map(|(movement, batch)| {
                let batch = batch?;
                let medicine_name = medicine_names.get(&batch.medicine_id)?.clone();
                Some(MovementRecord {
                    id: movement.id,
                    batch_id: batch.id,
                    batch_number: batch.batch_number,
                    medicine_id: batch.medicine_id,
                    medicine_name,
                    movement_type: movement.movement_type,
                    quantity: movement.quantity,
                    snapshot_quantity: movement.snapshot_quantity,
                    reason: movement.reason,
                    performed_by_user_id: movement.performed_by_user_id,
                    performed_at: movement.performed_at,
                })
            })
            .collect();

        Ok(records)
    }

    pub(crate) async fn invalidate_stock_cache(&self, medicine_id: i64) {
        if let Err(e) = self.cache.delete(&keys::stock_check(medicine_id)).await {
            warn!(medicine_id, "Failed to invalidate stock check cache: {}", e);
        }
    }

    async fn broadcast_movements(
        &self,
        medicine: &medicine::Model,
        allocations: &[BatchAllocation],
        movements: &[stock_movement::Model],
        actor: &ActorContext,
    ) {
        for (movement, line) in movements.iter().zip(allocations.iter()) {
            self.event_sender
                .emit(Event::MovementRecorded {
                    movement_id: movement.id,
                    medicine_id: medicine.id,
                    medicine_name: medicine.name.clone(),
                    batch_number: line.batch_number.clone(),
                    movement_type: movement.movement_type,
                    quantity: movement.quantity,
                    performed_by: actor.username.clone(),
                    performed_at: movement.performed_at,
                })
                .await;
        }
    }

    pub(crate) async fn broadcast_alert_outcome(&self, outcome: &StockAlertOutcome) {
        notifications::emit_stock_alert_event(&self.event_sender, outcome).await;
    }
}
