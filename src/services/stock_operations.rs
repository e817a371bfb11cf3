//! Stock removal operations: expired-stock disposal and supplier returns.
//!
//! Both operations end a batch's life (fully or partially), resolve the
//! alerts that pointed at it and leave the ledger as the only record of
//! where the units went.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use validator::Validate;

use crate::actor::ActorContext;
use crate::cache::{keys, CacheBackend};
use crate::db::DbPool;
use crate::entities::medicine_batch::BatchStatus;
use crate::entities::stock_movement::{self, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::{
    apply_batch_patch, total_active_stock, unwrap_txn_err, BatchPatch,
};
use crate::services::notifications::{self, StockAlertOutcome};
use crate::entities::{medicine, medicine_batch};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DisposeExpiredRequest {
    pub batch_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReturnToSupplierRequest {
    pub batch_id: i64,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisposalResult {
    pub batch_id: i64,
    pub disposed_quantity: i32,
    pub remaining_quantity: i32,
    /// True when the disposal emptied the batch and closed it.
    pub batch_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierReturnResult {
    pub batch_id: i64,
    pub returned_quantity: i32,
}

/// Service for taking stock out of circulation.
#[derive(Clone)]
pub struct StockOperationService {
    db: Arc<DbPool>,
    cache: Arc<dyn CacheBackend>,
    event_sender: EventSender,
}

impl StockOperationService {
    pub fn new(db: Arc<DbPool>, cache: Arc<dyn CacheBackend>, event_sender: EventSender) -> Self {
        Self {
            db,
            cache,
            event_sender,
        }
    }

    /// Disposes up to the batch's remaining quantity of expired stock.
    /// Full disposal closes the batch (terminal) and resolves its alerts;
    /// partial disposal leaves it Expired.
    #[instrument(skip(self, actor))]
    pub async fn dispose_expired(
        &self,
        request: DisposeExpiredRequest,
        actor: &ActorContext,
    ) -> Result<DisposalResult, ServiceError> {
        request.validate()?;

        let req = request.clone();
        let actor_ctx = actor.clone();

        let (medicine, batch, movement, remaining, closed) = self
            .db
            .transaction::<_, (
                medicine::Model,
                medicine_batch::Model,
                stock_movement::Model,
                i32,
                bool,
            ), ServiceError>(move |txn| {
                Box::pin(async move {
                    let batch = medicine_batch::Entity::find_by_id(req.batch_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Batch {} not found", req.batch_id))
                        })?;
                    let medicine = medicine::Entity::find_by_id(batch.medicine_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Medicine {} not found",
                                batch.medicine_id
                            ))
                        })?;

                    if req.quantity > batch.current_quantity {
                        return Err(ServiceError::Conflict(
                            "Requested quantity exceeds batch current quantity.".to_string(),
                        ));
                    }

                    let remaining = batch.current_quantity - req.quantity;
                    let closed = remaining == 0;

                    let patch = if closed {
                        // Disposal fully empties the lot: terminal close,
                        // not Depleted.
                        BatchPatch {
                            current_quantity: Some(0),
                            status: Some(BatchStatus::Closed),
                            ..Default::default()
                        }
                    } else {
                        BatchPatch {
                            current_quantity: Some(remaining),
                            ..Default::default()
                        }
                    };
                    apply_batch_patch(txn, &batch, patch, &actor_ctx).await?;

                    if closed {
                        notifications::resolve_batch_alerts(txn, batch.id).await?;
                    }

                    let movement = stock_movement::ActiveModel {
                        medicine_batch_id: Set(batch.id),
                        movement_type: Set(MovementType::OutExpired),
                        quantity: Set(-req.quantity),
                        snapshot_quantity: Set(None),
                        reason: Set(Some(req.reason.clone())),
                        reference_no: Set(None),
                        performed_by_user_id: Set(actor_ctx.user_id),
                        performed_at: Set(Utc::now()),
                        ..Default::default()
                    };
                    let movement = movement.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok((medicine, batch, movement, remaining, closed))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(medicine.id).await;
        self.broadcast_movement(&medicine, &batch, &movement, actor)
            .await;
        self.event_sender
            .emit(Event::StatsChanged {
                medicine_id: medicine.id,
            })
            .await;

        Ok(DisposalResult {
            batch_id: batch.id,
            disposed_quantity: request.quantity,
            remaining_quantity: remaining,
            batch_closed: closed,
        })
    }

    /// Returns the batch's entire remaining quantity to the supplier.
    /// Always a whole-batch operation: quantity goes to zero, status to
    /// Closed, and the medicine's stock alert is re-evaluated.
    #[instrument(skip(self, actor))]
    pub async fn return_to_supplier(
        &self,
        request: ReturnToSupplierRequest,
        actor: &ActorContext,
    ) -> Result<SupplierReturnResult, ServiceError> {
        request.validate()?;

        let req = request.clone();
        let actor_ctx = actor.clone();

        let (medicine, batch, movement, returned, alert_outcome) = self
            .db
            .transaction::<_, (
                medicine::Model,
                medicine_batch::Model,
                stock_movement::Model,
                i32,
                StockAlertOutcome,
            ), ServiceError>(move |txn| {
                Box::pin(async move {
                    let batch = medicine_batch::Entity::find_by_id(req.batch_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Batch {} not found", req.batch_id))
                        })?;
                    let medicine = medicine::Entity::find_by_id(batch.medicine_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Medicine {} not found",
                                batch.medicine_id
                            ))
                        })?;

                    let returned = batch.current_quantity;
                    if returned == 0 {
                        return Err(ServiceError::ValidationError(
                            "Cannot return batch with zero quantity.".to_string(),
                        ));
                    }

                    apply_batch_patch(
                        txn,
                        &batch,
                        BatchPatch {
                            current_quantity: Some(0),
                            status: Some(BatchStatus::Closed),
                            ..Default::default()
                        },
                        &actor_ctx,
                    )
                    .await?;

                    notifications::resolve_batch_alerts(txn, batch.id).await?;

                    let movement = stock_movement::ActiveModel {
                        medicine_batch_id: Set(batch.id),
                        movement_type: Set(MovementType::OutReturn),
                        quantity: Set(-returned),
                        snapshot_quantity: Set(None),
                        reason: Set(Some(req.reason.clone())),
                        reference_no: Set(None),
                        performed_by_user_id: Set(actor_ctx.user_id),
                        performed_at: Set(Utc::now()),
                        ..Default::default()
                    };
                    let movement = movement.insert(txn).await.map_err(ServiceError::db_error)?;

                    // The returned batch is already at zero, so the
                    // aggregate naturally excludes it.
                    let total_stock = total_active_stock(txn, batch.medicine_id).await?;
                    let alert_outcome =
                        notifications::reconcile_stock_alert(txn, &medicine, total_stock).await?;

                    Ok((medicine, batch, movement, returned, alert_outcome))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.invalidate_stock_cache(medicine.id).await;
        self.broadcast_movement(&medicine, &batch, &movement, actor)
            .await;
        notifications::emit_stock_alert_event(&self.event_sender, &alert_outcome).await;
        self.event_sender
            .emit(Event::StatsChanged {
                medicine_id: medicine.id,
            })
            .await;

        Ok(SupplierReturnResult {
            batch_id: batch.id,
            returned_quantity: returned,
        })
    }

    async fn invalidate_stock_cache(&self, medicine_id: i64) {
        if let Err(e) = self.cache.delete(&keys::stock_check(medicine_id)).await {
            warn!(medicine_id, "Failed to invalidate stock check cache: {}", e);
        }
    }

    async fn broadcast_movement(
        &self,
        medicine: &medicine::Model,
        batch: &medicine_batch::Model,
        movement: &stock_movement::Model,
        actor: &ActorContext,
    ) {
        self.event_sender
            .emit(Event::MovementRecorded {
                movement_id: movement.id,
                medicine_id: medicine.id,
                medicine_name: medicine.name.clone(),
                batch_number: batch.batch_number.clone(),
                movement_type: movement.movement_type,
                quantity: movement.quantity,
                performed_by: actor.username.clone(),
                performed_at: movement.performed_at,
            })
            .await;
    }
}
