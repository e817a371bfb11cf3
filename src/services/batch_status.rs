//! Batch lifecycle status engine.
//!
//! Status is derived, never stored authority: `Closed` and `Quarantined`
//! are manual overrides that suppress automatic reclassification, the
//! rest follows from quantity and expiry date. The derivation must be
//! re-run after every quantity mutation and when quarantine is lifted.

use chrono::NaiveDate;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info, instrument};

use crate::actor::ActorContext;
use crate::db::DbPool;
use crate::entities::medicine_batch::{self, BatchStatus};
use crate::errors::ServiceError;
use crate::services::inventory::{apply_batch_patch, BatchPatch};

fn derive(
    current: BatchStatus,
    quantity: i32,
    expiry_date: NaiveDate,
    today: NaiveDate,
) -> BatchStatus {
    // Manual overrides win over everything derived.
    if current == BatchStatus::Closed {
        return BatchStatus::Closed;
    }
    if current == BatchStatus::Quarantined {
        return BatchStatus::Quarantined;
    }
    if quantity == 0 {
        return BatchStatus::Depleted;
    }
    if expiry_date < today {
        return BatchStatus::Expired;
    }
    BatchStatus::Active
}

/// Computes the status a batch should carry given its stored state.
pub fn compute_status(batch: &medicine_batch::Model, today: NaiveDate) -> BatchStatus {
    derive(batch.status, batch.current_quantity, batch.expiry_date, today)
}

/// Computes the status a batch will carry once its quantity becomes
/// `new_quantity`. Used by operations that decide the status in the same
/// write as the quantity change.
pub fn status_after_change(
    batch: &medicine_batch::Model,
    new_quantity: i32,
    today: NaiveDate,
) -> BatchStatus {
    derive(batch.status, new_quantity, batch.expiry_date, today)
}

/// Status after lifting a quarantine: the override is cleared and the
/// automatic rules decide. This may land on Expired or Depleted, not
/// necessarily Active.
pub fn status_after_quarantine_lift(
    batch: &medicine_batch::Model,
    today: NaiveDate,
) -> BatchStatus {
    derive(
        BatchStatus::Active,
        batch.current_quantity,
        batch.expiry_date,
        today,
    )
}

/// Outcome of a full status sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusSweepSummary {
    pub examined: usize,
    pub updated: usize,
    pub expired: usize,
    pub depleted: usize,
    pub activated: usize,
}

/// Recomputes and persists the status of every active batch. Run daily by
/// the scheduler so that date-driven transitions (Active -> Expired) land
/// even when a batch sees no traffic.
#[instrument(skip(db, actor))]
pub async fn update_all_statuses(
    db: &DbPool,
    actor: &ActorContext,
    today: NaiveDate,
) -> Result<StatusSweepSummary, ServiceError> {
    let batches = medicine_batch::Entity::find()
        .filter(medicine_batch::Column::IsActive.eq(true))
        .all(db)
        .await?;

    let mut summary = StatusSweepSummary {
        examined: batches.len(),
        ..Default::default()
    };

    for batch in batches {
        let new_status = compute_status(&batch, today);
        if new_status == batch.status {
            continue;
        }

        apply_batch_patch(
            db,
            &batch,
            BatchPatch {
                status: Some(new_status),
                ..Default::default()
            },
            actor,
        )
        .await?;

        summary.updated += 1;
        match new_status {
            BatchStatus::Expired => summary.expired += 1,
            BatchStatus::Depleted => summary.depleted += 1,
            BatchStatus::Active => summary.activated += 1,
            _ => {}
        }

        debug!(
            batch_id = batch.id,
            old_status = %batch.status,
            new_status = %new_status,
            "Batch status changed"
        );
    }

    if summary.updated > 0 {
        info!(
            updated = summary.updated,
            expired = summary.expired,
            depleted = summary.depleted,
            activated = summary.activated,
            "Batch status sweep applied changes"
        );
    } else {
        info!(examined = summary.examined, "No batch status updates needed");
    }

    Ok(summary)
}
