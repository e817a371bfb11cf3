//! Alert creation, stock-alert reconciliation and resolution.
//!
//! The free helpers are generic over the connection so that alert writes
//! join the calling operation's transaction; [`NotificationService`] is
//! the standalone surface used by callers outside an operation.

use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cache::{keys, CacheBackend};
use crate::db::DbPool;
use crate::entities::notification::{self, NotificationType, RelatedEntity};
use crate::entities::medicine;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Fraction of the low-stock threshold under which a stock alert
/// escalates from warning to critical priority.
pub const STOCK_CRITICAL_PERCENTAGE: f64 = 0.5;

/// Priority values for stock alerts.
pub mod stock_priority {
    /// Stock is zero.
    pub const OUT_OF_STOCK: i32 = 5;
    /// Stock below half of the threshold.
    pub const CRITICAL: i32 = 4;
    /// Stock below the threshold.
    pub const WARNING: i32 = 3;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSystemAlert {
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub priority: i32,
    pub related_entity_id: i64,
    pub related_entity_type: RelatedEntity,
}

/// Inserts a system-wide alert row.
pub async fn create_system_alert<C: ConnectionTrait>(
    conn: &C,
    alert: NewSystemAlert,
) -> Result<notification::Model, ServiceError> {
    let model = notification::ActiveModel {
        user_id: Set(None),
        is_system_alert: Set(true),
        is_action_taken: Set(false),
        title: Set(alert.title),
        message: Set(alert.message),
        notification_type: Set(alert.notification_type),
        priority: Set(alert.priority),
        is_read: Set(false),
        related_entity_id: Set(Some(alert.related_entity_id)),
        related_entity_type: Set(Some(alert.related_entity_type)),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    model.insert(conn).await.map_err(ServiceError::db_error)
}

/// Whether a system alert for this entity was already created today
/// (UTC calendar day). Coarse idempotency guard against alert spam.
pub async fn same_day_alert_exists<C: ConnectionTrait>(
    conn: &C,
    related_entity_id: i64,
    related_entity_type: RelatedEntity,
    notification_type: Option<NotificationType>,
) -> Result<bool, ServiceError> {
    let day_start = Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();

    let mut query = notification::Entity::find()
        .filter(notification::Column::IsSystemAlert.eq(true))
        .filter(notification::Column::RelatedEntityId.eq(related_entity_id))
        .filter(notification::Column::RelatedEntityType.eq(related_entity_type))
        .filter(notification::Column::CreatedAt.gte(day_start));

    if let Some(ty) = notification_type {
        query = query.filter(notification::Column::NotificationType.eq(ty));
    }

    Ok(query.one(conn).await?.is_some())
}

/// Marks every unresolved system alert matching (entity, type) as
/// action-taken. Idempotent: already-resolved rows are simply not
/// matched. Returns the number of rows changed.
pub async fn resolve_alerts<C: ConnectionTrait>(
    conn: &C,
    related_entity_id: i64,
    related_entity_type: RelatedEntity,
    notification_type: NotificationType,
) -> Result<u64, ServiceError> {
    let result = notification::Entity::update_many()
        .col_expr(notification::Column::IsActionTaken, Expr::value(true))
        .filter(notification::Column::IsSystemAlert.eq(true))
        .filter(notification::Column::IsActionTaken.eq(false))
        .filter(notification::Column::RelatedEntityId.eq(related_entity_id))
        .filter(notification::Column::RelatedEntityType.eq(related_entity_type))
        .filter(notification::Column::NotificationType.eq(notification_type))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Resolves the full alert set tied to a batch that left circulation
/// (depleted, disposed or returned).
pub async fn resolve_batch_alerts<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<u64, ServiceError> {
    let mut resolved = 0;
    resolved += resolve_alerts(conn, batch_id, RelatedEntity::Batch, NotificationType::Warning)
        .await?;
    resolved += resolve_alerts(
        conn,
        batch_id,
        RelatedEntity::Batch,
        NotificationType::Critical,
    )
    .await?;
    resolved += resolve_alerts(
        conn,
        batch_id,
        RelatedEntity::ExpiredBatch,
        NotificationType::Critical,
    )
    .await?;
    Ok(resolved)
}

/// What the stock-alert reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum StockAlertOutcome {
    /// A new alert was created.
    Raised(notification::Model),
    /// An existing unresolved alert was refreshed in place.
    Updated(notification::Model),
    /// Stock recovered; open alerts were resolved.
    Resolved(u64),
    Unchanged,
}

impl StockAlertOutcome {
    pub fn alert(&self) -> Option<&notification::Model> {
        match self {
            StockAlertOutcome::Raised(n) | StockAlertOutcome::Updated(n) => Some(n),
            _ => None,
        }
    }
}

/// Create-or-update-or-resolve logic for a medicine's stock alert, shared
/// by the dispense, adjust and return paths.
///
/// Below the threshold an unresolved StockAlert is created or refreshed
/// (priority escalating with severity); at or above it any open alert is
/// resolved.
pub async fn reconcile_stock_alert<C: ConnectionTrait>(
    conn: &C,
    medicine: &medicine::Model,
    total_stock: i32,
) -> Result<StockAlertOutcome, ServiceError> {
    if total_stock >= medicine.low_stock_threshold {
        let resolved = resolve_alerts(
            conn,
            medicine.id,
            RelatedEntity::Medicine,
            NotificationType::StockAlert,
        )
        .await?;
        return Ok(if resolved > 0 {
            StockAlertOutcome::Resolved(resolved)
        } else {
            StockAlertOutcome::Unchanged
        });
    }

    let critical_level = (medicine.low_stock_threshold as f64 * STOCK_CRITICAL_PERCENTAGE) as i32;
    let priority = if total_stock == 0 {
        stock_priority::OUT_OF_STOCK
    } else if total_stock < critical_level {
        stock_priority::CRITICAL
    } else {
        stock_priority::WARNING
    };
    let title = if total_stock == 0 {
        "Out of Stock"
    } else {
        "Low Stock Alert"
    };
    let message = if total_stock == 0 {
        format!("{} is out of stock. Immediate reorder required.", medicine.name)
    } else {
        format!(
            "{} is low on stock. Current quantity: {} units.",
            medicine.name, total_stock
        )
    };

    let existing = notification::Entity::find()
        .filter(notification::Column::IsSystemAlert.eq(true))
        .filter(notification::Column::IsActionTaken.eq(false))
        .filter(notification::Column::RelatedEntityId.eq(medicine.id))
        .filter(notification::Column::RelatedEntityType.eq(RelatedEntity::Medicine))
        .filter(notification::Column::NotificationType.eq(NotificationType::StockAlert))
        .one(conn)
        .await?;

    match existing {
        Some(alert) => {
            let mut active: notification::ActiveModel = alert.into();
            active.title = Set(title.to_string());
            active.message = Set(message);
            active.priority = Set(priority);
            // Unread again so the escalation is noticed.
            active.is_read = Set(false);
            let updated = active.update(conn).await.map_err(ServiceError::db_error)?;
            Ok(StockAlertOutcome::Updated(updated))
        }
        None => {
            let created = create_system_alert(
                conn,
                NewSystemAlert {
                    title: title.to_string(),
                    message,
                    notification_type: NotificationType::StockAlert,
                    priority,
                    related_entity_id: medicine.id,
                    related_entity_type: RelatedEntity::Medicine,
                },
            )
            .await?;
            Ok(StockAlertOutcome::Raised(created))
        }
    }
}

/// Emits the broadcast event matching a stock-alert reconciliation
/// outcome. Best-effort, called after the owning transaction commits.
pub async fn emit_stock_alert_event(sender: &EventSender, outcome: &StockAlertOutcome) {
    match outcome {
        StockAlertOutcome::Raised(alert) => {
            sender
                .emit(Event::SystemAlertRaised {
                    notification_id: alert.id,
                    notification_type: alert.notification_type,
                    priority: alert.priority,
                    title: alert.title.clone(),
                })
                .await;
        }
        StockAlertOutcome::Updated(alert) => {
            sender
                .emit(Event::SystemAlertUpdated {
                    notification_id: alert.id,
                    notification_type: alert.notification_type,
                    priority: alert.priority,
                    title: alert.title.clone(),
                })
                .await;
        }
        StockAlertOutcome::Resolved(_) | StockAlertOutcome::Unchanged => {}
    }
}

/// Standalone notification surface: queries, read flags and explicit
/// resolution with its broadcast side effects.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DbPool>,
    cache: Arc<dyn CacheBackend>,
    event_sender: EventSender,
}

impl NotificationService {
    pub fn new(db: Arc<DbPool>, cache: Arc<dyn CacheBackend>, event_sender: EventSender) -> Self {
        Self {
            db,
            cache,
            event_sender,
        }
    }

    /// Notifications visible to one user: their own plus system alerts.
    pub async fn my_notifications(
        &self,
        user_id: i64,
    ) -> Result<Vec<notification::Model>, ServiceError> {
        notification::Entity::find()
            .filter(
                notification::Column::UserId
                    .eq(user_id)
                    .or(notification::Column::IsSystemAlert.eq(true)),
            )
            .order_by_desc(notification::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Unresolved system-wide alerts, most important first.
    pub async fn system_alerts(&self) -> Result<Vec<notification::Model>, ServiceError> {
        notification::Entity::find()
            .filter(notification::Column::IsSystemAlert.eq(true))
            .filter(notification::Column::IsActionTaken.eq(false))
            .order_by_desc(notification::Column::Priority)
            .order_by_desc(notification::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Marks the triggering condition of matching alerts as handled.
    /// Safe to call repeatedly; the second call changes nothing.
    #[instrument(skip(self))]
    pub async fn resolve_action(
        &self,
        related_entity_id: i64,
        related_entity_type: RelatedEntity,
        notification_type: NotificationType,
    ) -> Result<u64, ServiceError> {
        let resolved = resolve_alerts(
            self.db.as_ref(),
            related_entity_id,
            related_entity_type,
            notification_type,
        )
        .await?;

        if resolved > 0 {
            info!(
                related_entity_id,
                %related_entity_type,
                %notification_type,
                resolved,
                "Resolved system alerts"
            );

            if let Err(e) = self.cache.delete(keys::dashboard_alerts()).await {
                warn!("Failed to invalidate alerts cache: {}", e);
            }
            self.event_sender
                .emit(Event::AlertsResolved {
                    related_entity_id,
                    related_entity_type: related_entity_type.to_string(),
                    resolved_count: resolved,
                })
                .await;
        }

        Ok(resolved)
    }

    /// Creates a notification (user-scoped or system-wide) outside any
    /// operation flow, e.g. from administrative tooling.
    pub async fn create_notification(
        &self,
        user_id: Option<i64>,
        is_system_alert: bool,
        alert: NewSystemAlert,
    ) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            user_id: Set(user_id),
            is_system_alert: Set(is_system_alert),
            is_action_taken: Set(false),
            title: Set(alert.title),
            message: Set(alert.message),
            notification_type: Set(alert.notification_type),
            priority: Set(alert.priority),
            is_read: Set(false),
            related_entity_id: Set(Some(alert.related_entity_id)),
            related_entity_type: Set(Some(alert.related_entity_type)),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Marks one notification as read, if visible to this user.
    pub async fn mark_as_read(&self, id: i64, user_id: i64) -> Result<(), ServiceError> {
        let found = notification::Entity::find_by_id(id)
            .filter(
                notification::Column::UserId
                    .eq(user_id)
                    .or(notification::Column::IsSystemAlert.eq(true)),
            )
            .one(self.db.as_ref())
            .await?;

        if let Some(model) = found {
            let mut active: notification::ActiveModel = model.into();
            active.is_read = Set(true);
            active.update(self.db.as_ref()).await?;
        }

        Ok(())
    }

    /// Marks everything visible to this user as read.
    pub async fn mark_all_as_read(&self, user_id: i64) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(
                notification::Column::UserId
                    .eq(user_id)
                    .or(notification::Column::IsSystemAlert.eq(true)),
            )
            .filter(notification::Column::IsRead.eq(false))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    /// Deletes a notification owned by this user. System alerts are kept
    /// as history and cannot be deleted here.
    pub async fn delete_notification(&self, id: i64, user_id: i64) -> Result<(), ServiceError> {
        notification::Entity::delete_many()
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }
}
