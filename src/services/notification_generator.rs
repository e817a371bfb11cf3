//! Scheduled alert generation.
//!
//! Three routines scan the batch store and raise system alerts for
//! approaching expiry, low stock and expired stock awaiting disposal.
//! Each is idempotent per UTC calendar day per (entity, alert type): a
//! rerun on the same day creates nothing new.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::notification::{self, NotificationType, RelatedEntity};
use crate::entities::{medicine, medicine_batch};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::expiry_rules;
use crate::services::inventory::unwrap_txn_err;
use crate::services::notifications::{
    self, stock_priority, NewSystemAlert, STOCK_CRITICAL_PERCENTAGE,
};

/// Counts of alerts created by one full generation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub expiry_alerts: usize,
    pub low_stock_alerts: usize,
    pub expired_batch_alerts: usize,
}

impl GenerationSummary {
    pub fn total(&self) -> usize {
        self.expiry_alerts + self.low_stock_alerts + self.expired_batch_alerts
    }
}

#[derive(Clone)]
pub struct NotificationGeneratorService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl NotificationGeneratorService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Runs the three generators in sequence.
    #[instrument(skip(self))]
    pub async fn generate_all(&self) -> Result<GenerationSummary, ServiceError> {
        info!("Starting automatic notification generation");

        let summary = GenerationSummary {
            expiry_alerts: self.generate_expiry_notifications().await?,
            low_stock_alerts: self.generate_low_stock_notifications().await?,
            expired_batch_alerts: self.generate_expired_batch_notifications().await?,
        };

        info!(
            expiry = summary.expiry_alerts,
            low_stock = summary.low_stock_alerts,
            expired = summary.expired_batch_alerts,
            "Completed automatic notification generation"
        );

        Ok(summary)
    }

    /// Raises Warning/Critical alerts for stocked batches approaching
    /// their expiry date, per the resolved category rule.
    #[instrument(skip(self))]
    pub async fn generate_expiry_notifications(&self) -> Result<usize, ServiceError> {
        let created = self
            .db
            .transaction::<_, Vec<notification::Model>, ServiceError>(|txn| {
                Box::pin(async move {
                    let today = Utc::now().date_naive();
                    let batches = medicine_batch::Entity::find()
                        .find_also_related(medicine::Entity)
                        .filter(medicine_batch::Column::IsActive.eq(true))
                        .filter(medicine_batch::Column::CurrentQuantity.gt(0))
                        .all(txn)
                        .await?;
                    let rules = expiry_rules::active_rules(txn).await?;

                    let mut created = Vec::new();
                    for (batch, medicine) in batches {
                        let Some(medicine) = medicine else { continue };
                        if !medicine.is_active {
                            continue;
                        }

                        let rule = expiry_rules::resolve(&rules, medicine.category_id);
                        let days_until_expiry = (batch.expiry_date - today).num_days();

                        // Already-expired batches are the disposal
                        // generator's concern.
                        let severity = if days_until_expiry > 0
                            && days_until_expiry <= rule.critical_days as i64
                        {
                            Some((NotificationType::Critical, 5, "Critical Expiry Alert"))
                        } else if days_until_expiry > rule.critical_days as i64
                            && days_until_expiry <= rule.warning_days as i64
                        {
                            Some((NotificationType::Warning, 3, "Expiry Warning"))
                        } else {
                            None
                        };

                        let Some((notification_type, priority, title)) = severity else {
                            continue;
                        };

                        let duplicate = notifications::same_day_alert_exists(
                            txn,
                            batch.id,
                            RelatedEntity::Batch,
                            Some(notification_type),
                        )
                        .await?;
                        if duplicate {
                            continue;
                        }

                        let alert = notifications::create_system_alert(
                            txn,
                            NewSystemAlert {
                                title: title.to_string(),
                                message: format!(
                                    "{} (Batch {}) expires in {} days. Quantity: {} units.",
                                    medicine.name,
                                    batch.batch_number,
                                    days_until_expiry,
                                    batch.current_quantity
                                ),
                                notification_type,
                                priority,
                                related_entity_id: batch.id,
                                related_entity_type: RelatedEntity::Batch,
                            },
                        )
                        .await?;
                        created.push(alert);
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.finish_run("expiry", created.len()).await;
        Ok(created.len())
    }

    /// Raises stock alerts for medicines whose aggregate active stock is
    /// below their threshold.
    #[instrument(skip(self))]
    pub async fn generate_low_stock_notifications(&self) -> Result<usize, ServiceError> {
        let created = self
            .db
            .transaction::<_, Vec<notification::Model>, ServiceError>(|txn| {
                Box::pin(async move {
                    let batches = medicine_batch::Entity::find()
                        .find_also_related(medicine::Entity)
                        .filter(medicine_batch::Column::IsActive.eq(true))
                        .filter(medicine_batch::Column::CurrentQuantity.gt(0))
                        .all(txn)
                        .await?;

                    let mut totals: HashMap<i64, (i32, medicine::Model)> = HashMap::new();
                    for (batch, medicine) in batches {
                        let Some(medicine) = medicine else { continue };
                        if !medicine.is_active {
                            continue;
                        }
                        totals
                            .entry(medicine.id)
                            .and_modify(|(total, _)| *total += batch.current_quantity)
                            .or_insert((batch.current_quantity, medicine));
                    }

                    let mut created = Vec::new();
                    for (total, medicine) in totals.into_values() {
                        if total >= medicine.low_stock_threshold {
                            continue;
                        }

                        let duplicate = notifications::same_day_alert_exists(
                            txn,
                            medicine.id,
                            RelatedEntity::Medicine,
                            Some(NotificationType::StockAlert),
                        )
                        .await?;
                        if duplicate {
                            continue;
                        }

                        let critical_level = (medicine.low_stock_threshold as f64
                            * STOCK_CRITICAL_PERCENTAGE)
                            as i32;
                        let priority = if total == 0 {
                            stock_priority::OUT_OF_STOCK
                        } else if total < critical_level {
                            stock_priority::CRITICAL
                        } else {
                            stock_priority::WARNING
                        };
                        let title = if total == 0 {
                            "Out of Stock"
                        } else {
                            "Low Stock Alert"
                        };
                        let message = if total == 0 {
                            format!(
                                "{} is out of stock. Immediate reorder required.",
                                medicine.name
                            )
                        } else {
                            format!(
                                "{} is low on stock. Current quantity: {} units.",
                                medicine.name, total
                            )
                        };

                        let alert = notifications::create_system_alert(
                            txn,
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
                        created.push(alert);
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.finish_run("low_stock", created.len()).await;
        Ok(created.len())
    }

    /// Raises disposal-required alerts for stocked batches whose expiry
    /// date has passed.
    #[instrument(skip(self))]
    pub async fn generate_expired_batch_notifications(&self) -> Result<usize, ServiceError> {
        let created = self
            .db
            .transaction::<_, Vec<notification::Model>, ServiceError>(|txn| {
                Box::pin(async move {
                    let today = Utc::now().date_naive();
                    let batches = medicine_batch::Entity::find()
                        .find_also_related(medicine::Entity)
                        .filter(medicine_batch::Column::IsActive.eq(true))
                        .filter(medicine_batch::Column::CurrentQuantity.gt(0))
                        .filter(medicine_batch::Column::ExpiryDate.lt(today))
                        .all(txn)
                        .await?;

                    let mut created = Vec::new();
                    for (batch, medicine) in batches {
                        let Some(medicine) = medicine else { continue };
                        if !medicine.is_active {
                            continue;
                        }

                        // One disposal alert per batch per day regardless
                        // of severity, hence no type in the check.
                        let duplicate = notifications::same_day_alert_exists(
                            txn,
                            batch.id,
                            RelatedEntity::ExpiredBatch,
                            None,
                        )
                        .await?;
                        if duplicate {
                            continue;
                        }

                        let days_expired = (today - batch.expiry_date).num_days();
                        let alert = notifications::create_system_alert(
                            txn,
                            NewSystemAlert {
                                title: "Expired Stock - Disposal Required".to_string(),
                                message: format!(
                                    "{} (Batch {}) expired {} days ago. Quantity: {} units. \
                                     Requires proper disposal.",
                                    medicine.name,
                                    batch.batch_number,
                                    days_expired,
                                    batch.current_quantity
                                ),
                                notification_type: NotificationType::Critical,
                                priority: 5,
                                related_entity_id: batch.id,
                                related_entity_type: RelatedEntity::ExpiredBatch,
                            },
                        )
                        .await?;
                        created.push(alert);
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.finish_run("expired_batch", created.len()).await;
        Ok(created.len())
    }

    async fn finish_run(&self, generator: &str, created_count: usize) {
        if created_count > 0 {
            info!(generator, created_count, "Created system alerts");
            self.event_sender
                .emit(Event::NotificationsGenerated {
                    generator: generator.to_string(),
                    created_count,
                })
                .await;
        } else {
            info!(generator, "No new alerts to create");
        }
    }
}
