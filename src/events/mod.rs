//! Real-time broadcast boundary, modeled as message passing.
//!
//! Operations enqueue events on a tokio channel after their transaction
//! commits; the [`process_events`] worker drains the channel and forwards
//! to whatever transport is attached (currently structured logs). Tests
//! assert against the channel instead of needing a live transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::{MovementType, NotificationType};

/// Events emitted by stock operations and the notification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A ledger row was written.
    MovementRecorded {
        movement_id: i64,
        medicine_id: i64,
        medicine_name: String,
        batch_number: String,
        movement_type: MovementType,
        quantity: i32,
        performed_by: String,
        performed_at: DateTime<Utc>,
    },
    /// A system-wide alert was created.
    SystemAlertRaised {
        notification_id: i64,
        notification_type: NotificationType,
        priority: i32,
        title: String,
    },
    /// An existing stock alert was updated in place (priority escalation,
    /// refreshed message).
    SystemAlertUpdated {
        notification_id: i64,
        notification_type: NotificationType,
        priority: i32,
        title: String,
    },
    /// One or more alerts for an entity were marked action-taken.
    AlertsResolved {
        related_entity_id: i64,
        related_entity_type: String,
        resolved_count: u64,
    },
    /// Aggregate dashboard statistics are stale for this medicine.
    StatsChanged { medicine_id: i64 },
    /// Summary event from a notification-generation run.
    NotificationsGenerated {
        generator: String,
        created_count: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send. Broadcast failures must never fail the operation
    /// that already committed, so the error is logged and dropped here.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping broadcast event: {}", e);
        }
    }
}

/// Creates a connected sender/receiver pair with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, forwarding each event to the attached
/// transport. Runs until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementRecorded {
                medicine_name,
                batch_number,
                movement_type,
                quantity,
                ..
            } => {
                info!(
                    %medicine_name,
                    %batch_number,
                    %movement_type,
                    quantity,
                    "broadcast: stock movement"
                );
            }
            Event::SystemAlertRaised {
                notification_id,
                notification_type,
                priority,
                title,
            }
            | Event::SystemAlertUpdated {
                notification_id,
                notification_type,
                priority,
                title,
            } => {
                info!(
                    notification_id,
                    %notification_type,
                    priority,
                    %title,
                    "broadcast: system alert"
                );
            }
            Event::AlertsResolved {
                related_entity_id,
                related_entity_type,
                resolved_count,
            } => {
                info!(
                    related_entity_id,
                    %related_entity_type,
                    resolved_count,
                    "broadcast: alerts resolved"
                );
            }
            Event::StatsChanged { medicine_id } => {
                info!(medicine_id, "broadcast: stats update");
            }
            Event::NotificationsGenerated {
                generator,
                created_count,
            } => {
                info!(%generator, created_count, "broadcast: notifications generated");
            }
        }
    }

    info!("Event processing loop stopped");
}
