//! Persistence entities for the batch inventory core.

pub mod expiry_rule;
pub mod medicine;
pub mod medicine_batch;
pub mod notification;
pub mod stock_audit;
pub mod stock_movement;

pub use medicine_batch::BatchStatus;
pub use notification::{NotificationType, RelatedEntity};
pub use stock_movement::MovementType;
