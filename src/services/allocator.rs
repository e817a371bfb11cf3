//! First-Expiry-First-Out allocation planning.
//!
//! The planner is a pure function over pre-fetched batches so that the
//! dispense preview and the committing dispense share one algorithm;
//! only the commit path mutates state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entities::medicine_batch;

/// One line of an allocation plan: how much to take from which batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAllocation {
    pub batch_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity_allocated: i32,
    /// Units left in the batch after this take.
    pub remaining_after: i32,
}

/// Why a request cannot be satisfied. The "no stock" and "all expired"
/// branches are deliberately distinct even though both allocate nothing:
/// callers present them differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockShortfall {
    /// No eligible batches exist at all.
    NoStock,
    /// Eligible batches exist but every one is past its expiry date.
    /// Secondary date check guarding against stale status fields.
    AllExpired,
    /// Dispensable stock exists but not enough of it. `expired_quantity`
    /// discloses units that are present but excluded.
    Insufficient {
        available: i32,
        requested: i32,
        expired_quantity: i32,
    },
}

impl StockShortfall {
    pub fn message(&self) -> String {
        match self {
            StockShortfall::NoStock => "No stock available for this medicine.".to_string(),
            StockShortfall::AllExpired => {
                "Cannot dispense: All available stock has expired.".to_string()
            }
            StockShortfall::Insufficient {
                available,
                requested,
                expired_quantity,
            } => {
                if *expired_quantity > 0 {
                    format!(
                        "Insufficient non-expired stock. Available: {}, Requested: {}. \
                         Note: {} units have expired and cannot be dispensed.",
                        available, requested, expired_quantity
                    )
                } else {
                    format!(
                        "Insufficient active stock. Available: {}, Requested: {}",
                        available, requested
                    )
                }
            }
        }
    }
}

/// Result of planning an allocation against the current batch set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested_quantity: i32,
    /// Total dispensable (non-expired, eligible) quantity.
    pub total_available: i32,
    /// Greedy FEFO allocation; partial when the request cannot be met.
    pub allocations: Vec<BatchAllocation>,
    pub shortfall: Option<StockShortfall>,
}

impl AllocationPlan {
    pub fn can_dispense(&self) -> bool {
        self.shortfall.is_none()
    }

    pub fn message(&self) -> Option<String> {
        self.shortfall.as_ref().map(StockShortfall::message)
    }
}

/// Plans a FEFO allocation of `requested_quantity` units.
///
/// `batches` must already be filtered to eligibility (active, positive
/// quantity, status neither Expired nor Quarantined); this function adds
/// the by-date expiry check and the ordering.
pub fn plan(
    batches: &[medicine_batch::Model],
    requested_quantity: i32,
    today: NaiveDate,
) -> AllocationPlan {
    if batches.is_empty() {
        return AllocationPlan {
            requested_quantity,
            total_available: 0,
            allocations: Vec::new(),
            shortfall: Some(StockShortfall::NoStock),
        };
    }

    let expired_quantity: i32 = batches
        .iter()
        .filter(|b| b.expiry_date < today)
        .map(|b| b.current_quantity)
        .sum();

    let mut valid: Vec<&medicine_batch::Model> =
        batches.iter().filter(|b| b.expiry_date >= today).collect();

    if valid.is_empty() {
        return AllocationPlan {
            requested_quantity,
            total_available: 0,
            allocations: Vec::new(),
            shortfall: Some(StockShortfall::AllExpired),
        };
    }

    // Earliest expiry first; id as a stable tie-break.
    valid.sort_by_key(|b| (b.expiry_date, b.id));

    let total_available: i32 = valid.iter().map(|b| b.current_quantity).sum();

    let mut allocations = Vec::new();
    let mut remaining = requested_quantity;
    for batch in &valid {
        if remaining <= 0 {
            break;
        }
        let take = batch.current_quantity.min(remaining);
        allocations.push(BatchAllocation {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            expiry_date: batch.expiry_date,
            quantity_allocated: take,
            remaining_after: batch.current_quantity - take,
        });
        remaining -= take;
    }

    let shortfall = if total_available >= requested_quantity {
        None
    } else {
        Some(StockShortfall::Insufficient {
            available: total_available,
            requested: requested_quantity,
            expired_quantity,
        })
    };

    AllocationPlan {
        requested_quantity,
        total_available,
        allocations,
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::medicine_batch::BatchStatus;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(id: i64, expiry: NaiveDate, quantity: i32) -> medicine_batch::Model {
        medicine_batch::Model {
            id,
            medicine_id: 1,
            supplier_id: 1,
            batch_number: format!("B-{:03}", id),
            expiry_date: expiry,
            received_date: date(2024, 1, 1),
            initial_quantity: quantity,
            current_quantity: quantity,
            purchase_price: dec!(1.00),
            selling_price: dec!(1.50),
            status: BatchStatus::Active,
            row_version: 1,
            is_active: true,
            created_at: chrono::Utc::now(),
            created_by: None,
            updated_at: None,
            updated_by: None,
        }
    }

    fn today() -> NaiveDate {
        date(2024, 6, 1)
    }

    #[test]
    fn consumes_earliest_expiry_first() {
        let batches = vec![batch(2, date(2025, 2, 1), 10), batch(1, date(2025, 1, 1), 5)];
        let plan = plan(&batches, 8, today());

        assert!(plan.can_dispense());
        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].batch_id, 1);
        assert_eq!(plan.allocations[0].quantity_allocated, 5);
        assert_eq!(plan.allocations[0].remaining_after, 0);
        assert_eq!(plan.allocations[1].batch_id, 2);
        assert_eq!(plan.allocations[1].quantity_allocated, 3);
        assert_eq!(plan.allocations[1].remaining_after, 7);
    }

    #[test]
    fn allocated_sum_matches_request_when_satisfiable() {
        let batches = vec![
            batch(1, date(2025, 1, 1), 4),
            batch(2, date(2025, 2, 1), 4),
            batch(3, date(2025, 3, 1), 4),
        ];
        let plan = plan(&batches, 11, today());

        assert!(plan.can_dispense());
        let total: i32 = plan.allocations.iter().map(|a| a.quantity_allocated).sum();
        assert_eq!(total, 11);
    }

    #[test]
    fn empty_batch_set_reports_no_stock() {
        let plan = plan(&[], 1, today());
        assert!(!plan.can_dispense());
        assert_eq!(plan.shortfall, Some(StockShortfall::NoStock));
        assert!(plan.message().unwrap().contains("No stock available"));
    }

    #[test]
    fn all_expired_is_distinct_from_no_stock() {
        let batches = vec![batch(1, date(2024, 1, 1), 20)];
        let plan = plan(&batches, 1, today());

        assert!(!plan.can_dispense());
        assert_eq!(plan.shortfall, Some(StockShortfall::AllExpired));
        assert!(plan.message().unwrap().contains("expired"));
        assert!(plan.allocations.is_empty());
    }

    #[test]
    fn expired_units_are_excluded_and_disclosed() {
        let batches = vec![batch(1, date(2024, 1, 1), 50), batch(2, date(2025, 1, 1), 3)];
        let plan = plan(&batches, 10, today());

        assert!(!plan.can_dispense());
        assert_eq!(plan.total_available, 3);
        assert_eq!(
            plan.shortfall,
            Some(StockShortfall::Insufficient {
                available: 3,
                requested: 10,
                expired_quantity: 50,
            })
        );
        let message = plan.message().unwrap();
        assert!(message.contains("50 units have expired"));
    }

    #[test]
    fn insufficient_without_expired_mentions_active_stock_only() {
        let batches = vec![batch(1, date(2025, 1, 1), 3)];
        let plan = plan(&batches, 10, today());

        let message = plan.message().unwrap();
        assert!(message.contains("Insufficient active stock"));
        assert!(!message.contains("expired"));
    }

    #[test]
    fn partial_plan_is_built_even_when_short() {
        // Previews show what could be taken; the commit path refuses.
        let batches = vec![batch(1, date(2025, 1, 1), 3)];
        let plan = plan(&batches, 10, today());

        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].quantity_allocated, 3);
    }

    #[test]
    fn batch_expiring_today_is_still_dispensable() {
        let batches = vec![batch(1, today(), 5)];
        let plan = plan(&batches, 5, today());
        assert!(plan.can_dispense());
    }
}
