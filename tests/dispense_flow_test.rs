mod common;

use assert_matches::assert_matches;

use pharmacy_stock_api::entities::medicine_batch::BatchStatus;
use pharmacy_stock_api::entities::stock_movement::MovementType;
use pharmacy_stock_api::entities::{NotificationType, RelatedEntity};
use pharmacy_stock_api::errors::ServiceError;
use pharmacy_stock_api::services::inventory::DispenseRequest;

use common::*;

#[tokio::test]
async fn dispense_splits_across_batches_fefo() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Amoxicillin", 1).await;
    // Seed the later-expiring batch first to prove ordering is by expiry,
    // not by insertion.
    let late = seed_batch(&ctx.db, medicine.id, "LOT-B", days_from_now(230), 10).await;
    let early = seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(200), 5).await;

    let result = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 8,
                reason: Some("Prescription #1042".to_string()),
            },
            &actor(),
        )
        .await
        .expect("dispense should succeed");

    assert_eq!(result.total_dispensed, 8);
    assert_eq!(result.allocations.len(), 2);
    assert_eq!(result.allocations[0].batch_id, early.id);
    assert_eq!(result.allocations[0].quantity_allocated, 5);
    assert_eq!(result.allocations[1].batch_id, late.id);
    assert_eq!(result.allocations[1].quantity_allocated, 3);

    let early = reload_batch(&ctx.db, early.id).await;
    let late = reload_batch(&ctx.db, late.id).await;
    assert_eq!(early.current_quantity, 0);
    assert_eq!(early.status, BatchStatus::Depleted);
    assert_eq!(late.current_quantity, 7);
    assert_eq!(late.status, BatchStatus::Active);

    // One ledger row per touched batch, each carrying the signed delta.
    let early_movements = movements_for(&ctx.db, early.id).await;
    assert_eq!(early_movements.len(), 1);
    assert_eq!(early_movements[0].movement_type, MovementType::OutDispense);
    assert_eq!(early_movements[0].quantity, -5);

    let late_movements = movements_for(&ctx.db, late.id).await;
    assert_eq!(late_movements.len(), 1);
    assert_eq!(late_movements[0].quantity, -3);
}

#[tokio::test]
async fn dispense_unknown_medicine_is_not_found() {
    let ctx = setup().await;

    let err = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: 999,
                quantity: 1,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn dispense_rejects_non_positive_quantity() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Ibuprofen", 1).await;
    seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(100), 10).await;

    let err = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 0,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn expired_by_date_stock_is_never_dispensed() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Cefalexin", 1).await;
    // Stale status: the date guard must catch it even though the status
    // field still says Active.
    let batch = seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(-5), 40).await;

    let err = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 1,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();

    let ServiceError::InsufficientStock(message) = err else {
        panic!("expected insufficient stock, got {:?}", err);
    };
    assert!(message.contains("expired"), "message: {}", message);

    let batch = reload_batch(&ctx.db, batch.id).await;
    assert_eq!(batch.current_quantity, 40);
    assert!(movements_for(&ctx.db, batch.id).await.is_empty());
}

#[tokio::test]
async fn no_stock_and_all_expired_report_different_conditions() {
    let ctx = setup().await;
    let bare = seed_medicine(&ctx.db, "Naproxen", 1).await;
    let expired_only = seed_medicine(&ctx.db, "Diazepam", 1).await;
    seed_batch(&ctx.db, expired_only.id, "LOT-X", days_from_now(-10), 12).await;

    let service = ctx.inventory();

    let no_stock = service
        .dispense(
            DispenseRequest {
                medicine_id: bare.id,
                quantity: 1,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();
    let all_expired = service
        .dispense(
            DispenseRequest {
                medicine_id: expired_only.id,
                quantity: 1,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();

    let ServiceError::InsufficientStock(no_stock_msg) = no_stock else {
        panic!("unexpected error");
    };
    let ServiceError::InsufficientStock(all_expired_msg) = all_expired else {
        panic!("unexpected error");
    };

    assert!(no_stock_msg.contains("No stock available"));
    assert!(all_expired_msg.contains("expired"));
    assert_ne!(no_stock_msg, all_expired_msg);
}

#[tokio::test]
async fn insufficient_stock_discloses_excluded_expired_units() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Metformin", 1).await;
    seed_batch(&ctx.db, medicine.id, "LOT-OLD", days_from_now(-30), 50).await;
    seed_batch(&ctx.db, medicine.id, "LOT-NEW", days_from_now(90), 3).await;

    let err = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 10,
                reason: None,
            },
            &actor(),
        )
        .await
        .unwrap_err();

    let ServiceError::InsufficientStock(message) = err else {
        panic!("unexpected error");
    };
    assert!(message.contains("Available: 3"), "message: {}", message);
    assert!(message.contains("50 units have expired"), "message: {}", message);
}

#[tokio::test]
async fn preview_does_not_mutate_stock() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Loratadine", 1).await;
    let batch = seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(60), 25).await;

    let preview = ctx
        .inventory()
        .preview_dispense(medicine.id, 10)
        .await
        .expect("preview should succeed");

    assert!(preview.can_dispense);
    assert_eq!(preview.total_available, 25);
    assert_eq!(preview.allocations.len(), 1);
    assert_eq!(preview.allocations[0].quantity_allocated, 10);

    let batch = reload_batch(&ctx.db, batch.id).await;
    assert_eq!(batch.current_quantity, 25);
    assert!(movements_for(&ctx.db, batch.id).await.is_empty());
}

#[tokio::test]
async fn low_stock_alert_escalates_to_out_of_stock() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Insulin", 50).await;
    let batch = seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(300), 60).await;
    let service = ctx.inventory();

    // 60 -> 45: below threshold 50, above half of it.
    service
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 15,
                reason: None,
            },
            &actor(),
        )
        .await
        .expect("first dispense");

    let alerts = open_system_alerts(&ctx.db).await;
    assert_eq!(alerts.len(), 1);
    let first = &alerts[0];
    assert_eq!(first.notification_type, NotificationType::StockAlert);
    assert_eq!(first.related_entity_type, Some(RelatedEntity::Medicine));
    assert_eq!(first.related_entity_id, Some(medicine.id));
    assert_eq!(first.priority, 3);
    assert_eq!(first.title, "Low Stock Alert");

    // 45 -> 0: the same alert escalates instead of duplicating.
    service
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 45,
                reason: None,
            },
            &actor(),
        )
        .await
        .expect("second dispense");

    let alerts = open_system_alerts(&ctx.db).await;
    assert_eq!(alerts.len(), 1);
    let escalated = &alerts[0];
    assert_eq!(escalated.id, first.id);
    assert_eq!(escalated.priority, 5);
    assert_eq!(escalated.title, "Out of Stock");

    let batch = reload_batch(&ctx.db, batch.id).await;
    assert_eq!(batch.current_quantity, 0);
    assert_eq!(batch.status, BatchStatus::Depleted);
}

#[tokio::test]
async fn quarantined_batches_are_excluded_from_allocation() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Warfarin", 1).await;
    seed_batch_with_status(
        &ctx.db,
        medicine.id,
        "LOT-Q",
        days_from_now(100),
        50,
        BatchStatus::Quarantined,
    )
    .await;
    let free = seed_batch(&ctx.db, medicine.id, "LOT-F", days_from_now(200), 5).await;

    let result = ctx
        .inventory()
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 5,
                reason: None,
            },
            &actor(),
        )
        .await
        .expect("dispense from free batch");

    assert_eq!(result.allocations.len(), 1);
    assert_eq!(result.allocations[0].batch_id, free.id);
}

#[tokio::test]
async fn stock_check_reflects_dispense_after_cache_invalidation() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Omeprazole", 1).await;
    seed_batch(&ctx.db, medicine.id, "LOT-A", days_from_now(120), 30).await;
    let service = ctx.inventory();

    let before = service
        .stock_check(medicine.id)
        .await
        .expect("stock check")
        .expect("medicine known");
    assert_eq!(before.total_quantity, 30);

    service
        .dispense(
            DispenseRequest {
                medicine_id: medicine.id,
                quantity: 12,
                reason: None,
            },
            &actor(),
        )
        .await
        .expect("dispense");

    let after = service
        .stock_check(medicine.id)
        .await
        .expect("stock check")
        .expect("medicine known");
    assert_eq!(after.total_quantity, 18);
}
