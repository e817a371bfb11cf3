mod common;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};

use pharmacy_stock_api::entities::medicine_batch::BatchStatus;
use pharmacy_stock_api::entities::{expiry_rule, NotificationType, RelatedEntity};
use pharmacy_stock_api::services::scheduler::DailyScheduler;

use common::*;

async fn seed_rule(
    ctx: &TestContext,
    category_id: Option<i64>,
    warning_days: i32,
    critical_days: i32,
) {
    expiry_rule::ActiveModel {
        category_id: Set(category_id),
        warning_days: Set(warning_days),
        critical_days: Set(critical_days),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        created_by: Set(Some("System".to_string())),
        updated_at: Set(None),
        updated_by: Set(None),
        ..Default::default()
    }
    .insert(ctx.db.as_ref())
    .await
    .expect("seed rule");
}

#[tokio::test]
async fn expiry_generator_classifies_by_default_rule() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Ceftriaxone", 1).await;
    seed_batch(&ctx.db, medicine.id, "LOT-CRIT", days_from_now(5), 10).await;
    seed_batch(&ctx.db, medicine.id, "LOT-WARN", days_from_now(20), 10).await;
    seed_batch(&ctx.db, medicine.id, "LOT-OK", days_from_now(100), 10).await;

    let created = ctx
        .generator()
        .generate_expiry_notifications()
        .await
        .expect("generator run");
    assert_eq!(created, 2);

    let alerts = open_system_alerts(&ctx.db).await;
    assert_eq!(alerts.len(), 2);
    let critical = alerts
        .iter()
        .find(|a| a.notification_type == NotificationType::Critical)
        .expect("critical alert");
    let warning = alerts
        .iter()
        .find(|a| a.notification_type == NotificationType::Warning)
        .expect("warning alert");
    assert_eq!(critical.priority, 5);
    assert_eq!(critical.title, "Critical Expiry Alert");
    assert_eq!(warning.priority, 3);
    assert!(warning.message.contains("expires in"));
}

#[tokio::test]
async fn expiry_generator_is_idempotent_within_a_day() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Gentamicin", 1).await;
    seed_batch(&ctx.db, medicine.id, "LOT-CRIT", days_from_now(3), 10).await;
    let generator = ctx.generator();

    let first = generator
        .generate_expiry_notifications()
        .await
        .expect("first run");
    let second = generator
        .generate_expiry_notifications()
        .await
        .expect("second run");

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert_eq!(all_system_alerts(&ctx.db).await.len(), 1);
}

#[tokio::test]
async fn category_rule_beats_global_rule() {
    let ctx = setup().await;
    seed_rule(&ctx, None, 30, 7).await;
    seed_rule(&ctx, Some(2), 60, 20).await;

    // Same expiry distance, different categories.
    let general = seed_medicine_full(&ctx.db, "Cetirizine", 1, 1, None).await;
    let cold_chain = seed_medicine_full(&ctx.db, "Vaccine-X", 1, 2, None).await;
    seed_batch(&ctx.db, general.id, "LOT-G", days_from_now(15), 10).await;
    seed_batch(&ctx.db, cold_chain.id, "LOT-C", days_from_now(15), 10).await;

    ctx.generator()
        .generate_expiry_notifications()
        .await
        .expect("generator run");

    let alerts = open_system_alerts(&ctx.db).await;
    assert_eq!(alerts.len(), 2);

    // 15 days: Warning under the 30/7 global rule, Critical under the
    // category's 60/20 rule.
    let general_alert = alerts
        .iter()
        .find(|a| a.message.starts_with("Cetirizine"))
        .expect("general alert");
    let cold_alert = alerts
        .iter()
        .find(|a| a.message.starts_with("Vaccine-X"))
        .expect("cold-chain alert");
    assert_eq!(general_alert.notification_type, NotificationType::Warning);
    assert_eq!(cold_alert.notification_type, NotificationType::Critical);
}

#[tokio::test]
async fn expired_batch_generator_tags_disposal_alerts() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Lidocaine", 1).await;
    seed_batch_with_status(
        &ctx.db,
        medicine.id,
        "LOT-E",
        days_from_now(-4),
        12,
        BatchStatus::Expired,
    )
    .await;
    let generator = ctx.generator();

    let created = generator
        .generate_expired_batch_notifications()
        .await
        .expect("generator run");
    assert_eq!(created, 1);

    let alerts = open_system_alerts(&ctx.db).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].related_entity_type,
        Some(RelatedEntity::ExpiredBatch)
    );
    assert!(alerts[0].message.contains("Requires proper disposal"));

    // Second run the same day creates nothing.
    let repeat = generator
        .generate_expired_batch_notifications()
        .await
        .expect("repeat run");
    assert_eq!(repeat, 0);
}

#[tokio::test]
async fn low_stock_generator_prioritizes_by_severity() {
    let ctx = setup().await;
    let low = seed_medicine(&ctx.db, "Amlodipine", 50).await;
    let very_low = seed_medicine(&ctx.db, "Lisinopril", 50).await;
    let healthy = seed_medicine(&ctx.db, "Simvastatin", 50).await;
    seed_batch(&ctx.db, low.id, "LOT-L", days_from_now(200), 40).await;
    seed_batch(&ctx.db, very_low.id, "LOT-V", days_from_now(200), 10).await;
    seed_batch(&ctx.db, healthy.id, "LOT-H", days_from_now(200), 80).await;

    let created = ctx
        .generator()
        .generate_low_stock_notifications()
        .await
        .expect("generator run");
    assert_eq!(created, 2);

    let alerts = open_system_alerts(&ctx.db).await;
    let low_alert = alerts
        .iter()
        .find(|a| a.related_entity_id == Some(low.id))
        .expect("low alert");
    let very_low_alert = alerts
        .iter()
        .find(|a| a.related_entity_id == Some(very_low.id))
        .expect("very low alert");

    // 40/50 is above half the threshold, 10/50 is below it.
    assert_eq!(low_alert.priority, 3);
    assert_eq!(very_low_alert.priority, 4);
    assert!(alerts.iter().all(|a| a.related_entity_id != Some(healthy.id)));
}

#[tokio::test]
async fn inactive_medicines_are_skipped_by_generators() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Retired-Med", 50).await;
    seed_batch(&ctx.db, medicine.id, "LOT-R", days_from_now(5), 5).await;

    // Deactivate after seeding stock.
    let mut active: pharmacy_stock_api::entities::medicine::ActiveModel =
        medicine.into();
    active.is_active = Set(false);
    active.update(ctx.db.as_ref()).await.expect("deactivate");

    let summary = ctx.generator().generate_all().await.expect("generator run");
    assert_eq!(summary.total(), 0);
    assert!(all_system_alerts(&ctx.db).await.is_empty());
}

#[tokio::test]
async fn resolve_action_is_idempotent() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Captopril", 50).await;
    seed_batch(&ctx.db, medicine.id, "LOT-C", days_from_now(200), 10).await;
    ctx.generator()
        .generate_low_stock_notifications()
        .await
        .expect("generator run");

    let notifications = ctx.notifications();
    let first = notifications
        .resolve_action(medicine.id, RelatedEntity::Medicine, NotificationType::StockAlert)
        .await
        .expect("first resolve");
    let second = notifications
        .resolve_action(medicine.id, RelatedEntity::Medicine, NotificationType::StockAlert)
        .await
        .expect("second resolve");

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert!(open_system_alerts(&ctx.db).await.is_empty());
}

#[tokio::test]
async fn daily_scheduler_runs_once_per_day_and_sweeps_statuses() {
    let ctx = setup().await;
    let medicine = seed_medicine(&ctx.db, "Azithromycin", 1).await;
    // Stale Active status on a date-expired batch; the sweep must catch it.
    let batch = seed_batch(&ctx.db, medicine.id, "LOT-S", days_from_now(-1), 10).await;

    let config = pharmacy_stock_api::config::SchedulerConfig {
        hour: 0,
        check_interval_secs: 3600,
    };
    let scheduler = DailyScheduler::new(
        ctx.db.clone(),
        ctx.cache.clone(),
        ctx.generator(),
        config,
    );

    let ran = scheduler.run_if_due().await.expect("first tick");
    assert!(ran);

    let batch = reload_batch(&ctx.db, batch.id).await;
    assert_eq!(batch.status, BatchStatus::Expired);
    // The sweep ran before generation, so the disposal alert exists too.
    assert!(all_system_alerts(&ctx.db)
        .await
        .iter()
        .any(|a| a.related_entity_type == Some(RelatedEntity::ExpiredBatch)));

    // Marker set: the same day does not run twice.
    let ran_again = scheduler.run_if_due().await.expect("second tick");
    assert!(!ran_again);
}
