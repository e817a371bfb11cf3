mod common;

use assert_matches::assert_matches;

use pharmacy_stock_api::entities::{NotificationType, RelatedEntity};
use pharmacy_stock_api::errors::ServiceError;
use pharmacy_stock_api::services::expiry_rules::{ExpiryRuleInput, ExpiryRuleService};
use pharmacy_stock_api::services::notifications::NewSystemAlert;

use common::*;

fn rule_input(category_id: Option<i64>, warning: i32, critical: i32) -> ExpiryRuleInput {
    ExpiryRuleInput {
        category_id,
        warning_days: warning,
        critical_days: critical,
        is_active: true,
    }
}

#[tokio::test]
async fn only_one_active_rule_per_scope() {
    let ctx = setup().await;
    let service = ExpiryRuleService::new(ctx.db.clone());

    service
        .create(rule_input(None, 30, 7), &actor())
        .await
        .expect("global rule");
    service
        .create(rule_input(Some(2), 60, 20), &actor())
        .await
        .expect("category rule");

    // A second active rule in either scope is refused.
    let global_dup = service.create(rule_input(None, 45, 10), &actor()).await;
    assert_matches!(global_dup, Err(ServiceError::Conflict(_)));
    let category_dup = service.create(rule_input(Some(2), 45, 10), &actor()).await;
    assert_matches!(category_dup, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn deactivated_rule_frees_its_scope() {
    let ctx = setup().await;
    let service = ExpiryRuleService::new(ctx.db.clone());

    let rule = service
        .create(rule_input(Some(3), 30, 7), &actor())
        .await
        .expect("category rule");
    service
        .deactivate(rule.id, &actor())
        .await
        .expect("deactivate");

    // The scope is free again, and the old row survives as history.
    service
        .create(rule_input(Some(3), 40, 10), &actor())
        .await
        .expect("replacement rule");
    assert_eq!(service.list().await.expect("list").len(), 2);
}

#[tokio::test]
async fn reactivating_into_an_occupied_scope_conflicts() {
    let ctx = setup().await;
    let service = ExpiryRuleService::new(ctx.db.clone());

    let dormant = service
        .create(
            ExpiryRuleInput {
                category_id: Some(4),
                warning_days: 30,
                critical_days: 7,
                is_active: false,
            },
            &actor(),
        )
        .await
        .expect("dormant rule");
    service
        .create(rule_input(Some(4), 60, 20), &actor())
        .await
        .expect("active rule");

    let err = service
        .update(dormant.id, rule_input(Some(4), 30, 7), &actor())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn invalid_thresholds_are_rejected() {
    let ctx = setup().await;
    let service = ExpiryRuleService::new(ctx.db.clone());

    let err = service
        .create(rule_input(None, 0, 0), &actor())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn notification_surface_visibility_and_read_flags() {
    let ctx = setup().await;
    let service = ctx.notifications();

    // A user-scoped message and a system alert.
    let mine = service
        .create_notification(
            Some(7),
            false,
            NewSystemAlert {
                title: "Restock reminder".to_string(),
                message: "Order placed".to_string(),
                notification_type: NotificationType::Info,
                priority: 1,
                related_entity_id: 1,
                related_entity_type: RelatedEntity::Medicine,
            },
        )
        .await
        .expect("user notification");
    let system = service
        .create_notification(
            None,
            true,
            NewSystemAlert {
                title: "Out of Stock".to_string(),
                message: "reorder".to_string(),
                notification_type: NotificationType::StockAlert,
                priority: 5,
                related_entity_id: 1,
                related_entity_type: RelatedEntity::Medicine,
            },
        )
        .await
        .expect("system alert");

    // User 7 sees both; another user only sees the system alert.
    assert_eq!(service.my_notifications(7).await.expect("mine").len(), 2);
    assert_eq!(service.my_notifications(8).await.expect("other").len(), 1);

    service.mark_as_read(mine.id, 7).await.expect("mark read");
    let read = service
        .my_notifications(7)
        .await
        .expect("mine")
        .into_iter()
        .find(|n| n.id == mine.id)
        .expect("still visible");
    assert!(read.is_read);

    let marked = service.mark_all_as_read(7).await.expect("mark all");
    assert_eq!(marked, 1);

    // Own notifications can be deleted; system alerts cannot.
    service
        .delete_notification(mine.id, 7)
        .await
        .expect("delete own");
    service
        .delete_notification(system.id, 7)
        .await
        .expect("delete is a no-op for system alerts");
    let remaining = service.my_notifications(7).await.expect("mine");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, system.id);
}

#[tokio::test]
async fn system_alerts_are_ordered_by_priority_then_recency() {
    let ctx = setup().await;
    let service = ctx.notifications();

    for (title, priority) in [("low", 2), ("high", 5), ("mid", 3)] {
        service
            .create_notification(
                None,
                true,
                NewSystemAlert {
                    title: title.to_string(),
                    message: "alert".to_string(),
                    notification_type: NotificationType::Warning,
                    priority,
                    related_entity_id: priority as i64,
                    related_entity_type: RelatedEntity::Batch,
                },
            )
            .await
            .expect("create alert");
    }

    let alerts = service.system_alerts().await.expect("system alerts");
    let priorities: Vec<i32> = alerts.iter().map(|a| a.priority).collect();
    assert_eq!(priorities, vec![5, 3, 2]);
}
