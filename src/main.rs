use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use pharmacy_stock_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Cache boundary (in-memory or Redis per config)
    let cache = api::cache::backend_from_config(cfg.cache());

    // Broadcast boundary: event channel + processing loop
    let (event_sender, event_rx) = api::events::channel(1024);
    let event_worker = tokio::spawn(api::events::process_events(event_rx));

    // Services
    let generator =
        api::services::notification_generator::NotificationGeneratorService::new(
            db.clone(),
            event_sender.clone(),
        );
    let scheduler = api::services::scheduler::DailyScheduler::new(
        db.clone(),
        cache.clone(),
        generator,
        cfg.scheduler.clone(),
    );

    info!(environment = %cfg.environment, "pharmacy-stock-api started");

    let scheduler_task = tokio::spawn(scheduler.run());

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");

    scheduler_task.abort();
    drop(event_sender);
    let _ = event_worker.await;

    Ok(())
}
