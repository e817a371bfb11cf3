//! Daily maintenance job: batch status sweep followed by notification
//! generation.
//!
//! The scheduler wakes hourly and runs the job at most once per UTC day,
//! after the configured hour. The "already ran today" marker lives at the
//! cache boundary with a TTL longer than the check interval, which also
//! guards against duplicate runs from concurrent instances.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tracing::{error, info, instrument, warn};

use crate::actor::ActorContext;
use crate::cache::{keys, CacheBackend};
use crate::config::SchedulerConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::services::batch_status;
use crate::services::notification_generator::NotificationGeneratorService;

/// Marker TTL: comfortably longer than a day minus the scheduled hour, so
/// the key survives until the next day's run becomes eligible.
const MARKER_TTL: Duration = Duration::from_secs(26 * 60 * 60);

pub struct DailyScheduler {
    db: Arc<DbPool>,
    cache: Arc<dyn CacheBackend>,
    generator: NotificationGeneratorService,
    config: SchedulerConfig,
}

impl DailyScheduler {
    pub fn new(
        db: Arc<DbPool>,
        cache: Arc<dyn CacheBackend>,
        generator: NotificationGeneratorService,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            cache,
            generator,
            config,
        }
    }

    /// Runs the daily tasks if they have not run today and the scheduled
    /// hour has passed. Returns whether the tasks ran.
    #[instrument(skip(self))]
    pub async fn run_if_due(&self) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let today = now.date_naive().to_string();

        match self.cache.get(keys::daily_job_last_run()).await {
            Ok(Some(last_run)) if last_run == today => return Ok(false),
            Ok(_) => {}
            Err(e) => warn!("Daily job marker read failed: {}", e),
        }

        if now.hour() < self.config.hour {
            return Ok(false);
        }

        info!(scheduled_hour = self.config.hour, "Running scheduled daily tasks");
        self.run_tasks().await?;

        if let Err(e) = self
            .cache
            .set(keys::daily_job_last_run(), &today, Some(MARKER_TTL))
            .await
        {
            warn!("Daily job marker write failed: {}", e);
        }

        Ok(true)
    }

    /// The task sequence itself: status sweep first so that the
    /// generators see fresh statuses.
    pub async fn run_tasks(&self) -> Result<(), ServiceError> {
        let actor = ActorContext::system();
        let today = Utc::now().date_naive();

        let sweep = batch_status::update_all_statuses(self.db.as_ref(), &actor, today).await?;
        info!(
            examined = sweep.examined,
            updated = sweep.updated,
            "Completed batch status sweep"
        );

        let summary = self.generator.generate_all().await?;
        info!(created = summary.total(), "Completed notification generation");

        Ok(())
    }

    /// Hourly check loop. Runs until the task is aborted (e.g. on
    /// shutdown).
    pub async fn run(self) {
        info!(
            check_interval_secs = self.config.check_interval_secs,
            "Scheduled background service started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_secs.max(1)));

        loop {
            interval.tick().await;
            if let Err(e) = self.run_if_due().await {
                // Keep the loop alive; the next tick retries.
                error!("Scheduled daily tasks failed: {}", e);
            }
        }
    }
}
