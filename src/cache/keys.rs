//! Centralized cache key generation to avoid magic strings.

const STOCK_CHECK_PREFIX: &str = "stock_check_";
const DASHBOARD_ALERTS_KEY: &str = "dashboard_alerts";
const DAILY_JOB_LAST_RUN_KEY: &str = "daily_job_last_run";

/// Cached stock-check aggregate for one medicine.
pub fn stock_check(medicine_id: i64) -> String {
    format!("{}{}", STOCK_CHECK_PREFIX, medicine_id)
}

/// Cached dashboard alert list, dropped whenever alert state changes.
pub fn dashboard_alerts() -> &'static str {
    DASHBOARD_ALERTS_KEY
}

/// Idempotency marker for the daily notification job.
pub fn daily_job_last_run() -> &'static str {
    DAILY_JOB_LAST_RUN_KEY
}
