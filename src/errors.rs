use sea_orm::error::DbErr;
use thiserror::Error;

/// Central error type for all service operations.
///
/// Persistence-layer failures are translated into this taxonomy at the
/// operation boundary; raw `DbErr` values never cross a service API other
/// than wrapped in `DatabaseError`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Optimistic-concurrency failure on a batch row. The caller may
    /// re-read state and retry.
    #[error("Concurrent modification of batch {0}")]
    ConcurrentModification(i64),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Helper used in closures where `?` cannot rely on `From`.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Whether the caller can expect a retry (after re-reading state) to
    /// succeed. Concurrency conflicts are retryable; not-found and
    /// validation failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ConcurrentModification(_) | ServiceError::Conflict(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}
