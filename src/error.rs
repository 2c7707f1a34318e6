use thiserror::Error;

/// Main error type for the control plane
#[derive(Error, Debug)]
pub enum AutopilotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Lease coordination errors
    #[error("Lease transaction conflict for strategy {strategy_id} after {attempts} attempts")]
    LeaseConflict { strategy_id: String, attempts: u8 },

    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    // Agent runtime errors
    #[error("Agent run failed: {0}")]
    AgentRun(String),

    #[error("Agent run timed out after {elapsed_secs}s")]
    AgentTimeout { elapsed_secs: u64 },

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Cached-content errors
    #[error("Cache creation failed: {0}")]
    CacheCreation(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AutopilotError
pub type Result<T> = std::result::Result<T, AutopilotError>;

impl AutopilotError {
    /// True for failures the lease transaction retries (serialization
    /// conflicts and lock contention), as opposed to failures that must
    /// surface immediately.
    pub fn is_retryable_conflict(&self) -> bool {
        match self {
            AutopilotError::Database(sqlx::Error::Database(db)) => {
                // 40001 serialization_failure, 40P01 deadlock_detected,
                // 55P03 lock_not_available
                matches!(
                    db.code().as_deref(),
                    Some("40001") | Some("40P01") | Some("55P03")
                )
            }
            _ => false,
        }
    }
}
