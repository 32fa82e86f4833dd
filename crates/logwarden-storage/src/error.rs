use logwarden_common::types::ConditionError;

/// Errors raised by the storage layer. Lookups of missing rows return
/// `Ok(None)` rather than an error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The rule already has an active alert; rejected by the partial unique
    /// index on `alerts(rule_id) WHERE status = 'active'`.
    #[error("Storage: rule {rule_id} already has an active alert")]
    ActiveAlertExists { rule_id: String },

    /// A rule condition failed validation before it could be compiled.
    #[error("Storage: invalid rule condition: {0}")]
    InvalidCondition(#[from] ConditionError),

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (condition_json column).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
