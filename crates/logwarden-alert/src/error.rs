use logwarden_common::types::ConditionError;
use logwarden_storage::StorageError;

/// Why a single rule could not be evaluated. Never fatal to a cycle.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Eval: aggregate query failed: {0}")]
    Query(#[source] StorageError),

    #[error("Eval: invalid rule condition: {0}")]
    InvalidCondition(#[from] ConditionError),

    #[error("Eval: alert write failed: {0}")]
    Write(#[source] StorageError),
}
