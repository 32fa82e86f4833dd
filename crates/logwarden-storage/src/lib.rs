//! Persistence for log records, alert rules and alerts.
//!
//! The core components talk to storage through two narrow traits:
//! [`LogSink`] for the batch assembler and [`AlertStore`] for the alert
//! evaluator. [`engine::SqliteStore`] implements both on a single SQLite
//! database and also exposes the richer query surface used by the REST API.

mod condition;
pub mod engine;
pub mod error;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logwarden_common::types::{
    Alert, AlertRule, AlertStatus, LogLevel, LogRecord, RuleCondition, Severity,
};
use std::collections::BTreeMap;

pub use engine::SqliteStore;
pub use error::{Result, StorageError};

/// Write side used by the batch assembler.
///
/// Implementations must be safe to share across partition workers.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist `records` atomically: either all are stored or none are.
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<()>;
}

/// Rule and alert access used by the alert evaluator.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>>;

    /// Aggregate value of `condition` over logs with `start <= timestamp <= end`,
    /// or `None` when the window holds no data for the aggregate.
    async fn query_aggregate(
        &self,
        condition: &RuleCondition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<f64>>;

    async fn list_active_alerts_by_rule(&self, rule_id: &str) -> Result<Vec<Alert>>;

    /// Insert a new alert. Fails with [`StorageError::ActiveAlertExists`] if
    /// the rule already has an active alert.
    async fn create_alert(&self, alert: &Alert) -> Result<()>;

    /// Mark an alert resolved at `at`. Returns `false` when the alert was
    /// already resolved or does not exist.
    async fn resolve_alert(&self, alert_id: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// Filters for listing log records, newest first.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub service: Option<String>,
    pub trace_id: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// Filters for listing alerts, newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub rule_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Record count for a single service.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ServiceCount {
    pub service: String,
    pub count: u64,
}

/// Occurrence count of a distinct error message.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MessageCount {
    pub message: String,
    pub count: u64,
}

/// Log statistics over a time range.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogStats {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: u64,
    pub by_level: BTreeMap<String, u64>,
    pub avg_response_time_ms: Option<f64>,
    pub top_services: Vec<ServiceCount>,
    pub top_errors: Vec<MessageCount>,
}

/// Alert counts by status and severity.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AlertStats {
    pub total: u64,
    pub active: u64,
    pub acknowledged: u64,
    pub resolved: u64,
    pub by_severity: BTreeMap<String, u64>,
}
