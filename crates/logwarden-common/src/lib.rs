//! Shared domain types for logwarden: log records, alert rules and their
//! typed conditions, and alerts.

pub mod id;
pub mod types;
