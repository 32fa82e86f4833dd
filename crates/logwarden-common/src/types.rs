use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a log record.
///
/// Producers emit upper-case levels (`"ERROR"`). Decoding is case-insensitive
/// and also takes `"warning"`, the same as [`FromStr`](std::str::FromStr).
///
/// # Examples
///
/// ```
/// use logwarden_common::types::LogLevel;
///
/// let level: LogLevel = "ERROR".parse().unwrap();
/// assert_eq!(level, LogLevel::Error);
/// assert_eq!(level.to_string(), "error");
/// assert!(LogLevel::Fatal > LogLevel::Warn);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single structured log event, as carried on the stream (one per message).
///
/// A record without a timestamp is stamped with the decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub service: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
}

impl LogRecord {
    /// Minimal record with only the required fields set.
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            service: service.into(),
            message: message.into(),
            trace_id: None,
            user_id: None,
            request_method: None,
            request_path: None,
            response_status: None,
            response_time_ms: None,
        }
    }
}

/// A persisted log record with its storage identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLog {
    pub id: String,
    #[serde(flatten)]
    pub record: LogRecord,
    pub created_at: DateTime<Utc>,
}

/// Alert severity, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use logwarden_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Numeric log fields a rule can aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    ResponseTimeMs,
    ResponseStatus,
}

impl NumericField {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericField::ResponseTimeMs => "response_time_ms",
            NumericField::ResponseStatus => "response_status",
        }
    }
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunctive record filter used inside a [`RuleCondition`].
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_contains: Option<String>,
}

impl LogFilter {
    pub fn level(level: LogLevel) -> Self {
        Self {
            level: Some(level),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == LogFilter::default()
    }

    fn validate(&self) -> Result<(), ConditionError> {
        for (name, value) in [
            ("service", &self.service),
            ("path_prefix", &self.path_prefix),
            ("message_contains", &self.message_contains),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConditionError::EmptyField(name));
            }
        }
        for status in [self.status_min, self.status_max].into_iter().flatten() {
            if !(100..=599).contains(&status) {
                return Err(ConditionError::InvalidStatus(status));
            }
        }
        if let (Some(min), Some(max)) = (self.status_min, self.status_max) {
            if min > max {
                return Err(ConditionError::InvalidStatusRange { min, max });
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(level) = self.level {
            parts.push(format!("level={level}"));
        }
        if let Some(service) = &self.service {
            parts.push(format!("service={service}"));
        }
        if let Some(min) = self.status_min {
            parts.push(format!("status>={min}"));
        }
        if let Some(max) = self.status_max {
            parts.push(format!("status<={max}"));
        }
        if let Some(prefix) = &self.path_prefix {
            parts.push(format!("path^={prefix}"));
        }
        if let Some(needle) = &self.message_contains {
            parts.push(format!("message~{needle}"));
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Aggregate expression an alert rule evaluates over its trailing window.
///
/// Conditions are data, never SQL: storage compiles them into a
/// parameterized query.
///
/// # Examples
///
/// ```
/// use logwarden_common::types::{LogFilter, LogLevel, RuleCondition};
///
/// let cond: RuleCondition =
///     serde_json::from_str(r#"{"kind":"count","filter":{"level":"error"}}"#).unwrap();
/// assert_eq!(cond, RuleCondition::Count { filter: LogFilter::level(LogLevel::Error) });
/// assert_eq!(cond.to_string(), "count(level=error)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Count {
        #[serde(default)]
        filter: LogFilter,
    },
    Average {
        field: NumericField,
        #[serde(default)]
        filter: LogFilter,
    },
    Max {
        field: NumericField,
        #[serde(default)]
        filter: LogFilter,
    },
    /// matching(numerator) / matching(denominator); no data when the
    /// denominator matches nothing.
    Ratio {
        numerator: LogFilter,
        #[serde(default)]
        denominator: LogFilter,
    },
}

impl RuleCondition {
    pub fn validate(&self) -> Result<(), ConditionError> {
        match self {
            RuleCondition::Count { filter }
            | RuleCondition::Average { filter, .. }
            | RuleCondition::Max { filter, .. } => filter.validate(),
            RuleCondition::Ratio {
                numerator,
                denominator,
            } => {
                numerator.validate()?;
                denominator.validate()
            }
        }
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCondition::Count { filter } => write!(f, "count({filter})"),
            RuleCondition::Average { field, filter } if filter.is_empty() => {
                write!(f, "avg({field})")
            }
            RuleCondition::Average { field, filter } => write!(f, "avg({field} | {filter})"),
            RuleCondition::Max { field, filter } if filter.is_empty() => write!(f, "max({field})"),
            RuleCondition::Max { field, filter } => write!(f, "max({field} | {filter})"),
            RuleCondition::Ratio {
                numerator,
                denominator,
            } => write!(f, "ratio({numerator} / {denominator})"),
        }
    }
}

/// Why a [`RuleCondition`] was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("filter field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("response status {0} is outside 100..=599")]
    InvalidStatus(i32),

    #[error("status_min ({min}) is greater than status_max ({max})")]
    InvalidStatusRange { min: i32, max: i32 },
}

/// A rule scored by the evaluation engine. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: RuleCondition,
    pub threshold: f64,
    /// Trailing window length in minutes.
    pub time_window_minutes: u32,
    pub severity: Severity,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn time_window(&self) -> Duration {
        Duration::minutes(i64::from(self.time_window_minutes))
    }

    /// Start of the trailing window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.time_window()
    }
}

/// Lifecycle state of an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// An alert raised by a rule. Severity is copied from the rule at creation
/// and never re-synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub message: String,
    pub severity: Severity,
    /// Aggregate value that triggered the alert.
    pub value: f64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Build a new active alert for `rule` triggered by `value`.
    pub fn triggered(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::id::next_id(),
            rule_id: rule.id.clone(),
            message: format!(
                "Alert rule '{}' triggered: {} = {:.2} (threshold: {:.2})",
                rule.name, rule.condition, value, rule.threshold
            ),
            severity: rule.severity,
            value,
            status: AlertStatus::Active,
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Request body for creating an alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlertRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: RuleCondition,
    pub threshold: f64,
    pub time_window_minutes: u32,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CreateAlertRuleRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_rule_fields(
            &self.name,
            self.threshold,
            self.time_window_minutes,
            &self.condition,
        )
    }

    pub fn into_rule(self, now: DateTime<Utc>) -> AlertRule {
        AlertRule {
            id: crate::id::next_id(),
            name: self.name,
            description: self.description,
            condition: self.condition,
            threshold: self.threshold,
            time_window_minutes: self.time_window_minutes,
            severity: self.severity,
            enabled: self.enabled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an alert rule; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAlertRuleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub condition: Option<RuleCondition>,
    pub threshold: Option<f64>,
    pub time_window_minutes: Option<u32>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
}

impl UpdateAlertRuleRequest {
    /// Apply onto `rule`, validating the merged result.
    pub fn apply(self, rule: &mut AlertRule, now: DateTime<Utc>) -> Result<(), String> {
        let mut merged = rule.clone();
        if let Some(name) = self.name {
            merged.name = name;
        }
        if let Some(description) = self.description {
            merged.description = description;
        }
        if let Some(condition) = self.condition {
            merged.condition = condition;
        }
        if let Some(threshold) = self.threshold {
            merged.threshold = threshold;
        }
        if let Some(minutes) = self.time_window_minutes {
            merged.time_window_minutes = minutes;
        }
        if let Some(severity) = self.severity {
            merged.severity = severity;
        }
        if let Some(enabled) = self.enabled {
            merged.enabled = enabled;
        }
        validate_rule_fields(
            &merged.name,
            merged.threshold,
            merged.time_window_minutes,
            &merged.condition,
        )?;
        merged.updated_at = now;
        *rule = merged;
        Ok(())
    }
}

fn validate_rule_fields(
    name: &str,
    threshold: f64,
    time_window_minutes: u32,
    condition: &RuleCondition,
) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if !threshold.is_finite() {
        return Err("threshold must be a finite number".to_string());
    }
    if time_window_minutes == 0 {
        return Err("time_window_minutes must be at least 1".to_string());
    }
    condition
        .validate()
        .map_err(|e| format!("invalid condition: {e}"))
}
