use crate::condition::{self, ResultShape};
use crate::error::{Result, StorageError};
use crate::{
    AlertQuery, AlertStats, AlertStore, LogQuery, LogSink, LogStats, MessageCount, ServiceCount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logwarden_common::types::{
    Alert, AlertRule, AlertStatus, LogLevel, LogRecord, RuleCondition, StoredLog,
};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    service TEXT NOT NULL,
    message TEXT NOT NULL,
    trace_id TEXT,
    user_id TEXT,
    request_method TEXT,
    request_path TEXT,
    response_status INTEGER,
    response_time_ms INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_time ON logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_level_time ON logs(level, timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_service_time ON logs(service, timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_trace ON logs(trace_id);

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    condition_json TEXT NOT NULL,
    threshold REAL NOT NULL,
    time_window_minutes INTEGER NOT NULL,
    severity TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_enabled ON alert_rules(enabled);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    message TEXT NOT NULL,
    severity TEXT NOT NULL,
    value REAL NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    acknowledged_at INTEGER,
    resolved_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_alerts_rule_status ON alerts(rule_id, status);
CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_active_rule ON alerts(rule_id) WHERE status = 'active';
";

const LOG_COLUMNS: &str = "id, timestamp, level, service, message, trace_id, user_id, \
     request_method, request_path, response_status, response_time_ms, created_at";

const RULE_COLUMNS: &str = "id, name, description, condition_json, threshold, \
     time_window_minutes, severity, enabled, created_at, updated_at";

const ALERT_COLUMNS: &str =
    "id, rule_id, message, severity, value, status, created_at, acknowledged_at, resolved_at";

const TOP_N: i64 = 10;

/// SQLite-backed store for logs, alert rules and alerts.
///
/// A single connection guarded by a mutex; every statement is short, so
/// partition workers, the evaluator and API handlers simply queue on it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Other(format!("create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "Opened log store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, mostly for tests and the memory broker mode.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ping(&self) -> Result<()> {
        self.conn().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ---- logs ----

    /// Insert `records` in one transaction. Returns the number of rows written.
    pub fn insert_logs(&self, records: &[LogRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let created_at = Utc::now().timestamp_millis();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO logs (id, timestamp, level, service, message, trace_id, user_id,
                     request_method, request_path, response_status, response_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    logwarden_common::id::next_id(),
                    record.timestamp.timestamp_millis(),
                    record.level.as_str(),
                    &record.service,
                    &record.message,
                    &record.trace_id,
                    &record.user_id,
                    &record.request_method,
                    &record.request_path,
                    record.response_status,
                    record.response_time_ms,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(count = records.len(), "Inserted log batch");
        Ok(records.len())
    }

    pub fn list_logs(&self, query: &LogQuery) -> Result<Vec<StoredLog>> {
        let mut filter = log_filter(query);
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM logs{} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            filter.sql()
        );
        filter.bind(query.limit as i64);
        filter.bind(query.offset as i64);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter.params().as_slice(), log_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_logs(&self, query: &LogQuery) -> Result<u64> {
        let filter = log_filter(query);
        let sql = format!("SELECT COUNT(*) FROM logs{}", filter.sql());
        let count: i64 =
            self.conn()
                .query_row(&sql, filter.params().as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All records of one trace, oldest first.
    pub fn logs_by_trace(&self, trace_id: &str) -> Result<Vec<StoredLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE trace_id = ?1 ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map([trace_id], log_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn log_stats(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<LogStats> {
        let range = [from.timestamp_millis(), to.timestamp_millis()];
        let conn = self.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM logs WHERE timestamp >= ?1 AND timestamp <= ?2",
            range,
            |row| row.get(0),
        )?;

        let mut by_level: BTreeMap<String, u64> = LogLevel::ALL
            .iter()
            .map(|l| (l.as_str().to_string(), 0))
            .collect();
        {
            let mut stmt = conn.prepare_cached(
                "SELECT level, COUNT(*) FROM logs WHERE timestamp >= ?1 AND timestamp <= ?2
                 GROUP BY level",
            )?;
            let rows = stmt.query_map(range, |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (level, count) = row?;
                by_level.insert(level, count as u64);
            }
        }

        let avg_response_time_ms: Option<f64> = conn.query_row(
            "SELECT AVG(response_time_ms) FROM logs
             WHERE timestamp >= ?1 AND timestamp <= ?2 AND response_time_ms IS NOT NULL",
            range,
            |row| row.get(0),
        )?;

        let top_services = {
            let mut stmt = conn.prepare_cached(
                "SELECT service, COUNT(*) AS c FROM logs WHERE timestamp >= ?1 AND timestamp <= ?2
                 GROUP BY service ORDER BY c DESC, service ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(rusqlite::params![range[0], range[1], TOP_N], |row| {
                Ok(ServiceCount {
                    service: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let top_errors = {
            let mut stmt = conn.prepare_cached(
                "SELECT message, COUNT(*) AS c FROM logs
                 WHERE timestamp >= ?1 AND timestamp <= ?2 AND level IN ('error', 'fatal')
                 GROUP BY message ORDER BY c DESC, message ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(rusqlite::params![range[0], range[1], TOP_N], |row| {
                Ok(MessageCount {
                    message: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(LogStats {
            from,
            to,
            total: total as u64,
            by_level,
            avg_response_time_ms,
            top_services,
            top_errors,
        })
    }

    /// Aggregate value of `condition` over `[start, end]`.
    pub fn aggregate(
        &self,
        condition: &RuleCondition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let compiled =
            condition::compile(condition, start.timestamp_millis(), end.timestamp_millis())?;
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&compiled.sql)?;
        let value = stmt.query_row(rusqlite::params_from_iter(compiled.params.iter()), |row| {
            match compiled.shape {
                ResultShape::Count => Ok(Some(row.get::<_, i64>(0)? as f64)),
                ResultShape::Nullable => row.get::<_, Option<f64>>(0),
                ResultShape::Ratio => {
                    let num: i64 = row.get(0)?;
                    let den: i64 = row.get(1)?;
                    Ok((den > 0).then(|| num as f64 / den as f64))
                }
            }
        })?;
        Ok(value)
    }

    // ---- alert rules ----

    pub fn insert_rule(&self, rule: &AlertRule) -> Result<()> {
        let condition_json = serde_json::to_string(&rule.condition)?;
        self.conn().execute(
            &format!(
                "INSERT INTO alert_rules ({RULE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            rusqlite::params![
                &rule.id,
                &rule.name,
                &rule.description,
                condition_json,
                rule.threshold,
                rule.time_window_minutes,
                rule.severity.as_str(),
                rule.enabled,
                rule.created_at.timestamp_millis(),
                rule.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        let conn = self.conn();
        let rule = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?1"),
                [id],
                rule_from_row,
            )
            .optional()?;
        Ok(rule)
    }

    pub fn list_rules(
        &self,
        enabled: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRule>> {
        let mut filter = WhereClause::default();
        if let Some(enabled) = enabled {
            filter.push("enabled = ?", enabled);
        }
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            filter.sql()
        );
        filter.bind(limit as i64);
        filter.bind(offset as i64);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter.params().as_slice(), rule_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_rules(&self, enabled: Option<bool>) -> Result<u64> {
        let mut filter = WhereClause::default();
        if let Some(enabled) = enabled {
            filter.push("enabled = ?", enabled);
        }
        let sql = format!("SELECT COUNT(*) FROM alert_rules{}", filter.sql());
        let count: i64 =
            self.conn()
                .query_row(&sql, filter.params().as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn enabled_rules(&self) -> Result<Vec<AlertRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules WHERE enabled = 1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], rule_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Overwrite a rule. Returns `false` if no rule has that id.
    pub fn update_rule(&self, rule: &AlertRule) -> Result<bool> {
        let condition_json = serde_json::to_string(&rule.condition)?;
        let changed = self.conn().execute(
            "UPDATE alert_rules SET name = ?2, description = ?3, condition_json = ?4,
                 threshold = ?5, time_window_minutes = ?6, severity = ?7, enabled = ?8,
                 updated_at = ?9
             WHERE id = ?1",
            rusqlite::params![
                &rule.id,
                &rule.name,
                &rule.description,
                condition_json,
                rule.threshold,
                rule.time_window_minutes,
                rule.severity.as_str(),
                rule.enabled,
                rule.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_rule(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM alert_rules WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    // ---- alerts ----

    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let res = self.conn().execute(
            &format!(
                "INSERT INTO alerts ({ALERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            rusqlite::params![
                &alert.id,
                &alert.rule_id,
                &alert.message,
                alert.severity.as_str(),
                alert.value,
                alert.status.as_str(),
                alert.created_at.timestamp_millis(),
                alert.acknowledged_at.map(|t| t.timestamp_millis()),
                alert.resolved_at.map(|t| t.timestamp_millis()),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::ActiveAlertExists {
                rule_id: alert.rule_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.conn();
        let alert = conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                [id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let mut filter = alert_filter(query);
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            filter.sql()
        );
        filter.bind(query.limit as i64);
        filter.bind(query.offset as i64);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter.params().as_slice(), alert_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_alerts(&self, query: &AlertQuery) -> Result<u64> {
        let filter = alert_filter(query);
        let sql = format!("SELECT COUNT(*) FROM alerts{}", filter.sql());
        let count: i64 =
            self.conn()
                .query_row(&sql, filter.params().as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn active_alerts_for_rule(&self, rule_id: &str) -> Result<Vec<Alert>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE rule_id = ?1 AND status = 'active'
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([rule_id], alert_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Move an active alert to acknowledged. Returns `false` if the alert does
    /// not exist or is not active.
    pub fn acknowledge_alert(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE alerts SET status = 'acknowledged', acknowledged_at = ?2
             WHERE id = ?1 AND status = 'active'",
            rusqlite::params![id, at.timestamp_millis()],
        )?;
        Ok(changed > 0)
    }

    /// Resolve an active or acknowledged alert. Resolving an already
    /// resolved alert changes nothing and returns `false`.
    pub fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE alerts SET status = 'resolved', resolved_at = ?2
             WHERE id = ?1 AND status != 'resolved'",
            rusqlite::params![id, at.timestamp_millis()],
        )?;
        Ok(changed > 0)
    }

    pub fn alert_stats(&self) -> Result<AlertStats> {
        let conn = self.conn();
        let mut stats = AlertStats::default();

        {
            let mut stmt = conn.prepare_cached("SELECT status, COUNT(*) FROM alerts GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (status, count) = row?;
                stats.total += count;
                match AlertStatus::from_str(&status) {
                    Ok(AlertStatus::Active) => stats.active = count,
                    Ok(AlertStatus::Acknowledged) => stats.acknowledged = count,
                    Ok(AlertStatus::Resolved) => stats.resolved = count,
                    Err(e) => tracing::warn!(error = %e, "Skipping unknown alert status"),
                }
            }
        }

        let mut stmt =
            conn.prepare_cached("SELECT severity, COUNT(*) FROM alerts GROUP BY severity")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (severity, count) = row?;
            stats.by_severity.insert(severity, count);
        }

        Ok(stats)
    }
}

#[async_trait]
impl LogSink for SqliteStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<()> {
        self.insert_logs(records).map(|_| ())
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        self.enabled_rules()
    }

    async fn query_aggregate(
        &self,
        condition: &RuleCondition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        self.aggregate(condition, start, end)
    }

    async fn list_active_alerts_by_rule(&self, rule_id: &str) -> Result<Vec<Alert>> {
        self.active_alerts_for_rule(rule_id)
    }

    async fn create_alert(&self, alert: &Alert) -> Result<()> {
        self.insert_alert(alert)
    }

    async fn resolve_alert(&self, alert_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.mark_resolved(alert_id, at)
    }
}

/// Dynamic `WHERE` clause with positional parameters.
#[derive(Default)]
struct WhereClause {
    clauses: Vec<&'static str>,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    fn push(&mut self, clause: &'static str, value: impl ToSql + 'static) {
        self.clauses.push(clause);
        self.params.push(Box::new(value));
    }

    /// Bind a parameter for a placeholder outside the clause (LIMIT/OFFSET).
    fn bind(&mut self, value: impl ToSql + 'static) {
        self.params.push(Box::new(value));
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

fn log_filter(query: &LogQuery) -> WhereClause {
    let mut filter = WhereClause::default();
    if let Some(level) = query.level {
        filter.push("level = ?", level.as_str());
    }
    if let Some(service) = &query.service {
        filter.push("service = ?", service.clone());
    }
    if let Some(trace_id) = &query.trace_id {
        filter.push("trace_id = ?", trace_id.clone());
    }
    if let Some(user_id) = &query.user_id {
        filter.push("user_id = ?", user_id.clone());
    }
    if let Some(from) = query.from {
        filter.push("timestamp >= ?", from.timestamp_millis());
    }
    if let Some(to) = query.to {
        filter.push("timestamp <= ?", to.timestamp_millis());
    }
    filter
}

fn alert_filter(query: &AlertQuery) -> WhereClause {
    let mut filter = WhereClause::default();
    if let Some(status) = query.status {
        filter.push("status = ?", status.as_str());
    }
    if let Some(severity) = query.severity {
        filter.push("severity = ?", severity.as_str());
    }
    if let Some(rule_id) = &query.rule_id {
        filter.push("rule_id = ?", rule_id.clone());
    }
    filter
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_text<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<StoredLog> {
    Ok(StoredLog {
        id: row.get(0)?,
        record: LogRecord {
            timestamp: millis(row.get(1)?),
            level: parse_text(2, row.get(2)?)?,
            service: row.get(3)?,
            message: row.get(4)?,
            trace_id: row.get(5)?,
            user_id: row.get(6)?,
            request_method: row.get(7)?,
            request_path: row.get(8)?,
            response_status: row.get(9)?,
            response_time_ms: row.get(10)?,
        },
        created_at: millis(row.get(11)?),
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    let condition_json: String = row.get(3)?;
    let condition = serde_json::from_str(&condition_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(AlertRule {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        condition,
        threshold: row.get(4)?,
        time_window_minutes: row.get(5)?,
        severity: parse_text(6, row.get(6)?)?,
        enabled: row.get(7)?,
        created_at: millis(row.get(8)?),
        updated_at: millis(row.get(9)?),
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let acknowledged_at: Option<i64> = row.get(7)?;
    let resolved_at: Option<i64> = row.get(8)?;
    Ok(Alert {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        message: row.get(2)?,
        severity: parse_text(3, row.get(3)?)?,
        value: row.get(4)?,
        status: parse_text(5, row.get(5)?)?,
        created_at: millis(row.get(6)?),
        acknowledged_at: acknowledged_at.map(millis),
        resolved_at: resolved_at.map(millis),
    })
}
