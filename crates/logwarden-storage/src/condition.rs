//! Compiles a [`RuleCondition`] into a parameterized aggregate query over the
//! `logs` table. Every user-supplied value is bound as a parameter; only
//! fixed column names are ever spliced into the SQL text.

use logwarden_common::types::{ConditionError, LogFilter, NumericField, RuleCondition};
use rusqlite::types::Value;

/// How the single result row of a compiled query maps to an aggregate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResultShape {
    /// `COUNT(*)`; zero is a value, never "no data".
    Count,
    /// `AVG`/`MAX`; NULL means no matching rows.
    Nullable,
    /// Two counts; no data when the denominator is zero.
    Ratio,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub shape: ResultShape,
}

pub(crate) fn column(field: NumericField) -> &'static str {
    match field {
        NumericField::ResponseTimeMs => "response_time_ms",
        NumericField::ResponseStatus => "response_status",
    }
}

/// Compile `condition` for the inclusive window `[start_ms, end_ms]`.
pub(crate) fn compile(
    condition: &RuleCondition,
    start_ms: i64,
    end_ms: i64,
) -> Result<CompiledQuery, ConditionError> {
    condition.validate()?;

    let mut params = Vec::new();
    let compiled = match condition {
        RuleCondition::Count { filter } => {
            params.push(Value::Integer(start_ms));
            params.push(Value::Integer(end_ms));
            let pred = predicate(filter, &mut params);
            CompiledQuery {
                sql: format!(
                    "SELECT COUNT(*) FROM logs WHERE timestamp >= ? AND timestamp <= ? AND {pred}"
                ),
                params,
                shape: ResultShape::Count,
            }
        }
        RuleCondition::Average { field, filter } | RuleCondition::Max { field, filter } => {
            let func = if matches!(condition, RuleCondition::Average { .. }) {
                "AVG"
            } else {
                "MAX"
            };
            let col = column(*field);
            params.push(Value::Integer(start_ms));
            params.push(Value::Integer(end_ms));
            let pred = predicate(filter, &mut params);
            CompiledQuery {
                sql: format!(
                    "SELECT CAST({func}({col}) AS REAL) FROM logs \
                     WHERE timestamp >= ? AND timestamp <= ? AND {col} IS NOT NULL AND {pred}"
                ),
                params,
                shape: ResultShape::Nullable,
            }
        }
        RuleCondition::Ratio {
            numerator,
            denominator,
        } => {
            let num = predicate(numerator, &mut params);
            let den = predicate(denominator, &mut params);
            params.push(Value::Integer(start_ms));
            params.push(Value::Integer(end_ms));
            CompiledQuery {
                sql: format!(
                    "SELECT COUNT(CASE WHEN {num} THEN 1 END), COUNT(CASE WHEN {den} THEN 1 END) \
                     FROM logs WHERE timestamp >= ? AND timestamp <= ?"
                ),
                params,
                shape: ResultShape::Ratio,
            }
        }
    };
    Ok(compiled)
}

/// Render a filter as a boolean SQL expression, appending its parameters in
/// placeholder order. An empty filter renders as `1`.
fn predicate(filter: &LogFilter, params: &mut Vec<Value>) -> String {
    let mut clauses: Vec<&'static str> = Vec::new();

    if let Some(level) = filter.level {
        clauses.push("level = ?");
        params.push(Value::Text(level.as_str().to_string()));
    }
    if let Some(service) = &filter.service {
        clauses.push("service = ?");
        params.push(Value::Text(service.clone()));
    }
    if let Some(min) = filter.status_min {
        clauses.push("response_status >= ?");
        params.push(Value::Integer(i64::from(min)));
    }
    if let Some(max) = filter.status_max {
        clauses.push("response_status <= ?");
        params.push(Value::Integer(i64::from(max)));
    }
    if let Some(prefix) = &filter.path_prefix {
        clauses.push("instr(request_path, ?) = 1");
        params.push(Value::Text(prefix.clone()));
    }
    if let Some(needle) = &filter.message_contains {
        clauses.push("instr(message, ?) > 0");
        params.push(Value::Text(needle.clone()));
    }

    if clauses.is_empty() {
        "1".to_string()
    } else {
        format!("({})", clauses.join(" AND "))
    }
}
