use crate::error::EvalError;
use chrono::{DateTime, Utc};
use logwarden_common::types::{Alert, AlertRule};
use logwarden_storage::{AlertStore, StorageError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The window held no data for the aggregate; nothing changed.
    NoData,
    /// Threshold reached and a new active alert was stored.
    Raised(Alert),
    /// Threshold reached but the rule already has an active alert.
    AlreadyActive,
    /// Below threshold; this many active alerts were resolved.
    Resolved(usize),
    /// Below threshold with nothing to resolve.
    Clear,
}

/// Counters for one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Enabled rules fetched for the cycle.
    pub rules: usize,
    pub raised: usize,
    pub already_active: usize,
    /// Alerts resolved, summed over all rules.
    pub resolved: usize,
    pub no_data: usize,
    /// Rules whose evaluation failed and were skipped.
    pub failed: usize,
    /// The rule list itself could not be loaded; nothing was evaluated.
    pub rules_unavailable: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: &RuleOutcome) {
        match outcome {
            RuleOutcome::NoData => self.no_data += 1,
            RuleOutcome::Raised(_) => self.raised += 1,
            RuleOutcome::AlreadyActive => self.already_active += 1,
            RuleOutcome::Resolved(n) => self.resolved += n,
            RuleOutcome::Clear => {}
        }
    }
}

/// Scores rules against storage aggregates and raises or resolves alerts.
///
/// Evaluation is check-then-act with no compare-and-swap: callers must run
/// at most one evaluator per store. The partial unique index on active
/// alerts backs this up.
#[derive(Clone)]
pub struct AlertEvaluator {
    store: Arc<dyn AlertStore>,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Evaluate every enabled rule once, sequentially. A failing rule is
    /// logged and counted; the rest of the cycle still runs.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let rules = match self.store.list_enabled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load alert rules; skipping cycle");
                return CycleReport {
                    rules_unavailable: true,
                    ..Default::default()
                };
            }
        };

        let mut report = CycleReport {
            rules: rules.len(),
            ..Default::default()
        };
        for rule in &rules {
            match self.evaluate_rule(rule, now).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.failed += 1;
                    error!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        error = %e,
                        "Rule evaluation failed"
                    );
                }
            }
        }

        debug!(
            rules = report.rules,
            raised = report.raised,
            resolved = report.resolved,
            failed = report.failed,
            "Alert evaluation cycle complete"
        );
        report
    }

    /// Evaluate `rule` over `[now - window, now]` and apply the outcome.
    pub async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<RuleOutcome, EvalError> {
        rule.condition.validate()?;

        let start = rule.window_start(now);
        let value = match self.store.query_aggregate(&rule.condition, start, now).await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(RuleOutcome::NoData),
            Err(StorageError::InvalidCondition(e)) => return Err(EvalError::InvalidCondition(e)),
            Err(e) => return Err(EvalError::Query(e)),
        };

        let active = self
            .store
            .list_active_alerts_by_rule(&rule.id)
            .await
            .map_err(EvalError::Query)?;

        if value >= rule.threshold {
            if !active.is_empty() {
                return Ok(RuleOutcome::AlreadyActive);
            }
            let alert = Alert::triggered(rule, value, now);
            return match self.store.create_alert(&alert).await {
                Ok(()) => {
                    info!(
                        rule_id = %rule.id,
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        value,
                        threshold = rule.threshold,
                        "Alert raised"
                    );
                    Ok(RuleOutcome::Raised(alert))
                }
                Err(StorageError::ActiveAlertExists { .. }) => {
                    debug!(rule_id = %rule.id, "Active alert created concurrently");
                    Ok(RuleOutcome::AlreadyActive)
                }
                Err(e) => Err(EvalError::Write(e)),
            };
        }

        if active.is_empty() {
            return Ok(RuleOutcome::Clear);
        }
        let mut resolved = 0;
        for alert in &active {
            match self.store.resolve_alert(&alert.id, now).await {
                Ok(true) => {
                    resolved += 1;
                    info!(rule_id = %rule.id, alert_id = %alert.id, value, "Alert resolved");
                }
                Ok(false) => {}
                Err(e) => warn!(
                    rule_id = %rule.id,
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to resolve alert"
                ),
            }
        }
        Ok(if resolved == 0 {
            RuleOutcome::Clear
        } else {
            RuleOutcome::Resolved(resolved)
        })
    }
}
