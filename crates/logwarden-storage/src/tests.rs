use crate::engine::SqliteStore;
use crate::error::StorageError;
use crate::{AlertQuery, AlertStore, LogQuery, LogSink};
use chrono::{DateTime, Duration, Utc};
use logwarden_common::types::{
    Alert, AlertRule, AlertStatus, LogFilter, LogLevel, LogRecord, NumericField, RuleCondition,
    Severity,
};
use tempfile::TempDir;

fn setup() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("logwarden.db")).unwrap();
    (dir, store)
}

fn make_log(ts: DateTime<Utc>, level: LogLevel, service: &str) -> LogRecord {
    LogRecord::new(ts, level, service, format!("{level} from {service}"))
}

fn make_request_log(
    ts: DateTime<Utc>,
    service: &str,
    path: &str,
    status: i32,
    latency_ms: i64,
) -> LogRecord {
    let level = if status >= 500 {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    LogRecord {
        request_method: Some("GET".into()),
        request_path: Some(path.into()),
        response_status: Some(status),
        response_time_ms: Some(latency_ms),
        ..LogRecord::new(ts, level, service, format!("GET {path} -> {status}"))
    }
}

fn make_rule(name: &str, condition: RuleCondition, threshold: f64) -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: logwarden_common::id::next_id(),
        name: name.to_string(),
        description: String::new(),
        condition,
        threshold,
        time_window_minutes: 5,
        severity: Severity::High,
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

fn window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::minutes(5), now)
}

#[test]
fn insert_and_list_logs() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let batch = vec![
        make_log(now - Duration::seconds(3), LogLevel::Info, "api"),
        make_log(now - Duration::seconds(2), LogLevel::Error, "api"),
        make_log(now - Duration::seconds(1), LogLevel::Error, "billing"),
    ];
    assert_eq!(store.insert_logs(&batch).unwrap(), 3);

    let all = store
        .list_logs(&LogQuery {
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].record.timestamp >= all[1].record.timestamp);

    let errors = LogQuery {
        level: Some(LogLevel::Error),
        limit: 10,
        ..Default::default()
    };
    assert_eq!(store.list_logs(&errors).unwrap().len(), 2);
    assert_eq!(store.count_logs(&errors).unwrap(), 2);

    let api_errors = LogQuery {
        service: Some("api".into()),
        ..errors
    };
    assert_eq!(store.count_logs(&api_errors).unwrap(), 1);
}

#[test]
fn list_logs_paginates() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let batch: Vec<_> = (0..5)
        .map(|i| make_log(now - Duration::seconds(i), LogLevel::Info, "api"))
        .collect();
    store.insert_logs(&batch).unwrap();

    let page = store
        .list_logs(&LogQuery {
            limit: 2,
            offset: 4,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[test]
fn logs_by_trace_oldest_first() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let mut first = make_log(now - Duration::seconds(5), LogLevel::Info, "gateway");
    first.trace_id = Some("t-1".into());
    let mut second = make_log(now, LogLevel::Error, "payments");
    second.trace_id = Some("t-1".into());
    let other = make_log(now, LogLevel::Info, "gateway");
    store.insert_logs(&[second, other, first]).unwrap();

    let trace = store.logs_by_trace("t-1").unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].record.service, "gateway");
    assert_eq!(trace[1].record.service, "payments");
}

#[test]
fn log_stats_summarizes_range() {
    let (_dir, store) = setup();
    let now = Utc::now();
    store
        .insert_logs(&[
            make_request_log(now, "api", "/a", 200, 100),
            make_request_log(now, "api", "/a", 500, 300),
            make_request_log(now, "billing", "/b", 200, 200),
            make_log(now - Duration::hours(2), LogLevel::Error, "old"),
        ])
        .unwrap();

    let stats = store
        .log_stats(now - Duration::hours(1), now + Duration::seconds(1))
        .unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_level["info"], 2);
    assert_eq!(stats.by_level["error"], 1);
    assert_eq!(stats.by_level["fatal"], 0);
    assert_eq!(stats.avg_response_time_ms, Some(200.0));
    assert_eq!(stats.top_services[0].service, "api");
    assert_eq!(stats.top_services[0].count, 2);
    assert_eq!(stats.top_errors.len(), 1);
    assert_eq!(stats.top_errors[0].message, "GET /a -> 500");
}

#[test]
fn aggregate_count_is_zero_not_none() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let (start, end) = window(now);
    let cond = RuleCondition::Count {
        filter: LogFilter::level(LogLevel::Error),
    };
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), Some(0.0));
}

#[test]
fn aggregate_count_respects_window_and_filter() {
    let (_dir, store) = setup();
    let now = Utc::now();
    store
        .insert_logs(&[
            make_log(now - Duration::minutes(1), LogLevel::Error, "api"),
            make_log(now - Duration::minutes(2), LogLevel::Error, "api"),
            make_log(now - Duration::minutes(2), LogLevel::Info, "api"),
            make_log(now - Duration::minutes(10), LogLevel::Error, "api"),
        ])
        .unwrap();
    let (start, end) = window(now);
    let cond = RuleCondition::Count {
        filter: LogFilter::level(LogLevel::Error),
    };
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), Some(2.0));
}

#[test]
fn aggregate_window_bounds_are_inclusive() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let (start, end) = window(now);
    store
        .insert_logs(&[
            make_log(start, LogLevel::Error, "api"),
            make_log(end, LogLevel::Error, "api"),
        ])
        .unwrap();
    let cond = RuleCondition::Count {
        filter: LogFilter::default(),
    };
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), Some(2.0));
}

#[test]
fn aggregate_average_and_max() {
    let (_dir, store) = setup();
    let now = Utc::now();
    store
        .insert_logs(&[
            make_request_log(now, "api-gateway", "/v1/orders", 200, 1000),
            make_request_log(now, "api-gateway", "/v1/orders", 200, 3000),
            make_request_log(now, "billing", "/v1/pay", 200, 9000),
            make_log(now, LogLevel::Info, "api-gateway"),
        ])
        .unwrap();
    let (start, end) = window(now + Duration::seconds(1));
    let gateway = LogFilter {
        service: Some("api-gateway".into()),
        ..Default::default()
    };

    let avg = RuleCondition::Average {
        field: NumericField::ResponseTimeMs,
        filter: gateway.clone(),
    };
    assert_eq!(store.aggregate(&avg, start, end).unwrap(), Some(2000.0));

    let max = RuleCondition::Max {
        field: NumericField::ResponseTimeMs,
        filter: LogFilter::default(),
    };
    assert_eq!(store.aggregate(&max, start, end).unwrap(), Some(9000.0));

    let none = RuleCondition::Average {
        field: NumericField::ResponseTimeMs,
        filter: LogFilter {
            service: Some("ghost".into()),
            ..Default::default()
        },
    };
    assert_eq!(store.aggregate(&none, start, end).unwrap(), None);
}

#[test]
fn aggregate_ratio_handles_empty_denominator() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let cond = RuleCondition::Ratio {
        numerator: LogFilter {
            status_min: Some(500),
            ..Default::default()
        },
        denominator: LogFilter {
            path_prefix: Some("/v1/".into()),
            ..Default::default()
        },
    };
    let (start, end) = window(now + Duration::seconds(1));
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), None);

    store
        .insert_logs(&[
            make_request_log(now, "api", "/v1/a", 500, 10),
            make_request_log(now, "api", "/v1/b", 200, 10),
            make_request_log(now, "api", "/v1/c", 200, 10),
            make_request_log(now, "api", "/v1/d", 200, 10),
            make_request_log(now, "api", "/health", 200, 10),
        ])
        .unwrap();
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), Some(0.25));
}

#[test]
fn aggregate_message_filter_is_literal() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let mut odd = make_log(now, LogLevel::Error, "api");
    odd.message = "50% of requests failed".into();
    store
        .insert_logs(&[odd, make_log(now, LogLevel::Error, "api")])
        .unwrap();
    let cond = RuleCondition::Count {
        filter: LogFilter {
            message_contains: Some("%".into()),
            ..Default::default()
        },
    };
    let (start, end) = window(now + Duration::seconds(1));
    assert_eq!(store.aggregate(&cond, start, end).unwrap(), Some(1.0));
}

#[test]
fn aggregate_rejects_invalid_condition() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let cond = RuleCondition::Count {
        filter: LogFilter {
            status_min: Some(600),
            ..Default::default()
        },
    };
    let err = store.aggregate(&cond, now, now).unwrap_err();
    assert!(matches!(err, StorageError::InvalidCondition(_)));
}

#[test]
fn rule_crud_round_trip() {
    let (_dir, store) = setup();
    let mut rule = make_rule(
        "High Error Rate",
        RuleCondition::Count {
            filter: LogFilter::level(LogLevel::Error),
        },
        10.0,
    );
    store.insert_rule(&rule).unwrap();

    let loaded = store.get_rule(&rule.id).unwrap().unwrap();
    assert_eq!(loaded.condition, rule.condition);
    assert_eq!(loaded.severity, Severity::High);

    rule.enabled = false;
    rule.threshold = 20.0;
    assert!(store.update_rule(&rule).unwrap());
    assert!(store.enabled_rules().unwrap().is_empty());
    assert_eq!(store.count_rules(Some(false)).unwrap(), 1);
    assert_eq!(store.list_rules(None, 10, 0).unwrap()[0].threshold, 20.0);

    assert!(store.delete_rule(&rule.id).unwrap());
    assert!(!store.delete_rule(&rule.id).unwrap());
    assert!(store.get_rule(&rule.id).unwrap().is_none());
}

#[test]
fn missing_rows_are_reported_without_errors() {
    let (_dir, store) = setup();
    let rule = make_rule(
        "never stored",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    let now = Utc::now();

    assert!(store.get_rule(&rule.id).unwrap().is_none());
    assert!(!store.update_rule(&rule).unwrap());
    assert!(!store.delete_rule(&rule.id).unwrap());
    assert!(store.get_alert("missing").unwrap().is_none());
    assert!(!store.acknowledge_alert("missing", now).unwrap());
}

#[test]
fn second_active_alert_for_rule_is_rejected() {
    let (_dir, store) = setup();
    let rule = make_rule(
        "errors",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    let now = Utc::now();
    let first = Alert::triggered(&rule, 2.0, now);
    let second = Alert::triggered(&rule, 3.0, now);

    store.insert_alert(&first).unwrap();
    let err = store.insert_alert(&second).unwrap_err();
    assert!(matches!(err, StorageError::ActiveAlertExists { .. }));

    // once resolved, a new active alert is allowed
    assert!(store.mark_resolved(&first.id, now).unwrap());
    store.insert_alert(&second).unwrap();
}

#[test]
fn resolve_is_idempotent() {
    let (_dir, store) = setup();
    let rule = make_rule(
        "errors",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    let now = Utc::now();
    let alert = Alert::triggered(&rule, 2.0, now);
    store.insert_alert(&alert).unwrap();

    assert!(store.mark_resolved(&alert.id, now).unwrap());
    let resolved_at = store.get_alert(&alert.id).unwrap().unwrap().resolved_at;

    assert!(!store
        .mark_resolved(&alert.id, now + Duration::minutes(1))
        .unwrap());
    let again = store.get_alert(&alert.id).unwrap().unwrap();
    assert_eq!(again.status, AlertStatus::Resolved);
    assert_eq!(again.resolved_at, resolved_at);

    assert!(!store.mark_resolved("missing", now).unwrap());
}

#[test]
fn acknowledge_only_from_active() {
    let (_dir, store) = setup();
    let rule = make_rule(
        "errors",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    let now = Utc::now();
    let alert = Alert::triggered(&rule, 2.0, now);
    store.insert_alert(&alert).unwrap();

    assert!(store.acknowledge_alert(&alert.id, now).unwrap());
    assert!(!store.acknowledge_alert(&alert.id, now).unwrap());
    let acked = store.get_alert(&alert.id).unwrap().unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());
    assert!(store.active_alerts_for_rule(&rule.id).unwrap().is_empty());

    // acknowledged alerts can still be resolved
    assert!(store.mark_resolved(&alert.id, now).unwrap());
}

#[test]
fn list_alerts_filters_and_stats() {
    let (_dir, store) = setup();
    let now = Utc::now();
    let high = make_rule(
        "high",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    let mut low = make_rule(
        "low",
        RuleCondition::Count {
            filter: LogFilter::default(),
        },
        1.0,
    );
    low.severity = Severity::Low;

    let a = Alert::triggered(&high, 2.0, now - Duration::minutes(2));
    let b = Alert::triggered(&low, 2.0, now - Duration::minutes(1));
    store.insert_alert(&a).unwrap();
    store.mark_resolved(&a.id, now).unwrap();
    store.insert_alert(&b).unwrap();

    let active = store
        .list_alerts(&AlertQuery {
            status: Some(AlertStatus::Active),
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);

    let by_rule = AlertQuery {
        rule_id: Some(high.id.clone()),
        limit: 10,
        ..Default::default()
    };
    assert_eq!(store.count_alerts(&by_rule).unwrap(), 1);

    let stats = store.alert_stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.by_severity["high"], 1);
    assert_eq!(stats.by_severity["low"], 1);
}

#[tokio::test]
async fn trait_surface_delegates_to_store() {
    let (_dir, store) = setup();
    let now = Utc::now();
    store
        .insert_batch(&[make_log(now, LogLevel::Error, "api")])
        .await
        .unwrap();

    let rule = make_rule(
        "errors",
        RuleCondition::Count {
            filter: LogFilter::level(LogLevel::Error),
        },
        1.0,
    );
    store.insert_rule(&rule).unwrap();
    assert_eq!(store.list_enabled_rules().await.unwrap().len(), 1);

    let value = store
        .query_aggregate(&rule.condition, rule.window_start(now), now)
        .await
        .unwrap();
    assert_eq!(value, Some(1.0));

    let alert = Alert::triggered(&rule, 1.0, now);
    store.create_alert(&alert).await.unwrap();
    assert_eq!(
        store.list_active_alerts_by_rule(&rule.id).await.unwrap().len(),
        1
    );
    assert!(store.resolve_alert(&alert.id, now).await.unwrap());
    assert!(store
        .list_active_alerts_by_rule(&rule.id)
        .await
        .unwrap()
        .is_empty());
}

#[test]
fn schema_is_reapplied_idempotently() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("logwarden.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .insert_logs(&[make_log(Utc::now(), LogLevel::Info, "api")])
            .unwrap();
    }
    let reopened = SqliteStore::open(&path).unwrap();
    reopened.ping().unwrap();
    assert_eq!(reopened.count_logs(&LogQuery::default()).unwrap(), 1);
}
