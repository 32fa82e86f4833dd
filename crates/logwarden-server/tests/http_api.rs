mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{
    assert_err_envelope, assert_ok_envelope, build_context_without_ingest, build_test_context,
    create_rule, decode_data, error_count_rule, make_log, request_json, request_no_body,
    request_raw, seed_errors,
};
use logwarden_alert::AlertEvaluator;
use logwarden_common::types::{Alert, AlertRule, LogLevel, StoredLog};
use logwarden_server::runtime::Background;
use serde_json::json;

#[tokio::test]
async fn health_should_return_ok_envelope() {
    let ctx = build_test_context().expect("test context should build");
    let (status, body, trace) = request_no_body(&ctx.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["storage_status"], "ok");
    assert_eq!(body["data"]["broker"], "memory");
    assert!(body["data"]["version"].is_string());

    let trace = trace.expect("trace header should be set");
    assert_eq!(body["trace_id"], trace.as_str());
}

#[tokio::test]
async fn caller_trace_id_is_echoed() {
    let ctx = build_test_context().expect("test context should build");
    let req = axum::http::Request::builder()
        .uri("/health")
        .header("X-Trace-Id", "req-42")
        .body(axum::body::Body::empty())
        .expect("request should build");
    let resp = tower::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .expect("request should be handled");
    assert_eq!(
        resp.headers().get("x-trace-id").and_then(|v| v.to_str().ok()),
        Some("req-42")
    );
}

#[tokio::test]
async fn unknown_route_is_404() {
    let ctx = build_test_context().expect("test context should build");
    let (status, _, _) = request_no_body(&ctx.app, "GET", "/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn alert_rule_crud_flow() {
    let ctx = build_test_context().expect("test context should build");
    let id = create_rule(&ctx.app, error_count_rule("api errors", 10.0)).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/alert-rules/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let rule: AlertRule = decode_data(&body);
    assert_eq!(rule.name, "api errors");
    assert_eq!(rule.threshold, 10.0);
    assert!(rule.enabled);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alert-rules").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["limit"], 20);
    assert_eq!(body["data"]["items"][0]["id"], id.as_str());

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/alert-rules/{id}"),
        json!({ "threshold": 25.0, "enabled": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: AlertRule = decode_data(&body);
    assert_eq!(updated.threshold, 25.0);
    assert!(!updated.enabled);
    assert_eq!(updated.name, "api errors");

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/alert-rules?enabled=true").await;
    assert_eq!(body["data"]["total"], 0);
    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/alert-rules?enabled=false").await;
    assert_eq!(body["data"]["total"], 1);

    let (status, body, _) =
        request_no_body(&ctx.app, "DELETE", &format!("/v1/alert-rules/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/alert-rules/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, _, _) =
        request_no_body(&ctx.app, "DELETE", &format!("/v1/alert-rules/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_rules_are_rejected_with_400() {
    let ctx = build_test_context().expect("test context should build");

    let mut blank_name = error_count_rule("x", 1.0);
    blank_name["name"] = json!("  ");
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/alert-rules", blank_name).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let mut unknown_kind = error_count_rule("x", 1.0);
    unknown_kind["condition"] = json!({ "kind": "median" });
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/alert-rules", unknown_kind).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let mut bad_status = error_count_rule("x", 1.0);
    bad_status["condition"] = json!({ "kind": "count", "filter": { "status_min": 42 } });
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/alert-rules", bad_status).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let mut unknown_filter_key = error_count_rule("x", 1.0);
    unknown_filter_key["condition"] = json!({ "kind": "count", "filter": { "host": "a" } });
    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/alert-rules", unknown_filter_key).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = request_raw(&ctx.app, "POST", "/v1/alert-rules", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    // Nothing was stored by the failed attempts.
    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/alert-rules").await;
    assert_eq!(body["data"]["total"], 0);

    let id = create_rule(&ctx.app, error_count_rule("ok", 1.0)).await;
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/alert-rules/{id}"),
        json!({ "condition": { "kind": "ratio", "numerator": { "service": "" } } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (_, body, _) = request_no_body(&ctx.app, "GET", &format!("/v1/alert-rules/{id}")).await;
    assert_eq!(body["data"]["condition"]["kind"], "count");

    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        "/v1/alert-rules/missing",
        json!({ "threshold": 2.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logs_listing_filters_and_paginates() {
    let ctx = build_test_context().expect("test context should build");
    let now = Utc::now();
    seed_errors(&ctx.store, "api", 3, now);
    ctx.store
        .insert_logs(&[
            make_log(now, LogLevel::Info, "api", "ok"),
            make_log(now, LogLevel::Info, "billing", "charged"),
        ])
        .expect("insert should succeed");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 5);

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs?level=ERROR").await;
    assert_eq!(body["data"]["total"], 3);
    let items: Vec<StoredLog> =
        serde_json::from_value(body["data"]["items"].clone()).expect("items should decode");
    assert!(items.iter().all(|l| l.record.level == LogLevel::Error));

    let (_, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/logs?service=billing&limit=10").await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["message"], "charged");

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs?limit=2&offset=1").await;
    assert_eq!(body["data"]["total"], 5);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"]["offset"], 1);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs?level=loud").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn trace_lookup_returns_oldest_first() {
    let ctx = build_test_context().expect("test context should build");
    let now = Utc::now();
    let mut later = make_log(now, LogLevel::Error, "billing", "charge failed");
    later.trace_id = Some("t-1".to_string());
    let mut earlier = make_log(now - Duration::seconds(2), LogLevel::Info, "api", "request in");
    earlier.trace_id = Some("t-1".to_string());
    let mut other = make_log(now, LogLevel::Info, "api", "unrelated");
    other.trace_id = Some("t-2".to_string());
    ctx.store
        .insert_logs(&[later, earlier, other])
        .expect("insert should succeed");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs/trace/t-1").await;
    assert_eq!(status, StatusCode::OK);
    let logs: Vec<StoredLog> = decode_data(&body);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].record.message, "request in");
    assert_eq!(logs[1].record.message, "charge failed");

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs/trace/none").await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn log_stats_default_to_last_hour() {
    let ctx = build_test_context().expect("test context should build");
    let now = Utc::now();
    seed_errors(&ctx.store, "api", 2, now);
    ctx.store
        .insert_logs(&[make_log(
            now - Duration::hours(3),
            LogLevel::Info,
            "api",
            "old",
        )])
        .expect("insert should succeed");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["by_level"]["error"], 2);
    assert_eq!(body["data"]["top_services"][0]["service"], "api");
}

#[tokio::test]
async fn alert_lifecycle_over_http() {
    let ctx = build_test_context().expect("test context should build");
    let rule_id = create_rule(&ctx.app, error_count_rule("api errors", 3.0)).await;
    seed_errors(&ctx.store, "api", 3, Utc::now());

    let evaluator = AlertEvaluator::new(ctx.store.clone());
    let report = evaluator.run_cycle(Utc::now()).await;
    assert_eq!(report.raised, 1);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    let alert_id = body["data"]["items"][0]["id"]
        .as_str()
        .expect("alert id should exist")
        .to_string();
    assert_eq!(body["data"]["items"][0]["rule_id"], rule_id.as_str());
    assert_eq!(body["data"]["items"][0]["severity"], "high");

    let (_, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/alerts?rule_id={rule_id}&severity=HIGH"),
    )
    .await;
    assert_eq!(body["data"]["total"], 1);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "PUT",
        &format!("/v1/alerts/{alert_id}/acknowledge"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let alert: Alert = decode_data(&body);
    assert_eq!(alert.status.as_str(), "acknowledged");
    assert!(alert.acknowledged_at.is_some());

    let (status, body, _) = request_no_body(
        &ctx.app,
        "PUT",
        &format!("/v1/alerts/{alert_id}/acknowledge"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    for _ in 0..2 {
        let (status, body, _) =
            request_no_body(&ctx.app, "PUT", &format!("/v1/alerts/{alert_id}/resolve")).await;
        assert_eq!(status, StatusCode::OK);
        let alert: Alert = decode_data(&body);
        assert_eq!(alert.status.as_str(), "resolved");
        assert!(alert.resolved_at.is_some());
    }

    let (status, body, _) =
        request_no_body(&ctx.app, "PUT", &format!("/v1/alerts/{alert_id}/acknowledge")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts/stats").await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["resolved"], 1);
    assert_eq!(body["data"]["active"], 0);

    let (status, body, _) = request_no_body(&ctx.app, "GET", &format!("/v1/alerts/{alert_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "resolved");
}

#[tokio::test]
async fn alert_lookups_reject_bad_input() {
    let ctx = build_test_context().expect("test context should build");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, _, _) =
        request_no_body(&ctx.app, "PUT", "/v1/alerts/missing/acknowledge").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = request_no_body(&ctx.app, "PUT", "/v1/alerts/missing/resolve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts?status=open").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn malformed_query_strings_get_envelopes() {
    let ctx = build_test_context().expect("test context should build");

    for uri in [
        "/v1/logs?from=yesterday",
        "/v1/logs?offset=-1",
        "/v1/logs/stats?to=soon",
        "/v1/alert-rules?enabled=maybe",
        "/v1/alerts/active?limit=ten",
    ] {
        let (status, body, trace_id) = request_no_body(&ctx.app, "GET", uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_err_envelope(&body, 1001);
        assert_eq!(body["trace_id"].as_str(), trace_id.as_deref(), "{uri}");
    }
}

#[tokio::test]
async fn http_ingest_requires_memory_broker() {
    let ctx = build_context_without_ingest().expect("test context should build");
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/logs",
        json!({ "level": "error", "service": "api", "message": "boom" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1201);
}

#[tokio::test]
async fn http_ingest_validates_records() {
    let ctx = build_test_context().expect("test context should build");

    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/logs", json!([])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/logs",
        json!([{ "level": "info", "service": "api", "message": "" }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/logs",
        json!({ "level": "verbose", "service": "api", "message": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingested_records_reach_storage_in_batches() {
    let ctx = build_test_context().expect("test context should build");
    let background = Background::spawn(ctx.store.clone(), ctx.broker.clone(), &ctx.config);

    let records: Vec<_> = (0..7)
        .map(|i| json!({ "level": "ERROR", "service": "api", "message": format!("fail {i}") }))
        .collect();
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/logs", json!(records)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["accepted"], 7);

    let mut total = 0;
    for _ in 0..100 {
        let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/logs?service=api").await;
        total = body["data"]["total"].as_u64().unwrap_or(0);
        if total == 7 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(total, 7);

    background.stop().await.expect("background should stop cleanly");
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_envelope() {
    let ctx = build_test_context().expect("test context should build");
    let huge = format!(r#"{{"name":"{}"}}"#, "x".repeat(4 * 1024 * 1024));

    let (status, body, trace_id) = request_raw(&ctx.app, "POST", "/v1/alert-rules", &huge).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_err_envelope(&body, 1006);
    assert_eq!(body["trace_id"].as_str(), trace_id.as_deref());

    let (_, rules, _) = request_no_body(&ctx.app, "GET", "/v1/alert-rules").await;
    assert_eq!(rules["data"]["total"], 0);
}
