#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use logwarden_common::types::{LogLevel, LogRecord};
use logwarden_ingest::MemoryBroker;
use logwarden_server::app;
use logwarden_server::config::ServerConfig;
use logwarden_server::state::AppState;
use logwarden_storage::SqliteStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub broker: Arc<MemoryBroker>,
    pub config: ServerConfig,
    pub state: AppState,
    pub app: axum::Router,
}

pub fn test_config(temp_dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.database.path = temp_dir
        .path()
        .join("logwarden.db")
        .to_string_lossy()
        .to_string();
    config.broker.memory_partitions = 2;
    config.ingest.batch_max_records = 5;
    config.ingest.batch_max_wait_ms = 50;
    config.ingest.retry_backoff_ms = 10;
    config.alert.enabled = false;
    config
}

pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = test_config(&temp_dir);
    let store = Arc::new(SqliteStore::open(&config.database.path())?);
    let broker = Arc::new(MemoryBroker::new(config.broker.memory_partitions));
    let state = AppState::new(store.clone(), Some(broker.clone()), config.clone());
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        store,
        broker,
        config,
        state,
        app,
    })
}

/// Context with no memory broker, as when running against Kafka.
pub fn build_context_without_ingest() -> Result<TestContext> {
    let ctx = build_test_context()?;
    let state = AppState::new(ctx.store.clone(), None, ctx.config.clone());
    let app = app::build_http_app(state.clone());
    Ok(TestContext { state, app, ..ctx })
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json["data"].is_null());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}

pub fn make_log(ts: DateTime<Utc>, level: LogLevel, service: &str, message: &str) -> LogRecord {
    LogRecord::new(ts, level, service, message)
}

/// Store `count` error records for `service`, one second apart ending at `end`.
pub fn seed_errors(store: &SqliteStore, service: &str, count: usize, end: DateTime<Utc>) {
    let records: Vec<LogRecord> = (0..count)
        .map(|i| {
            make_log(
                end - chrono::Duration::seconds(i as i64),
                LogLevel::Error,
                service,
                "upstream timeout",
            )
        })
        .collect();
    store.insert_logs(&records).expect("seed logs should insert");
}

/// JSON body for a count rule on error logs.
pub fn error_count_rule(name: &str, threshold: f64) -> Value {
    serde_json::json!({
        "name": name,
        "description": "too many errors",
        "condition": { "kind": "count", "filter": { "level": "error" } },
        "threshold": threshold,
        "time_window_minutes": 5,
        "severity": "high"
    })
}

pub async fn create_rule(app: &axum::Router, body: Value) -> String {
    let (status, json, _) = request_json(app, "POST", "/v1/alert-rules", body).await;
    assert_eq!(status, StatusCode::CREATED, "create rule failed: {json}");
    json["data"]["id"]
        .as_str()
        .expect("rule id should exist")
        .to_string()
}
