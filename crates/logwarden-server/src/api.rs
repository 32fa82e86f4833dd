pub mod alerts;
pub mod logs;
pub mod pagination;
pub mod rules;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use logwarden_storage::StorageError;
use serde::Serialize;
use serde_json::Value;

/// API 统一响应包裹
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 错误码（成功时为 0）
    pub err_code: i32,
    /// 错误信息（成功时为 success）
    pub err_msg: String,
    /// 链路追踪 ID
    pub trace_id: String,
    /// 业务数据（有数据时返回）
    pub data: Option<T>,
}

/// 分页数据结构
#[derive(Serialize)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub fn success_paginated_response<T>(
    trace_id: &str,
    items: Vec<T>,
    total: u64,
    limit: usize,
    offset: usize,
) -> Response
where
    T: Serialize,
{
    success_response(
        StatusCode::OK,
        trace_id,
        PaginatedData {
            items,
            total,
            limit,
            offset,
        },
    )
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "conflict" => 1005,
        "payload_too_large" => 1006,
        "ingest_unavailable" => 1201,
        "internal_error" => 1500,
        "storage_error" => 1501,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub fn bad_request(trace_id: &str, msg: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", msg)
}

pub fn not_found(trace_id: &str, msg: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, trace_id, "not_found", msg)
}

/// Log a storage failure and answer 500 without leaking the cause.
pub fn storage_failure(trace_id: &str, e: &StorageError, what: &str) -> Response {
    tracing::error!(trace_id = %trace_id, error = %e, "{what} failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        "Database error",
    )
}

/// Unwrap a JSON body, turning extractor rejections into 400 envelopes.
pub fn json_body<T>(trace_id: &str, body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|rejection| bad_request(trace_id, &rejection.body_text()))
}

/// Unwrap query parameters, turning extractor rejections into 400 envelopes.
pub fn query_params<T>(
    trace_id: &str,
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, Response> {
    query
        .map(|Query(v)| v)
        .map_err(|rejection| bad_request(trace_id, &rejection.body_text()))
}

/// Parse an optional query parameter with `FromStr`.
pub fn parse_param<T>(trace_id: &str, name: &str, raw: Option<&str>) -> Result<Option<T>, Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| bad_request(trace_id, &format!("invalid {name}: {e}"))),
    }
}

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    /// 服务版本号
    version: String,
    /// 运行时长（秒）
    uptime_secs: i64,
    /// 存储状态
    storage_status: String,
    /// 日志接入方式（memory / kafka）
    broker: String,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    if let Err(e) = state.store.ping() {
        tracing::error!(error = %e, "Health check: storage unreachable");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &trace_id,
            "storage_error",
            "Storage unavailable",
        );
    }
    let broker = match state.config.broker.kind {
        crate::config::BrokerKind::Memory => "memory",
        crate::config::BrokerKind::Kafka => "kafka",
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
            storage_status: "ok".to_string(),
            broker: broker.to_string(),
        },
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/logs", get(logs::list_logs).post(logs::ingest_logs))
        .route("/v1/logs/stats", get(logs::log_stats))
        .route("/v1/logs/trace/{trace_id}", get(logs::logs_by_trace))
        .route(
            "/v1/alert-rules",
            get(rules::list_rules).post(rules::create_rule),
        )
        .route(
            "/v1/alert-rules/{id}",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/v1/alerts", get(alerts::list_alerts))
        .route("/v1/alerts/active", get(alerts::active_alerts))
        .route("/v1/alerts/stats", get(alerts::alert_stats))
        .route("/v1/alerts/{id}", get(alerts::get_alert))
        .route(
            "/v1/alerts/{id}/acknowledge",
            put(alerts::acknowledge_alert),
        )
        .route("/v1/alerts/{id}/resolve", put(alerts::resolve_alert))
}
