use crate::api::pagination::{deserialize_optional_u64, Page};
use crate::api::{
    error_response, not_found, parse_param, query_params, storage_failure,
    success_paginated_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use logwarden_common::types::{AlertStatus, Severity};
use logwarden_storage::AlertQuery;
use serde::Deserialize;

/// 告警列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListAlertsParams {
    /// 状态（active / acknowledged / resolved）
    status: Option<String>,
    /// 级别（low / medium / high / critical）
    severity: Option<String>,
    rule_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    offset: Option<u64>,
}

fn paginated_alerts(state: &AppState, trace_id: &str, query: AlertQuery) -> Response {
    let total = match state.store.count_alerts(&query) {
        Ok(total) => total,
        Err(e) => return storage_failure(trace_id, &e, "Count alerts"),
    };
    match state.store.list_alerts(&query) {
        Ok(items) => success_paginated_response(trace_id, items, total, query.limit, query.offset),
        Err(e) => storage_failure(trace_id, &e, "List alerts"),
    }
}

/// 分页查询告警，按创建时间倒序。
pub async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Query<ListAlertsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(&trace_id, query) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let status = match parse_param::<AlertStatus>(&trace_id, "status", params.status.as_deref()) {
        Ok(status) => status,
        Err(resp) => return resp,
    };
    let severity =
        match parse_param::<Severity>(&trace_id, "severity", params.severity.as_deref()) {
            Ok(severity) => severity,
            Err(resp) => return resp,
        };
    let query = AlertQuery {
        status,
        severity,
        rule_id: params.rule_id,
        limit: Page::limit(params.limit),
        offset: Page::offset(params.offset),
    };
    paginated_alerts(&state, &trace_id, query)
}

/// 活动告警查询参数
#[derive(Debug, Deserialize)]
pub struct ActiveAlertsParams {
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    offset: Option<u64>,
}

pub async fn active_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Query<ActiveAlertsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(&trace_id, query) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let query = AlertQuery {
        status: Some(AlertStatus::Active),
        limit: Page::limit(params.limit),
        offset: Page::offset(params.offset),
        ..Default::default()
    };
    paginated_alerts(&state, &trace_id, query)
}

pub async fn alert_stats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    match state.store.alert_stats() {
        Ok(stats) => success_response(StatusCode::OK, &trace_id, stats),
        Err(e) => storage_failure(&trace_id, &e, "Alert stats"),
    }
}

pub async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_alert(&id) {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => not_found(&trace_id, &format!("Alert '{id}' not found")),
        Err(e) => storage_failure(&trace_id, &e, "Get alert"),
    }
}

/// 确认告警。只有 active 状态的告警可以确认，其他状态返回 409。
pub async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.acknowledge_alert(&id, Utc::now()) {
        Ok(true) => {
            tracing::info!(alert_id = %id, "Alert acknowledged");
            reload_alert(&state, &trace_id, &id)
        }
        Ok(false) => match state.store.get_alert(&id) {
            Ok(Some(alert)) => error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                &format!("Alert '{id}' is {}, only active alerts can be acknowledged", alert.status),
            ),
            Ok(None) => not_found(&trace_id, &format!("Alert '{id}' not found")),
            Err(e) => storage_failure(&trace_id, &e, "Get alert"),
        },
        Err(e) => storage_failure(&trace_id, &e, "Acknowledge alert"),
    }
}

/// 解决告警。对已解决的告警重复调用直接返回当前状态。
pub async fn resolve_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.mark_resolved(&id, Utc::now()) {
        Ok(changed) => {
            if changed {
                tracing::info!(alert_id = %id, "Alert resolved manually");
            }
            reload_alert(&state, &trace_id, &id)
        }
        Err(e) => storage_failure(&trace_id, &e, "Resolve alert"),
    }
}

fn reload_alert(state: &AppState, trace_id: &str, id: &str) -> Response {
    match state.store.get_alert(id) {
        Ok(Some(alert)) => success_response(StatusCode::OK, trace_id, alert),
        Ok(None) => not_found(trace_id, &format!("Alert '{id}' not found")),
        Err(e) => storage_failure(trace_id, &e, "Get alert"),
    }
}
