use crate::api::pagination::{deserialize_optional_u64, Page};
use crate::api::{
    bad_request, json_body, not_found, query_params, storage_failure,
    success_empty_response, success_paginated_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use logwarden_common::types::{CreateAlertRuleRequest, UpdateAlertRuleRequest};
use serde::Deserialize;

/// 告警规则列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListRulesParams {
    /// 是否启用精确匹配
    enabled: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    offset: Option<u64>,
}

/// 分页查询告警规则，按创建时间倒序。
pub async fn list_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Query<ListRulesParams>, QueryRejection>,
) -> Response {
    let params = match query_params(&trace_id, query) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let limit = Page::limit(params.limit);
    let offset = Page::offset(params.offset);

    let total = match state.store.count_rules(params.enabled) {
        Ok(total) => total,
        Err(e) => return storage_failure(&trace_id, &e, "Count alert rules"),
    };
    match state.store.list_rules(params.enabled, limit, offset) {
        Ok(rules) => success_paginated_response(&trace_id, rules, total, limit, offset),
        Err(e) => storage_failure(&trace_id, &e, "List alert rules"),
    }
}

pub async fn get_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_rule(&id) {
        Ok(Some(rule)) => success_response(StatusCode::OK, &trace_id, rule),
        Ok(None) => not_found(&trace_id, &format!("Alert rule '{id}' not found")),
        Err(e) => storage_failure(&trace_id, &e, "Get alert rule"),
    }
}

/// 创建告警规则。条件在写入前校验，不合法返回 400。
pub async fn create_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Result<Json<CreateAlertRuleRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(&trace_id, body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Err(msg) = req.validate() {
        return bad_request(&trace_id, &msg);
    }

    let rule = req.into_rule(Utc::now());
    match state.store.insert_rule(&rule) {
        Ok(()) => {
            tracing::info!(
                rule_id = %rule.id,
                name = %rule.name,
                condition = %rule.condition,
                threshold = rule.threshold,
                "Alert rule created"
            );
            success_response(StatusCode::CREATED, &trace_id, rule)
        }
        Err(e) => storage_failure(&trace_id, &e, "Create alert rule"),
    }
}

/// 更新告警规则（部分字段）。合并后的规则整体校验。
pub async fn update_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateAlertRuleRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(&trace_id, body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let mut rule = match state.store.get_rule(&id) {
        Ok(Some(rule)) => rule,
        Ok(None) => return not_found(&trace_id, &format!("Alert rule '{id}' not found")),
        Err(e) => return storage_failure(&trace_id, &e, "Get alert rule"),
    };
    if let Err(msg) = req.apply(&mut rule, Utc::now()) {
        return bad_request(&trace_id, &msg);
    }

    match state.store.update_rule(&rule) {
        Ok(true) => {
            tracing::info!(rule_id = %rule.id, "Alert rule updated");
            success_response(StatusCode::OK, &trace_id, rule)
        }
        // Deleted between the read and the write.
        Ok(false) => not_found(&trace_id, &format!("Alert rule '{id}' not found")),
        Err(e) => storage_failure(&trace_id, &e, "Update alert rule"),
    }
}

/// 删除告警规则。已产生的告警保留。
pub async fn delete_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_rule(&id) {
        Ok(true) => {
            tracing::info!(rule_id = %id, "Alert rule deleted");
            success_empty_response(StatusCode::OK, &trace_id, "Alert rule deleted")
        }
        Ok(false) => not_found(&trace_id, &format!("Alert rule '{id}' not found")),
        Err(e) => storage_failure(&trace_id, &e, "Delete alert rule"),
    }
}
