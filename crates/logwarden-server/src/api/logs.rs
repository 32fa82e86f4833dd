use crate::api::pagination::{deserialize_optional_u64, Page};
use crate::api::{
    bad_request, error_response, json_body, parse_param, query_params, storage_failure,
    success_paginated_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use logwarden_common::types::{LogLevel, LogRecord};
use logwarden_storage::LogQuery;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 日志列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListLogsParams {
    /// 日志级别（debug / info / warn / error / fatal，大小写不敏感）
    level: Option<String>,
    /// 服务名精确匹配
    service: Option<String>,
    trace_id: Option<String>,
    user_id: Option<String>,
    /// 时间下界（timestamp >=）
    from: Option<DateTime<Utc>>,
    /// 时间上界（timestamp <=）
    to: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    offset: Option<u64>,
}

/// 分页查询日志，按时间倒序。
pub async fn list_logs(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Query<ListLogsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(&trace_id, query) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let level = match parse_param::<LogLevel>(&trace_id, "level", params.level.as_deref()) {
        Ok(level) => level,
        Err(resp) => return resp,
    };
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return bad_request(&trace_id, "from must not be after to");
        }
    }

    let query = LogQuery {
        level,
        service: params.service,
        trace_id: params.trace_id,
        user_id: params.user_id,
        from: params.from,
        to: params.to,
        limit: Page::limit(params.limit),
        offset: Page::offset(params.offset),
    };

    let total = match state.store.count_logs(&query) {
        Ok(total) => total,
        Err(e) => return storage_failure(&trace_id, &e, "Count logs"),
    };
    match state.store.list_logs(&query) {
        Ok(items) => {
            success_paginated_response(&trace_id, items, total, query.limit, query.offset)
        }
        Err(e) => storage_failure(&trace_id, &e, "List logs"),
    }
}

/// 查询同一 trace 的全部日志，按时间正序。
pub async fn logs_by_trace(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(log_trace_id): Path<String>,
) -> Response {
    match state.store.logs_by_trace(&log_trace_id) {
        Ok(items) => success_response(StatusCode::OK, &trace_id, items),
        Err(e) => storage_failure(&trace_id, &e, "Logs by trace"),
    }
}

/// 日志统计查询参数（默认最近一小时）
#[derive(Debug, Deserialize)]
pub struct LogStatsParams {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

pub async fn log_stats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Query<LogStatsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(&trace_id, query) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or_else(|| to - Duration::hours(1));
    if from > to {
        return bad_request(&trace_id, "from must not be after to");
    }
    match state.store.log_stats(from, to) {
        Ok(stats) => success_response(StatusCode::OK, &trace_id, stats),
        Err(e) => storage_failure(&trace_id, &e, "Log stats"),
    }
}

/// 写入请求：单条日志或日志数组
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Many(Vec<LogRecord>),
    One(LogRecord),
}

impl IngestBody {
    fn into_records(self) -> Vec<LogRecord> {
        match self {
            IngestBody::Many(records) => records,
            IngestBody::One(record) => vec![record],
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    accepted: usize,
}

/// Records of one service land on one partition, keeping their order.
fn partition_for(service: &str, partitions: i32) -> i32 {
    let mut hasher = DefaultHasher::new();
    service.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as i32
}

/// 通过 HTTP 写入日志（仅内存 broker 模式）。记录进入与 Kafka 相同的批量写入流程。
pub async fn ingest_logs(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Response {
    let Some(broker) = state.memory_broker.as_ref() else {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "ingest_unavailable",
            "HTTP ingest requires broker.kind = \"memory\"",
        );
    };
    let records = match json_body(&trace_id, body) {
        Ok(body) => body.into_records(),
        Err(resp) => return resp,
    };
    if records.is_empty() {
        return bad_request(&trace_id, "no log records in request");
    }
    if let Some(pos) = records
        .iter()
        .position(|r| r.service.trim().is_empty() || r.message.is_empty())
    {
        return bad_request(
            &trace_id,
            &format!("record {pos}: service and message are required"),
        );
    }

    let topic = &state.config.broker.topic;
    let partitions = broker.partitions();
    for record in &records {
        let partition = partition_for(&record.service, partitions);
        if let Err(e) = broker.publish_record(topic, partition, record).await {
            tracing::error!(trace_id = %*trace_id, error = %e, "Publish to memory broker failed");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &trace_id,
                "ingest_unavailable",
                "Failed to enqueue log records",
            );
        }
    }

    success_response(
        StatusCode::ACCEPTED,
        &trace_id,
        IngestResponse {
            accepted: records.len(),
        },
    )
}
