use crate::api::{bad_request, error_response};
use crate::config::LogFormat;
use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

pub const TRACE_HEADER: &str = "X-Trace-Id";

/// Request-scoped trace id, read by handlers for the response envelope.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// Install the global subscriber. `RUST_LOG` refines the default
/// `logwarden=info` directive.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("logwarden=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// 16 hex chars from 8 random bytes.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Accept a caller-supplied id if it is short and printable.
fn incoming_trace_id(req: &Request) -> Option<String> {
    let value = req.headers().get(TRACE_HEADER)?.to_str().ok()?.trim();
    let usable = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    usable.then(|| value.to_string())
}

const MAX_BODY_LOG_BYTES: usize = 200;
const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

fn snippet(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > MAX_BODY_LOG_BYTES => {
            let mut end = MAX_BODY_LOG_BYTES;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

fn unreadable_body(trace_id: &str, oversized: bool) -> Response {
    if oversized {
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            trace_id,
            "payload_too_large",
            &format!("Request body exceeds {MAX_REQUEST_BODY} bytes"),
        )
    } else {
        bad_request(trace_id, "Failed to read request body")
    }
}

/// Assigns a [`TraceId`], logs the request and its outcome, and echoes the
/// id in the `X-Trace-Id` response header.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = incoming_trace_id(&req).unwrap_or_else(generate_trace_id);
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    // Ingest batches can be large; skip their bodies.
    let log_body =
        (method == Method::POST || method == Method::PUT) && !url.starts_with("/v1/logs");
    let start = Instant::now();
    let mut response = if log_body {
        let (parts, body) = req.into_parts();
        let oversized = body.size_hint().lower() > MAX_REQUEST_BODY as u64;
        match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(bytes) => {
                tracing::info!(
                    trace_id = %trace_id,
                    method = %method,
                    path = %url,
                    body = %snippet(&bytes),
                    "--> request"
                );
                next.run(Request::from_parts(parts, Body::from(bytes))).await
            }
            Err(e) => {
                tracing::info!(trace_id = %trace_id, method = %method, path = %url, "--> request");
                tracing::warn!(trace_id = %trace_id, error = %e, "Failed to read request body");
                unreadable_body(&trace_id, oversized)
            }
        }
    } else {
        tracing::info!(trace_id = %trace_id, method = %method, path = %url, "--> request");
        next.run(req).await
    };

    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    } else if response.status().is_client_error() {
        tracing::warn!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response");
    }

    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, val);
    }
    response
}
