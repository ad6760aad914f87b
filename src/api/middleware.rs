//! Admission control and response timing.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::AppState;
use crate::error::PipelineError;
use crate::rate_limit::{Admission, is_exempt};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REMAINING_MINUTE_HEADER: &str = "x-ratelimit-remaining-minute";
pub const REMAINING_HOUR_HEADER: &str = "x-ratelimit-remaining-hour";
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Rate-limit every non-exempt request, keyed by `X-User-ID` or client IP.
pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();

    if is_exempt(request.uri().path()) {
        let mut response = next.run(request).await;
        set_process_time(response.headers_mut(), started);
        return response;
    }

    let key = client_key(&request);
    let remaining = match state.limiter.admit(&key, Instant::now()) {
        Admission::Allowed(remaining) => remaining,
        Admission::Denied { retry_after_secs } => {
            let rejection = PipelineError::AdmissionDenied { retry_after_secs };
            warn!(path = %request.uri().path(), "{rejection}");
            return denied(&rejection.to_string(), retry_after_secs);
        }
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(REMAINING_MINUTE_HEADER, HeaderValue::from(remaining.per_minute));
    headers.insert(REMAINING_HOUR_HEADER, HeaderValue::from(remaining.per_hour));
    set_process_time(headers, started);
    response
}

fn client_key(request: &Request) -> String {
    if let Some(id) = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("user:{id}");
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

fn denied(message: &str, retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": message,
            "retry_after": retry_after_secs,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

fn set_process_time(headers: &mut HeaderMap, started: Instant) {
    let elapsed = format!("{:.6}", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        headers.insert(PROCESS_TIME_HEADER, value);
    }
}
