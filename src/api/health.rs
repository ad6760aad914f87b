//! Liveness, readiness and metrics. Exempt from admission.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "sahaay-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Readiness check: database unavailable");
            false
        }
    };
    let storage = state.audio_dir.is_dir();
    let ready = database && storage;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": ready,
            "checks": {
                "database": database,
                "storage": storage,
                "outbound_transport": state.orchestrator.transport_enabled(),
            },
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "rate_limiter": {
            "tracked_keys": state.limiter.tracked_keys(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_support::{body_string, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    async fn get_json(app: axum::Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, serde_json::from_str(&body_string(response).await).unwrap())
    }

    #[tokio::test]
    async fn ready_checks_store() {
        let (status, body) = get_json(router(state().await), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["checks"]["database"], true);
        assert_eq!(body["checks"]["outbound_transport"], false);
    }

    #[tokio::test]
    async fn metrics_counts_tracked_keys() {
        let app = router(state().await);
        app.clone()
            .oneshot(
                Request::post("/webhooks/sms/status")
                    .header("x-user-id", "metrics-user")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("MessageSid=SM1&MessageStatus=sent"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let (_, body) = get_json(app, "/metrics").await;
        assert_eq!(body["rate_limiter"]["tracked_keys"], 1);
    }
}
