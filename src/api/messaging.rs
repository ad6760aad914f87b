//! JSON messaging API: `POST /api/v1/message/{channel}`.

use std::sync::LazyLock;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::pipeline::{Delivery, InboundMessage, Reply};
use crate::store::Channel;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone pattern"));

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub phone_number: String,
    pub message: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Strip spaces and dashes, then require an E.164-shaped number.
pub fn validate_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    PHONE_PATTERN.is_match(&cleaned).then_some(cleaned)
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Response {
    let channel: Channel = match channel.parse() {
        Ok(channel) => channel,
        Err(e) => return bad_request(StatusCode::NOT_FOUND, e),
    };
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return bad_request(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };
    let Some(phone_number) = validate_phone(&request.phone_number) else {
        return bad_request(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid phone number format".to_string(),
        );
    };

    // Messaging channels also push the reply out through Twilio.
    let delivery = if channel.is_messaging() {
        Delivery::Push
    } else {
        Delivery::Inline
    };
    let inbound = InboundMessage::new(channel, phone_number, request.message)
        .with_language(request.language)
        .with_delivery(delivery);

    match state.orchestrator.handle(inbound).await {
        Ok(reply) => Json(reply_body(reply)).into_response(),
        Err(e) => {
            error!(channel = %channel, error = %e, "Message handling failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error processing message" })),
            )
                .into_response()
        }
    }
}

fn reply_body(reply: Reply) -> serde_json::Value {
    let response = match reply.web {
        Some(web) => serde_json::to_value(web).unwrap_or_else(|_| json!({ "text": reply.text })),
        None if reply.channel == Channel::Web => {
            json!({ "text": reply.text, "language": reply.language })
        }
        None => json!(reply.text),
    };

    json!({
        "success": true,
        "response": response,
        "language": reply.language,
        "conversation_id": reply.conversation_id,
    })
}

pub(super) fn bad_request(status: StatusCode, detail: String) -> Response {
    (status, Json(json!({ "error": detail }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::api::test_support::{body_string, state};
    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    fn post(channel: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(format!("/api/v1/message/{channel}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_of(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[test]
    fn phone_validation() {
        assert_eq!(validate_phone("+91 98765-43210").as_deref(), Some("+919876543210"));
        assert_eq!(validate_phone("919876543210").as_deref(), Some("919876543210"));
        assert!(validate_phone("+0123").is_none());
        assert!(validate_phone("call me").is_none());
        assert!(validate_phone("+1234567890123456").is_none());
    }

    #[tokio::test]
    async fn sms_message_is_answered() {
        let app = router(state().await);
        let response = app
            .oneshot(post(
                "sms",
                json!({"phone_number": "+919876543210", "message": "help with my bank account"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_of(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "You asked: help with my bank account");
        assert!(body["conversation_id"].is_string());
    }

    #[tokio::test]
    async fn web_message_returns_structured_reply() {
        let app = router(state().await);
        let response = app
            .oneshot(post(
                "web",
                json!({"phone_number": "+919876543210", "message": "school scholarship", "language": "hi"}),
            ))
            .await
            .unwrap();

        let body = json_of(response).await;
        assert_eq!(body["response"]["text"], "You asked: school scholarship");
        assert_eq!(body["response"]["language"], "hi");
        assert_eq!(body["response"]["intent"]["domain"], "general");
    }

    #[tokio::test]
    async fn rejected_web_message_has_no_conversation() {
        let app = router(state().await);
        let response = app
            .oneshot(post(
                "web",
                json!({"phone_number": "+919876543210", "message": "hi"}),
            ))
            .await
            .unwrap();

        let body = json_of(response).await;
        assert_eq!(body["success"], true);
        assert!(body["conversation_id"].is_null());
        assert_eq!(body["response"]["text"], crate::safety::RejectReason::TooShort.user_message());
    }

    #[tokio::test]
    async fn invalid_phone_is_422() {
        let app = router(state().await);
        let response = app
            .oneshot(post(
                "sms",
                json!({"phone_number": "not a phone", "message": "help with my bank account"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_channel_is_404() {
        let app = router(state().await);
        let response = app
            .oneshot(post(
                "fax",
                json!({"phone_number": "+919876543210", "message": "help with my bank account"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
