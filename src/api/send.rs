//! Direct outbound sends that bypass the pipeline, plus delivery status and
//! number lookup through the transport.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use super::messaging::{bad_request, validate_phone};
use crate::error::ChannelError;
use crate::store::Channel;

const NOT_ENABLED: &str = "Twilio service is not enabled. Please configure Twilio credentials.";

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub phone_number: String,
    pub message: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub phone_number: String,
}

pub async fn send_sms(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    direct_send(&state, Channel::Sms, payload).await
}

pub async fn send_whatsapp(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    direct_send(&state, Channel::Whatsapp, payload).await
}

async fn direct_send(
    state: &AppState,
    channel: Channel,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let transport = state.orchestrator.transport();
    if !transport.is_enabled() {
        return bad_request(StatusCode::SERVICE_UNAVAILABLE, NOT_ENABLED.to_string());
    }

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
    if request.message.trim().is_empty() {
        return bad_request(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Message must not be empty".to_string(),
        );
    }

    match transport
        .send(
            &phone_number,
            channel,
            &request.message,
            request.media_url.as_deref(),
        )
        .await
    {
        Ok(receipt) => {
            info!(channel = %channel, parts = receipt.parts(), "Direct message sent");
            let label = match channel {
                Channel::Whatsapp => "WhatsApp message",
                _ => "SMS",
            };
            Json(json!({
                "success": true,
                "message": format!("{label} sent successfully"),
                "details": {
                    "channel": channel,
                    "parts": receipt.parts(),
                    "message_ids": receipt.message_ids,
                },
            }))
            .into_response()
        }
        Err(ChannelError::Disabled { .. }) => {
            bad_request(StatusCode::SERVICE_UNAVAILABLE, NOT_ENABLED.to_string())
        }
        Err(e) => {
            error!(channel = %channel, error = %e, "Direct send failed");
            bad_request(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn message_status(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Response {
    let transport = state.orchestrator.transport();
    if !transport.is_enabled() {
        return bad_request(StatusCode::SERVICE_UNAVAILABLE, NOT_ENABLED.to_string());
    }

    match transport.message_status(&message_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => bad_request(StatusCode::NOT_FOUND, "Message not found".to_string()),
        Err(e) => {
            error!(sid = %message_id, error = %e, "Message status fetch failed");
            bad_request(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

pub async fn validate_phone_number(
    State(state): State<AppState>,
    query: Result<Query<LookupQuery>, QueryRejection>,
) -> Response {
    let transport = state.orchestrator.transport();
    if !transport.is_enabled() {
        return bad_request(StatusCode::SERVICE_UNAVAILABLE, NOT_ENABLED.to_string());
    }

    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return bad_request(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };
    let Some(phone_number) = validate_phone(&query.phone_number) else {
        return bad_request(StatusCode::BAD_REQUEST, "Invalid phone number".to_string());
    };

    match transport.lookup_number(&phone_number).await {
        Ok(lookup) => Json(lookup).into_response(),
        Err(e) => {
            error!(error = %e, "Number lookup failed");
            bad_request(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
