//! Twilio webhooks for inbound SMS and WhatsApp plus delivery status callbacks.

use axum::{
    Form, Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::channels::twiml::{self, Twiml};
use crate::conversation::fingerprint_prefix;
use crate::pipeline::{InboundMessage, apology};
use crate::store::Channel;

const EMPTY_WHATSAPP_BODY: &str = "Hello";

/// Fields Twilio posts for an inbound message.
#[derive(Debug, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,
}

impl TwilioInbound {
    fn media_count(&self) -> u32 {
        self.num_media
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct TwilioStatus {
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
    #[serde(rename = "MessageStatus")]
    pub message_status: String,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<String>,
}

pub async fn sms_incoming(
    State(state): State<AppState>,
    Form(form): Form<TwilioInbound>,
) -> Response {
    let text = form.body.clone();
    handle_inbound(&state, Channel::Sms, &form, text).await
}

pub async fn whatsapp_incoming(
    State(state): State<AppState>,
    Form(form): Form<TwilioInbound>,
) -> Response {
    let mut text = form.body.trim().to_string();
    if form.media_count() > 0 {
        if let Some(url) = form.media_url.as_deref() {
            info!(media = form.media_count(), "WhatsApp message includes media");
            text = format!("[User sent media: {url}] {text}");
        }
    }
    if text.trim().is_empty() {
        text = EMPTY_WHATSAPP_BODY.to_string();
    }
    handle_inbound(&state, Channel::Whatsapp, &form, text).await
}

async fn handle_inbound(
    state: &AppState,
    channel: Channel,
    form: &TwilioInbound,
    text: String,
) -> Response {
    let phone = form.from.trim().trim_start_matches("whatsapp:").to_string();
    info!(
        channel = %channel,
        sid = form.message_sid.as_deref().unwrap_or("-"),
        "Inbound webhook received"
    );

    let inbound = InboundMessage::new(channel, phone, text);
    let body = match state.orchestrator.handle(inbound).await {
        Ok(reply) => reply.text,
        Err(e) => {
            let fingerprint = state.orchestrator.fingerprint(&form.from);
            error!(
                channel = %channel,
                fingerprint = fingerprint_prefix(&fingerprint),
                error = %e,
                "Webhook message handling failed"
            );
            apology(channel).to_string()
        }
    };

    twiml_response(Twiml::new().message(&body).build())
}

pub async fn status_callback(
    Path(channel): Path<String>,
    Form(status): Form<TwilioStatus>,
) -> impl IntoResponse {
    info!(
        channel = %channel,
        sid = %status.message_sid,
        status = %status.message_status,
        "Delivery status update"
    );
    if let Some(code) = status.error_code.as_deref().filter(|c| !c.is_empty()) {
        warn!(channel = %channel, sid = %status.message_sid, code, "Delivery error reported");
    }
    Json(json!({ "status": "received" }))
}

pub(crate) fn twiml_response(xml: String) -> Response {
    ([(header::CONTENT_TYPE, twiml::CONTENT_TYPE)], xml).into_response()
}
