//! IVR call flow: greeting with a speech gather, then one turn per utterance.

use axum::{Form, extract::State, response::Response};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use super::webhooks::twiml_response;
use crate::channels::Twiml;
use crate::conversation::fingerprint_prefix;
use crate::pipeline::{InboundMessage, apology};
use crate::store::Channel;

const GREETING: &str = "Welcome to SahaayAI. How can I help you today? \
You can ask about healthcare, government schemes, agriculture, or financial help.";
const NO_INPUT: &str = "We didn't receive any input. Goodbye!";
const NOT_CAUGHT: &str = "Sorry, I didn't catch that. Please try again.";
const FOLLOW_UP: &str = "Is there anything else I can help you with?";
const GOODBYE: &str = "Thank you for calling SahaayAI. Goodbye!";

#[derive(Debug, Deserialize)]
pub struct VoiceForm {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
}

pub async fn incoming(State(state): State<AppState>, Form(form): Form<VoiceForm>) -> Response {
    info!(call_sid = form.call_sid.as_deref().unwrap_or("-"), "Incoming call");
    let language = state.default_language.as_str();
    twiml_response(
        Twiml::new()
            .gather_speech(GREETING, language)
            .say(NO_INPUT, language)
            .build(),
    )
}

pub async fn gather(State(state): State<AppState>, Form(form): Form<VoiceForm>) -> Response {
    let default_language = state.default_language.as_str();

    let speech = form
        .speech_result
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (Some(speech), Some(from)) = (speech, form.from.as_deref()) else {
        return twiml_response(Twiml::new().say(NOT_CAUGHT, default_language).build());
    };

    let inbound = InboundMessage::new(Channel::Voice, from, speech)
        .with_language(Some(default_language.to_string()));
    match state.orchestrator.handle(inbound).await {
        Ok(reply) => twiml_response(
            Twiml::new()
                .say(&reply.text, &reply.language)
                .gather_speech(FOLLOW_UP, &reply.language)
                .say(GOODBYE, &reply.language)
                .build(),
        ),
        Err(e) => {
            let fingerprint = state.orchestrator.fingerprint(from);
            error!(
                fingerprint = fingerprint_prefix(&fingerprint),
                call_sid = form.call_sid.as_deref().unwrap_or("-"),
                error = %e,
                "Voice turn failed"
            );
            twiml_response(
                Twiml::new()
                    .say(apology(Channel::Voice), default_language)
                    .build(),
            )
        }
    }
}
