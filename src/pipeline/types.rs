//! Shared types for the message pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::formatter::WebReply;
use crate::safety::RejectReason;
use crate::store::Channel;

// ── Inbound message ─────────────────────────────────────────────────

/// How the reply reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Returned in the HTTP response (API JSON or webhook TwiML).
    Inline,
    /// Returned inline and also pushed through the outbound transport.
    Push,
}

/// Unified inbound message from any channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: Channel,
    /// Caller's phone number as received. Never logged.
    pub phone_number: String,
    pub text: String,
    /// Caller-supplied language code, if any.
    pub language: Option<String>,
    pub delivery: Delivery,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(channel: Channel, phone_number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel,
            phone_number: phone_number.into(),
            text: text.into(),
            language: None,
            delivery: Delivery::Inline,
            received_at: Utc::now(),
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }
}

// ── Stages and outcomes ─────────────────────────────────────────────

/// Orchestration stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Admitted,
    Validated,
    Identified,
    Classified,
    Planned,
    Responded,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Admitted => "admitted",
            Stage::Validated => "validated",
            Stage::Identified => "identified",
            Stage::Classified => "classified",
            Stage::Planned => "planned",
            Stage::Responded => "responded",
            Stage::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// Which AI calls fell back to deterministic output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Degraded {
    pub classification: bool,
    pub plan: bool,
    pub response: bool,
    pub simplify: bool,
}

impl Degraded {
    pub fn any(&self) -> bool {
        self.classification || self.plan || self.response || self.simplify
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Passed the guardrails and was answered.
    Answered { planned: bool },
    /// Turned away by the guardrails. Nothing was persisted.
    Rejected(RejectReason),
}

/// Result of handling one inbound message.
#[derive(Debug, Clone)]
pub struct Reply {
    pub channel: Channel,
    /// Rendered body for the channel.
    pub text: String,
    /// Structured payload for web clients.
    pub web: Option<WebReply>,
    pub language: String,
    pub conversation_id: Option<Uuid>,
    pub outcome: Outcome,
    /// Furthest stage reached.
    pub stage: Stage,
    pub degraded: Degraded,
}

impl Reply {
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, Outcome::Rejected(_))
    }
}

/// Channel-appropriate apology for a failed message.
pub fn apology(channel: Channel) -> &'static str {
    match channel {
        Channel::Whatsapp => {
            "क्षमा करें, एक त्रुटि हुई। कृपया पुनः प्रयास करें।\nSorry, an error occurred. Please try again."
        }
        Channel::Voice => "Sorry, we encountered an error. Please try again later.",
        Channel::Sms | Channel::Web => "Sorry, I encountered an error. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Admitted < Stage::Validated);
        assert!(Stage::Classified < Stage::Planned);
        assert!(Stage::Responded < Stage::Persisted);
    }

    #[test]
    fn whatsapp_apology_is_bilingual() {
        let text = apology(Channel::Whatsapp);
        assert!(text.contains("Sorry"));
        assert!(text.contains("क्षमा"));
    }
}
