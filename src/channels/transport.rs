//! Outbound send primitive and the helpers both transports share.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::store::Channel;

/// Longest body Twilio accepts for one concatenated SMS.
pub const SMS_CHUNK_CHARS: usize = 1600;

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider message ids, one per part sent.
    pub message_ids: Vec<String>,
}

impl SendReceipt {
    pub fn parts(&self) -> usize {
        self.message_ids.len()
    }
}

/// Delivery state of a previously sent message, as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatus {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub date_sent: Option<String>,
    #[serde(default)]
    pub date_updated: Option<String>,
}

/// Result of a carrier lookup for a phone number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberLookup {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NumberLookup {
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            phone_number: None,
            national_format: None,
            country_code: None,
            error: Some(error.into()),
        }
    }
}

/// Pushes a message to a phone number on a messaging channel.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether sends can succeed at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(
        &self,
        destination: &str,
        channel: Channel,
        text: &str,
        media_url: Option<&str>,
    ) -> Result<SendReceipt, ChannelError>;

    /// Fetch delivery status for `message_id`. `Ok(None)` when the provider
    /// does not know the id.
    async fn message_status(&self, _message_id: &str) -> Result<Option<MessageStatus>, ChannelError> {
        Err(ChannelError::Disabled {
            name: self.name().to_string(),
        })
    }

    async fn lookup_number(&self, _number: &str) -> Result<NumberLookup, ChannelError> {
        Err(ChannelError::Disabled {
            name: self.name().to_string(),
        })
    }
}

/// Used when no Twilio credentials are configured.
pub struct DisabledTransport;

#[async_trait]
impl Transport for DisabledTransport {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn send(
        &self,
        _destination: &str,
        _channel: Channel,
        _text: &str,
        _media_url: Option<&str>,
    ) -> Result<SendReceipt, ChannelError> {
        Err(ChannelError::Disabled {
            name: "twilio".to_string(),
        })
    }
}

/// E.164 form: leading `+`, digits only.
pub fn to_e164(number: &str) -> String {
    let bare = number.trim().trim_start_matches("whatsapp:");
    let digits: String = bare.chars().filter(char::is_ascii_digit).collect();
    format!("+{digits}")
}

/// Address form Twilio expects for a channel.
pub fn channel_address(number: &str, channel: Channel) -> String {
    let e164 = to_e164(number);
    match channel {
        Channel::Whatsapp => format!("whatsapp:{e164}"),
        _ => e164,
    }
}

/// Split `text` into parts of at most `limit` characters, preferring
/// sentence boundaries and prefixing each part with "(i/n) ".
///
/// Text within the limit is returned unchanged as a single part.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    // Reserve room for the widest prefix, e.g. "(12/12) ".
    let reserve = 8;
    let budget = limit.saturating_sub(reserve).max(1);

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        if current.chars().count() + sentence.chars().count() <= budget {
            current.push_str(sentence);
            continue;
        }
        if !current.trim().is_empty() {
            parts.push(current.trim().to_string());
        }
        current.clear();

        // A single sentence longer than the budget is hard-split.
        let mut rest: Vec<char> = sentence.chars().collect();
        while rest.len() > budget {
            let head: String = rest.drain(..budget).collect();
            parts.push(head.trim().to_string());
        }
        current.extend(rest);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("({}/{total}) {part}", i + 1))
        .collect()
}

/// Split after ". ", "! " and "? ", keeping the terminator and space.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1] == b' ' {
            out.push(&text[start..i + 2]);
            start = i + 2;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
