//! Persisted entities and the small enums they carry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound/outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Whatsapp,
    Voice,
    Web,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Voice => "voice",
            Channel::Web => "web",
        }
    }

    /// Channels with a push transport behind them.
    pub fn is_messaging(&self) -> bool {
        matches!(self, Channel::Sms | Channel::Whatsapp)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::Whatsapp),
            "voice" => Ok(Channel::Voice),
            "web" => Ok(Channel::Web),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteracyLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl LiteracyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiteracyLevel::Low => "low",
            LiteracyLevel::Medium => "medium",
            LiteracyLevel::High => "high",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "low" => LiteracyLevel::Low,
            "high" => LiteracyLevel::High,
            _ => LiteracyLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "closed" => ConversationStatus::Closed,
            _ => ConversationStatus::Active,
        }
    }
}

/// Service domain an intent or action plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Health,
    Agriculture,
    Finance,
    Education,
    GovernmentSchemes,
    Climate,
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Health => "health",
            Domain::Agriculture => "agriculture",
            Domain::Finance => "finance",
            Domain::Education => "education",
            Domain::GovernmentSchemes => "government_schemes",
            Domain::Climate => "climate",
            Domain::General => "general",
        }
    }

    /// Map a free-form label (usually from model output) to a domain.
    ///
    /// Returns `None` for anything outside the known set so callers can
    /// decide how loudly to fall back.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "health" | "healthcare" => Some(Domain::Health),
            "agriculture" | "farming" => Some(Domain::Agriculture),
            "finance" | "banking" => Some(Domain::Finance),
            "education" => Some(Domain::Education),
            "government_schemes" | "government" | "schemes" => Some(Domain::GovernmentSchemes),
            "climate" | "disaster" => Some(Domain::Climate),
            "general" => Some(Domain::General),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person known to the gateway, keyed by phone fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub phone_fingerprint: String,
    pub preferred_language: String,
    pub literacy_level: LiteracyLevel,
    pub district: Option<String>,
    pub state: Option<String>,
    pub consent_given: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    pub fn new(phone_fingerprint: impl Into<String>, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_fingerprint: phone_fingerprint.into(),
            preferred_language: language.into(),
            literacy_level: LiteracyLevel::default(),
            district: None,
            state: None,
            consent_given: false,
            created_at: now,
            last_active: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(user_id: Uuid, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel,
            status: ConversationStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// One turn of a conversation. `content` is always ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub language: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A generated action plan as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlanRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub domain: Domain,
    pub steps: serde_json::Value,
    pub required_documents: serde_json::Value,
    pub eligibility_status: Option<String>,
    pub risk_alerts: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("WhatsApp".parse::<Channel>().unwrap(), Channel::Whatsapp);
        assert!("fax".parse::<Channel>().is_err());
        assert!(Channel::Sms.is_messaging());
        assert!(!Channel::Web.is_messaging());
    }

    #[test]
    fn domain_labels_map_exhaustively() {
        assert_eq!(Domain::from_label("Government Schemes"), Some(Domain::GovernmentSchemes));
        assert_eq!(Domain::from_label("government-schemes"), Some(Domain::GovernmentSchemes));
        assert_eq!(Domain::from_label(" HEALTH "), Some(Domain::Health));
        assert_eq!(Domain::from_label("legal"), None);
    }

    #[test]
    fn domain_serializes_snake_case() {
        let json = serde_json::to_string(&Domain::GovernmentSchemes).unwrap();
        assert_eq!(json, "\"government_schemes\"");
    }
}
