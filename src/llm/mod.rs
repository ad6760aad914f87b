//! AI collaborator integration.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! The gateway never depends on a provider directly. Everything goes through
//! the `AiCollaborator` trait so the orchestrator can bound each call with a
//! timeout and substitute a deterministic fallback.

mod parse;
pub mod prompts;
mod rig_collaborator;

pub use parse::{extract_json_object, parse_intent, parse_plan};
pub use rig_collaborator::RigCollaborator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::LlmError;
use crate::pipeline::plan::ActionPlan;
use crate::store::{Channel, Domain, LiteracyLevel, Role};

/// Confidence above which a non-general intent gets an action plan.
pub const PLAN_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmBackend::Anthropic => f.write_str("anthropic"),
            LlmBackend::OpenAi => f.write_str("openai"),
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" | "gpt" => Ok(LlmBackend::OpenAi),
            other => Err(format!("unsupported backend '{other}', expected anthropic or openai")),
        }
    }
}

/// Classified intent of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent: String,
    pub domain: Domain,
    pub entities: serde_json::Value,
    pub urgency: String,
    pub confidence: f32,
}

impl Intent {
    /// Used when classification fails or times out.
    pub fn fallback() -> Self {
        Self {
            intent: "general_inquiry".to_string(),
            domain: Domain::General,
            entities: serde_json::json!({}),
            urgency: "medium".to_string(),
            confidence: 0.5,
        }
    }

    /// Whether this intent should be answered with an action plan.
    pub fn wants_plan(&self) -> bool {
        self.domain != Domain::General && self.confidence > PLAN_CONFIDENCE_THRESHOLD
    }
}

/// One earlier turn, already decrypted.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// What the collaborator knows about the person it is answering.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub language: String,
    pub literacy: LiteracyLevel,
    pub channel: Channel,
    pub location: Option<String>,
    pub history: Vec<HistoryTurn>,
}

impl PromptContext {
    pub fn new(language: impl Into<String>, channel: Channel) -> Self {
        Self {
            language: language.into(),
            literacy: LiteracyLevel::default(),
            channel,
            location: None,
            history: Vec::new(),
        }
    }
}

/// External language-model collaborator.
///
/// Implementations return errors freely; callers own timeouts and fallbacks.
#[async_trait]
pub trait AiCollaborator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn extract_intent(&self, text: &str, language: &str) -> Result<Intent, LlmError>;

    async fn generate_response(
        &self,
        text: &str,
        intent: &Intent,
        context: &PromptContext,
    ) -> Result<String, LlmError>;

    async fn generate_plan(
        &self,
        text: &str,
        intent: &Intent,
        context: &PromptContext,
    ) -> Result<ActionPlan, LlmError>;

    /// Rewrite `text` for a reader at the given literacy level.
    async fn simplify(
        &self,
        text: &str,
        literacy: LiteracyLevel,
        language: &str,
    ) -> Result<String, LlmError>;
}

/// Collaborator used when no API key is configured. Every call fails, so
/// the orchestrator serves its fallbacks.
pub struct DisabledCollaborator;

impl DisabledCollaborator {
    fn unavailable() -> LlmError {
        LlmError::RequestFailed {
            provider: "disabled".to_string(),
            reason: "no AI backend configured".to_string(),
        }
    }
}

#[async_trait]
impl AiCollaborator for DisabledCollaborator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract_intent(&self, _text: &str, _language: &str) -> Result<Intent, LlmError> {
        Err(Self::unavailable())
    }

    async fn generate_response(
        &self,
        _text: &str,
        _intent: &Intent,
        _context: &PromptContext,
    ) -> Result<String, LlmError> {
        Err(Self::unavailable())
    }

    async fn generate_plan(
        &self,
        _text: &str,
        _intent: &Intent,
        _context: &PromptContext,
    ) -> Result<ActionPlan, LlmError> {
        Err(Self::unavailable())
    }

    async fn simplify(
        &self,
        _text: &str,
        _literacy: LiteracyLevel,
        _language: &str,
    ) -> Result<String, LlmError> {
        Err(Self::unavailable())
    }
}

/// Create an AI collaborator from configuration.
pub fn create_collaborator(config: &AiConfig) -> Result<Arc<dyn AiCollaborator>, LlmError> {
    let Some(api_key) = config.api_key.as_ref() else {
        tracing::warn!("AI_API_KEY not set; AI calls will use fallbacks");
        return Ok(Arc::new(DisabledCollaborator));
    };

    match config.backend {
        LlmBackend::Anthropic => create_anthropic_collaborator(api_key.expose_secret(), &config.model),
        LlmBackend::OpenAi => create_openai_collaborator(api_key.expose_secret(), &config.model),
    }
}

fn create_anthropic_collaborator(
    api_key: &str,
    model_name: &str,
) -> Result<Arc<dyn AiCollaborator>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key).map_err(|e| LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: format!("Failed to create Anthropic client: {e}"),
        })?;

    let model = client.completion_model(model_name);
    tracing::info!("Using Anthropic (model: {})", model_name);
    Ok(Arc::new(RigCollaborator::new(model, "anthropic", model_name)))
}

fn create_openai_collaborator(
    api_key: &str,
    model_name: &str,
) -> Result<Arc<dyn AiCollaborator>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key).map_err(|e| LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("Failed to create OpenAI client: {e}"),
        })?;

    let model = client.completion_model(model_name);
    tracing::info!("Using OpenAI (model: {})", model_name);
    Ok(Arc::new(RigCollaborator::new(model, "openai", model_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn backend_parses_aliases() {
        assert_eq!("Anthropic".parse::<LlmBackend>(), Ok(LlmBackend::Anthropic));
        assert_eq!("openai".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert!("gemini".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn plan_requires_domain_and_confidence() {
        let mut intent = Intent {
            intent: "crop_loan".into(),
            domain: Domain::Agriculture,
            entities: serde_json::json!({}),
            urgency: "medium".into(),
            confidence: 0.9,
        };
        assert!(intent.wants_plan());

        intent.confidence = 0.7;
        assert!(!intent.wants_plan());

        intent.confidence = 0.95;
        intent.domain = Domain::General;
        assert!(!intent.wants_plan());

        assert!(!Intent::fallback().wants_plan());
    }

    #[test]
    fn missing_key_yields_disabled_collaborator() {
        let config = AiConfig::default();
        let collaborator = create_collaborator(&config).unwrap();
        assert_eq!(collaborator.name(), "disabled");
    }

    #[test]
    fn create_collaborator_with_key_still_constructs() {
        // rig-core clients accept any string as API key at construction time.
        let config = AiConfig {
            api_key: Some(SecretString::from("test-key")),
            ..AiConfig::default()
        };
        let collaborator = create_collaborator(&config).unwrap();
        assert_eq!(collaborator.name(), "anthropic");

        let config = AiConfig {
            backend: LlmBackend::OpenAi,
            api_key: Some(SecretString::from("sk-test")),
            model: "gpt-4o".to_string(),
            ..AiConfig::default()
        };
        assert_eq!(create_collaborator(&config).unwrap().name(), "openai");
    }

    #[tokio::test]
    async fn disabled_collaborator_always_errors() {
        let c = DisabledCollaborator;
        assert!(c.extract_intent("loan", "en").await.is_err());
        assert!(c
            .simplify("text", LiteracyLevel::Low, "en")
            .await
            .is_err());
    }
}
