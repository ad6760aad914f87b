//! Parsing of model output into typed values.

use serde::Deserialize;

use crate::error::LlmError;
use crate::llm::Intent;
use crate::pipeline::plan::ActionPlan;
use crate::store::Domain;

#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    entities: serde_json::Value,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    confidence: serde_json::Value,
}

/// Parse an intent classification response.
///
/// Unknown domains map to `Domain::General` and are logged, so an
/// unexpected label never produces a plan for the wrong domain.
pub fn parse_intent(raw: &str, provider: &str) -> Result<Intent, LlmError> {
    let json = extract_json_object(raw);
    let parsed: RawIntent =
        serde_json::from_str(&json).map_err(|e| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("intent JSON parse error: {e}"),
        })?;

    let domain = match Domain::from_label(&parsed.domain) {
        Some(domain) => domain,
        None => {
            tracing::warn!(label = %parsed.domain, "Unknown domain label, using general");
            Domain::General
        }
    };

    let confidence = match &parsed.confidence {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0) as f32,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    Ok(Intent {
        intent: if parsed.intent.trim().is_empty() {
            "general_inquiry".to_string()
        } else {
            parsed.intent
        },
        domain,
        entities: match parsed.entities {
            serde_json::Value::Object(_) => parsed.entities,
            _ => serde_json::json!({}),
        },
        urgency: match parsed.urgency.to_ascii_lowercase().as_str() {
            u @ ("low" | "medium" | "high") => u.to_string(),
            _ => "medium".to_string(),
        },
        confidence: confidence.clamp(0.0, 1.0),
    })
}

/// Parse an action plan response.
pub fn parse_plan(raw: &str, provider: &str) -> Result<ActionPlan, LlmError> {
    let json = extract_json_object(raw);
    serde_json::from_str(&json).map_err(|e| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: format!("plan JSON parse error: {e}"),
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
