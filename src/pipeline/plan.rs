//! Canonical action plan shape shared by the AI collaborator, the
//! formatter and the store.
//!
//! Every field is optional on input. Model output routinely drops keys or
//! sends numbers as strings, and none of that should fail a reply.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::store::{ActionPlanRecord, Domain};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPlan {
    pub summary: Option<String>,
    pub immediate_actions: Vec<String>,
    pub steps: Vec<PlanStep>,
    pub documents_required: Vec<String>,
    pub eligibility: Option<Eligibility>,
    pub risk_alerts: Vec<String>,
    pub resources: Vec<Resource>,
    pub estimated_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanStep {
    #[serde(alias = "number", deserialize_with = "lenient_u32")]
    pub step_number: Option<u32>,
    pub action: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Eligibility {
    pub criteria: Vec<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub name: Option<String>,
    pub contact: Option<String>,
}

impl ActionPlan {
    /// Deterministic plan used when generation fails or times out.
    pub fn fallback() -> Self {
        Self {
            summary: Some(
                "We're here to help you. Please provide more details so we can assist you better."
                    .to_string(),
            ),
            immediate_actions: vec![
                "Share your specific situation or question".to_string(),
                "Mention your location if relevant".to_string(),
                "Tell us if this is urgent".to_string(),
            ],
            steps: vec![PlanStep {
                step_number: Some(1),
                action: "Provide more details".to_string(),
                details: Some(
                    "Help us understand your situation better by sharing specific information"
                        .to_string(),
                ),
            }],
            eligibility: Some(Eligibility {
                criteria: Vec::new(),
                status: Some("check_needed".to_string()),
            }),
            estimated_time: Some("Unknown".to_string()),
            ..Self::default()
        }
    }

    /// Steps paired with their display number. Missing numbers follow position.
    pub fn numbered_steps(&self) -> impl Iterator<Item = (u32, &PlanStep)> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.step_number.unwrap_or(i as u32 + 1), step))
    }

    pub fn to_record(&self, conversation_id: Uuid, domain: Domain) -> ActionPlanRecord {
        ActionPlanRecord {
            id: Uuid::new_v4(),
            conversation_id,
            domain,
            steps: serde_json::to_value(&self.steps).unwrap_or_default(),
            required_documents: serde_json::to_value(&self.documents_required)
                .unwrap_or_default(),
            eligibility_status: self.eligibility.as_ref().and_then(|e| e.status.clone()),
            risk_alerts: serde_json::to_value(&self.risk_alerts).unwrap_or_default(),
            created_at: Utc::now(),
        }
    }
}

/// Accept `3`, `"3"` or null for a step number.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_default() {
        let plan: ActionPlan = serde_json::from_str(r#"{"summary": "Apply for KCC"}"#).unwrap();
        assert_eq!(plan.summary.as_deref(), Some("Apply for KCC"));
        assert!(plan.steps.is_empty());
        assert!(plan.eligibility.is_none());
    }

    #[test]
    fn step_numbers_accept_strings_and_alias() {
        let plan: ActionPlan = serde_json::from_str(
            r#"{"steps": [
                {"step_number": "2", "action": "Visit bank"},
                {"number": 5, "action": "Submit form"},
                {"action": "Wait"}
            ]}"#,
        )
        .unwrap();
        let numbers: Vec<u32> = plan.numbered_steps().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![2, 5, 3]);
    }

    #[test]
    fn fallback_is_check_needed() {
        let plan = ActionPlan::fallback();
        assert_eq!(plan.immediate_actions.len(), 3);
        assert_eq!(
            plan.eligibility.and_then(|e| e.status).as_deref(),
            Some("check_needed")
        );
    }

    #[test]
    fn record_carries_eligibility_and_documents() {
        let plan = ActionPlan {
            documents_required: vec!["Aadhaar".into(), "Land record".into()],
            eligibility: Some(Eligibility {
                criteria: vec![],
                status: Some("eligible".into()),
            }),
            ..ActionPlan::default()
        };
        let record = plan.to_record(Uuid::new_v4(), Domain::Agriculture);
        assert_eq!(record.eligibility_status.as_deref(), Some("eligible"));
        assert_eq!(record.required_documents, serde_json::json!(["Aadhaar", "Land record"]));
    }
}
