//! `AiCollaborator` over any rig-core completion model.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::{AiCollaborator, Intent, PromptContext, parse, prompts};
use crate::pipeline::plan::ActionPlan;
use crate::store::LiteracyLevel;

const INTENT_MAX_TOKENS: u64 = 400;
const RESPONSE_MAX_TOKENS: u64 = 1024;
const PLAN_MAX_TOKENS: u64 = 2048;

/// Builds a fresh single-turn agent per call around a shared model handle.
pub struct RigCollaborator<M> {
    model: M,
    provider: &'static str,
    model_name: String,
}

impl<M: CompletionModel> RigCollaborator<M> {
    pub fn new(model: M, provider: &'static str, model_name: &str) -> Self {
        Self {
            model,
            provider,
            model_name: model_name.to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        preamble: &str,
        prompt: String,
        max_tokens: u64,
    ) -> Result<String, LlmError> {
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(preamble)
            .max_tokens(max_tokens)
            .build();

        let text = agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason: "empty completion".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl<M> AiCollaborator for RigCollaborator<M>
where
    M: CompletionModel + 'static,
{
    fn name(&self) -> &str {
        self.provider
    }

    async fn extract_intent(&self, text: &str, language: &str) -> Result<Intent, LlmError> {
        let raw = self
            .complete(
                prompts::INTENT_PREAMBLE,
                prompts::intent_prompt(text, language),
                INTENT_MAX_TOKENS,
            )
            .await?;
        let intent = parse::parse_intent(&raw, self.provider)?;
        tracing::debug!(
            intent = %intent.intent,
            domain = %intent.domain,
            confidence = intent.confidence,
            "Intent extracted"
        );
        Ok(intent)
    }

    async fn generate_response(
        &self,
        text: &str,
        intent: &Intent,
        context: &PromptContext,
    ) -> Result<String, LlmError> {
        let preamble = prompts::response_preamble(context);
        let reply = self
            .complete(
                &preamble,
                prompts::response_prompt(text, intent, context),
                RESPONSE_MAX_TOKENS,
            )
            .await?;
        Ok(reply.trim().to_string())
    }

    async fn generate_plan(
        &self,
        text: &str,
        intent: &Intent,
        context: &PromptContext,
    ) -> Result<ActionPlan, LlmError> {
        let raw = self
            .complete(
                prompts::PLAN_PREAMBLE,
                prompts::plan_prompt(text, intent, context),
                PLAN_MAX_TOKENS,
            )
            .await?;
        parse::parse_plan(&raw, self.provider)
    }

    async fn simplify(
        &self,
        text: &str,
        literacy: LiteracyLevel,
        language: &str,
    ) -> Result<String, LlmError> {
        let simplified = self
            .complete(
                prompts::SIMPLIFY_PREAMBLE,
                prompts::simplify_prompt(text, literacy, language),
                RESPONSE_MAX_TOKENS,
            )
            .await?;
        Ok(simplified.trim().to_string())
    }
}
