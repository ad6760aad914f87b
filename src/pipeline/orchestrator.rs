//! Per-message orchestration.
//!
//! ADMITTED → VALIDATED → IDENTIFIED → CLASSIFIED → [PLANNED] → RESPONDED → PERSISTED
//!
//! Admission happens at the HTTP layer, so every message reaching
//! `handle` is already admitted. The user's turn is written right after
//! identification, before any AI call. Every AI call is bounded by the
//! configured timeout and replaced by a deterministic fallback on failure.
//! Only persistence errors escape as `Err`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::channels::Transport;
use crate::config::GatewayConfig;
use crate::conversation::{IdentityResolver, MessageLedger, fingerprint_prefix};
use crate::crypto::FieldCipher;
use crate::error::{LlmError, PipelineError};
use crate::language::resolve_language;
use crate::llm::{AiCollaborator, HistoryTurn, Intent, PromptContext, prompts::HISTORY_TURNS};
use crate::pipeline::formatter::{self, RenderContext, Rendered};
use crate::pipeline::plan::ActionPlan;
use crate::pipeline::speech::SpeechSynthesizer;
use crate::pipeline::types::{Degraded, Delivery, InboundMessage, Outcome, Reply, Stage};
use crate::safety::{GuardrailFilter, Verdict, sanitize_input};
use crate::store::{Channel, Conversation, LiteracyLevel, Role, Store, User};

const RESPONSE_FALLBACK: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again.";

/// Tunables taken from the gateway configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub ai_timeout: Duration,
    pub default_language: String,
    pub supported_languages: Vec<String>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            ai_timeout: config.ai.timeout,
            default_language: config.default_language.clone(),
            supported_languages: config.supported_languages.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

pub struct Orchestrator {
    guardrails: GuardrailFilter,
    identity: Arc<IdentityResolver>,
    ledger: Arc<MessageLedger>,
    cipher: Arc<FieldCipher>,
    ai: Arc<dyn AiCollaborator>,
    speech: Arc<dyn SpeechSynthesizer>,
    transport: Arc<dyn Transport>,
    settings: OrchestratorSettings,
}

/// State handed back by the detached identification task.
struct Identified {
    user: User,
    conversation: Conversation,
    history: Vec<HistoryTurn>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Arc<FieldCipher>,
        ai: Arc<dyn AiCollaborator>,
        speech: Arc<dyn SpeechSynthesizer>,
        transport: Arc<dyn Transport>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            guardrails: GuardrailFilter::new(),
            identity: Arc::new(IdentityResolver::new(Arc::clone(&store))),
            ledger: Arc::new(MessageLedger::new(store, Arc::clone(&cipher))),
            cipher,
            ai,
            speech,
            transport,
            settings,
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Keyed fingerprint of a phone number, safe to log by prefix.
    pub fn fingerprint(&self, phone_number: &str) -> String {
        self.cipher.fingerprint(phone_number)
    }

    pub fn transport_enabled(&self) -> bool {
        self.transport.is_enabled()
    }

    /// Outbound transport, for direct sends that bypass the pipeline.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Run one admitted message through the pipeline.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<Reply, PipelineError> {
        let started = Instant::now();
        let channel = inbound.channel;
        debug!(channel = %channel, stage = %Stage::Admitted, "Message entered pipeline");

        // ── VALIDATED ───────────────────────────────────────────────
        let text = sanitize_input(&inbound.text);
        let language = resolve_language(
            inbound.language.as_deref(),
            &text,
            &self.settings.supported_languages,
            &self.settings.default_language,
        );

        if let Verdict::Rejected { reason, message } = self.guardrails.validate(&text) {
            info!(channel = %channel, reason = %reason, "Message rejected by guardrails");
            return Ok(Reply {
                channel,
                text: message.to_string(),
                web: None,
                language,
                conversation_id: None,
                outcome: Outcome::Rejected(reason),
                stage: Stage::Validated,
                degraded: Degraded::default(),
            });
        }
        debug!(channel = %channel, stage = %Stage::Validated, "Message passed guardrails");

        // ── IDENTIFIED ──────────────────────────────────────────────
        let fingerprint = self.cipher.fingerprint(&inbound.phone_number);
        let Identified {
            user,
            conversation,
            history,
        } = self
            .identify_and_record(fingerprint.clone(), channel, text.clone(), language.clone())
            .await?;
        debug!(
            fingerprint = fingerprint_prefix(&fingerprint),
            conversation_id = %conversation.id,
            stage = %Stage::Identified,
            "User turn recorded"
        );

        // ── CLASSIFIED ──────────────────────────────────────────────
        let mut degraded = Degraded::default();
        let intent = match self
            .bounded("extract_intent", self.ai.extract_intent(&text, &language))
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "{}", PipelineError::ClassificationDegraded(e.to_string()));
                degraded.classification = true;
                Intent::fallback()
            }
        };
        debug!(
            intent = %intent.intent,
            domain = %intent.domain,
            confidence = intent.confidence,
            stage = %Stage::Classified,
            "Message classified"
        );

        let context = PromptContext {
            language: language.clone(),
            literacy: user.literacy_level,
            channel,
            location: location_of(&user),
            history,
        };

        // ── PLANNED / RESPONDED ─────────────────────────────────────
        let planned = intent.wants_plan();
        let mut stage = Stage::Responded;
        let rendered = if planned {
            let plan = match self
                .bounded("generate_plan", self.ai.generate_plan(&text, &intent, &context))
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(error = %e, "{}", PipelineError::PlanGenerationDegraded(e.to_string()));
                    degraded.plan = true;
                    ActionPlan::fallback()
                }
            };
            self.ledger
                .record_plan(conversation.id, intent.domain, &plan)
                .await?;
            stage = Stage::Planned;
            debug!(domain = %intent.domain, stage = %stage, "Action plan stored");

            let audio = self
                .audio_for(channel, &formatter::format_voice(&plan), &language)
                .await;
            formatter::render_plan(
                channel,
                &plan,
                intent.domain,
                &RenderContext {
                    language: &language,
                    intent: &intent,
                    audio_file: audio.as_deref(),
                },
            )
        } else {
            let response = self.respond(&text, &intent, &context, &mut degraded).await;
            let audio = self.audio_for(channel, &response, &language).await;
            formatter::render_response(
                channel,
                &response,
                &RenderContext {
                    language: &language,
                    intent: &intent,
                    audio_file: audio.as_deref(),
                },
            )
        };
        debug!(stage = %Stage::Responded, "Reply rendered");

        // ── PERSISTED ───────────────────────────────────────────────
        let metadata = serde_json::json!({
            "intent": intent.intent,
            "domain": intent.domain,
            "urgency": intent.urgency,
            "confidence": intent.confidence,
            "action_plan": planned,
            "stage": stage,
            "degraded": degraded,
        });
        self.ledger
            .append(
                conversation.id,
                Role::Assistant,
                &rendered.text,
                &language,
                Some(metadata),
            )
            .await?;
        self.identity.touch(user.id).await?;

        if inbound.delivery == Delivery::Push && channel.is_messaging() {
            self.dispatch(&inbound.phone_number, channel, &rendered);
        }

        info!(
            channel = %channel,
            conversation_id = %conversation.id,
            planned,
            degraded = degraded.any(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Message handled"
        );

        Ok(Reply {
            channel,
            text: rendered.text,
            web: rendered.web,
            language,
            conversation_id: Some(conversation.id),
            outcome: Outcome::Answered { planned },
            stage: Stage::Persisted,
            degraded,
        })
    }

    /// Resolve identity and write the user turn on a detached task, so the
    /// write completes exactly once even if the caller goes away.
    async fn identify_and_record(
        &self,
        fingerprint: String,
        channel: Channel,
        text: String,
        language: String,
    ) -> Result<Identified, PipelineError> {
        let identity = Arc::clone(&self.identity);
        let ledger = Arc::clone(&self.ledger);

        let task = tokio::spawn(async move {
            let user = identity.get_or_create_user(&fingerprint, &language).await?;
            let conversation = identity.get_or_create_conversation(user.id, channel).await?;
            let history = ledger.history(conversation.id, HISTORY_TURNS).await?;
            ledger
                .append(conversation.id, Role::User, &text, &language, None)
                .await?;
            Ok::<_, PipelineError>(Identified {
                user,
                conversation,
                history,
            })
        });

        task.await
            .map_err(|e| PipelineError::Task(format!("identify_and_record: {e}")))?
    }

    async fn respond(
        &self,
        text: &str,
        intent: &Intent,
        context: &PromptContext,
        degraded: &mut Degraded,
    ) -> String {
        let response = match self
            .bounded(
                "generate_response",
                self.ai.generate_response(text, intent, context),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "{}", PipelineError::ResponseDegraded(e.to_string()));
                degraded.response = true;
                return RESPONSE_FALLBACK.to_string();
            }
        };

        if context.literacy != LiteracyLevel::Low {
            return response;
        }

        match self
            .bounded(
                "simplify",
                self.ai
                    .simplify(&response, context.literacy, &context.language),
            )
            .await
        {
            Ok(simplified) if !simplified.trim().is_empty() => simplified,
            Ok(_) => response,
            Err(e) => {
                warn!(error = %e, "Simplification degraded, keeping original text");
                degraded.simplify = true;
                response
            }
        }
    }

    async fn audio_for(&self, channel: Channel, text: &str, language: &str) -> Option<String> {
        if channel != Channel::Web || text.trim().is_empty() {
            return None;
        }
        self.speech.synthesize(text, language).await
    }

    /// Push the rendered reply through the transport without blocking the caller.
    fn dispatch(&self, phone_number: &str, channel: Channel, rendered: &Rendered) {
        if !self.transport.is_enabled() {
            debug!(channel = %channel, "Transport disabled, reply returned inline only");
            return;
        }

        let transport = Arc::clone(&self.transport);
        let destination = phone_number.to_string();
        let body = rendered.text.clone();
        tokio::spawn(async move {
            match transport.send(&destination, channel, &body, None).await {
                Ok(receipt) => debug!(channel = %channel, parts = receipt.parts(), "Reply pushed"),
                Err(e) => warn!(channel = %channel, error = %e, "Outbound push failed"),
            }
        });
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        let timeout = self.settings.ai_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout { operation, timeout }),
        }
    }
}

fn location_of(user: &User) -> Option<String> {
    match (user.district.as_deref(), user.state.as_deref()) {
        (Some(d), Some(s)) => Some(format!("{d}, {s}")),
        (Some(x), None) | (None, Some(x)) => Some(x.to_string()),
        (None, None) => None,
    }
}
