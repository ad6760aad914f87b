//! HTTP surface: messaging API, Twilio webhooks, voice and health routes.

pub mod health;
pub mod messaging;
pub mod middleware;
pub mod send;
pub mod voice;
pub mod webhooks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::pipeline::Orchestrator;
use crate::rate_limit::RateLimiter;
use crate::store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<RateLimiter>,
    /// Used by readiness checks.
    pub store: Arc<dyn Store>,
    pub default_language: String,
    /// Served under `/audio`.
    pub audio_dir: PathBuf,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn Store>,
        default_language: impl Into<String>,
        audio_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            limiter,
            store,
            default_language: default_language.into(),
            audio_dir: audio_dir.into(),
            started_at: Instant::now(),
        }
    }
}

/// Build the full gateway router.
pub fn router(state: AppState) -> Router {
    let audio = ServeDir::new(&state.audio_dir);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route("/api/v1/message/{channel}", post(messaging::send_message))
        .route("/api/v1/send/sms", post(send::send_sms))
        .route("/api/v1/send/whatsapp", post(send::send_whatsapp))
        .route("/api/v1/send/status/{sid}", get(send::message_status))
        .route("/api/v1/send/validate-phone", post(send::validate_phone_number))
        .route("/webhooks/sms/incoming", post(webhooks::sms_incoming))
        .route(
            "/webhooks/whatsapp/incoming",
            post(webhooks::whatsapp_incoming),
        )
        .route("/webhooks/{channel}/status", post(webhooks::status_callback))
        .route("/api/v1/voice/incoming", post(voice::incoming))
        .route("/api/v1/voice/gather", post(voice::gather))
        .nest_service("/audio", audio)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admission,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use crate::channels::{DisabledTransport, MessageStatus, NumberLookup, SendReceipt, Transport};
    use crate::crypto::FieldCipher;
    use crate::error::{ChannelError, LlmError};
    use crate::llm::{AiCollaborator, Intent, PromptContext};
    use crate::pipeline::{ActionPlan, NoSpeech, OrchestratorSettings};
    use crate::store::{Channel, LibSqlBackend, LiteracyLevel};

    /// Answers every message with a fixed general reply.
    pub struct EchoAi;

    #[async_trait]
    impl AiCollaborator for EchoAi {
        fn name(&self) -> &str {
            "echo"
        }

        async fn extract_intent(&self, _text: &str, _language: &str) -> Result<Intent, LlmError> {
            Ok(Intent::fallback())
        }

        async fn generate_response(
            &self,
            text: &str,
            _intent: &Intent,
            _context: &PromptContext,
        ) -> Result<String, LlmError> {
            Ok(format!("You asked: {text}"))
        }

        async fn generate_plan(
            &self,
            _text: &str,
            _intent: &Intent,
            _context: &PromptContext,
        ) -> Result<ActionPlan, LlmError> {
            Ok(ActionPlan::fallback())
        }

        async fn simplify(
            &self,
            text: &str,
            _literacy: LiteracyLevel,
            _language: &str,
        ) -> Result<String, LlmError> {
            Ok(text.to_string())
        }
    }

    /// Records every send. Knows one message id and one number.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, Channel, String, Option<String>)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(
            &self,
            destination: &str,
            channel: Channel,
            text: &str,
            media_url: Option<&str>,
        ) -> Result<SendReceipt, ChannelError> {
            self.sent.lock().unwrap().push((
                destination.to_string(),
                channel,
                text.to_string(),
                media_url.map(String::from),
            ));
            Ok(SendReceipt {
                message_ids: vec!["SM1".into()],
            })
        }

        async fn message_status(
            &self,
            message_id: &str,
        ) -> Result<Option<MessageStatus>, ChannelError> {
            Ok((message_id == "SM1").then(|| MessageStatus {
                sid: "SM1".into(),
                status: "delivered".into(),
                error_code: None,
                error_message: None,
                date_sent: None,
                date_updated: None,
            }))
        }

        async fn lookup_number(&self, number: &str) -> Result<NumberLookup, ChannelError> {
            if number != "+919876543210" {
                return Ok(NumberLookup::invalid("Number not found"));
            }
            Ok(NumberLookup {
                valid: true,
                phone_number: Some(number.to_string()),
                national_format: Some("098765 43210".into()),
                country_code: Some("IN".into()),
                error: None,
            })
        }
    }

    async fn build_state(per_minute: u32, per_hour: u32, transport: Arc<dyn Transport>) -> AppState {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let cipher = Arc::new(FieldCipher::new(&SecretString::from("api-test-key")).unwrap());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            cipher,
            Arc::new(EchoAi),
            Arc::new(NoSpeech),
            transport,
            OrchestratorSettings::default(),
        ));
        AppState::new(
            orchestrator,
            Arc::new(RateLimiter::new(per_minute, per_hour)),
            store,
            "en",
            std::env::temp_dir(),
        )
    }

    pub async fn state_with_limits(per_minute: u32, per_hour: u32) -> AppState {
        build_state(per_minute, per_hour, Arc::new(DisabledTransport)).await
    }

    pub async fn state_with_transport(transport: Arc<dyn Transport>) -> AppState {
        build_state(60, 1000, transport).await
    }

    pub async fn state() -> AppState {
        state_with_limits(60, 1000).await
    }

    pub async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
