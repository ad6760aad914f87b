//! Integration tests for the gateway HTTP surface.
//!
//! Each test spins up the full axum app on a random port with an in-memory
//! store and a scripted collaborator, then drives it over real HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use sahaay_gateway::api::{self, AppState};
use sahaay_gateway::channels::DisabledTransport;
use sahaay_gateway::config::SpeechConfig;
use sahaay_gateway::crypto::FieldCipher;
use sahaay_gateway::error::LlmError;
use sahaay_gateway::llm::{AiCollaborator, Intent, PromptContext};
use sahaay_gateway::pipeline::plan::PlanStep;
use sahaay_gateway::pipeline::{
    ActionPlan, HttpSpeech, NoSpeech, Orchestrator, OrchestratorSettings, SpeechSynthesizer,
};
use sahaay_gateway::rate_limit::RateLimiter;
use sahaay_gateway::store::{Domain, LibSqlBackend, LiteracyLevel, Store};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Plans for anything mentioning "loan", answers everything else directly.
#[derive(Default)]
struct ScriptedAi {
    plans: AtomicUsize,
}

#[async_trait]
impl AiCollaborator for ScriptedAi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract_intent(&self, text: &str, _language: &str) -> Result<Intent, LlmError> {
        if text.to_lowercase().contains("loan") {
            Ok(Intent {
                intent: "loan_application".into(),
                domain: Domain::Finance,
                entities: json!({}),
                urgency: "high".into(),
                confidence: 0.9,
            })
        } else {
            Ok(Intent::fallback())
        }
    }

    async fn generate_response(
        &self,
        _text: &str,
        _intent: &Intent,
        context: &PromptContext,
    ) -> Result<String, LlmError> {
        Ok(format!("Reply #{} for you.", context.history.len() / 2 + 1))
    }

    async fn generate_plan(
        &self,
        _text: &str,
        _intent: &Intent,
        _context: &PromptContext,
    ) -> Result<ActionPlan, LlmError> {
        self.plans.fetch_add(1, Ordering::SeqCst);
        Ok(ActionPlan {
            summary: Some("Apply for a Mudra loan.".into()),
            immediate_actions: vec!["Visit the nearest bank branch".into()],
            steps: (1..=7)
                .map(|n| PlanStep {
                    step_number: Some(n),
                    action: format!("Step action {n}"),
                    details: None,
                })
                .collect(),
            documents_required: vec!["Aadhaar".into(), "PAN".into(), "Bank statement".into()],
            ..ActionPlan::default()
        })
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

struct TestServer {
    base: String,
    store: Arc<dyn Store>,
    ai: Arc<ScriptedAi>,
    client: reqwest::Client,
}

/// Start the gateway on a random port.
async fn start_server(per_minute: u32) -> TestServer {
    start_server_with(per_minute, Arc::new(NoSpeech), std::env::temp_dir()).await
}

async fn start_server_with(
    per_minute: u32,
    speech: Arc<dyn SpeechSynthesizer>,
    audio_dir: PathBuf,
) -> TestServer {
    let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let cipher = Arc::new(FieldCipher::new(&SecretString::from("integration-key")).unwrap());
    let ai = Arc::new(ScriptedAi::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        cipher,
        ai.clone(),
        speech,
        Arc::new(DisabledTransport),
        OrchestratorSettings::default(),
    ));
    let state = AppState::new(
        orchestrator,
        Arc::new(RateLimiter::new(per_minute, 1000)),
        Arc::clone(&store),
        "en",
        audio_dir,
    );
    let app = api::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        store,
        ai,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn message(&self, channel: &str, phone: &str, text: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/v1/message/{channel}", self.base))
            .json(&json!({ "phone_number": phone, "message": text }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn conversation_history_accumulates_across_turns() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(60).await;

        let first: Value = server
            .message("sms", "+919000000001", "how to open a bank account")
            .await
            .json()
            .await
            .unwrap();
        let second: Value = server
            .message("sms", "+919000000001", "what documents for bank account")
            .await
            .json()
            .await
            .unwrap();

        assert_eq!(first["response"], "Reply #1 for you.");
        assert_eq!(second["response"], "Reply #2 for you.");
        assert_eq!(first["conversation_id"], second["conversation_id"]);

        let id = second["conversation_id"].as_str().unwrap().parse().unwrap();
        let messages = server.store.list_messages(id, 100).await.unwrap();
        assert_eq!(messages.len(), 4);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn plan_reply_fits_each_channel() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(60).await;

        let sms: Value = server
            .message("sms", "+919000000002", "I need a business loan")
            .await
            .json()
            .await
            .unwrap();
        let sms_text = sms["response"].as_str().unwrap();
        assert!(sms_text.chars().count() <= 300);

        let web: Value = server
            .message("web", "+919000000002", "I need a business loan")
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(web["response"]["text"], "Apply for a Mudra loan.");
        assert_eq!(web["response"]["action_plan"]["steps"].as_array().unwrap().len(), 7);
        assert_eq!(web["response"]["visual_guide"]["summary_icon"], "💰");

        let voice: Value = server
            .message("voice", "+919000000002", "I need a business loan")
            .await
            .json()
            .await
            .unwrap();
        let narrated = voice["response"].as_str().unwrap();
        assert_eq!(narrated.lines().filter(|l| l.starts_with("Step ")).count(), 7);

        assert_eq!(server.ai.plans.load(Ordering::SeqCst), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn guardrail_rejection_is_answered_but_not_stored() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(60).await;

        let response = server
            .message("sms", "+919000000003", "who won the cricket match")
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(body["conversation_id"].is_null());
        assert!(body["response"].as_str().unwrap().contains("Thanks for your question"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(2).await;

        for _ in 0..2 {
            let ok = server
                .message("sms", "+919000000004", "savings account interest")
                .await;
            assert_eq!(ok.status(), 200);
        }

        let denied = server
            .message("sms", "+919000000004", "savings account interest")
            .await;
        assert_eq!(denied.status(), 429);
        assert_eq!(denied.headers()["retry-after"], "60");

        // Health stays reachable for the denied client.
        let health = server
            .client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), 200);

        // A distinct user id has its own budget.
        let other = server
            .client
            .post(format!("{}/api/v1/message/sms", server.base))
            .header("X-User-ID", "someone-else")
            .json(&json!({ "phone_number": "+919000000005", "message": "savings account interest" }))
            .send()
            .await
            .unwrap();
        assert_eq!(other.status(), 200);
        assert_eq!(other.headers()["x-ratelimit-remaining-minute"], "1");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sms_webhook_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(60).await;

        let response = server
            .client
            .post(format!("{}/webhooks/sms/incoming", server.base))
            .form(&[
                ("From", "+919000000006"),
                ("Body", "fertilizer subsidy for farmers"),
                ("MessageSid", "SM123"),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "application/xml");
        let xml = response.text().await.unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>"#));
        assert!(xml.contains("Reply #1 for you."));
    })
    .await
    .expect("test timed out");
}

const FAKE_MP3: &[u8] = b"ID3\x03\x00gateway-audio";

/// Stand-in for an OpenAI-compatible speech endpoint.
async fn start_speech_stub() -> String {
    let app = axum::Router::new().route(
        "/v1/audio/speech",
        axum::routing::post(|| async { FAKE_MP3 }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn web_reply_links_served_audio() {
    timeout(TEST_TIMEOUT, async {
        let speech_base = start_speech_stub().await;
        let audio_dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(HttpSpeech::new(
            SpeechConfig::new(speech_base, SecretString::from("tts-key")),
            audio_dir.path(),
        ));
        let server = start_server_with(60, speech, audio_dir.path().to_path_buf()).await;

        let web: Value = server
            .message("web", "+919000000007", "how to open a bank account")
            .await
            .json()
            .await
            .unwrap();
        let url = web["response"]["audio_url"].as_str().unwrap();
        assert!(url.starts_with("/audio/") && url.ends_with(".mp3"));

        let audio = server
            .client
            .get(format!("{}{url}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(audio.status(), 200);
        assert_eq!(audio.bytes().await.unwrap().as_ref(), FAKE_MP3);

        // Messaging channels never synthesize.
        let sms: Value = server
            .message("sms", "+919000000007", "how to open a bank account")
            .await
            .json()
            .await
            .unwrap();
        assert!(sms["response"].is_string());
        assert_eq!(std::fs::read_dir(audio_dir.path()).unwrap().count(), 1);
    })
    .await
    .expect("test timed out");
}
