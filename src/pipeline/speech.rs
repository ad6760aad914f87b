//! Optional speech synthesis for web replies.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SpeechConfig;
use crate::error::SpeechError;

/// Longest input the speech endpoint accepts, in characters.
const MAX_SPEECH_CHARS: usize = 4096;

/// Produces an audio rendering of reply text.
///
/// Audio is best effort: implementations log their own failures and return
/// `None`, and the reply goes out without an audio reference.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and return the file name under the audio directory.
    async fn synthesize(&self, text: &str, language: &str) -> Option<String>;
}

/// Synthesizer used when no speech backend is configured.
pub struct NoSpeech;

#[async_trait]
impl SpeechSynthesizer for NoSpeech {
    async fn synthesize(&self, _text: &str, _language: &str) -> Option<String> {
        None
    }
}

/// OpenAI-compatible `/v1/audio/speech` client that writes `<uuid>.mp3`
/// files into the served audio directory.
pub struct HttpSpeech {
    config: SpeechConfig,
    audio_dir: PathBuf,
    client: reqwest::Client,
}

impl HttpSpeech {
    pub fn new(config: SpeechConfig, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            audio_dir: audio_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.config.api_base.trim_end_matches('/'))
    }

    async fn fetch_and_store(&self, text: &str) -> Result<String, SpeechError> {
        let input: String = text.chars().take(MAX_SPEECH_CHARS).collect();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(&json!({
                "model": self.config.model,
                "voice": self.config.voice,
                "input": input,
                "response_format": "mp3",
            }))
            .send()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Http(e.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }

        let file_name = format!("{}.mp3", Uuid::new_v4());
        tokio::fs::write(self.audio_dir.join(&file_name), &audio).await?;
        Ok(file_name)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Option<String> {
        match self.fetch_and_store(text).await {
            Ok(file_name) => {
                debug!(file = %file_name, language, "Generated audio file");
                Some(file_name)
            }
            Err(e) => {
                warn!(error = %e, language, "Speech synthesis failed, reply sent without audio");
                None
            }
        }
    }
}

/// HTTP synthesis when configured, otherwise no audio.
pub fn create_synthesizer(
    config: Option<&SpeechConfig>,
    audio_dir: &Path,
) -> Arc<dyn SpeechSynthesizer> {
    match config {
        Some(config) => {
            info!(model = %config.model, "Speech synthesis enabled");
            Arc::new(HttpSpeech::new(config.clone(), audio_dir))
        }
        None => Arc::new(NoSpeech),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::post,
    };
    use secrecy::SecretString;

    const FAKE_MP3: &[u8] = b"ID3\x03\x00fake-audio";

    type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn speech(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer tts-key") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        seen.lock().unwrap().push(body);
        ([(header::CONTENT_TYPE, "audio/mpeg")], FAKE_MP3).into_response()
    }

    async fn stub_speech_server() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/v1/audio/speech", post(speech))
            .with_state(Arc::clone(&seen));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (base, seen)
    }

    #[tokio::test]
    async fn writes_mp3_into_audio_dir() {
        let (base, seen) = stub_speech_server().await;
        let dir = tempfile::tempdir().unwrap();
        let tts = HttpSpeech::new(
            SpeechConfig::new(base, SecretString::from("tts-key")),
            dir.path(),
        );

        let file = tts.synthesize("Visit your bank branch.", "en").await.unwrap();
        assert!(file.ends_with(".mp3"));
        assert!(Uuid::parse_str(file.trim_end_matches(".mp3")).is_ok());
        assert_eq!(std::fs::read(dir.path().join(&file)).unwrap(), FAKE_MP3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["input"], "Visit your bank branch.");
        assert_eq!(seen[0]["model"], "tts-1");
    }

    #[tokio::test]
    async fn long_text_is_capped() {
        let (base, seen) = stub_speech_server().await;
        let dir = tempfile::tempdir().unwrap();
        let tts = HttpSpeech::new(
            SpeechConfig::new(base, SecretString::from("tts-key")),
            dir.path(),
        );

        tts.synthesize(&"क".repeat(5000), "hi").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["input"].as_str().unwrap().chars().count(), MAX_SPEECH_CHARS);
    }

    #[tokio::test]
    async fn provider_failure_yields_no_audio() {
        let (base, _) = stub_speech_server().await;
        let dir = tempfile::tempdir().unwrap();
        let tts = HttpSpeech::new(
            SpeechConfig::new(base, SecretString::from("wrong-key")),
            dir.path(),
        );

        assert!(tts.synthesize("hello", "en").await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_synthesizer_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let tts = create_synthesizer(None, dir.path());
        assert!(tts.synthesize("hello", "en").await.is_none());
    }
}
