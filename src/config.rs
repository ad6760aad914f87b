//! Configuration types.
//!
//! Every section has a `Default` suitable for tests and a `from_env()`
//! constructor used by `main.rs` after `.env` has been loaded.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Secret used to derive the content cipher and phone fingerprints.
    pub encryption_key: SecretString,
    /// Language assumed when the caller gives none and detection is inconclusive.
    pub default_language: String,
    /// Language codes the gateway will accept from callers.
    pub supported_languages: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub ai: AiConfig,
    pub twilio: Option<TwilioConfig>,
    pub speech: Option<SpeechConfig>,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            encryption_key: SecretString::from("change-me"),
            default_language: "en".to_string(),
            supported_languages: parse_list("en,hi,bn,ta,te,mr,gu,kn,ml,pa,or,as"),
            rate_limit: RateLimitConfig::default(),
            ai: AiConfig::default(),
            twilio: None,
            speech: None,
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// `ENCRYPTION_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let encryption_key = std::env::var("ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ENCRYPTION_KEY".to_string()))?;
        if encryption_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ENCRYPTION_KEY".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port)?,
            encryption_key: SecretString::from(encryption_key),
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
            supported_languages: std::env::var("SUPPORTED_LANGUAGES")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.supported_languages),
            rate_limit: RateLimitConfig::from_env()?,
            ai: AiConfig::from_env()?,
            twilio: TwilioConfig::from_env(),
            speech: SpeechConfig::from_env()?,
            storage: StorageConfig::from_env(),
            logging: LoggingConfig::from_env(),
        })
    }

    /// Whether a language code is one the gateway accepts.
    pub fn is_supported_language(&self, code: &str) -> bool {
        self.supported_languages.iter().any(|l| l == code)
    }
}

/// Sliding-window admission limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per rolling 60 seconds.
    pub per_minute: u32,
    /// Requests allowed per rolling 3600 seconds.
    pub per_hour: u32,
    /// How often the idle-key sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1000,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.per_minute)?,
            per_hour: env_parse("RATE_LIMIT_PER_HOUR", defaults.per_hour)?,
            sweep_interval: Duration::from_secs(env_parse(
                "RATE_LIMIT_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
        })
    }
}

/// AI collaborator settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub backend: LlmBackend,
    /// None means the collaborator is not configured and every AI call degrades.
    pub api_key: Option<SecretString>,
    pub model: String,
    /// Upper bound on any single AI call.
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl AiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend = match std::env::var("AI_BACKEND") {
            Ok(raw) => raw.parse::<LlmBackend>().map_err(|message| ConfigError::InvalidValue {
                key: "AI_BACKEND".to_string(),
                message,
            })?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            backend,
            api_key: std::env::var("AI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            model: std::env::var("AI_MODEL").unwrap_or(defaults.model),
            timeout: Duration::from_secs(env_parse(
                "AI_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        })
    }
}

/// Twilio credentials. Absent when SMS/WhatsApp sending is disabled.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number in E.164 form.
    pub phone_number: String,
    /// API base URL, overridable for tests.
    pub api_base: String,
    /// Lookup API base URL.
    pub lookup_base: String,
}

impl TwilioConfig {
    /// Returns `None` unless both the account SID and auth token are set.
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok().filter(|s| !s.is_empty())?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            phone_number: std::env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            api_base: std::env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            lookup_base: std::env::var("TWILIO_LOOKUP_BASE")
                .unwrap_or_else(|_| "https://lookups.twilio.com".to_string()),
        })
    }
}

/// Text-to-speech endpoint for web reply audio. Absent when no key is set.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/speech` endpoint.
    pub api_base: String,
    pub api_key: SecretString,
    pub model: String,
    pub voice: String,
    pub timeout: Duration,
}

impl SpeechConfig {
    pub fn new(api_base: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = std::env::var("SPEECH_API_KEY").ok().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let api_base = std::env::var("SPEECH_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let defaults = Self::new(api_base, SecretString::from(api_key));

        Ok(Some(Self {
            model: std::env::var("SPEECH_MODEL").unwrap_or(defaults.model.clone()),
            voice: std::env::var("SPEECH_VOICE").unwrap_or(defaults.voice.clone()),
            timeout: Duration::from_secs(env_parse(
                "SPEECH_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            ..defaults
        }))
    }
}

/// Database and file storage locations.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// Root for generated media (audio files land under `audio/`).
    pub file_storage_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/sahaay.db"),
            file_storage_path: PathBuf::from("./storage"),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            file_storage_path: std::env::var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_storage_path),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the daily rolling log file.
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: std::env::var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or(defaults.level),
            directory: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
