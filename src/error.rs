//! Error types for the gateway.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// True when the store rejected a write because of a uniqueness constraint.
    pub fn is_constraint(&self) -> bool {
        matches!(self, DatabaseError::Constraint(_))
    }
}

/// Outbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport {name} is not configured")]
    Disabled { name: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Call to {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

/// Speech synthesis errors. Logged, never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech request failed: {0}")]
    Http(String),

    #[error("Speech provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Speech provider returned no audio")]
    EmptyAudio,

    #[error("Failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Field encryption errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Errors raised while orchestrating an inbound message.
///
/// Only `Persistence` reaches the caller as a hard failure. The degraded
/// variants are logged and replaced by deterministic fallbacks.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    AdmissionDenied { retry_after_secs: u64 },

    #[error("Concurrent creation of {entity} could not be resolved: {reason}")]
    IdentityConflict { entity: String, reason: String },

    #[error("Intent classification degraded: {0}")]
    ClassificationDegraded(String),

    #[error("Plan generation degraded: {0}")]
    PlanGenerationDegraded(String),

    #[error("Response generation degraded: {0}")]
    ResponseDegraded(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Background task failed: {0}")]
    Task(String),
}
