//! Sahaay gateway: multi-channel AI assistance over SMS, WhatsApp, voice and web.

pub mod api;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod crypto;
pub mod error;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod rate_limit;
pub mod safety;
pub mod store;
