//! Outbound transports and Twilio wire formats.

pub mod transport;
pub mod twilio;
pub mod twiml;

pub use transport::{DisabledTransport, MessageStatus, NumberLookup, SendReceipt, Transport};
pub use twilio::TwilioTransport;
pub use twiml::Twiml;

use std::sync::Arc;

use crate::config::TwilioConfig;

/// Twilio when credentials are present, otherwise a transport that refuses.
pub fn create_transport(config: Option<&TwilioConfig>) -> Arc<dyn Transport> {
    match config {
        Some(config) => Arc::new(TwilioTransport::new(config.clone())),
        None => {
            tracing::warn!("Twilio credentials not provided; outbound messaging disabled");
            Arc::new(DisabledTransport)
        }
    }
}
