//! Message pipeline: validation, identity, AI collaboration, rendering and
//! persistence for one inbound message at a time.

pub mod formatter;
pub mod orchestrator;
pub mod plan;
pub mod speech;
pub mod types;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use plan::ActionPlan;
pub use speech::{HttpSpeech, NoSpeech, SpeechSynthesizer, create_synthesizer};
pub use types::{Degraded, Delivery, InboundMessage, Outcome, Reply, Stage, apology};
