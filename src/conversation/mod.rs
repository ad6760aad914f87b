//! Conversation state: who is talking and what has been said.

pub mod identity;
pub mod ledger;

pub use identity::IdentityResolver;
pub use ledger::MessageLedger;

/// Leading characters of a phone fingerprint, safe to log.
pub fn fingerprint_prefix(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}
