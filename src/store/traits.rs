//! `Store` trait, the single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::models::{ActionPlanRecord, Channel, Conversation, StoredMessage, User};

/// Backend-agnostic store covering users, conversations, messages and plans.
///
/// Uniqueness of a user's phone fingerprint and of the active conversation
/// per (user, channel) is enforced by the backend. Inserts that would break
/// either return `DatabaseError::Constraint`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<User>, DatabaseError>;

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Bump `last_active` for a user.
    async fn touch_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    async fn get_active_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<Option<Conversation>, DatabaseError>;

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError>;

    /// Mark a conversation closed. Returns false if it was not active.
    async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    async fn append_message(&self, message: &StoredMessage) -> Result<(), DatabaseError>;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── Action plans ────────────────────────────────────────────────

    async fn append_action_plan(&self, plan: &ActionPlanRecord) -> Result<(), DatabaseError>;

    async fn list_action_plans(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ActionPlanRecord>, DatabaseError>;
}
