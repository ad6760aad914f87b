//! Resolve the user and active conversation behind an inbound message.
//!
//! Both lookups are get-or-create. Two requests from the same phone can race
//! to create the same row; the store's uniqueness constraints decide the
//! winner and the loser re-reads what the winner wrote.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversation::fingerprint_prefix;
use crate::error::PipelineError;
use crate::store::{Channel, Conversation, Store, User};

pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_or_create_user(
        &self,
        fingerprint: &str,
        default_language: &str,
    ) -> Result<User, PipelineError> {
        if let Some(user) = self.store.get_user_by_fingerprint(fingerprint).await? {
            return Ok(user);
        }

        let user = User::new(fingerprint, default_language);
        match self.store.create_user(&user).await {
            Ok(()) => {
                info!(
                    fingerprint = fingerprint_prefix(fingerprint),
                    user_id = %user.id,
                    "New user registered"
                );
                Ok(user)
            }
            Err(e) if e.is_constraint() => {
                debug!(
                    fingerprint = fingerprint_prefix(fingerprint),
                    "Lost user creation race, re-reading"
                );
                self.store
                    .get_user_by_fingerprint(fingerprint)
                    .await?
                    .ok_or_else(|| PipelineError::IdentityConflict {
                        entity: "user".to_string(),
                        reason: e.to_string(),
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_or_create_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<Conversation, PipelineError> {
        if let Some(conversation) = self.store.get_active_conversation(user_id, channel).await? {
            return Ok(conversation);
        }

        let conversation = Conversation::new(user_id, channel);
        match self.store.create_conversation(&conversation).await {
            Ok(()) => {
                debug!(
                    conversation_id = %conversation.id,
                    channel = %channel,
                    "Conversation started"
                );
                Ok(conversation)
            }
            Err(e) if e.is_constraint() => self
                .store
                .get_active_conversation(user_id, channel)
                .await?
                .ok_or_else(|| PipelineError::IdentityConflict {
                    entity: "conversation".to_string(),
                    reason: e.to_string(),
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Record activity for a user.
    pub async fn touch(&self, user_id: Uuid) -> Result<(), PipelineError> {
        self.store.touch_user(user_id, Utc::now()).await?;
        Ok(())
    }

    /// Close a conversation so the next message starts a new one.
    pub async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool, PipelineError> {
        let closed = self.store.close_conversation(conversation_id).await?;
        if closed {
            info!(conversation_id = %conversation_id, "Conversation closed");
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn resolver() -> Arc<IdentityResolver> {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        Arc::new(IdentityResolver::new(store))
    }

    #[tokio::test]
    async fn user_is_created_once() {
        let r = resolver().await;
        let first = r.get_or_create_user("fp-a", "hi").await.unwrap();
        let second = r.get_or_create_user("fp-a", "en").await.unwrap();
        assert_eq!(first.id, second.id);
        // Language is only set on creation.
        assert_eq!(second.preferred_language, "hi");
    }

    #[tokio::test]
    async fn concurrent_user_creation_converges() {
        let r = resolver().await;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.get_or_create_user("fp-race", "en").await })
            })
            .collect();

        let ids: Vec<Uuid> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|h| h.unwrap().unwrap().id)
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn concurrent_conversation_creation_yields_one_active() {
        let r = resolver().await;
        let user = r.get_or_create_user("fp-conv", "en").await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = Arc::clone(&r);
                let user_id = user.id;
                tokio::spawn(async move {
                    r.get_or_create_conversation(user_id, Channel::Whatsapp).await
                })
            })
            .collect();

        let ids: Vec<Uuid> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|h| h.unwrap().unwrap().id)
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]));

        let other = r
            .get_or_create_conversation(user.id, Channel::Sms)
            .await
            .unwrap();
        assert_ne!(other.id, ids[0]);
    }

    #[tokio::test]
    async fn closed_conversation_is_replaced() {
        let r = resolver().await;
        let user = r.get_or_create_user("fp-close", "en").await.unwrap();
        let first = r.get_or_create_conversation(user.id, Channel::Sms).await.unwrap();

        assert!(r.close_conversation(first.id).await.unwrap());
        let next = r.get_or_create_conversation(user.id, Channel::Sms).await.unwrap();
        assert_ne!(first.id, next.id);
    }

    #[tokio::test]
    async fn unknown_user_conversation_is_an_error() {
        let r = resolver().await;
        let result = r.get_or_create_conversation(Uuid::new_v4(), Channel::Web).await;
        assert!(matches!(result, Err(PipelineError::IdentityConflict { .. })));
    }
}
