//! Append-only record of conversation turns and generated plans.
//!
//! Turn content is encrypted before it reaches the store and decrypted on
//! the way out. Nothing here ever writes plaintext.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::FieldCipher;
use crate::error::PipelineError;
use crate::llm::HistoryTurn;
use crate::pipeline::plan::ActionPlan;
use crate::store::{ActionPlanRecord, Domain, Role, Store, StoredMessage};

pub struct MessageLedger {
    store: Arc<dyn Store>,
    cipher: Arc<FieldCipher>,
}

impl MessageLedger {
    pub fn new(store: Arc<dyn Store>, cipher: Arc<FieldCipher>) -> Self {
        Self { store, cipher }
    }

    pub async fn append(
        &self,
        conversation_id: Uuid,
        role: Role,
        text: &str,
        language: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<StoredMessage, PipelineError> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: self.cipher.encrypt(text)?,
            language: language.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.store.append_message(&message).await?;
        Ok(message)
    }

    /// Recent turns, oldest first. Turns that fail to decrypt are skipped.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<HistoryTurn>, PipelineError> {
        let messages = self.store.list_messages(conversation_id, limit).await?;
        Ok(messages
            .into_iter()
            .filter_map(|m| match self.cipher.decrypt(&m.content) {
                Ok(text) => Some(HistoryTurn { role: m.role, text }),
                Err(e) => {
                    warn!(message_id = %m.id, error = %e, "Skipping undecryptable turn");
                    None
                }
            })
            .collect())
    }

    pub async fn record_plan(
        &self,
        conversation_id: Uuid,
        domain: Domain,
        plan: &ActionPlan,
    ) -> Result<ActionPlanRecord, PipelineError> {
        let record = plan.to_record(conversation_id, domain);
        self.store.append_action_plan(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Channel, Conversation, LibSqlBackend, User};
    use secrecy::SecretString;

    async fn setup() -> (Arc<dyn Store>, MessageLedger, Uuid) {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let cipher = Arc::new(FieldCipher::new(&SecretString::from("ledger-key")).unwrap());
        let user = User::new("fp", "en");
        store.create_user(&user).await.unwrap();
        let conversation = Conversation::new(user.id, Channel::Web);
        store.create_conversation(&conversation).await.unwrap();
        let ledger = MessageLedger::new(Arc::clone(&store), cipher);
        (store, ledger, conversation.id)
    }

    #[tokio::test]
    async fn content_is_stored_encrypted() {
        let (store, ledger, conversation_id) = setup().await;
        ledger
            .append(conversation_id, Role::User, "I need a crop loan", "en", None)
            .await
            .unwrap();

        let raw = store.list_messages(conversation_id, 10).await.unwrap();
        assert_eq!(raw.len(), 1);
        assert!(!raw[0].content.contains("crop"));

        let history = ledger.history(conversation_id, 10).await.unwrap();
        assert_eq!(history[0].text, "I need a crop loan");
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn history_skips_foreign_ciphertext() {
        let (store, ledger, conversation_id) = setup().await;
        ledger
            .append(conversation_id, Role::User, "hello", "en", None)
            .await
            .unwrap();

        let foreign = FieldCipher::new(&SecretString::from("other-key")).unwrap();
        store
            .append_message(&StoredMessage {
                id: Uuid::new_v4(),
                conversation_id,
                role: Role::Assistant,
                content: foreign.encrypt("unreadable").unwrap(),
                language: "en".into(),
                metadata: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let history = ledger.history(conversation_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hello");
    }

    #[tokio::test]
    async fn plan_recorded_against_conversation() {
        let (store, ledger, conversation_id) = setup().await;
        ledger
            .record_plan(conversation_id, Domain::Health, &ActionPlan::fallback())
            .await
            .unwrap();
        let plans = store.list_action_plans(conversation_id).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].domain, Domain::Health);
    }
}
