//! libSQL implementation of the async `Store` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::{
    ActionPlanRecord, Channel, Conversation, ConversationStatus, Domain, LiteracyLevel, Role,
    StoredMessage, User,
};
use crate::store::traits::Store;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn parse_json(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or(serde_json::Value::Null)
}

/// Classify a failed write. Uniqueness and foreign-key violations become
/// `Constraint` so callers can tell a lost race from a broken database.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") || message.contains("FOREIGN KEY constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

const USER_COLUMNS: &str = "id, phone_fingerprint, preferred_language, literacy_level, district, state, consent_given, created_at, last_active";

const CONVERSATION_COLUMNS: &str = "id, user_id, channel, status, started_at, ended_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, language, metadata, created_at";

const PLAN_COLUMNS: &str = "id, conversation_id, domain, steps, required_documents, eligibility_status, risk_alerts, created_at";

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let id: String = row.get(0)?;
    let literacy: String = row.get(3)?;
    let consent: i64 = row.get(6)?;
    let created: String = row.get(7)?;
    let last_active: String = row.get(8)?;

    Ok(User {
        id: parse_uuid(&id),
        phone_fingerprint: row.get(1)?,
        preferred_language: row.get(2)?,
        literacy_level: LiteracyLevel::from_db(&literacy),
        district: row.get::<String>(4).ok(),
        state: row.get::<String>(5).ok(),
        consent_given: consent != 0,
        created_at: parse_datetime(&created),
        last_active: parse_datetime(&last_active),
    })
}

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let channel: String = row.get(2)?;
    let status: String = row.get(3)?;
    let started: String = row.get(4)?;
    let ended: Option<String> = row.get::<String>(5).ok();

    Ok(Conversation {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        channel: channel.parse().unwrap_or(Channel::Web),
        status: ConversationStatus::from_db(&status),
        started_at: parse_datetime(&started),
        ended_at: ended.as_deref().map(parse_datetime),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let metadata: Option<String> = row.get::<String>(5).ok();
    let created: String = row.get(6)?;

    Ok(StoredMessage {
        id: parse_uuid(&id),
        conversation_id: parse_uuid(&conversation_id),
        role: Role::from_db(&role),
        content: row.get(3)?,
        language: row.get(4)?,
        metadata: metadata.as_deref().map(parse_json),
        created_at: parse_datetime(&created),
    })
}

fn row_to_plan(row: &libsql::Row) -> Result<ActionPlanRecord, libsql::Error> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let domain: String = row.get(2)?;
    let steps: String = row.get(3)?;
    let documents: String = row.get(4)?;
    let risks: String = row.get(6)?;
    let created: String = row.get(7)?;

    Ok(ActionPlanRecord {
        id: parse_uuid(&id),
        conversation_id: parse_uuid(&conversation_id),
        domain: Domain::from_label(&domain).unwrap_or(Domain::General),
        steps: parse_json(&steps),
        required_documents: parse_json(&documents),
        eligibility_status: row.get::<String>(5).ok(),
        risk_alerts: parse_json(&risks),
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("ping: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DatabaseError::Query(format!("ping: {e}")))?;
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone_fingerprint = ?1"),
                params![fingerprint],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_fingerprint: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| DatabaseError::Query(format!("user row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_fingerprint: {e}"))),
        }
    }

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    user.id.to_string(),
                    user.phone_fingerprint.clone(),
                    user.preferred_language.clone(),
                    user.literacy_level.as_str(),
                    opt_text(user.district.as_deref()),
                    opt_text(user.state.as_deref()),
                    i64::from(user.consent_given),
                    user.created_at.to_rfc3339(),
                    user.last_active.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_user", e))?;

        debug!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn touch_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET last_active = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_user: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".to_string(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn get_active_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_id = ?1 AND channel = ?2 AND status = 'active'"
                ),
                params![user_id.to_string(), channel.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_active_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let conversation = row_to_conversation(&row)
                    .map_err(|e| DatabaseError::Query(format!("conversation row parse: {e}")))?;
                Ok(Some(conversation))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_active_conversation: {e}"))),
        }
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    conversation.id.to_string(),
                    conversation.user_id.to_string(),
                    conversation.channel.as_str(),
                    conversation.status.as_str(),
                    conversation.started_at.to_rfc3339(),
                    opt_text(conversation.ended_at.map(|t| t.to_rfc3339()).as_deref()),
                ],
            )
            .await
            .map_err(|e| write_error("create_conversation", e))?;

        debug!(
            conversation_id = %conversation.id,
            channel = %conversation.channel,
            "Conversation created"
        );
        Ok(())
    }

    async fn close_conversation(&self, conversation_id: Uuid) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE conversations SET status = 'closed', ended_at = ?1
                 WHERE id = ?2 AND status = 'active'",
                params![Utc::now().to_rfc3339(), conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("close_conversation: {e}")))?;
        Ok(updated > 0)
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn append_message(&self, message: &StoredMessage) -> Result<(), DatabaseError> {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(format!("message metadata: {e}")))?;

        self.conn()
            .execute(
                &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.role.as_str(),
                    message.content.clone(),
                    message.language.clone(),
                    opt_text(metadata.as_deref()),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("append_message", e))?;

        debug!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            role = message.role.as_str(),
            "Message appended"
        );
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM (
                        SELECT {MESSAGE_COLUMNS}, rowid AS seq FROM messages
                        WHERE conversation_id = ?1
                        ORDER BY created_at DESC, rowid DESC
                        LIMIT ?2
                     ) ORDER BY created_at ASC, seq ASC"
                ),
                params![conversation_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            messages.push(
                row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("message row parse: {e}")))?,
            );
        }
        Ok(messages)
    }

    // ── Action plans ────────────────────────────────────────────────

    async fn append_action_plan(&self, plan: &ActionPlanRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO action_plans ({PLAN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    plan.id.to_string(),
                    plan.conversation_id.to_string(),
                    plan.domain.as_str(),
                    plan.steps.to_string(),
                    plan.required_documents.to_string(),
                    opt_text(plan.eligibility_status.as_deref()),
                    plan.risk_alerts.to_string(),
                    plan.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("append_action_plan", e))?;

        debug!(plan_id = %plan.id, domain = %plan.domain, "Action plan stored");
        Ok(())
    }

    async fn list_action_plans(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ActionPlanRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM action_plans
                     WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_action_plans: {e}")))?;

        let mut plans = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_action_plans: {e}")))?
        {
            plans.push(
                row_to_plan(&row)
                    .map_err(|e| DatabaseError::Query(format!("plan row parse: {e}")))?,
            );
        }
        Ok(plans)
    }
}
