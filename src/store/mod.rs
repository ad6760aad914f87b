//! Persistence layer: libSQL-backed storage for users, conversations,
//! messages and action plans.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use models::{
    ActionPlanRecord, Channel, Conversation, ConversationStatus, Domain, LiteracyLevel, Role,
    StoredMessage, User,
};
pub use traits::Store;
