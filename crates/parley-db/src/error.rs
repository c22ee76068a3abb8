//! Error taxonomy for persistence and the messaging core.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    /// SQLite failure (connectivity, I/O, constraint)
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored record could not be decoded
    #[error("corrupt record at {key}: {source}")]
    CorruptData {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Membership check failed
    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    AccessDenied { user_id: Uuid, conversation_id: Uuid },

    #[error("invalid input: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
