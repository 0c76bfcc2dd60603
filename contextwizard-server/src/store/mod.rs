//! Storage for pending comments: short-lived records keyed by an opaque code,
//! polled later for the ones whose expiry has passed.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentType {
    Inline,
    Thread,
}

impl CommentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentType::Inline => "inline",
            CommentType::Thread => "thread",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inline" => Some(CommentType::Inline),
            "thread" => Some(CommentType::Thread),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingComment {
    pub code: String,
    pub comment_id: u64,
    pub comment_type: CommentType,
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    pub installation_id: u64,
    /// Unix seconds.
    pub expires_at: i64,
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("pending comment '{0}' already exists")]
    Conflict(String),

    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("corrupted {0} in pending comment store")]
    Corruption(String),
}

impl RepositoryError {
    pub fn storage(operation: &str, message: impl Into<String>) -> Self {
        RepositoryError::Storage {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn corruption(what: &str) -> Self {
        RepositoryError::Corruption(what.to_string())
    }
}

#[async_trait]
pub trait PendingCommentRepository: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the code is taken.
    async fn create(&self, comment: PendingComment) -> Result<(), RepositoryError>;

    async fn get(&self, code: &str) -> Result<Option<PendingComment>, RepositoryError>;

    /// Returns whether a record was removed.
    async fn delete(&self, code: &str) -> Result<bool, RepositoryError>;

    /// Records with `expires_at <= now`, ordered by expiry then code.
    async fn list_expired(&self, now: i64) -> Result<Vec<PendingComment>, RepositoryError>;
}
