use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PendingComment, PendingCommentRepository, RepositoryError};

/// Pending comments held in a `HashMap`. Lost on restart.
#[derive(Default)]
pub struct InMemoryRepository {
    comments: RwLock<HashMap<String, PendingComment>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingCommentRepository for InMemoryRepository {
    async fn create(&self, comment: PendingComment) -> Result<(), RepositoryError> {
        let mut comments = self.comments.write().await;
        if comments.contains_key(&comment.code) {
            return Err(RepositoryError::Conflict(comment.code));
        }
        comments.insert(comment.code.clone(), comment);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<PendingComment>, RepositoryError> {
        Ok(self.comments.read().await.get(code).cloned())
    }

    async fn delete(&self, code: &str) -> Result<bool, RepositoryError> {
        Ok(self.comments.write().await.remove(code).is_some())
    }

    async fn list_expired(&self, now: i64) -> Result<Vec<PendingComment>, RepositoryError> {
        let comments = self.comments.read().await;
        let mut expired: Vec<PendingComment> = comments
            .values()
            .filter(|c| c.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(expired)
    }
}
