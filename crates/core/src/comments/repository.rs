use async_trait::async_trait;
use thiserror::Error;

use crate::domain::comments::{Comment, CommentTarget, NewComment};
use crate::types::CommentId;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A foreign key or other integrity constraint rejected the write,
    /// e.g. a dangling parent or author reference.
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("invalid stored value: {0}")]
    InvalidRow(String),
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Persistence for comments. Implementations must honor the listing orders:
/// roots newest first, children oldest first, ties broken by id.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert(&self, comment: NewComment) -> Result<Comment, RepositoryError>;

    async fn find(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError>;

    async fn list_roots(&self) -> Result<Vec<Comment>, RepositoryError>;

    async fn list_roots_for(&self, target: CommentTarget) -> Result<Vec<Comment>, RepositoryError>;

    /// Roots and replies attached to `target`.
    async fn count_for(&self, target: CommentTarget) -> Result<i64, RepositoryError>;

    async fn list_children(&self, parent: CommentId) -> Result<Vec<Comment>, RepositoryError>;

    async fn count_children(&self, parent: CommentId) -> Result<i64, RepositoryError>;
}
