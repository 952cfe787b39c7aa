//! In-process backend with the same ordering and foreign-key behavior as the
//! Postgres one.

use std::cmp::Reverse;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::comments::registry::EntityResolver;
use crate::comments::repository::{CommentRepository, RepositoryError};
use crate::domain::comments::{Comment, CommentTarget, EntityKind, NewComment};
use crate::types::{CommentId, EntityId};

#[derive(Debug, Default)]
pub struct MemoryCommentRepository {
    inner: RwLock<MemoryComments>,
}

#[derive(Debug, Default)]
struct MemoryComments {
    next_id: i64,
    rows: Vec<Comment>,
}

impl MemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn newest_first(mut rows: Vec<Comment>) -> Vec<Comment> {
    rows.sort_by_key(|comment| Reverse((comment.created_at, comment.id)));
    rows
}

fn oldest_first(mut rows: Vec<Comment>) -> Vec<Comment> {
    rows.sort_by_key(|comment| (comment.created_at, comment.id));
    rows
}

fn to_count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

#[async_trait]
impl CommentRepository for MemoryCommentRepository {
    async fn insert(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let mut inner = self.inner.write().await;
        if let Some(parent) = comment.parent {
            if !inner.rows.iter().any(|row| row.id == parent) {
                return Err(RepositoryError::Constraint(format!(
                    "parent comment {parent} does not exist"
                )));
            }
        }
        inner.next_id += 1;
        let stored = comment.into_comment(CommentId(inner.next_id));
        inner.rows.push(stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.iter().find(|row| row.id == id).cloned())
    }

    async fn list_roots(&self) -> Result<Vec<Comment>, RepositoryError> {
        let inner = self.inner.read().await;
        let rows = inner.rows.iter().filter(|row| row.is_root()).cloned().collect();
        Ok(newest_first(rows))
    }

    async fn list_roots_for(&self, target: CommentTarget) -> Result<Vec<Comment>, RepositoryError> {
        let inner = self.inner.read().await;
        let rows = inner
            .rows
            .iter()
            .filter(|row| row.is_root() && row.target == target)
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn count_for(&self, target: CommentTarget) -> Result<i64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(to_count(
            inner.rows.iter().filter(|row| row.target == target).count(),
        ))
    }

    async fn list_children(&self, parent: CommentId) -> Result<Vec<Comment>, RepositoryError> {
        let inner = self.inner.read().await;
        let rows = inner
            .rows
            .iter()
            .filter(|row| row.parent == Some(parent))
            .cloned()
            .collect();
        Ok(oldest_first(rows))
    }

    async fn count_children(&self, parent: CommentId) -> Result<i64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(to_count(
            inner
                .rows
                .iter()
                .filter(|row| row.parent == Some(parent))
                .count(),
        ))
    }
}

/// Natural-key table for one entity kind. Keys need not be unique, which lets
/// callers exercise ambiguous lookups.
#[derive(Debug)]
pub struct MemoryEntityResolver {
    kind: EntityKind,
    entries: Vec<(String, EntityId)>,
}

impl MemoryEntityResolver {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn with_entries<I, K>(kind: EntityKind, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, id)| (key.into(), EntityId(id)))
            .collect();
        Self { kind, entries }
    }
}

#[async_trait]
impl EntityResolver for MemoryEntityResolver {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn find_by_natural_key(&self, key: &str) -> Result<Vec<EntityId>, RepositoryError> {
        Ok(self
            .entries
            .iter()
            .filter(|(candidate, _)| candidate == key)
            .map(|(_, id)| *id)
            .collect())
    }
}
