use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::comments::registry::EntityRegistry;
use crate::comments::repository::{CommentRepository, RepositoryError};
use crate::domain::comments::{Comment, CommentTarget, EntityKind, NewComment};
use crate::types::{CommentId, EntityId, UserId};

#[derive(Debug, Error)]
pub enum CommentStoreError {
    #[error("unknown commentable type: {0}")]
    UnknownEntityType(String),
    #[error("no {kind} matches key {key:?}")]
    NotFound { kind: EntityKind, key: String },
    #[error("key {key:?} matches {matches} {kind} entries")]
    AmbiguousTarget {
        kind: EntityKind,
        key: String,
        matches: usize,
    },
    #[error("parent comment {parent} belongs to another target")]
    ParentTargetMismatch { parent: CommentId },
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Whether a reply must share its parent's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentPolicy {
    #[default]
    SameTarget,
    /// Accept any existing parent regardless of what it is attached to.
    Permissive,
}

impl ParentPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "same_target" | "same-target" => Some(Self::SameTarget),
            "permissive" => Some(Self::Permissive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SameTarget => "same_target",
            Self::Permissive => "permissive",
        }
    }
}

pub struct CommentStore {
    repo: Arc<dyn CommentRepository>,
    registry: EntityRegistry,
    parent_policy: ParentPolicy,
}

impl CommentStore {
    pub fn new(repo: Arc<dyn CommentRepository>, registry: EntityRegistry) -> Self {
        Self {
            repo,
            registry,
            parent_policy: ParentPolicy::default(),
        }
    }

    pub fn with_parent_policy(mut self, policy: ParentPolicy) -> Self {
        self.parent_policy = policy;
        self
    }

    pub fn parent_policy(&self) -> ParentPolicy {
        self.parent_policy
    }

    pub fn registered_kinds(&self) -> Vec<EntityKind> {
        self.registry.kinds()
    }

    pub async fn list_roots(&self) -> Result<Vec<Comment>, CommentStoreError> {
        Ok(self.repo.list_roots().await?)
    }

    pub async fn list_roots_for_entity(
        &self,
        type_name: &str,
        entity_id: EntityId,
    ) -> Result<Vec<Comment>, CommentStoreError> {
        let target = self.target_for(type_name, entity_id)?;
        Ok(self.repo.list_roots_for(target).await?)
    }

    pub async fn count_for_entity(
        &self,
        type_name: &str,
        entity_id: EntityId,
    ) -> Result<i64, CommentStoreError> {
        let target = self.target_for(type_name, entity_id)?;
        Ok(self.repo.count_for(target).await?)
    }

    /// Resolves `type_name` and `key` to exactly one entity and attaches a new
    /// comment to it, stamped with the current time at microsecond precision
    /// so the returned comment matches what storage reads back.
    pub async fn create_comment(
        &self,
        type_name: &str,
        key: &str,
        content: &str,
        author: UserId,
        parent: Option<CommentId>,
    ) -> Result<Comment, CommentStoreError> {
        let kind = self.kind_for(type_name)?;
        let resolver = self
            .registry
            .resolver(kind)
            .ok_or_else(|| CommentStoreError::UnknownEntityType(type_name.trim().to_string()))?;
        let matches = resolver.find_by_natural_key(key).await?;
        let entity_id = match matches.as_slice() {
            [] => {
                debug!(%kind, key, "comment target not found");
                return Err(CommentStoreError::NotFound {
                    kind,
                    key: key.to_string(),
                });
            }
            [id] => *id,
            _ => {
                debug!(%kind, key, matches = matches.len(), "comment target is ambiguous");
                return Err(CommentStoreError::AmbiguousTarget {
                    kind,
                    key: key.to_string(),
                    matches: matches.len(),
                });
            }
        };
        let target = CommentTarget::new(kind, entity_id);
        if let Some(parent_id) = parent {
            self.check_parent(parent_id, target).await?;
        }

        let comment = self
            .repo
            .insert(NewComment {
                author,
                target,
                parent,
                content: content.to_string(),
                created_at: Utc::now().trunc_subsecs(6),
            })
            .await?;
        info!(
            comment_id = %comment.id,
            %target,
            parent = ?comment.parent,
            author = %comment.author,
            "comment created"
        );
        Ok(comment)
    }

    pub async fn list_children(
        &self,
        comment_id: CommentId,
    ) -> Result<Vec<Comment>, CommentStoreError> {
        Ok(self.repo.list_children(comment_id).await?)
    }

    pub async fn count_children(&self, comment_id: CommentId) -> Result<i64, CommentStoreError> {
        Ok(self.repo.count_children(comment_id).await?)
    }

    pub async fn find(&self, comment_id: CommentId) -> Result<Option<Comment>, CommentStoreError> {
        Ok(self.repo.find(comment_id).await?)
    }

    pub fn is_root(comment: &Comment) -> bool {
        comment.is_root()
    }

    fn kind_for(&self, type_name: &str) -> Result<EntityKind, CommentStoreError> {
        self.registry
            .kind_for(type_name)
            .ok_or_else(|| CommentStoreError::UnknownEntityType(type_name.trim().to_string()))
    }

    /// Maps a type name and id to a target of a registered kind.
    pub fn target_for(
        &self,
        type_name: &str,
        entity_id: EntityId,
    ) -> Result<CommentTarget, CommentStoreError> {
        Ok(CommentTarget::new(self.kind_for(type_name)?, entity_id))
    }

    // A missing parent is left to the storage foreign key.
    async fn check_parent(
        &self,
        parent_id: CommentId,
        target: CommentTarget,
    ) -> Result<(), CommentStoreError> {
        if self.parent_policy == ParentPolicy::Permissive {
            return Ok(());
        }
        match self.repo.find(parent_id).await? {
            Some(parent) if parent.target != target => {
                Err(CommentStoreError::ParentTargetMismatch { parent: parent_id })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comments::memory::{MemoryCommentRepository, MemoryEntityResolver};

    struct Fixture {
        repo: Arc<MemoryCommentRepository>,
        store: CommentStore,
    }

    fn fixture(policy: ParentPolicy) -> Fixture {
        let repo = Arc::new(MemoryCommentRepository::new());
        let posts = MemoryEntityResolver::with_entries(
            EntityKind::Post,
            [("hello-world", 7), ("second-post", 8), ("dup", 9), ("dup", 10)],
        );
        let registry = EntityRegistry::new().register(Arc::new(posts));
        let store = CommentStore::new(repo.clone(), registry).with_parent_policy(policy);
        Fixture { repo, store }
    }

    #[tokio::test]
    async fn create_root_comment_on_unique_slug() {
        let fx = fixture(ParentPolicy::SameTarget);
        let before = Utc::now().trunc_subsecs(6);
        let comment = fx
            .store
            .create_comment("post", "hello-world", "nice post", UserId(42), None)
            .await
            .unwrap();
        let after = Utc::now();

        assert_eq!(comment.target, CommentTarget::new(EntityKind::Post, EntityId(7)));
        assert_eq!(comment.target.kind.as_str(), "post");
        assert_eq!(comment.author, UserId(42));
        assert_eq!(comment.content, "nice post");
        assert!(comment.parent.is_none());
        assert!(CommentStore::is_root(&comment));
        assert!(comment.created_at >= before && comment.created_at <= after);
    }

    #[tokio::test]
    async fn created_timestamp_survives_read_back() {
        let fx = fixture(ParentPolicy::SameTarget);
        let created = fx
            .store
            .create_comment("post", "hello-world", "nice post", UserId(42), None)
            .await
            .unwrap();
        assert_eq!(created.created_at.timestamp_subsec_nanos() % 1_000, 0);

        let found = fx.store.find(created.id).await.unwrap().unwrap();
        assert_eq!(found.created_at, created.created_at);
        let listed = fx.store.list_roots().await.unwrap();
        assert_eq!(listed[0].created_at, created.created_at);
    }

    #[tokio::test]
    async fn unknown_type_creates_nothing() {
        let fx = fixture(ParentPolicy::SameTarget);
        let err = fx
            .store
            .create_comment("article", "hello-world", "nice post", UserId(42), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentStoreError::UnknownEntityType(name) if name == "article"));

        // Parses as a kind but has no resolver registered.
        let err = fx
            .store
            .create_comment("profile", "alice", "hi", UserId(42), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommentStoreError::UnknownEntityType(_)));
        assert!(fx.repo.is_empty().await);
    }

    #[tokio::test]
    async fn missing_and_ambiguous_keys_are_distinguished() {
        let fx = fixture(ParentPolicy::SameTarget);
        let missing = fx
            .store
            .create_comment("post", "nope", "x", UserId(1), None)
            .await
            .unwrap_err();
        assert!(matches!(missing, CommentStoreError::NotFound { kind: EntityKind::Post, .. }));

        let ambiguous = fx
            .store
            .create_comment("post", "dup", "x", UserId(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            ambiguous,
            CommentStoreError::AmbiguousTarget { matches: 2, .. }
        ));
        assert!(fx.repo.is_empty().await);
    }

    #[tokio::test]
    async fn replies_are_children_not_roots() {
        let fx = fixture(ParentPolicy::SameTarget);
        let root = fx
            .store
            .create_comment("post", "hello-world", "root", UserId(1), None)
            .await
            .unwrap();
        let first = fx
            .store
            .create_comment("post", "hello-world", "first", UserId(2), Some(root.id))
            .await
            .unwrap();
        let second = fx
            .store
            .create_comment("post", "hello-world", "second", UserId(3), Some(root.id))
            .await
            .unwrap();

        assert!(!first.is_root());
        let children = fx.store.list_children(root.id).await.unwrap();
        let ids: Vec<CommentId> = children.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let roots = fx
            .store
            .list_roots_for_entity("post", EntityId(7))
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);
        assert!(roots.iter().all(Comment::is_root));

        assert_eq!(fx.store.count_for_entity("post", EntityId(7)).await.unwrap(), 3);
        assert_eq!(fx.store.count_children(root.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn roots_are_listed_newest_first_per_entity() {
        let fx = fixture(ParentPolicy::SameTarget);
        let older = fx
            .store
            .create_comment("post", "hello-world", "older", UserId(1), None)
            .await
            .unwrap();
        let other = fx
            .store
            .create_comment("post", "second-post", "elsewhere", UserId(1), None)
            .await
            .unwrap();
        let newer = fx
            .store
            .create_comment("post", "hello-world", "newer", UserId(1), None)
            .await
            .unwrap();

        let roots = fx
            .store
            .list_roots_for_entity("post", EntityId(7))
            .await
            .unwrap();
        let ids: Vec<CommentId> = roots.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let all = fx.store.list_roots().await.unwrap();
        let ids: Vec<CommentId> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, other.id, older.id]);
        assert_eq!(fx.store.count_for_entity("post", EntityId(8)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn listing_an_unregistered_type_fails() {
        let fx = fixture(ParentPolicy::SameTarget);
        let err = fx
            .store
            .list_roots_for_entity("profile", EntityId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentStoreError::UnknownEntityType(_)));
        let err = fx.store.count_for_entity("video", EntityId(1)).await.unwrap_err();
        assert!(matches!(err, CommentStoreError::UnknownEntityType(_)));
    }

    #[tokio::test]
    async fn same_target_policy_rejects_foreign_parent() {
        let fx = fixture(ParentPolicy::SameTarget);
        let root = fx
            .store
            .create_comment("post", "hello-world", "root", UserId(1), None)
            .await
            .unwrap();
        let err = fx
            .store
            .create_comment("post", "second-post", "reply", UserId(1), Some(root.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentStoreError::ParentTargetMismatch { parent } if parent == root.id));
        assert_eq!(fx.repo.len().await, 1);
    }

    #[tokio::test]
    async fn permissive_policy_accepts_foreign_parent() {
        let fx = fixture(ParentPolicy::Permissive);
        let root = fx
            .store
            .create_comment("post", "hello-world", "root", UserId(1), None)
            .await
            .unwrap();
        let reply = fx
            .store
            .create_comment("post", "second-post", "reply", UserId(1), Some(root.id))
            .await
            .unwrap();
        assert_eq!(reply.target.id, EntityId(8));
        assert_eq!(fx.store.list_children(root.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dangling_parent_surfaces_storage_error() {
        let fx = fixture(ParentPolicy::SameTarget);
        let err = fx
            .store
            .create_comment("post", "hello-world", "reply", UserId(1), Some(CommentId(404)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommentStoreError::Storage(RepositoryError::Constraint(_))
        ));
    }

    #[test]
    fn parent_policy_parses_config_values() {
        assert_eq!(ParentPolicy::parse("same_target"), Some(ParentPolicy::SameTarget));
        assert_eq!(ParentPolicy::parse(" Permissive "), Some(ParentPolicy::Permissive));
        assert_eq!(ParentPolicy::parse("strict"), None);
        assert_eq!(
            ParentPolicy::parse(ParentPolicy::SameTarget.as_str()),
            Some(ParentPolicy::SameTarget)
        );
    }
}
