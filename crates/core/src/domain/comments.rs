use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CommentId, EntityId, UserId};

/// Discriminator of a commentable entity type. `as_str` is the value stored in
/// `comments.target_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Profile,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Post, EntityKind::Profile];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Profile => "profile",
        }
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownEntityKind(value.trim().to_string()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic reference from a comment to the entity it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CommentTarget {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: EntityId,
}

impl CommentTarget {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub target: CommentTarget,
    pub parent: Option<CommentId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A comment that has not been persisted yet; storage assigns the id.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub author: UserId,
    pub target: CommentTarget,
    pub parent: Option<CommentId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewComment {
    pub fn into_comment(self, id: CommentId) -> Comment {
        Comment {
            id,
            author: self.author,
            target: self.target,
            parent: self.parent,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub author: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reply_count: i64,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    pub fn leaf(comment: Comment, reply_count: i64) -> Self {
        Self {
            id: comment.id,
            author: comment.author,
            parent_id: comment.parent,
            content: comment.content,
            created_at: comment.created_at,
            reply_count,
            replies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    pub target: CommentTarget,
    pub total: i64,
    pub comments: Vec<CommentView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_case_insensitively() {
        assert_eq!("post".parse::<EntityKind>().unwrap(), EntityKind::Post);
        assert_eq!(" Profile ".parse::<EntityKind>().unwrap(), EntityKind::Profile);
    }

    #[test]
    fn entity_kind_rejects_unknown_names() {
        let err = "article".parse::<EntityKind>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntityKind(name) if name == "article"));
    }

    #[test]
    fn root_is_derived_from_parent() {
        let target = CommentTarget::new(EntityKind::Post, EntityId(1));
        let root = NewComment {
            author: UserId(1),
            target,
            parent: None,
            content: "root".to_string(),
            created_at: Utc::now(),
        }
        .into_comment(CommentId(1));
        let mut reply = root.clone();
        reply.id = CommentId(2);
        reply.parent = Some(root.id);
        assert!(root.is_root());
        assert!(!reply.is_root());
    }
}
