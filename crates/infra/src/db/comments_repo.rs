use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use marginalia_core::comments::{CommentRepository, RepositoryError};
use marginalia_core::domain::comments::{Comment, CommentTarget, EntityKind, NewComment};
use marginalia_core::types::{CommentId, EntityId, UserId};

use super::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PgCommentRepository {
    pool: PgPool,
}

impl PgCommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn insert(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO comments (
                author_id,
                target_type,
                target_id,
                parent_id,
                content,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(comment.author.get())
        .bind(comment.target.kind.as_str())
        .bind(comment.target.id.get())
        .bind(comment.parent.map(CommentId::get))
        .bind(&comment.content)
        .bind(comment.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_error)?;
        let mut stored = comment.into_comment(CommentId(id));
        // TIMESTAMPTZ keeps microseconds; report the value as stored.
        stored.created_at = created_at;
        Ok(stored)
    }

    async fn find(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, author_id, target_type, target_id, parent_id, content, created_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(map_comment).transpose()
    }

    async fn list_roots(&self) -> Result<Vec<Comment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, target_type, target_id, parent_id, content, created_at
            FROM comments
            WHERE parent_id IS NULL
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(map_comment).collect()
    }

    async fn list_roots_for(&self, target: CommentTarget) -> Result<Vec<Comment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, target_type, target_id, parent_id, content, created_at
            FROM comments
            WHERE target_type = $1
              AND target_id = $2
              AND parent_id IS NULL
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(map_comment).collect()
    }

    async fn count_for(&self, target: CommentTarget) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM comments
            WHERE target_type = $1 AND target_id = $2
            "#,
        )
        .bind(target.kind.as_str())
        .bind(target.id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.try_get("count").map_err(map_sqlx_error)
    }

    async fn list_children(&self, parent: CommentId) -> Result<Vec<Comment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, target_type, target_id, parent_id, content, created_at
            FROM comments
            WHERE parent_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(parent.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(map_comment).collect()
    }

    async fn count_children(&self, parent: CommentId) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM comments
            WHERE parent_id = $1
            "#,
        )
        .bind(parent.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.try_get("count").map_err(map_sqlx_error)
    }
}

fn map_comment(row: PgRow) -> Result<Comment, RepositoryError> {
    let target_type: String = row.try_get("target_type").map_err(map_sqlx_error)?;
    let kind = parse_target_type(&target_type)?;
    let parent_id: Option<i64> = row.try_get("parent_id").map_err(map_sqlx_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_error)?;
    Ok(Comment {
        id: CommentId(row.try_get("id").map_err(map_sqlx_error)?),
        author: UserId(row.try_get("author_id").map_err(map_sqlx_error)?),
        target: CommentTarget::new(
            kind,
            EntityId(row.try_get("target_id").map_err(map_sqlx_error)?),
        ),
        parent: parent_id.map(CommentId),
        content: row.try_get("content").map_err(map_sqlx_error)?,
        created_at,
    })
}

fn parse_target_type(value: &str) -> Result<EntityKind, RepositoryError> {
    value
        .parse()
        .map_err(|_| RepositoryError::InvalidRow(format!("unknown target_type {value:?}")))
}
