use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;

use marginalia_core::domain::comments::EntityKind;
use marginalia_core::domain::posts::PostOrdering;

const MAX_SLUG_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum PostsRepoError {
    #[error("slug already taken: {0}")]
    SlugTaken(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("post is still referenced: {0}")]
    Referenced(String),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub draft: bool,
    pub author_username: String,
    pub author_first_name: String,
    pub author_last_name: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Id and owner of a post, drafts included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOwner {
    pub id: i64,
    pub author_id: i64,
}

/// Writable post fields. `published_at` falls back to now on create and to the
/// stored value on update.
#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub draft: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// How a new post gets its slug.
#[derive(Debug, Clone)]
pub enum SlugChoice {
    /// Used as given; a clash fails with `SlugTaken`.
    Exact(String),
    /// Derived from the title; a clash appends the clashing post's id.
    Derived(String),
}

const POST_COLUMNS: &str = r#"
    p.id,
    p.author_id,
    p.title,
    p.slug,
    p.content,
    p.draft,
    u.username AS author_username,
    u.first_name AS author_first_name,
    u.last_name AS author_last_name,
    p.published_at,
    p.updated_at
"#;

/// Published posts in `ordering`. `query` matches title, content and author
/// names case-insensitively. Returns the total match count with the page.
pub async fn list_posts(
    pool: &PgPool,
    query: Option<&str>,
    ordering: PostOrdering,
    limit: i64,
    offset: i64,
) -> Result<(i64, Vec<PostRecord>), PostsRepoError> {
    let pattern = query
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(like_pattern);

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM posts p
        JOIN users u ON u.id = p.author_id
        WHERE NOT p.draft
          AND (
            $1::TEXT IS NULL
            OR p.title ILIKE $1
            OR p.content ILIKE $1
            OR u.first_name ILIKE $1
            OR u.last_name ILIKE $1
          )
        "#,
    )
    .bind(&pattern)
    .fetch_one(pool)
    .await?;
    let total: i64 = row.try_get("count")?;

    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        JOIN users u ON u.id = p.author_id
        WHERE NOT p.draft
          AND (
            $1::TEXT IS NULL
            OR p.title ILIKE $1
            OR p.content ILIKE $1
            OR u.first_name ILIKE $1
            OR u.last_name ILIKE $1
          )
        ORDER BY {order}
        LIMIT $2 OFFSET $3
        "#,
        order = order_clause(ordering),
    );
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let mut posts = Vec::with_capacity(rows.len());
    for row in rows {
        posts.push(map_post(&row)?);
    }
    Ok((total, posts))
}

pub async fn find_post_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<PostRecord>, PostsRepoError> {
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        JOIN users u ON u.id = p.author_id
        WHERE p.slug = $1 AND NOT p.draft
        "#
    );
    let row = sqlx::query(&sql).bind(slug).fetch_optional(pool).await?;
    Ok(row.as_ref().map(map_post).transpose()?)
}

pub async fn find_post_owner(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<PostOwner>, PostsRepoError> {
    let row = sqlx::query("SELECT id, author_id FROM posts WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(PostOwner {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
    }))
}

pub async fn create_post(
    pool: &PgPool,
    author_id: i64,
    slug: SlugChoice,
    input: &PostInput,
) -> Result<PostRecord, PostsRepoError> {
    let slug = match slug {
        SlugChoice::Exact(slug) => slug,
        SlugChoice::Derived(base) => free_slug(pool, base).await?,
    };
    let sql = format!(
        r#"
        WITH p AS (
            INSERT INTO posts (author_id, title, slug, content, draft, published_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            RETURNING *
        )
        SELECT {POST_COLUMNS}
        FROM p
        JOIN users u ON u.id = p.author_id
        "#
    );
    let row = sqlx::query(&sql)
        .bind(author_id)
        .bind(&input.title)
        .bind(&slug)
        .bind(&input.content)
        .bind(input.draft)
        .bind(input.published_at)
        .fetch_one(pool)
        .await
        .map_err(|err| map_write_error(err, &slug))?;
    Ok(map_post(&row)?)
}

/// Rewrites a post owned by `author_id`. The slug never changes. Returns `None`
/// when no such post belongs to the author.
pub async fn update_post(
    pool: &PgPool,
    post_id: i64,
    author_id: i64,
    input: &PostInput,
) -> Result<Option<PostRecord>, PostsRepoError> {
    let sql = format!(
        r#"
        WITH p AS (
            UPDATE posts
            SET title = $3,
                content = $4,
                draft = $5,
                published_at = COALESCE($6, published_at),
                updated_at = NOW()
            WHERE id = $1 AND author_id = $2
            RETURNING *
        )
        SELECT {POST_COLUMNS}
        FROM p
        JOIN users u ON u.id = p.author_id
        "#
    );
    let row = sqlx::query(&sql)
        .bind(post_id)
        .bind(author_id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.draft)
        .bind(input.published_at)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_post).transpose()?)
}

/// Deletes a post owned by `author_id` together with the comments attached to
/// it. Returns whether a post was removed.
pub async fn delete_post(
    pool: &PgPool,
    post_id: i64,
    author_id: i64,
) -> Result<bool, PostsRepoError> {
    let mut tx = pool.begin().await?;
    let owned = sqlx::query("SELECT id FROM posts WHERE id = $1 AND author_id = $2 FOR UPDATE")
        .bind(post_id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await?;
    if owned.is_none() {
        return Ok(false);
    }
    // Replies on other targets still referencing these comments fail the FK.
    sqlx::query("DELETE FROM comments WHERE target_type = $1 AND target_id = $2")
        .bind(EntityKind::Post.as_str())
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                PostsRepoError::Referenced(db_err.message().to_string())
            }
            other => PostsRepoError::Sqlx(other),
        })?;
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(true)
}

async fn free_slug(pool: &PgPool, base: String) -> Result<String, PostsRepoError> {
    let mut candidate = base;
    for _ in 0..MAX_SLUG_ATTEMPTS {
        let taken = sqlx::query("SELECT id FROM posts WHERE slug = $1")
            .bind(&candidate)
            .fetch_optional(pool)
            .await?;
        match taken {
            None => return Ok(candidate),
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                candidate = suffixed_slug(&candidate, id);
            }
        }
    }
    Err(PostsRepoError::SlugTaken(candidate))
}

fn suffixed_slug(slug: &str, id: i64) -> String {
    format!("{slug}-{id}")
}

fn map_write_error(err: sqlx::Error, slug: &str) -> PostsRepoError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            PostsRepoError::SlugTaken(slug.to_string())
        }
        sqlx::Error::Database(db_err)
            if db_err.is_foreign_key_violation() || db_err.is_check_violation() =>
        {
            PostsRepoError::Constraint(db_err.message().to_string())
        }
        other => PostsRepoError::Sqlx(other),
    }
}

fn order_clause(ordering: PostOrdering) -> &'static str {
    match ordering {
        PostOrdering::NewestFirst => "p.published_at DESC, p.id DESC",
        PostOrdering::OldestFirst => "p.published_at ASC, p.id ASC",
        PostOrdering::TitleAsc => "p.title ASC, p.id ASC",
        PostOrdering::TitleDesc => "p.title DESC, p.id DESC",
        PostOrdering::RecentlyUpdated => "p.updated_at DESC, p.id DESC",
        PostOrdering::LeastRecentlyUpdated => "p.updated_at ASC, p.id ASC",
    }
}

fn map_post(row: &sqlx::postgres::PgRow) -> Result<PostRecord, sqlx::Error> {
    Ok(PostRecord {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        draft: row.try_get("draft")?,
        author_username: row.try_get("author_username")?,
        author_first_name: row.try_get("author_first_name")?,
        author_last_name: row.try_get("author_last_name")?,
        published_at: row.try_get("published_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Wraps `value` for a substring `ILIKE`, escaping the pattern metacharacters.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::{like_pattern, order_clause, suffixed_slug};
    use marginalia_core::domain::posts::PostOrdering;

    #[test]
    fn like_pattern_wraps_plain_text() {
        assert_eq!(like_pattern("rust"), "%rust%");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn every_ordering_breaks_ties_by_id() {
        let orderings = [
            PostOrdering::NewestFirst,
            PostOrdering::OldestFirst,
            PostOrdering::TitleAsc,
            PostOrdering::TitleDesc,
            PostOrdering::RecentlyUpdated,
            PostOrdering::LeastRecentlyUpdated,
        ];
        for ordering in orderings {
            let clause = order_clause(ordering);
            assert!(clause.ends_with("p.id ASC") || clause.ends_with("p.id DESC"));
        }
        assert_eq!(order_clause(PostOrdering::default()), "p.published_at DESC, p.id DESC");
    }

    #[test]
    fn clashing_slug_gets_id_suffix() {
        assert_eq!(suffixed_slug("hello-world", 12), "hello-world-12");
    }
}
