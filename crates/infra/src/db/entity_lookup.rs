use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use marginalia_core::comments::{EntityRegistry, EntityResolver, RepositoryError};
use marginalia_core::domain::comments::EntityKind;
use marginalia_core::types::EntityId;

use super::map_sqlx_error;

// Two rows are enough to tell a unique key from an ambiguous one.
const MATCH_LIMIT: i64 = 2;

/// Posts, keyed by slug. Drafts are not commentable.
#[derive(Debug, Clone)]
pub struct PgPostResolver {
    pool: PgPool,
}

impl PgPostResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityResolver for PgPostResolver {
    fn kind(&self) -> EntityKind {
        EntityKind::Post
    }

    async fn find_by_natural_key(&self, key: &str) -> Result<Vec<EntityId>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM posts
            WHERE slug = $1 AND NOT draft
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(key)
        .bind(MATCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect_ids(rows)
    }
}

/// Active user profiles, keyed by username.
#[derive(Debug, Clone)]
pub struct PgProfileResolver {
    pool: PgPool,
}

impl PgProfileResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityResolver for PgProfileResolver {
    fn kind(&self) -> EntityKind {
        EntityKind::Profile
    }

    async fn find_by_natural_key(&self, key: &str) -> Result<Vec<EntityId>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM users
            WHERE username = $1 AND is_active
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(key)
        .bind(MATCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect_ids(rows)
    }
}

fn collect_ids(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<EntityId>, RepositoryError> {
    rows.into_iter()
        .map(|row| row.try_get::<i64, _>("id").map(EntityId).map_err(map_sqlx_error))
        .collect()
}

/// Registry with every commentable kind backed by Postgres.
pub fn build_registry(pool: &PgPool) -> EntityRegistry {
    EntityRegistry::new()
        .register(Arc::new(PgPostResolver::new(pool.clone())))
        .register(Arc::new(PgProfileResolver::new(pool.clone())))
}
