use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::AppConfig;
use crate::state::AppState;
use marginalia_core::comments::CommentStore;
use marginalia_infra::db::{build_registry, connect_lazy, DbPoolError, PgCommentRepository};

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("database pool error: {0}")]
    Db(#[from] DbPoolError),
}

pub fn build_state(config: AppConfig) -> Result<AppState, WiringError> {
    let db = match config.database_url.as_deref() {
        Some(url) => Some(connect_lazy(url, config.db_max_connections)?),
        None => {
            warn!("MARGINALIA_DATABASE_URL not set; posts and comments are unavailable");
            None
        }
    };
    let comments = db.as_ref().map(|pool| {
        let store = CommentStore::new(
            Arc::new(PgCommentRepository::new(pool.clone())),
            build_registry(pool),
        )
        .with_parent_policy(config.parent_policy);
        Arc::new(store)
    });
    Ok(AppState {
        config: Arc::new(config),
        db,
        comments,
    })
}
