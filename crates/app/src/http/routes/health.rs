use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;
use marginalia_core::domain::comments::EntityKind;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub modules: HealthModules,
}

#[derive(Debug, Serialize)]
pub struct HealthModules {
    pub database: DatabaseStatus,
    pub comments: CommentsStatus,
    pub posts: ModuleStatus,
}

#[derive(Debug, Serialize)]
pub struct ModuleStatus {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub configured: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentsStatus {
    pub enabled: bool,
    pub posting_enabled: bool,
    pub commentable_types: Vec<EntityKind>,
    pub parent_policy: Option<&'static str>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_configured = state.db.is_some();
    let commentable_types = state
        .comments
        .as_ref()
        .map(|store| store.registered_kinds())
        .unwrap_or_default();
    let parent_policy = state
        .comments
        .as_ref()
        .map(|store| store.parent_policy().as_str());
    let comments_enabled = state.comments.is_some();
    let token_secret_set = state
        .config
        .author_token_secret
        .as_ref()
        .is_some_and(|value| !value.is_empty());

    Json(HealthResponse {
        status: "ok",
        modules: HealthModules {
            database: DatabaseStatus {
                configured: db_configured,
            },
            comments: CommentsStatus {
                enabled: comments_enabled,
                posting_enabled: comments_enabled && token_secret_set,
                commentable_types,
                parent_policy,
            },
            posts: ModuleStatus {
                enabled: db_configured,
            },
        },
    })
}
