use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::http::middleware::author_auth::Author;
use crate::http::{ErrorBody, RequestRejection};
use crate::state::AppState;
use marginalia_core::comments::{CommentStore, CommentStoreError, RepositoryError};
use marginalia_core::domain::comments::{Comment, CommentThread, CommentView};
use marginalia_core::types::{CommentId, EntityId};

const MAX_KEY_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct ThreadParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub object_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub slug: String,
    pub content: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum CommentsApiError {
    #[error("{0} is required")]
    MissingParam(&'static str),
    #[error("slug is invalid")]
    InvalidKey,
    #[error("content is required")]
    EmptyContent,
    #[error("content too long (max {0} chars)")]
    ContentTooLong(usize),
    #[error("comment not found")]
    CommentNotFound,
    #[error("comment store not configured")]
    StoreUnavailable,
    #[error(transparent)]
    Rejected(#[from] RequestRejection),
    #[error(transparent)]
    Store(#[from] CommentStoreError),
}

pub async fn list_roots(
    State(state): State<AppState>,
) -> Result<Json<Vec<Comment>>, CommentsApiError> {
    let store = comment_store(&state)?;
    Ok(Json(store.list_roots().await?))
}

pub async fn get_thread(
    State(state): State<AppState>,
    query: Result<Query<ThreadParams>, QueryRejection>,
) -> Result<Json<CommentThread>, CommentsApiError> {
    let store = comment_store(&state)?;
    let Query(params) = query.map_err(RequestRejection::from)?;
    let kind = params
        .kind
        .filter(|value| !value.trim().is_empty())
        .ok_or(CommentsApiError::MissingParam("type"))?;
    let object_id = params
        .object_id
        .ok_or(CommentsApiError::MissingParam("object_id"))?;
    let target = store.target_for(&kind, EntityId(object_id))?;
    let roots = store
        .list_roots_for_entity(target.kind.as_str(), target.id)
        .await?;
    let total = store
        .count_for_entity(target.kind.as_str(), target.id)
        .await?;
    let comments = load_thread(store, roots, state.config.max_thread_depth).await?;
    Ok(Json(CommentThread {
        target,
        total,
        comments,
    }))
}

pub async fn get_children(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Comment>>, CommentsApiError> {
    let store = comment_store(&state)?;
    let Path(comment_id) = path.map_err(RequestRejection::from)?;
    let comment_id = CommentId(comment_id);
    if store.find(comment_id).await?.is_none() {
        return Err(CommentsApiError::CommentNotFound);
    }
    Ok(Json(store.list_children(comment_id).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(Author(author)): Extension<Author>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Comment>), CommentsApiError> {
    let store = comment_store(&state)?;
    let Json(payload) = payload.map_err(RequestRejection::from)?;
    let key = normalize_key(&payload.slug)?;
    let content = normalize_content(&payload.content, state.config.max_comment_len)?;
    let comment = store
        .create_comment(
            &payload.kind,
            key,
            content,
            author,
            payload.parent_id.map(CommentId),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

fn comment_store(state: &AppState) -> Result<&CommentStore, CommentsApiError> {
    state
        .comments
        .as_deref()
        .ok_or(CommentsApiError::StoreUnavailable)
}

fn normalize_key(value: &str) -> Result<&str, CommentsApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommentsApiError::MissingParam("slug"));
    }
    if trimmed.len() > MAX_KEY_LEN || trimmed.chars().any(char::is_whitespace) {
        return Err(CommentsApiError::InvalidKey);
    }
    Ok(trimmed)
}

fn normalize_content(value: &str, max_len: usize) -> Result<&str, CommentsApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommentsApiError::EmptyContent);
    }
    if trimmed.chars().count() > max_len {
        return Err(CommentsApiError::ContentTooLong(max_len));
    }
    Ok(trimmed)
}

struct ThreadNode {
    view: CommentView,
    children: Vec<usize>,
}

/// Expands `roots` one level at a time with `list_children`. Nodes at
/// `max_depth` keep their `reply_count` but carry no replies.
async fn load_thread(
    store: &CommentStore,
    roots: Vec<Comment>,
    max_depth: usize,
) -> Result<Vec<CommentView>, CommentStoreError> {
    let max_depth = max_depth.max(1);
    let mut nodes: Vec<ThreadNode> = Vec::new();
    let mut root_indices = Vec::with_capacity(roots.len());
    let mut frontier: Vec<(Option<usize>, Comment)> =
        roots.into_iter().map(|comment| (None, comment)).collect();
    let mut depth = 1;

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (parent_idx, comment) in frontier {
            let node_idx = nodes.len();
            let reply_count = if depth < max_depth {
                let children = store.list_children(comment.id).await?;
                let count = i64::try_from(children.len()).unwrap_or(i64::MAX);
                next.extend(children.into_iter().map(|child| (Some(node_idx), child)));
                count
            } else {
                store.count_children(comment.id).await?
            };
            nodes.push(ThreadNode {
                view: CommentView::leaf(comment, reply_count),
                children: Vec::new(),
            });
            match parent_idx {
                Some(parent_idx) => nodes[parent_idx].children.push(node_idx),
                None => root_indices.push(node_idx),
            }
        }
        frontier = next;
        depth += 1;
    }

    Ok(root_indices
        .into_iter()
        .map(|idx| build_view(idx, &nodes))
        .collect())
}

fn build_view(idx: usize, nodes: &[ThreadNode]) -> CommentView {
    let mut view = nodes[idx].view.clone();
    for child_idx in &nodes[idx].children {
        view.replies.push(build_view(*child_idx, nodes));
    }
    view
}

impl IntoResponse for CommentsApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CommentsApiError::MissingParam(_)
            | CommentsApiError::InvalidKey
            | CommentsApiError::EmptyContent
            | CommentsApiError::ContentTooLong(_) => StatusCode::BAD_REQUEST,
            CommentsApiError::CommentNotFound => StatusCode::NOT_FOUND,
            CommentsApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            CommentsApiError::Rejected(rejection) => rejection.status,
            CommentsApiError::Store(err) => store_status(err),
        };
        if status.is_server_error() {
            error!(error = %self, "comments api failure");
        } else if status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(error = %self, "comment rejected");
        }
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

fn store_status(err: &CommentStoreError) -> StatusCode {
    match err {
        CommentStoreError::UnknownEntityType(_) => StatusCode::BAD_REQUEST,
        CommentStoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CommentStoreError::AmbiguousTarget { .. } => StatusCode::CONFLICT,
        CommentStoreError::ParentTargetMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CommentStoreError::Storage(RepositoryError::Constraint(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CommentStoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
