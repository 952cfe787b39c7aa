use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::http::middleware::author_auth::Author;
use crate::http::{ErrorBody, RequestRejection};
use crate::state::AppState;
use marginalia_core::comments::CommentStoreError;
use marginalia_core::domain::comments::EntityKind;
use marginalia_core::domain::posts::{
    Paginated, PostAuthor, PostDetail, PostOrdering, PostSummary,
};
use marginalia_core::types::{EntityId, PageRequest, Slug, UserId};
use marginalia_core::CoreError;
use marginalia_infra::db::{
    create_post, delete_post, find_post_by_slug, find_post_owner, list_posts, update_post, DbPool,
    PostInput, PostRecord, PostsRepoError, SlugChoice,
};

const MAX_SEARCH_LEN: usize = 256;
const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Deserialize)]
pub struct PostListParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub ordering: Option<String>,
}

/// Body of `POST /v1/posts` and `PUT /v1/posts/{slug}`. `slug` is only read on
/// create.
#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub draft: bool,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum PostsApiError {
    #[error("search text too long (max {0} chars)")]
    SearchTooLong(usize),
    #[error("{0}")]
    InvalidRequest(#[from] CoreError),
    #[error("title is required")]
    EmptyTitle,
    #[error("title too long (max {0} chars)")]
    TitleTooLong(usize),
    #[error("content is required")]
    EmptyContent,
    #[error("post not found")]
    NotFound,
    #[error("only the author may change this post")]
    NotOwner,
    #[error("db not configured")]
    DbUnavailable,
    #[error(transparent)]
    Rejected(#[from] RequestRejection),
    #[error("db error: {0}")]
    Db(#[from] PostsRepoError),
    #[error("comment store error: {0}")]
    Comments(#[from] CommentStoreError),
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<PostListParams>, QueryRejection>,
) -> Result<Json<Paginated<PostSummary>>, PostsApiError> {
    let Query(params) = query.map_err(RequestRejection::from)?;
    let search = normalize_search(params.q)?;
    let ordering = parse_ordering(params.ordering.as_deref())?;
    let page = PageRequest::parse(
        params.page,
        params.page_size,
        state.config.default_page_size,
        state.config.max_page_size,
    )?;
    let pool = db(&state)?;
    debug!(?search, ?ordering, page = page.page, page_size = page.page_size, "listing posts");
    let (total, records) =
        list_posts(pool, search.as_deref(), ordering, page.limit(), page.offset()).await?;
    let results = records.into_iter().map(summary).collect();
    Ok(Json(Paginated::new(page, total, results)))
}

pub async fn detail(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<PostDetail>, PostsApiError> {
    let Path(slug) = path.map_err(RequestRejection::from)?;
    let slug = Slug::try_from(slug.as_str())?;
    let pool = db(&state)?;
    let record = find_post_by_slug(pool, slug.as_str())
        .await?
        .ok_or(PostsApiError::NotFound)?;
    let comment_count = comment_count(&state, record.id).await?;
    Ok(Json(detail_view(record, comment_count)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(Author(author)): Extension<Author>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PostDetail>), PostsApiError> {
    let Json(payload) = payload.map_err(RequestRejection::from)?;
    let slug = match payload.slug.as_deref() {
        Some(raw) => SlugChoice::Exact(Slug::try_from(raw)?.to_string()),
        None => SlugChoice::Derived(Slug::from_title(&payload.title)?.to_string()),
    };
    let input = post_input(payload)?;
    let pool = db(&state)?;
    let record = create_post(pool, author.get(), slug, &input).await?;
    info!(post_id = record.id, slug = %record.slug, %author, "post created");
    Ok((StatusCode::CREATED, Json(detail_view(record, 0))))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(Author(author)): Extension<Author>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<Json<PostDetail>, PostsApiError> {
    let Path(slug) = path.map_err(RequestRejection::from)?;
    let Json(payload) = payload.map_err(RequestRejection::from)?;
    let slug = Slug::try_from(slug.as_str())?;
    let input = post_input(payload)?;
    let pool = db(&state)?;
    let post_id = owned_post(pool, &slug, author).await?;
    let record = update_post(pool, post_id, author.get(), &input)
        .await?
        .ok_or(PostsApiError::NotFound)?;
    info!(post_id, %slug, %author, "post updated");
    let comment_count = comment_count(&state, record.id).await?;
    Ok(Json(detail_view(record, comment_count)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(Author(author)): Extension<Author>,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, PostsApiError> {
    let Path(slug) = path.map_err(RequestRejection::from)?;
    let slug = Slug::try_from(slug.as_str())?;
    let pool = db(&state)?;
    let post_id = owned_post(pool, &slug, author).await?;
    if !delete_post(pool, post_id, author.get()).await? {
        return Err(PostsApiError::NotFound);
    }
    info!(post_id, %slug, %author, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn db(state: &AppState) -> Result<&DbPool, PostsApiError> {
    state.db.as_ref().ok_or(PostsApiError::DbUnavailable)
}

async fn owned_post(pool: &DbPool, slug: &Slug, author: UserId) -> Result<i64, PostsApiError> {
    let owner = find_post_owner(pool, slug.as_str())
        .await?
        .ok_or(PostsApiError::NotFound)?;
    ensure_owner(UserId(owner.author_id), author)?;
    Ok(owner.id)
}

fn ensure_owner(owner: UserId, author: UserId) -> Result<(), PostsApiError> {
    if owner == author {
        Ok(())
    } else {
        debug!(%owner, %author, "post change by non-owner refused");
        Err(PostsApiError::NotOwner)
    }
}

async fn comment_count(state: &AppState, post_id: i64) -> Result<i64, PostsApiError> {
    match state.comments.as_ref() {
        Some(store) => Ok(store
            .count_for_entity(EntityKind::Post.as_str(), EntityId(post_id))
            .await?),
        None => Ok(0),
    }
}

fn post_input(payload: PostRequest) -> Result<PostInput, PostsApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(PostsApiError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PostsApiError::TitleTooLong(MAX_TITLE_LEN));
    }
    if payload.content.trim().is_empty() {
        return Err(PostsApiError::EmptyContent);
    }
    Ok(PostInput {
        title: title.to_string(),
        content: payload.content,
        draft: payload.draft,
        published_at: payload.published_at,
    })
}

fn parse_ordering(value: Option<&str>) -> Result<PostOrdering, PostsApiError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Ok(value.parse()?),
        None => Ok(PostOrdering::default()),
    }
}

fn normalize_search(value: Option<String>) -> Result<Option<String>, PostsApiError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.chars().count() > MAX_SEARCH_LEN {
        return Err(PostsApiError::SearchTooLong(MAX_SEARCH_LEN));
    }
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn author(record: &PostRecord) -> PostAuthor {
    PostAuthor {
        username: record.author_username.clone(),
        first_name: record.author_first_name.clone(),
        last_name: record.author_last_name.clone(),
    }
}

fn summary(record: PostRecord) -> PostSummary {
    PostSummary {
        id: EntityId(record.id),
        author: author(&record),
        title: record.title,
        slug: record.slug,
        published_at: record.published_at,
    }
}

fn detail_view(record: PostRecord, comment_count: i64) -> PostDetail {
    PostDetail {
        id: EntityId(record.id),
        author: author(&record),
        title: record.title,
        slug: record.slug,
        content: record.content,
        draft: record.draft,
        published_at: record.published_at,
        updated_at: record.updated_at,
        comment_count,
    }
}

impl IntoResponse for PostsApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            PostsApiError::SearchTooLong(_)
            | PostsApiError::InvalidRequest(_)
            | PostsApiError::EmptyTitle
            | PostsApiError::TitleTooLong(_)
            | PostsApiError::EmptyContent => StatusCode::BAD_REQUEST,
            PostsApiError::NotFound => StatusCode::NOT_FOUND,
            PostsApiError::NotOwner => StatusCode::FORBIDDEN,
            PostsApiError::DbUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            PostsApiError::Rejected(rejection) => rejection.status,
            PostsApiError::Db(PostsRepoError::SlugTaken(_) | PostsRepoError::Referenced(_)) => {
                StatusCode::CONFLICT
            }
            PostsApiError::Db(PostsRepoError::Constraint(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            PostsApiError::Db(_) | PostsApiError::Comments(_) => {
                error!(error = %self, "posts api failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{
        ensure_owner, normalize_search, parse_ordering, post_input, PostRequest, PostsApiError,
        MAX_SEARCH_LEN, MAX_TITLE_LEN,
    };
    use crate::config::AppConfig;
    use crate::http::middleware::author_auth::issue_token;
    use crate::http::router;
    use crate::state::AppState;
    use marginalia_core::domain::posts::PostOrdering;
    use marginalia_core::types::UserId;

    const SECRET: &str = "test-secret";

    fn app() -> Router {
        let mut config = AppConfig::for_tests();
        config.author_token_secret = Some(SECRET.to_string());
        router::build(AppState {
            config: Arc::new(config),
            db: None,
            comments: None,
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn write(method: &str, uri: &str, body: Value, user: Option<i64>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            let token = issue_token(SECRET, UserId(user), 60).unwrap();
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn request(title: &str, content: &str) -> PostRequest {
        PostRequest {
            title: title.to_string(),
            content: content.to_string(),
            slug: None,
            draft: false,
            published_at: None,
        }
    }

    #[test]
    fn blank_search_is_ignored() {
        assert_eq!(normalize_search(None).unwrap(), None);
        assert_eq!(normalize_search(Some("   ".to_string())).unwrap(), None);
    }

    #[test]
    fn search_is_trimmed() {
        let query = normalize_search(Some("  switch ".to_string())).unwrap();
        assert_eq!(query.as_deref(), Some("switch"));
    }

    #[test]
    fn search_length_is_capped() {
        let err = normalize_search(Some("a".repeat(MAX_SEARCH_LEN + 1))).unwrap_err();
        assert!(matches!(err, PostsApiError::SearchTooLong(_)));
    }

    #[test]
    fn ordering_defaults_to_newest_first() {
        assert_eq!(parse_ordering(None).unwrap(), PostOrdering::NewestFirst);
        assert_eq!(parse_ordering(Some(" ")).unwrap(), PostOrdering::NewestFirst);
        assert_eq!(parse_ordering(Some("title")).unwrap(), PostOrdering::TitleAsc);
        assert!(matches!(
            parse_ordering(Some("votes")).unwrap_err(),
            PostsApiError::InvalidRequest(_)
        ));
    }

    #[test]
    fn only_the_owner_may_change_a_post() {
        assert!(ensure_owner(UserId(7), UserId(7)).is_ok());
        assert!(matches!(
            ensure_owner(UserId(7), UserId(8)).unwrap_err(),
            PostsApiError::NotOwner
        ));
    }

    #[test]
    fn post_input_trims_title_and_requires_content() {
        let input = post_input(request("  Hello  ", "body")).unwrap();
        assert_eq!(input.title, "Hello");
        assert!(!input.draft);
        assert!(matches!(
            post_input(request(" ", "body")).unwrap_err(),
            PostsApiError::EmptyTitle
        ));
        assert!(matches!(
            post_input(request("Hello", "  ")).unwrap_err(),
            PostsApiError::EmptyContent
        ));
        assert!(matches!(
            post_input(request(&"t".repeat(MAX_TITLE_LEN + 1), "body")).unwrap_err(),
            PostsApiError::TitleTooLong(_)
        ));
    }

    #[tokio::test]
    async fn writes_require_author_token() {
        let app = app();
        let body = json!({"title": "Hello", "content": "body"});
        let cases = [
            ("POST", "/v1/posts"),
            ("PUT", "/v1/posts/hello"),
            ("DELETE", "/v1/posts/hello"),
        ];
        for (method, uri) in cases {
            let (status, response) = send(&app, write(method, uri, body.clone(), None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert!(response["error"].is_string());
        }
    }

    #[tokio::test]
    async fn authorized_writes_need_database() {
        let app = app();
        let body = json!({"title": "Hello", "content": "body"});
        let cases = [
            ("POST", "/v1/posts"),
            ("PUT", "/v1/posts/hello"),
            ("DELETE", "/v1/posts/hello"),
        ];
        for (method, uri) in cases {
            let (status, response) = send(&app, write(method, uri, body.clone(), Some(1))).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{method} {uri}");
            assert_eq!(response["error"], "db not configured");
        }
    }

    #[tokio::test]
    async fn invalid_post_bodies_are_rejected_before_storage() {
        let app = app();
        let cases = [
            json!({"title": " ", "content": "body"}),
            json!({"title": "!!!", "content": "body"}),
            json!({"title": "Hello", "content": "body", "slug": "has space"}),
        ];
        for body in cases {
            let (status, response) =
                send(&app, write("POST", "/v1/posts", body.clone(), Some(1))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(response["error"].is_string());
        }

        let (status, response) =
            send(&app, write("POST", "/v1/posts", json!({"title": "Hello"}), Some(1))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response["error"].is_string());
    }

    #[tokio::test]
    async fn list_rejects_bad_query_params_as_json() {
        let app = app();
        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(&app, get("/v1/posts?ordering=votes")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid ordering: votes");

        let (status, body) = send(&app, get("/v1/posts?page=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
