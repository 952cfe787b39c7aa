use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::http::middleware::{author_auth, query_limit};
use crate::http::routes::{comments, health, posts};
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let cors = build_cors(&state);
    let require_author =
        || middleware::from_fn_with_state(state.clone(), author_auth::require_author);
    let mut router = Router::new()
        .route("/health", get(health::health))
        .route(
            "/v1/posts",
            get(posts::list)
                .layer(middleware::from_fn(query_limit::enforce_query_string_length))
                .merge(post(posts::create).route_layer(require_author())),
        )
        .route(
            "/v1/posts/{slug}",
            get(posts::detail).merge(
                put(posts::update)
                    .delete(posts::delete)
                    .route_layer(require_author()),
            ),
        )
        .route(
            "/v1/comments",
            get(comments::list_roots).merge(
                post(comments::create_comment).route_layer(require_author()),
            ),
        )
        .route(
            "/v1/comments/thread",
            get(comments::get_thread)
                .layer(middleware::from_fn(query_limit::enforce_query_string_length)),
        )
        .route("/v1/comments/{id}/children", get(comments::get_children))
        .with_state(state);
    if let Some(cors) = cors {
        router = router.layer(cors);
    }
    router
}

fn build_cors(state: &AppState) -> Option<CorsLayer> {
    let mut origins = Vec::new();
    let mut allow_any = false;
    for origin in state.config.cors_allow_origins.iter() {
        if is_wildcard_origin(origin) {
            allow_any = true;
            break;
        }
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => origins.push(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin ignored");
            }
        }
    }

    let cors = CorsLayer::new().allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ]);

    if !should_enable_cors(allow_any, &origins) {
        return None;
    }

    if allow_any {
        Some(cors.allow_origin(Any).allow_headers(Any))
    } else {
        Some(
            cors.allow_origin(AllowOrigin::list(origins))
                .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        )
    }
}

fn is_wildcard_origin(origin: &str) -> bool {
    origin.trim() == "*"
}

fn should_enable_cors(allow_any: bool, origins: &[HeaderValue]) -> bool {
    allow_any || !origins.is_empty()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{build, is_wildcard_origin, should_enable_cors};
    use crate::config::AppConfig;
    use crate::state::AppState;

    fn bare_state() -> AppState {
        AppState {
            config: Arc::new(AppConfig::for_tests()),
            db: None,
            comments: None,
        }
    }

    #[test]
    fn wildcard_origin_matches_trimmed_star() {
        assert!(is_wildcard_origin("*"));
        assert!(is_wildcard_origin(" * "));
        assert!(!is_wildcard_origin("https://example.com"));
    }

    #[test]
    fn cors_enablement_requires_origin_or_wildcard() {
        assert!(!should_enable_cors(false, &[]));
        assert!(should_enable_cors(true, &[]));
        assert!(should_enable_cors(false, &[HeaderValue::from_static("https://example.com")]));
    }

    #[tokio::test]
    async fn health_reports_disabled_modules() {
        let response = build(bare_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["modules"]["database"]["configured"], false);
        assert_eq!(body["modules"]["comments"]["posting_enabled"], false);
    }

    #[tokio::test]
    async fn posts_need_database() {
        let response = build(bare_state())
            .oneshot(Request::builder().uri("/v1/posts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn overlong_query_string_is_rejected() {
        let uri = format!("/v1/posts?q={}", "a".repeat(600));
        let response = build(bare_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::URI_TOO_LONG);
    }
}
