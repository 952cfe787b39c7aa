use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::ErrorBody;

pub const MAX_QUERY_STRING_LEN: usize = 512;

/// Rejects listing requests whose raw query string exceeds the limit before
/// any extractor runs.
pub async fn enforce_query_string_length(req: Request, next: Next) -> Response {
    if exceeds_limit(req.uri().query()) {
        let body = ErrorBody {
            error: format!("query string too long (max {MAX_QUERY_STRING_LEN} bytes)"),
        };
        return (StatusCode::URI_TOO_LONG, Json(body)).into_response();
    }
    next.run(req).await
}

fn exceeds_limit(query: Option<&str>) -> bool {
    query.is_some_and(|value| value.len() > MAX_QUERY_STRING_LEN)
}

#[cfg(test)]
mod tests {
    use super::{exceeds_limit, MAX_QUERY_STRING_LEN};

    #[test]
    fn missing_query_is_allowed() {
        assert!(!exceeds_limit(None));
    }

    #[test]
    fn limit_is_inclusive() {
        let query = "q=".to_string() + &"a".repeat(MAX_QUERY_STRING_LEN - 2);
        assert!(!exceeds_limit(Some(&query)));
        let query = query + "a";
        assert!(exceeds_limit(Some(&query)));
    }
}
