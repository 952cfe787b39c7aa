//! Signed author tokens: `base64url(json{sub, exp}).base64url(hmac_sha256)`.
//!
//! `require_author` guards write routes and exposes the caller as an
//! [`Author`] request extension.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::http::ErrorBody;
use crate::state::AppState;
use marginalia_core::types::UserId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthorAuthError {
    #[error("author auth not configured")]
    MissingConfig,
    #[error("author token required")]
    MissingToken,
    #[error("author token invalid")]
    InvalidToken,
    #[error("author token could not be signed")]
    Signing,
}

/// The authenticated commenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Author(pub UserId);

#[derive(Debug, Serialize, Deserialize)]
struct AuthorTokenPayload {
    sub: i64,
    exp: i64,
}

pub async fn require_author(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthorAuthError> {
    let secret = state
        .config
        .author_token_secret
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(AuthorAuthError::MissingConfig)?;
    let token = extract_bearer_token(&request).ok_or(AuthorAuthError::MissingToken)?;
    let user = verify_token(secret, &token).ok_or_else(|| {
        debug!("rejected author token");
        AuthorAuthError::InvalidToken
    })?;
    request.extensions_mut().insert(Author(user));
    Ok(next.run(request).await)
}

pub fn issue_token(
    secret: &str,
    user: UserId,
    max_age_secs: i64,
) -> Result<String, AuthorAuthError> {
    let exp = Utc::now().timestamp().saturating_add(max_age_secs);
    let payload = AuthorTokenPayload { sub: user.get(), exp };
    let json = serde_json::to_vec(&payload).map_err(|_| AuthorAuthError::Signing)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(json);
    let mac = keyed_mac(secret, &payload_b64).ok_or(AuthorAuthError::Signing)?;
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload_b64}.{signature}"))
}

fn verify_token(secret: &str, token: &str) -> Option<UserId> {
    let (payload_b64, sig_b64) = token.split_once('.')?;
    if payload_b64.is_empty() || sig_b64.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(sig_b64.as_bytes()).ok()?;
    keyed_mac(secret, payload_b64)?
        .verify_slice(&signature)
        .ok()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload_b64.as_bytes()).ok()?;
    let payload: AuthorTokenPayload = serde_json::from_slice(&bytes).ok()?;
    (payload.exp > Utc::now().timestamp()).then_some(UserId(payload.sub))
}

fn keyed_mac(secret: &str, payload_b64: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload_b64.as_bytes());
    Some(mac)
}

fn extract_bearer_token<B>(request: &Request<B>) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let value = header.trim().strip_prefix("Bearer ")?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl IntoResponse for AuthorAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthorAuthError::MissingConfig => StatusCode::SERVICE_UNAVAILABLE,
            AuthorAuthError::MissingToken | AuthorAuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthorAuthError::Signing => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
