pub mod middleware;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

/// An extractor failure, kept with axum's status so route errors can render it
/// as an [`ErrorBody`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RequestRejection {
    pub status: StatusCode,
    pub message: String,
}

macro_rules! request_rejection_from {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for RequestRejection {
                fn from(rejection: $rejection) -> Self {
                    Self {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )+
    };
}

request_rejection_from!(JsonRejection, PathRejection, QueryRejection);

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), HttpError> {
    let router = router::build(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
