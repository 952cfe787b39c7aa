use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid slug: {0}")]
    InvalidSlug(String),
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),
    #[error("invalid page: {0}")]
    InvalidPage(String),
    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),
}
