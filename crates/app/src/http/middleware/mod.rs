pub mod author_auth;
pub mod query_limit;
