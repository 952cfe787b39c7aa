use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::types::{EntityId, PageRequest};

#[derive(Debug, Clone, Serialize)]
pub struct PostAuthor {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    pub author: PostAuthor,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    pub author: PostAuthor,
    pub content: String,
    pub draft: bool,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub comment_count: i64,
}

/// Sort order of the post listing. A leading `-` in the query value means
/// descending; `publish` is accepted for `published_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrdering {
    #[default]
    NewestFirst,
    OldestFirst,
    TitleAsc,
    TitleDesc,
    RecentlyUpdated,
    LeastRecentlyUpdated,
}

impl FromStr for PostOrdering {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (descending, field) = match trimmed.strip_prefix('-') {
            Some(field) => (true, field),
            None => (false, trimmed),
        };
        match (field, descending) {
            ("published_at" | "publish", true) => Ok(Self::NewestFirst),
            ("published_at" | "publish", false) => Ok(Self::OldestFirst),
            ("title", false) => Ok(Self::TitleAsc),
            ("title", true) => Ok(Self::TitleDesc),
            ("updated_at", true) => Ok(Self::RecentlyUpdated),
            ("updated_at", false) => Ok(Self::LeastRecentlyUpdated),
            _ => Err(CoreError::InvalidOrdering(trimmed.to_string())),
        }
    }
}

/// Page-number pagination envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub next_page: Option<u32>,
    pub previous_page: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(request: PageRequest, count: i64, results: Vec<T>) -> Self {
        Self {
            count,
            page: request.page,
            page_size: request.page_size,
            next_page: request.next_page(count),
            previous_page: request.previous_page(),
            results,
        }
    }
}
