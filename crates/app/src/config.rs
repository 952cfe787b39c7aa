use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use marginalia_core::comments::ParentPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub cors_allow_origins: Vec<String>,
    pub author_token_secret: Option<String>,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_comment_len: usize,
    pub max_thread_depth: usize,
    pub parent_policy: ParentPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidSocket(String),
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr_raw = read_string("MARGINALIA_HTTP_ADDR", "127.0.0.1:8080");
        let http_addr = http_addr_raw
            .parse()
            .map_err(|_| ConfigError::InvalidSocket(http_addr_raw.clone()))?;
        let database_url = read_optional_string("MARGINALIA_DATABASE_URL");
        let db_max_connections = read_u32("MARGINALIA_DB_MAX_CONNECTIONS", 5)?;
        let cors_allow_origins = parse_list(&read_string("MARGINALIA_CORS_ALLOW_ORIGINS", ""));
        let author_token_secret = read_optional_string("MARGINALIA_AUTHOR_TOKEN_SECRET");
        let default_page_size = read_u32("MARGINALIA_DEFAULT_PAGE_SIZE", 10)?;
        let max_page_size = read_u32("MARGINALIA_MAX_PAGE_SIZE", 50)?;
        if default_page_size == 0 || max_page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "MARGINALIA_MAX_PAGE_SIZE",
                "page sizes must be positive".to_string(),
            ));
        }
        let max_comment_len = read_usize("MARGINALIA_MAX_COMMENT_LEN", 5000)?;
        let max_thread_depth = read_usize("MARGINALIA_MAX_THREAD_DEPTH", 8)?;
        let parent_policy_raw = read_string("MARGINALIA_COMMENT_PARENT_POLICY", "same_target");
        let parent_policy = ParentPolicy::parse(&parent_policy_raw).ok_or(
            ConfigError::InvalidValue("MARGINALIA_COMMENT_PARENT_POLICY", parent_policy_raw),
        )?;

        Ok(Self {
            http_addr,
            database_url,
            db_max_connections,
            cors_allow_origins,
            author_token_secret,
            default_page_size,
            max_page_size: max_page_size.max(default_page_size),
            max_comment_len,
            max_thread_depth,
            parent_policy,
        })
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            db_max_connections: 1,
            cors_allow_origins: Vec::new(),
            author_token_secret: None,
            default_page_size: 10,
            max_page_size: 50,
            max_comment_len: 5000,
            max_thread_depth: 8,
            parent_policy: ParentPolicy::SameTarget,
        }
    }
}

pub fn load_dotenv() -> Result<(), std::io::Error> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            // Safety: invoked during startup before any threads are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn read_string(key: &'static str, default: &'static str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw))
}

fn read_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_optional_string(key: &'static str) -> Option<String> {
    let value = std::env::var(key).unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(parse_dotenv_line)
        .collect()
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = parse_dotenv_value(value.trim());
    Some((key.to_string(), value))
}

fn parse_dotenv_value(value: &str) -> String {
    if let Some(stripped) = value.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        return unescape_double_quoted(stripped);
    }
    if let Some(stripped) = value.strip_prefix('\'').and_then(|inner| inner.strip_suffix('\'')) {
        return stripped.to_string();
    }
    value.to_string()
}

fn unescape_double_quoted(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => output.push('\n'),
                Some('r') => output.push('\r'),
                Some('t') => output.push('\t'),
                Some('\\') => output.push('\\'),
                Some('"') => output.push('"'),
                Some(other) => {
                    output.push('\\');
                    output.push(other);
                }
                None => output.push('\\'),
            }
        } else {
            output.push(ch);
        }
    }
    output
}
