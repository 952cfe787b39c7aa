mod cli;
mod config;
mod http;
mod state;
mod wiring;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::ConfigError;
use crate::http::middleware::author_auth::{self, AuthorAuthError};
use crate::http::HttpError;
use crate::wiring::WiringError;
use marginalia_core::types::UserId;
use marginalia_infra::db::run_migrations;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid cli: {0}")]
    InvalidCli(String),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("db error: {0}")]
    Db(#[from] marginalia_infra::db::DbPoolError),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error("token error: {0}")]
    Token(#[from] AuthorAuthError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    cli.validate().map_err(AppError::InvalidCli)?;
    config::load_dotenv()?;
    let config = config::AppConfig::from_env()?;

    if let Command::IssueToken { user_id, days } = cli.command() {
        let secret = config
            .author_token_secret
            .as_deref()
            .ok_or_else(|| AppError::InvalidCli("MARGINALIA_AUTHOR_TOKEN_SECRET is not set".to_string()))?;
        if days <= 0 {
            return Err(AppError::InvalidCli("--days must be positive".to_string()));
        }
        let max_age_secs = days.saturating_mul(24 * 60 * 60);
        let token = author_auth::issue_token(secret, UserId(user_id), max_age_secs)?;
        println!("{token}");
        return Ok(());
    }

    let state = wiring::build_state(config)?;
    match (state.db.as_ref(), cli.skip_migrations) {
        (Some(pool), false) => {
            run_migrations(pool).await?;
            info!("database migrations applied");
        }
        (Some(_), true) => info!("skipping database migrations"),
        (None, _) => {
            if matches!(cli.command(), Command::Migrate) {
                return Err(AppError::InvalidCli(
                    "migrate requires MARGINALIA_DATABASE_URL".to_string(),
                ));
            }
        }
    }
    if matches!(cli.command(), Command::Migrate) {
        return Ok(());
    }
    if state.config.author_token_secret.is_none() {
        warn!("MARGINALIA_AUTHOR_TOKEN_SECRET not set; posting comments is disabled");
    }

    let addr = state.config.http_addr;
    info!(%addr, "http server starting");
    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        res = http::serve(addr, state) => {
            res?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
    }
}
