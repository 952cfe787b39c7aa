use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "marginalia", author, version, about)]
pub struct Cli {
    /// Skip applying database migrations at startup.
    #[arg(long, default_value_t = false, global = true)]
    pub skip_migrations: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Apply database migrations and exit.
    Migrate,
    /// Print a signed author token for an existing user.
    IssueToken {
        #[arg(long)]
        user_id: i64,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Rejects flag combinations that contradict the subcommand.
    pub fn validate(&self) -> Result<(), String> {
        if self.skip_migrations && matches!(self.command(), Command::Migrate) {
            return Err("--skip-migrations cannot be combined with migrate".to_string());
        }
        Ok(())
    }
}
