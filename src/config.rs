use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::fetch::DEFAULT_ASSETS_URL;

#[derive(Debug, Parser)]
#[command(name = "coinstats", version, about = "Hourly CoinCap price logger and query API")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the ingestion task and the HTTP API (default)
    Serve,
    /// Run a single ingestion cycle and print the stored coins
    Sync,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// SQLite connection string; the file is created if missing
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://coinstats.db", global = true)]
    pub database_url: String,

    /// CoinCap assets endpoint
    #[arg(long, env = "COINCAP_URL", default_value = DEFAULT_ASSETS_URL, global = true)]
    pub coincap_url: String,

    /// Bearer token required by /start-task
    #[arg(long, env = "API_TOKEN", default_value = "token", hide_env_values = true, global = true)]
    pub api_token: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000, global = true)]
    pub port: u16,

    /// Seconds between ingestion cycles
    #[arg(long, env = "INGEST_INTERVAL_SECS", default_value_t = 3600, global = true)]
    pub ingest_interval_secs: u64,
}

impl Config {
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs.max(1))
    }
}
