//! CLI parser and config loading.

use anyhow::Result;
use clap::{Parser, Subcommand};
use relay_engine::BacklogStrategy;

use crate::config::RelayConfig;

#[derive(Parser, Debug)]
#[command(name = "channel-relay")]
#[command(about = "Mirror a Telegram channel or group into target chats, edits included", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay (config from env; token can override BOT_TOKEN).
    Run {
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Reconcile the backlog once and exit.
    Reconcile {
        #[arg(short, long)]
        token: Option<String>,
        /// positional, content_match, track_only or disabled; default BACKLOG_STRATEGY
        #[arg(short, long)]
        strategy: Option<BacklogStrategy>,
    },
    /// Print mapping store counts (needs only DATABASE_URL).
    Status,
}

/// Load RelayConfig from environment. If `token` is provided it overrides BOT_TOKEN.
pub fn load_config(token: Option<String>) -> Result<RelayConfig> {
    RelayConfig::load(token)
}
