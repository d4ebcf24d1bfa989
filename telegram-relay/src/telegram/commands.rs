//! Admin commands, accepted only from ADMIN_ID.

use relay_engine::BacklogStrategy;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Relay admin commands:")]
pub enum AdminCommand {
    #[command(description = "show this help.")]
    Start,
    #[command(description = "show linked / waiting record counts.")]
    Status,
    #[command(description = "reconcile the backlog: /scan [positional|content_match|track_only]")]
    Scan(String),
}

impl AdminCommand {
    /// Strategy requested by `/scan`; bare `/scan` only tracks (records placeholders).
    pub fn scan_strategy(arg: &str) -> Result<BacklogStrategy, String> {
        if arg.trim().is_empty() {
            return Ok(BacklogStrategy::TrackOnly);
        }
        arg.parse()
    }

    pub fn help() -> String {
        Self::descriptions().to_string()
    }
}
