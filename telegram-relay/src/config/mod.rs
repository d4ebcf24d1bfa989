//! Relay configuration: BaseConfig (Telegram + log + DB) + RelaySettings (chats, backlog, retry).

mod base;
mod relay_config;
mod relay_settings;


pub use base::{BaseConfig, DEFAULT_DATABASE_URL, DEFAULT_LOG_FILE};
pub use relay_config::RelayConfig;
pub use relay_settings::{parse_chat_list, ChatRef, RelaySettings};
