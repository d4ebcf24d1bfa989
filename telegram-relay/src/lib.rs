//! # Telegram channel relay
//!
//! Mirrors one source channel or group into a set of target chats and keeps the copies in sync
//! when source messages are edited. Wires relay-engine, storage and the teloxide transport;
//! loads config from env.

pub mod cli;
pub mod config;
pub mod runner;
pub mod telegram;

pub use cli::{load_config, Cli, Commands};
pub use config::{BaseConfig, ChatRef, RelayConfig, RelaySettings};
pub use runner::{build_components, run_reconcile, run_relay, store_status, RelayComponents};
pub use telegram::{AdminCommand, ExportHistory, TelegramMessageWrapper, TelegramTransport};
