//! Telegram framework layer: adapters, Bot API transport, history exports, admin commands,
//! update runner.

mod adapters;
mod commands;
mod history;
mod runner;
mod transport;

pub use adapters::{relay_entities, telegram_entities, TelegramMessageWrapper};
pub use commands::AdminCommand;
pub use history::ExportHistory;
pub use runner::{run_dispatch, schema, status_text, RelayState};
pub use transport::{map_request_error, TelegramTransport};
