//! Update runner: turns teloxide updates into relay events and admin command replies.
//!
//! Channel sources arrive as `channel_post` / `edited_channel_post`, group sources as
//! `message` / `edited_message`. Updates from any other chat are dropped here; the engine
//! guards against foreign chats as well.

use std::error::Error;
use std::sync::Arc;

use relay_core::ToRelayMessage;
use relay_engine::{DispatchHandle, Reconciler, RelayEvent};
use storage::MappingStore;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use super::adapters::TelegramMessageWrapper;
use super::commands::AdminCommand;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Shared state injected into every update handler.
pub struct RelayState {
    pub events: DispatchHandle,
    pub source_chat: i64,
    pub targets: Vec<i64>,
    pub admin_id: Option<i64>,
    pub reconciler: Arc<Reconciler>,
    pub store: Arc<dyn MappingStore>,
}

impl RelayState {
    fn is_source(&self, msg: &Message) -> bool {
        msg.chat.id.0 == self.source_chat
    }

    fn is_admin(&self, msg: &Message) -> bool {
        match (self.admin_id, msg.from.as_ref()) {
            (Some(admin), Some(user)) => user.id.0 as i64 == admin,
            _ => false,
        }
    }
}

/// Update tree: admin commands, then source posts and edits.
pub fn schema() -> UpdateHandler<Box<dyn Error + Send + Sync + 'static>> {
    let admin_commands = dptree::filter(|msg: Message, state: Arc<RelayState>| state.is_admin(&msg))
        .filter_command::<AdminCommand>()
        .endpoint(on_admin_command);

    let from_source = |msg: Message, state: Arc<RelayState>| state.is_source(&msg);

    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(admin_commands)
                .branch(dptree::filter(from_source).endpoint(on_new)),
        )
        .branch(Update::filter_channel_post().filter(from_source).endpoint(on_new))
        .branch(Update::filter_edited_message().filter(from_source).endpoint(on_edit))
        .branch(
            Update::filter_edited_channel_post()
                .filter(from_source)
                .endpoint(on_edit),
        )
}

/// Runs the teloxide dispatcher until Ctrl-C.
#[instrument(skip(bot, state))]
pub async fn run_dispatch(bot: Bot, state: Arc<RelayState>) {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|update| async move {
            debug!(update_id = update.id.0, "Unhandled update");
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_new(msg: Message, state: Arc<RelayState>) -> HandlerResult {
    let message = TelegramMessageWrapper(&msg).to_relay();
    debug!(source_msg_id = message.id, "Source message received");
    state.events.submit(RelayEvent::New(message)).await?;
    Ok(())
}

async fn on_edit(msg: Message, state: Arc<RelayState>) -> HandlerResult {
    let message = TelegramMessageWrapper(&msg).to_relay();
    debug!(source_msg_id = message.id, "Source edit received");
    state.events.submit(RelayEvent::Edited(message)).await?;
    Ok(())
}

async fn on_admin_command(
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
    state: Arc<RelayState>,
) -> HandlerResult {
    info!(command = ?cmd, "Admin command");
    let reply = match cmd {
        AdminCommand::Start => liveness_text(&state),
        AdminCommand::Status => status_text(state.store.as_ref()).await,
        AdminCommand::Scan(arg) => match AdminCommand::scan_strategy(&arg) {
            Ok(strategy) => {
                bot.send_message(msg.chat.id, format!("Scanning backlog ({})...", strategy))
                    .await?;
                match state.reconciler.reconcile_with(strategy).await {
                    Ok(created) => format!("Scan done: {} records created.", created),
                    Err(e) => {
                        error!(error = %e, "Admin scan failed");
                        format!("Scan failed: {}", e)
                    }
                }
            }
            Err(e) => e,
        },
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn liveness_text(state: &RelayState) -> String {
    format!(
        "Relay is running.\nSource: {}\nTargets: {}\n\n{}",
        state.source_chat,
        state.targets.len(),
        AdminCommand::help()
    )
}

/// Human-readable store summary for `/status` and the CLI.
pub async fn status_text(store: &dyn MappingStore) -> String {
    match store.stats().await {
        Ok(stats) => {
            let last = stats
                .last_update
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            format!(
                "Linked: {}\nWaiting: {}\nSource messages: {}\nLast update: {}",
                stats.ready, stats.pending, stats.source_messages, last
            )
        }
        Err(e) => {
            warn!(error = %e, "Could not read mapping stats");
            format!("Mapping store unavailable: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{InMemoryMappingStore, MessageRecord};

    #[tokio::test]
    async fn test_status_text_counts() {
        let store = InMemoryMappingStore::new();
        store.upsert(&MessageRecord::placeholder(-1, 1)).await.unwrap();
        store
            .upsert(&MessageRecord::linked(-1, 2, -2, 20, "fp", false))
            .await
            .unwrap();

        let text = status_text(&store).await;

        assert!(text.contains("Linked: 1"));
        assert!(text.contains("Waiting: 1"));
        assert!(text.contains("Source messages: 2"));
    }

    #[tokio::test]
    async fn test_status_text_empty_store() {
        let text = status_text(&InMemoryMappingStore::new()).await;
        assert!(text.contains("Linked: 0"));
        assert!(text.contains("never"));
    }
}
