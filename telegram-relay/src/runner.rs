//! Relay runner: builds the components from config, reconciles the backlog, then relays live
//! updates until Ctrl-C.
//!
//! Live updates are accepted from the start but held in the dispatcher lanes until the startup
//! backlog pass has finished, so no edit is handled against a half-built mapping.

use anyhow::{Context, Result};
use relay_engine::{BacklogStrategy, Dispatcher, Governor, Reconciler, RelayEngine};
use std::sync::Arc;
use storage::{MappingStore, SqliteMappingStore};
use teloxide::prelude::*;
use tracing::{error, info, instrument, warn};

use crate::config::{BaseConfig, RelayConfig};
use crate::telegram::{run_dispatch, status_text, ExportHistory, RelayState, TelegramTransport};

/// Everything the relay needs at runtime.
pub struct RelayComponents {
    pub bot: Bot,
    pub transport: Arc<TelegramTransport>,
    pub store: Arc<dyn MappingStore>,
    pub engine: Arc<RelayEngine>,
    pub reconciler: Arc<Reconciler>,
    pub source_chat: i64,
    pub targets: Vec<i64>,
}

/// teloxide Bot with the optional custom API URL.
pub fn build_bot(base: &BaseConfig) -> Bot {
    let bot = Bot::new(base.bot_token.clone());
    match base.telegram_api_url.as_deref().map(reqwest::Url::parse) {
        Some(Ok(url)) => bot.set_api_url(url),
        Some(Err(e)) => {
            error!(error = %e, "Invalid TELEGRAM_API_URL, using default");
            bot
        }
        None => bot,
    }
}

/// Opens the store, resolves the configured chats and wires engine and reconciler.
#[instrument(skip(config))]
pub async fn build_components(config: &RelayConfig) -> Result<RelayComponents> {
    let bot = build_bot(config.base());
    let transport = Arc::new(TelegramTransport::new(
        bot.clone(),
        ExportHistory::new(config.relay().history_export_dir.clone()),
    ));

    let store: Arc<dyn MappingStore> = Arc::new(
        SqliteMappingStore::new(config.database_url())
            .await
            .with_context(|| format!("opening mapping store {}", config.database_url()))?,
    );

    let source_chat = transport
        .resolve_chat(config.source_chat())
        .await
        .with_context(|| format!("resolving SOURCE_CHAT {}", config.source_chat()))?;
    let mut targets = Vec::with_capacity(config.target_chats().len());
    for chat in config.target_chats() {
        let id = transport
            .resolve_chat(chat)
            .await
            .with_context(|| format!("resolving target {}", chat))?;
        if id == source_chat {
            anyhow::bail!("target {} resolves to the source chat", chat);
        }
        targets.push(id);
    }

    let governor = Governor::new(config.retry().clone());
    let engine = Arc::new(RelayEngine::new(
        transport.clone(),
        store.clone(),
        governor.clone(),
        source_chat,
        targets.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        transport.clone(),
        store.clone(),
        governor,
        source_chat,
        targets.clone(),
        config.backlog().clone(),
    ));

    info!(source_chat, targets = ?targets, "Relay components ready");
    Ok(RelayComponents {
        bot,
        transport,
        store,
        engine,
        reconciler,
        source_chat,
        targets,
    })
}

/// Main entry: init logging, validate config, build components, reconcile, then relay.
#[instrument(skip(config))]
pub async fn run_relay(config: RelayConfig) -> Result<()> {
    config.validate()?;
    relay_core::init_tracing(config.log_file())?;

    info!(
        database_url = %config.database_url(),
        strategy = %config.backlog().strategy,
        workers = config.workers(),
        "Initializing relay"
    );

    let components = build_components(&config).await?;
    let dispatcher = Dispatcher::start(components.engine.clone(), config.workers());
    let state = Arc::new(RelayState {
        events: dispatcher.handle(),
        source_chat: components.source_chat,
        targets: components.targets.clone(),
        admin_id: config.admin_id(),
        reconciler: components.reconciler.clone(),
        store: components.store.clone(),
    });

    let listener = tokio::spawn(run_dispatch(components.bot.clone(), state));

    let reconciled = match components.reconciler.reconcile().await {
        Ok(created) => Some(created),
        Err(e) => {
            error!(error = %e, "Startup backlog reconciliation failed; relaying live updates only");
            None
        }
    };
    dispatcher.open();
    info!("Relay started successfully");

    if let Some(admin) = config.admin_id() {
        let notice = startup_notice(&components, reconciled);
        if let Err(e) = components.bot.send_message(ChatId(admin), notice).await {
            warn!(error = %e, admin, "Could not notify admin");
        }
    }

    if let Err(e) = listener.await {
        error!(error = %e, "Update listener stopped unexpectedly");
    }

    info!("Shutting down");
    dispatcher.shutdown().await;
    components.store.close().await;
    Ok(())
}

fn startup_notice(components: &RelayComponents, reconciled: Option<usize>) -> String {
    let backlog = match reconciled {
        Some(created) => format!("backlog: {} records created", created),
        None => "backlog: reconciliation failed, see logs".to_string(),
    };
    format!(
        "Relay started.\nSource: {}\nTargets: {}\n{}",
        components.source_chat,
        components.targets.len(),
        backlog
    )
}

/// One-shot backlog pass (CLI `reconcile`).
#[instrument(skip(config))]
pub async fn run_reconcile(config: RelayConfig, strategy: Option<BacklogStrategy>) -> Result<usize> {
    config.validate()?;
    relay_core::init_tracing(config.log_file())?;

    let components = build_components(&config).await?;
    let strategy = strategy.unwrap_or(config.backlog().strategy);
    let created = components.reconciler.reconcile_with(strategy).await;
    components.store.close().await;
    Ok(created?)
}

/// Mapping store summary (CLI `status`); needs only DATABASE_URL.
pub async fn store_status(database_url: &str) -> Result<String> {
    let store = SqliteMappingStore::new(database_url)
        .await
        .with_context(|| format!("opening mapping store {}", database_url))?;
    let text = status_text(&store).await;
    store.close().await;
    Ok(text)
}
