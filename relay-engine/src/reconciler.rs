//! Backlog reconciliation: link history that predates the relay so later edits propagate.
//!
//! Runs once at startup, before live events are processed. Every strategy skips messages that
//! are already linked, so an interrupted pass can be repeated safely.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;
use relay_core::{fingerprint, ChatId, HistoryStream, Message, MessageId, Transport};
use storage::{MappingStore, MessageRecord};
use tracing::{debug, info, instrument, warn};

use crate::error::RelayError;
use crate::governor::Governor;

/// How pre-existing history is paired with target messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BacklogStrategy {
    /// Pair the i-th source message with the i-th target message, oldest first, over the full
    /// histories. Assumes the target was filled by an earlier run of this relay and nothing was
    /// removed.
    #[default]
    Positional,
    /// Pair by identical normalized text.
    ContentMatch,
    /// Record placeholders only; no target message is claimed.
    TrackOnly,
    Disabled,
}

impl FromStr for BacklogStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "content" | "content_match" | "content-match" => Ok(Self::ContentMatch),
            "track" | "track_only" | "track-only" => Ok(Self::TrackOnly),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(format!(
                "unknown backlog strategy '{}' (expected positional, content_match, track_only or disabled)",
                other
            )),
        }
    }
}

impl fmt::Display for BacklogStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Positional => "positional",
            Self::ContentMatch => "content_match",
            Self::TrackOnly => "track_only",
            Self::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Windows bound content matching and track-only passes. Positional pairing ignores them: a
/// window cut by raw message count shifts every pair once a service message falls inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogConfig {
    pub strategy: BacklogStrategy,
    /// Most recent source messages considered.
    pub source_window: usize,
    /// Most recent messages read from each target.
    pub target_window: usize,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            strategy: BacklogStrategy::default(),
            source_window: 1000,
            target_window: 1000,
        }
    }
}

pub struct Reconciler {
    transport: Arc<dyn Transport>,
    store: Arc<dyn MappingStore>,
    governor: Governor,
    source_chat: ChatId,
    targets: Vec<ChatId>,
    config: BacklogConfig,
}

impl Reconciler {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn MappingStore>,
        governor: Governor,
        source_chat: ChatId,
        targets: Vec<ChatId>,
        config: BacklogConfig,
    ) -> Self {
        Self {
            transport,
            store,
            governor,
            source_chat,
            targets,
            config,
        }
    }

    pub fn config(&self) -> &BacklogConfig {
        &self.config
    }

    /// Runs the configured strategy. Returns the number of records created.
    pub async fn reconcile(&self) -> Result<usize, RelayError> {
        self.reconcile_with(self.config.strategy).await
    }

    /// Runs `strategy` regardless of the configured one. A failed pass is retried as a whole
    /// through the governor; records written by earlier attempts are kept and skipped.
    #[instrument(skip(self), fields(source_chat = self.source_chat))]
    pub async fn reconcile_with(&self, strategy: BacklogStrategy) -> Result<usize, RelayError> {
        if strategy == BacklogStrategy::Disabled {
            info!("Backlog reconciliation disabled");
            return Ok(0);
        }

        let created = AtomicUsize::new(0);
        let result = self
            .governor
            .execute_with_backoff("reconcile", || self.run_pass(strategy, &created))
            .await;
        let total = created.load(Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!(%strategy, created = total, "Backlog reconciled");
                Ok(total)
            }
            Err(e) => {
                warn!(%strategy, created = total, error = %e, "Backlog reconciliation failed");
                Err(e)
            }
        }
    }

    async fn run_pass(&self, strategy: BacklogStrategy, created: &AtomicUsize) -> Result<(), RelayError> {
        match strategy {
            BacklogStrategy::Positional => {
                for &target in &self.targets {
                    self.align_positional(target, created).await?;
                }
            }
            BacklogStrategy::ContentMatch => {
                for &target in &self.targets {
                    self.match_content(target, created).await?;
                }
            }
            BacklogStrategy::TrackOnly => self.track_only(created).await?,
            BacklogStrategy::Disabled => {}
        }
        Ok(())
    }

    fn source_history(&self) -> HistoryStream<'_> {
        self.transport
            .history(self.source_chat, Some(self.config.source_window))
    }

    fn target_history(&self, target: ChatId) -> HistoryStream<'_> {
        self.transport.history(target, Some(self.config.target_window))
    }

    async fn align_positional(&self, target: ChatId, created: &AtomicUsize) -> Result<(), RelayError> {
        let mut source = self.transport.history(self.source_chat, None);
        let mut copies = self.transport.history(target, None);
        let mut paired = 0usize;

        loop {
            let src = next_content(&mut source).await?;
            let copy = next_content(&mut copies).await?;
            match (src, copy) {
                (Some(src), Some(copy)) => {
                    paired += 1;
                    if self.link(&src, target, copy.id).await? {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                }
                (None, None) => break,
                (src, copy) => {
                    warn!(
                        target_chat = target,
                        paired,
                        source_longer = src.is_some(),
                        target_longer = copy.is_some(),
                        "Histories differ in length; positional pairing may be misaligned"
                    );
                    break;
                }
            }
        }

        debug!(target_chat = target, paired, "Positional pass done");
        Ok(())
    }

    async fn match_content(&self, target: ChatId, created: &AtomicUsize) -> Result<(), RelayError> {
        let mut candidates: HashMap<String, VecDeque<MessageId>> = HashMap::new();
        let mut claimed = 0usize;
        let mut copies = self.target_history(target);
        while let Some(copy) = next_content(&mut copies).await? {
            let Some(key) = normalize(copy.text.as_deref()) else {
                continue;
            };
            // A copy owned by another source message must never be linked twice.
            if self.store.find_by_target(target, copy.id).await?.is_some() {
                claimed += 1;
                continue;
            }
            candidates.entry(key).or_default().push_back(copy.id);
        }

        let mut source = self.source_history();
        let mut unmatched = 0usize;
        while let Some(src) = next_content(&mut source).await? {
            let Some(key) = normalize(src.text.as_deref()) else {
                continue;
            };
            if self.store.exists(self.source_chat, src.id, target).await? {
                continue;
            }
            match candidates.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(copy_id) => {
                    if self.link(&src, target, copy_id).await? {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                }
                None => unmatched += 1,
            }
        }

        debug!(target_chat = target, claimed, unmatched, "Content match pass done");
        Ok(())
    }

    async fn track_only(&self, created: &AtomicUsize) -> Result<(), RelayError> {
        let mut source = self.source_history();
        while let Some(src) = next_content(&mut source).await? {
            if !self
                .store
                .find_by_source(self.source_chat, src.id)
                .await?
                .is_empty()
            {
                continue;
            }
            self.store
                .upsert(&MessageRecord::placeholder(self.source_chat, src.id))
                .await?;
            created.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Links `src` to `copy_id` unless `src` is already linked in `target`. Returns whether a
    /// record was written.
    async fn link(&self, src: &Message, target: ChatId, copy_id: MessageId) -> Result<bool, RelayError> {
        if self.store.exists(self.source_chat, src.id, target).await? {
            return Ok(false);
        }
        let record = MessageRecord::linked(
            self.source_chat,
            src.id,
            target,
            copy_id,
            fingerprint(src).into_string(),
            src.has_media(),
        );
        self.store.upsert(&record).await?;
        Ok(true)
    }
}

/// Next non-service message of a history stream.
async fn next_content(stream: &mut HistoryStream<'_>) -> Result<Option<Message>, RelayError> {
    while let Some(message) = stream.try_next().await? {
        if !message.is_service {
            return Ok(Some(message));
        }
    }
    Ok(None)
}

/// Trimmed text with unified line endings; `None` for empty text.
fn normalize(text: Option<&str>) -> Option<String> {
    let text = text?.replace("\r\n", "\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
