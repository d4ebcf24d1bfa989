//! Relay engine: new-message fan-out and edit propagation.
//!
//! Per (source message, target) the engine moves through:
//!
//! ```text
//! unseen ──new──▶ linked ──edit(text)──▶ linked (edited in place)
//!   │                └──edit(media)──▶ linked (deleted + resent, new target id)
//!   └──edit──▶ placeholder ──new / backlog──▶ linked
//! ```
//!
//! Targets are independent: one failing target never blocks or rolls back another.

use std::sync::Arc;

use futures::future::join_all;
use relay_core::{fingerprint, ChatId, Fingerprint, Message, MessageId, SentMessage, Transport, TransportError};
use storage::{MappingStore, MessageRecord};
use tracing::{debug, info, instrument, warn};

use crate::error::RelayError;
use crate::governor::Governor;

/// What happened in one target chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    /// A copy was sent (new message, or an edit reaching a target that never got one).
    Created { target_msg_id: MessageId },
    /// Already linked; nothing sent.
    AlreadyLinked,
    /// Fingerprint unchanged; nothing sent.
    Unchanged,
    /// Text edited in place.
    Updated { target_msg_id: MessageId },
    /// Media copy deleted (best effort) and resent.
    Replaced { old_msg_id: MessageId, new_msg_id: MessageId },
    /// The linked copy was gone; a fresh copy was sent and linked.
    Relinked { old_msg_id: MessageId, new_msg_id: MessageId },
}

/// Result for one target chat.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target_chat_id: ChatId,
    pub result: Result<TargetAction, RelayError>,
}

impl TargetOutcome {
    fn new(target_chat_id: ChatId, result: Result<TargetAction, RelayError>) -> Self {
        Self {
            target_chat_id,
            result,
        }
    }
}

/// Why an event was not relayed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Event from a chat other than the configured source.
    ForeignChat,
    /// Service message (join, pin, title change, ...).
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignored(IgnoreReason),
    /// Edit of an untracked message: a placeholder was recorded, nothing sent.
    Placeholder,
    /// Processed against the targets; see the outcomes.
    Relayed,
}

/// Summary of one `handle_new` / `handle_edit` call.
#[derive(Debug)]
pub struct RelayReport {
    pub source_chat_id: ChatId,
    pub source_msg_id: MessageId,
    pub disposition: Disposition,
    pub outcomes: Vec<TargetOutcome>,
}

impl RelayReport {
    fn without_targets(message: &Message, disposition: Disposition) -> Self {
        Self {
            source_chat_id: message.chat_id,
            source_msg_id: message.id,
            disposition,
            outcomes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// True when at least one target failed with a retryable error; redelivering the event
    /// only touches those targets since the others are already linked.
    pub fn needs_retry(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(&o.result, Err(e) if e.is_retryable()))
    }

    pub fn outcome_for(&self, target_chat_id: ChatId) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.target_chat_id == target_chat_id)
    }
}

/// Relays one source chat into a fixed set of target chats.
pub struct RelayEngine {
    transport: Arc<dyn Transport>,
    store: Arc<dyn MappingStore>,
    governor: Governor,
    source_chat: ChatId,
    targets: Vec<ChatId>,
}

impl RelayEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn MappingStore>,
        governor: Governor,
        source_chat: ChatId,
        targets: Vec<ChatId>,
    ) -> Self {
        Self {
            transport,
            store,
            governor,
            source_chat,
            targets,
        }
    }

    pub fn source_chat(&self) -> ChatId {
        self.source_chat
    }

    pub fn targets(&self) -> &[ChatId] {
        &self.targets
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    /// Fans a new source message out to every target that does not have a copy yet.
    ///
    /// Safe to call again for the same message: linked targets are skipped.
    #[instrument(skip(self, message), fields(source_msg_id = message.id))]
    pub async fn handle_new(&self, message: &Message) -> Result<RelayReport, RelayError> {
        if let Some(reason) = self.ignore_reason(message) {
            debug!(?reason, "Ignoring message");
            return Ok(RelayReport::without_targets(message, Disposition::Ignored(reason)));
        }

        let fp = fingerprint(message);
        let fp = &fp;
        let outcomes = join_all(self.targets.iter().map(|&target| async move {
            TargetOutcome::new(target, self.relay_to_target(message, fp, target).await)
        }))
        .await;

        let report = RelayReport {
            source_chat_id: message.chat_id,
            source_msg_id: message.id,
            disposition: Disposition::Relayed,
            outcomes,
        };
        log_outcomes("new", &report);
        Ok(report)
    }

    /// Propagates an edit of a source message to every linked copy.
    ///
    /// Edits of untracked messages only leave a placeholder. Targets configured after the
    /// original relay (or that failed back then) receive a fresh copy.
    #[instrument(skip(self, message), fields(source_msg_id = message.id))]
    pub async fn handle_edit(&self, message: &Message) -> Result<RelayReport, RelayError> {
        if let Some(reason) = self.ignore_reason(message) {
            debug!(?reason, "Ignoring edit");
            return Ok(RelayReport::without_targets(message, Disposition::Ignored(reason)));
        }

        let records = self.store.find_by_source(message.chat_id, message.id).await?;
        let linked: Vec<(ChatId, MessageId, &MessageRecord)> = records
            .iter()
            .filter_map(|r| match (r.target_chat_id, r.target_msg_id) {
                (Some(chat), Some(msg)) => Some((chat, msg, r)),
                _ => None,
            })
            .collect();

        if linked.is_empty() {
            self.store
                .upsert(&MessageRecord::placeholder(message.chat_id, message.id))
                .await?;
            info!("Edit of untracked message, placeholder recorded");
            return Ok(RelayReport::without_targets(message, Disposition::Placeholder));
        }

        let fp = fingerprint(message);
        let fp = &fp;
        let edits = join_all(linked.iter().map(|&(chat, msg, record)| async move {
            TargetOutcome::new(chat, self.sync_edit(message, fp, chat, msg, record).await)
        }));
        let missing = join_all(
            self.targets
                .iter()
                .filter(|&&t| !linked.iter().any(|&(chat, _, _)| chat == t))
                .map(|&target| async move {
                    TargetOutcome::new(target, self.relay_to_target(message, fp, target).await)
                }),
        );
        let (mut outcomes, created) = futures::join!(edits, missing);
        outcomes.extend(created);

        let report = RelayReport {
            source_chat_id: message.chat_id,
            source_msg_id: message.id,
            disposition: Disposition::Relayed,
            outcomes,
        };
        log_outcomes("edit", &report);
        Ok(report)
    }

    fn ignore_reason(&self, message: &Message) -> Option<IgnoreReason> {
        if message.chat_id != self.source_chat {
            Some(IgnoreReason::ForeignChat)
        } else if message.is_service {
            Some(IgnoreReason::Service)
        } else {
            None
        }
    }

    async fn relay_to_target(
        &self,
        message: &Message,
        fp: &Fingerprint,
        target: ChatId,
    ) -> Result<TargetAction, RelayError> {
        if self.store.exists(message.chat_id, message.id, target).await? {
            return Ok(TargetAction::AlreadyLinked);
        }
        let sent = self.send_copy(target, message).await?;
        self.link(message, fp, target, sent.id).await?;
        Ok(TargetAction::Created {
            target_msg_id: sent.id,
        })
    }

    async fn sync_edit(
        &self,
        message: &Message,
        fp: &Fingerprint,
        target: ChatId,
        target_msg: MessageId,
        record: &MessageRecord,
    ) -> Result<TargetAction, RelayError> {
        if record.fingerprint.as_deref() == Some(fp.as_str()) {
            return Ok(TargetAction::Unchanged);
        }

        if record.has_media || message.has_media() {
            return self.replace(message, fp, target, target_msg).await;
        }

        let edited = self
            .governor
            .execute_with_backoff("edit", || {
                self.transport
                    .edit(target, target_msg, message.text_or_empty(), &message.entities)
            })
            .await;

        match edited {
            Ok(()) | Err(TransportError::NotModified) => {
                self.link(message, fp, target, target_msg).await?;
                Ok(TargetAction::Updated {
                    target_msg_id: target_msg,
                })
            }
            Err(TransportError::NotFound(reason)) => {
                warn!(target_chat = target, target_msg, %reason, "Linked copy is gone, sending a fresh one");
                let sent = self.send_copy(target, message).await?;
                self.link(message, fp, target, sent.id).await?;
                Ok(TargetAction::Relinked {
                    old_msg_id: target_msg,
                    new_msg_id: sent.id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Media cannot be edited in place: delete the old copy, then send a new one.
    async fn replace(
        &self,
        message: &Message,
        fp: &Fingerprint,
        target: ChatId,
        old_msg: MessageId,
    ) -> Result<TargetAction, RelayError> {
        if let Err(e) = self
            .governor
            .execute_with_backoff("delete", || self.transport.delete(target, old_msg))
            .await
        {
            warn!(target_chat = target, old_msg, error = %e, "Could not delete previous copy");
        }

        let sent = self.send_copy(target, message).await?;
        self.link(message, fp, target, sent.id).await?;
        Ok(TargetAction::Replaced {
            old_msg_id: old_msg,
            new_msg_id: sent.id,
        })
    }

    async fn send_copy(&self, target: ChatId, message: &Message) -> Result<SentMessage, TransportError> {
        self.governor
            .execute_with_backoff("send", || self.transport.send(target, message))
            .await
    }

    async fn link(
        &self,
        message: &Message,
        fp: &Fingerprint,
        target: ChatId,
        target_msg: MessageId,
    ) -> Result<(), RelayError> {
        let record = MessageRecord::linked(
            message.chat_id,
            message.id,
            target,
            target_msg,
            fp.as_str(),
            message.has_media(),
        );
        self.store.upsert(&record).await?;
        Ok(())
    }
}

fn log_outcomes(kind: &str, report: &RelayReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(TargetAction::AlreadyLinked) | Ok(TargetAction::Unchanged) => {
                debug!(kind, target_chat = outcome.target_chat_id, result = ?outcome.result, "Nothing to do");
            }
            Ok(action) => {
                info!(kind, target_chat = outcome.target_chat_id, ?action, "Relayed");
            }
            Err(e) => {
                warn!(
                    kind,
                    target_chat = outcome.target_chat_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Relay to target failed"
                );
            }
        }
    }
}
