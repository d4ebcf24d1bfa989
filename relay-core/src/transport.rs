//! Transport abstraction for reading and writing chat messages.
//!
//! [`Transport`] is transport-agnostic; the Telegram implementation lives in telegram-relay.
//! Tests substitute a recording mock.

use crate::error::Result;
use crate::types::{ChatId, Message, MessageId, SentMessage, TextEntity};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy sequence of historical messages, yielded oldest-first.
pub type HistoryStream<'a> = BoxStream<'a, Result<Message>>;

/// Reads history from and writes copies into chats. Every call may fail with
/// [`crate::TransportError::RateLimited`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// The most recent `limit` messages of `chat` (all when `None`), oldest first.
    fn history(&self, chat: ChatId, limit: Option<usize>) -> HistoryStream<'_>;

    /// Sends a copy of `message` (media + caption, or text only) into `chat`.
    async fn send(&self, chat: ChatId, message: &Message) -> Result<SentMessage>;

    /// Replaces the text and formatting of an already-sent text message.
    async fn edit(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        entities: &[TextEntity],
    ) -> Result<()>;

    async fn delete(&self, chat: ChatId, message_id: MessageId) -> Result<()>;
}
