//! Wraps teloxide::Bot and implements [`relay_core::Transport`].
//!
//! Sends are `copyMessage` from the source chat, so the copy carries the same text, entities,
//! media and caption without a "forwarded from" header.

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use relay_core::{HistoryStream, Message, SentMessage, TextEntity, Transport, TransportError};
use teloxide::prelude::*;
use teloxide::types::{MessageId, Recipient};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use super::adapters::telegram_entities;
use super::history::ExportHistory;
use crate::config::ChatRef;

/// Thin wrapper around teloxide::Bot that implements the relay Transport.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: teloxide::Bot,
    history: ExportHistory,
}

impl TelegramTransport {
    pub fn new(bot: teloxide::Bot, history: ExportHistory) -> Self {
        Self { bot, history }
    }

    /// Returns the underlying teloxide::Bot for direct API use when needed.
    pub fn inner(&self) -> &teloxide::Bot {
        &self.bot
    }

    /// Numeric id of a configured chat; usernames are looked up with getChat.
    pub async fn resolve_chat(&self, chat: &ChatRef) -> Result<i64, TransportError> {
        match chat {
            ChatRef::Id(id) => Ok(*id),
            ChatRef::Username(name) => {
                let info = self
                    .bot
                    .get_chat(Recipient::ChannelUsername(name.clone()))
                    .await
                    .map_err(map_request_error)?;
                debug!(username = %name, chat_id = info.id.0, "Resolved chat");
                Ok(info.id.0)
            }
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn history(&self, chat: i64, limit: Option<usize>) -> HistoryStream<'_> {
        let history = self.history.clone();
        stream::once(async move { history.load(chat, limit).await })
            .map_ok(|messages| stream::iter(messages.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    async fn send(&self, chat: i64, message: &Message) -> relay_core::Result<SentMessage> {
        let copied = self
            .bot
            .copy_message(ChatId(chat), ChatId(message.chat_id), MessageId(message.id))
            .await
            .map_err(map_request_error)?;
        Ok(SentMessage {
            chat_id: chat,
            id: copied.0,
        })
    }

    async fn edit(
        &self,
        chat: i64,
        message_id: i32,
        text: &str,
        entities: &[TextEntity],
    ) -> relay_core::Result<()> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat), MessageId(message_id), text);
        if !entities.is_empty() {
            request = request.entities(telegram_entities(entities));
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn delete(&self, chat: i64, message_id: i32) -> relay_core::Result<()> {
        self.bot
            .delete_message(ChatId(chat), MessageId(message_id))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }
}

/// Classifies a Bot API failure for the relay governor.
pub fn map_request_error(err: RequestError) -> TransportError {
    match err {
        RequestError::RetryAfter(wait) => TransportError::RateLimited(wait.duration()),
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
        RequestError::Api(
            e @ (ApiError::MessageToEditNotFound | ApiError::MessageToDeleteNotFound),
        ) => TransportError::NotFound(e.to_string()),
        other => TransportError::Api(other.to_string()),
    }
}
