//! Core types: message, media descriptor, sent-message identity, and conversion trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat (channel, group or private) identity.
pub type ChatId = i64;

/// Message identity, unique within one chat.
pub type MessageId = i32;

/// Kind of the single media attachment a message may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Animation,
    Sticker,
    VideoNote,
    Other,
}

impl MediaKind {
    /// Stable tag used in fingerprints and logs.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Animation => "animation",
            Self::Sticker => "sticker",
            Self::VideoNote => "video_note",
            Self::Other => "other",
        }
    }
}

/// Identifying attributes of a media attachment. Not the payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    /// Transport-specific stable file id (e.g. Telegram `file_unique_id`).
    pub file_unique_id: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

impl MediaDescriptor {
    /// Descriptor with only a kind; attributes are filled with the `with_*` builders.
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            file_unique_id: None,
            file_name: None,
            file_size: None,
        }
    }

    pub fn with_unique_id(mut self, id: impl Into<String>) -> Self {
        self.file_unique_id = Some(id.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }
}

/// Bot API user carried by a `text_mention` entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUser {
    pub id: u64,
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Formatting span over the text or caption, in the Bot API `MessageEntity` shape.
/// `offset` and `length` count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntity {
    /// Bot API entity type (`bold`, `text_link`, `pre`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emoji_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<EntityUser>,
}

impl TextEntity {
    pub fn new(kind: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            kind: kind.into(),
            offset,
            length,
            url: None,
            language: None,
            custom_emoji_id: None,
            user: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A message observed in a chat: text or caption plus at most one media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    /// Text body, or the caption when the message carries media.
    pub text: Option<String>,
    /// Formatting of `text`; empty for plain text.
    #[serde(default)]
    pub entities: Vec<TextEntity>,
    pub media: Option<MediaDescriptor>,
    /// Join/leave, pin, title change and similar; never relayed.
    pub is_service: bool,
    pub date: DateTime<Utc>,
}

impl Message {
    /// Plain text message.
    pub fn text(chat_id: ChatId, id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            text: Some(text.into()),
            entities: Vec::new(),
            media: None,
            is_service: false,
            date: Utc::now(),
        }
    }

    /// Media message with an optional caption.
    pub fn media(
        chat_id: ChatId,
        id: MessageId,
        media: MediaDescriptor,
        caption: Option<String>,
    ) -> Self {
        Self {
            id,
            chat_id,
            text: caption,
            entities: Vec::new(),
            media: Some(media),
            is_service: false,
            date: Utc::now(),
        }
    }

    /// Service message (no content of its own).
    pub fn service(chat_id: ChatId, id: MessageId) -> Self {
        Self {
            id,
            chat_id,
            text: None,
            entities: Vec::new(),
            media: None,
            is_service: true,
            date: Utc::now(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<TextEntity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// Text or caption, empty when absent.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Identity of a message produced by [`crate::Transport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub id: MessageId,
}

/// Converts a transport-specific message type to core [`Message`].
pub trait ToRelayMessage: Send + Sync {
    fn to_relay(&self) -> Message;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_or_empty() {
        assert_eq!(Message::text(1, 2, "hi").text_or_empty(), "hi");
        assert_eq!(Message::service(1, 3).text_or_empty(), "");
    }

    #[test]
    fn test_media_constructor_keeps_caption() {
        let media = MediaDescriptor::new(MediaKind::Photo).with_unique_id("AQAD");
        let msg = Message::media(-100, 7, media, Some("caption".to_string()));
        assert!(msg.has_media());
        assert_eq!(msg.text_or_empty(), "caption");
        assert!(!msg.is_service);
    }
}
