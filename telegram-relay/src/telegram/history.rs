//! Chat history from Telegram Desktop JSON exports.
//!
//! The Bot API cannot read chat history, so backlog reconciliation reads exports instead:
//! `<HISTORY_EXPORT_DIR>/<chat_id>.json` in the "Export chat history → JSON" format. Messages are
//! yielded oldest first; a chat without an export has an empty history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use relay_core::{ChatId, MediaDescriptor, MediaKind, Message, TextEntity, TransportError};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i32,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    date_unixtime: Option<String>,
    #[serde(default)]
    text: ExportText,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    photo_file_size: Option<u64>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    media_type: Option<String>,
}

/// Export text is either a plain string or a list of plain strings and entity objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportText {
    Plain(String),
    Parts(Vec<ExportTextPart>),
}

impl Default for ExportText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportTextPart {
    Plain(String),
    Entity {
        #[serde(rename = "type", default)]
        kind: String,
        text: String,
        #[serde(default)]
        href: Option<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        document_id: Option<String>,
    },
}

impl ExportText {
    /// Plain text plus Bot API entities rebuilt from the formatted parts.
    fn flatten(self) -> (String, Vec<TextEntity>) {
        let parts = match self {
            Self::Plain(s) => return (s, Vec::new()),
            Self::Parts(parts) => parts,
        };

        let mut text = String::new();
        let mut entities = Vec::new();
        let mut offset = 0usize;
        for part in parts {
            let (chunk, entity) = match part {
                ExportTextPart::Plain(s) => (s, None),
                ExportTextPart::Entity {
                    kind,
                    text: part,
                    href,
                    language,
                    document_id,
                } => {
                    let length = part.encode_utf16().count();
                    let entity = bot_api_kind(&kind).map(|kind| TextEntity {
                        url: href.filter(|_| kind == "text_link"),
                        language: language.filter(|l| !l.is_empty()),
                        custom_emoji_id: document_id.filter(|_| kind == "custom_emoji"),
                        ..TextEntity::new(kind, offset, length)
                    });
                    (part, entity)
                }
            };
            offset += chunk.encode_utf16().count();
            text.push_str(&chunk);
            entities.extend(entity);
        }
        (text, entities)
    }
}

/// Bot API entity type for an export part type; `None` for plain text and unknown types.
fn bot_api_kind(export_kind: &str) -> Option<&'static str> {
    let kind = match export_kind {
        "bold" => "bold",
        "italic" => "italic",
        "underline" => "underline",
        "strikethrough" => "strikethrough",
        "spoiler" => "spoiler",
        "code" => "code",
        "pre" => "pre",
        "blockquote" => "blockquote",
        "text_link" => "text_link",
        "link" => "url",
        "mention" => "mention",
        "hashtag" => "hashtag",
        "cashtag" => "cashtag",
        "bot_command" => "bot_command",
        "email" => "email",
        "phone" => "phone_number",
        "custom_emoji" => "custom_emoji",
        _ => return None,
    };
    Some(kind)
}

impl ExportMessage {
    fn into_message(self, chat_id: ChatId) -> Message {
        let date = self
            .date_unixtime
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_default();
        let media = self.media();
        let (text, entities) = self.text.flatten();
        let text = Some(text).filter(|t| !t.is_empty());

        Message {
            id: self.id,
            chat_id,
            text,
            entities,
            media,
            is_service: self.kind == "service",
            date,
        }
    }

    fn media(&self) -> Option<MediaDescriptor> {
        if self.photo.is_some() {
            let mut media = MediaDescriptor::new(MediaKind::Photo);
            if let Some(size) = self.photo_file_size {
                media = media.with_size(size);
            }
            return Some(media);
        }
        self.file.as_ref()?;
        let kind = match self.media_type.as_deref() {
            Some("video_file") => MediaKind::Video,
            Some("animation") => MediaKind::Animation,
            Some("voice_message") => MediaKind::Voice,
            Some("audio_file") => MediaKind::Audio,
            Some("sticker") => MediaKind::Sticker,
            Some("video_message") => MediaKind::VideoNote,
            None => MediaKind::Document,
            Some(_) => MediaKind::Other,
        };
        let mut media = MediaDescriptor::new(kind);
        if let Some(name) = &self.file_name {
            media = media.with_file_name(name.clone());
        }
        if let Some(size) = self.file_size {
            media = media.with_size(size);
        }
        Some(media)
    }
}

/// Reads `<dir>/<chat_id>.json` exports.
#[derive(Debug, Clone, Default)]
pub struct ExportHistory {
    dir: Option<PathBuf>,
}

impl ExportHistory {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, chat: ChatId) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", chat)))
    }

    /// The most recent `limit` messages of `chat` (all when `None`), oldest first.
    pub async fn load(&self, chat: ChatId, limit: Option<usize>) -> Result<Vec<Message>, TransportError> {
        let Some(path) = self.path_for(chat) else {
            warn!(chat, "No HISTORY_EXPORT_DIR configured; history is empty");
            return Ok(Vec::new());
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(chat, path = %path.display(), "No history export for chat; history is empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(TransportError::Api(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut messages = parse_export(&raw, chat, &path)?;
        messages.sort_by_key(|m| m.id);
        if let Some(limit) = limit {
            let skip = messages.len().saturating_sub(limit);
            messages.drain(..skip);
        }
        debug!(chat, count = messages.len(), "Loaded history export");
        Ok(messages)
    }
}

fn parse_export(raw: &str, chat: ChatId, path: &Path) -> Result<Vec<Message>, TransportError> {
    let export: ExportFile = serde_json::from_str(raw).map_err(|e| {
        TransportError::Unsupported(format!("malformed history export {}: {}", path.display(), e))
    })?;
    Ok(export
        .messages
        .into_iter()
        .map(|m| m.into_message(chat))
        .collect())
}
