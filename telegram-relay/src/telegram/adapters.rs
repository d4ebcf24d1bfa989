//! Adapters from Telegram (teloxide) types to relay_core types.
//! Depends only on teloxide and relay_core type definitions.

use relay_core::{MediaDescriptor, MediaKind, Message, TextEntity, ToRelayMessage};
use teloxide::types::{FileMeta, MessageEntity, MessageKind};
use tracing::debug;

/// Wraps a teloxide Message for conversion to relay [`Message`].
pub struct TelegramMessageWrapper<'a>(pub &'a teloxide::types::Message);

impl<'a> ToRelayMessage for TelegramMessageWrapper<'a> {
    fn to_relay(&self) -> Message {
        let msg = self.0;
        Message {
            id: msg.id.0,
            chat_id: msg.chat.id.0,
            text: msg.text().or_else(|| msg.caption()).map(str::to_string),
            entities: self.entities(),
            media: self.media(),
            is_service: self.is_service(),
            date: msg.date,
        }
    }
}

impl<'a> TelegramMessageWrapper<'a> {
    /// Anything that is not a regular (common) message: joins, pins, title changes, ...
    pub fn is_service(&self) -> bool {
        !matches!(self.0.kind, MessageKind::Common(_))
    }

    /// Formatting of the text, or of the caption for media messages.
    fn entities(&self) -> Vec<TextEntity> {
        let msg = self.0;
        let entities = if msg.text().is_some() {
            msg.entities()
        } else {
            msg.caption_entities()
        };
        entities.map(relay_entities).unwrap_or_default()
    }

    /// The single media attachment, if any. Photos use the largest size.
    fn media(&self) -> Option<MediaDescriptor> {
        let msg = self.0;
        if let Some(sizes) = msg.photo() {
            let largest = sizes.last()?;
            return Some(describe(MediaKind::Photo, &largest.file, None));
        }
        if let Some(v) = msg.video() {
            return Some(describe(MediaKind::Video, &v.file, v.file_name.as_deref()));
        }
        if let Some(a) = msg.animation() {
            return Some(describe(MediaKind::Animation, &a.file, a.file_name.as_deref()));
        }
        if let Some(d) = msg.document() {
            return Some(describe(MediaKind::Document, &d.file, d.file_name.as_deref()));
        }
        if let Some(a) = msg.audio() {
            return Some(describe(MediaKind::Audio, &a.file, a.file_name.as_deref()));
        }
        if let Some(v) = msg.voice() {
            return Some(describe(MediaKind::Voice, &v.file, None));
        }
        if let Some(s) = msg.sticker() {
            return Some(describe(MediaKind::Sticker, &s.file, None));
        }
        if let Some(n) = msg.video_note() {
            return Some(describe(MediaKind::VideoNote, &n.file, None));
        }
        None
    }
}

fn describe(kind: MediaKind, file: &FileMeta, file_name: Option<&str>) -> MediaDescriptor {
    let mut media = MediaDescriptor::new(kind)
        .with_unique_id(file.unique_id.0.clone())
        .with_size(u64::from(file.size));
    if let Some(name) = file_name {
        media = media.with_file_name(name);
    }
    media
}

/// Both sides serialize to the Bot API `MessageEntity` object, so conversion goes through JSON.
pub fn relay_entities(entities: &[MessageEntity]) -> Vec<TextEntity> {
    entities
        .iter()
        .filter_map(|entity| {
            serde_json::to_value(entity)
                .and_then(serde_json::from_value)
                .map_err(|e| debug!(error = %e, "Dropping unconvertible entity"))
                .ok()
        })
        .collect()
}

pub fn telegram_entities(entities: &[TextEntity]) -> Vec<MessageEntity> {
    entities
        .iter()
        .filter_map(|entity| {
            serde_json::to_value(entity)
                .and_then(serde_json::from_value)
                .map_err(|e| debug!(kind = %entity.kind, error = %e, "Dropping unconvertible entity"))
                .ok()
        })
        .collect()
}
