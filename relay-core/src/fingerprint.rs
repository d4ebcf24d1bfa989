//! Content fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical form of the message content: text (or caption),
//! its formatting entities, media kind tag and media identifying attributes, joined by the ASCII
//! unit separator. Two
//! messages with equal content always share a fingerprint; the relay uses this to tell real
//! edits from notifications that changed nothing visible.

use crate::types::{Message, TextEntity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const SEPARATOR: char = '\u{1f}';

/// Hex-encoded SHA-256 content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Fingerprint {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Computes the content fingerprint of `message`. Never fails.
pub fn fingerprint(message: &Message) -> Fingerprint {
    let canonical = canonical_form(message);
    let digest = Sha256::digest(canonical.as_bytes());
    Fingerprint(hex::encode(digest))
}

fn canonical_form(message: &Message) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(6);
    parts.push(message.text_or_empty().to_string());
    parts.push(
        message
            .entities
            .iter()
            .map(canonical_entity)
            .collect::<Vec<_>>()
            .join(";"),
    );
    match &message.media {
        Some(media) => {
            parts.push(media.kind.as_tag().to_string());
            parts.push(media.file_unique_id.clone().unwrap_or_default());
            parts.push(media.file_name.clone().unwrap_or_default());
            parts.push(media.file_size.map(|s| s.to_string()).unwrap_or_default());
        }
        None => parts.extend(std::iter::repeat(String::new()).take(4)),
    }
    parts.join(&SEPARATOR.to_string())
}

fn canonical_entity(entity: &TextEntity) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}",
        entity.kind,
        entity.offset,
        entity.length,
        entity.url.as_deref().unwrap_or_default(),
        entity.language.as_deref().unwrap_or_default(),
        entity.custom_emoji_id.as_deref().unwrap_or_default(),
        entity.user.as_ref().map(|u| u.id.to_string()).unwrap_or_default()
    )
}
