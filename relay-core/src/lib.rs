//! # relay-core
//!
//! Core types and traits for the channel relay: [`Message`], [`Transport`], [`TransportError`],
//! content [`fingerprint`]s and tracing initialization. Transport-agnostic; used by storage,
//! relay-engine and telegram-relay.

pub mod error;
pub mod fingerprint;
pub mod logger;
pub mod transport;
pub mod types;

pub use error::{Result, TransportError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use logger::init_tracing;
pub use transport::{HistoryStream, Transport};
pub use types::{
    ChatId, EntityUser, MediaDescriptor, MediaKind, Message, MessageId, SentMessage, TextEntity,
    ToRelayMessage,
};
