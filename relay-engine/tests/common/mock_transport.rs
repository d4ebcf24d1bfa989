//! In-memory [`relay_core::Transport`] for engine tests.
//!
//! Records every send/edit/delete, serves scripted histories and injects failures either once
//! (`fail_next`) or for every call to a chat (`fail_always`).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use relay_core::{
    ChatId, HistoryStream, Message, MessageId, Result, SentMessage, TextEntity, Transport,
    TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    History,
    Send,
    Edit,
    Delete,
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send {
        chat: ChatId,
        source_msg_id: MessageId,
        sent_id: MessageId,
    },
    Edit {
        chat: ChatId,
        message_id: MessageId,
        text: String,
        entities: Vec<TextEntity>,
    },
    Delete {
        chat: ChatId,
        message_id: MessageId,
    },
}

pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    histories: Mutex<HashMap<ChatId, Vec<Message>>>,
    scripted: Mutex<HashMap<(Op, ChatId), VecDeque<TransportError>>>,
    always: Mutex<HashMap<(Op, ChatId), TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(5000),
            histories: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            always: Mutex::new(HashMap::new()),
        }
    }

    /// History of `chat`, oldest first.
    pub fn set_history(&self, chat: ChatId, messages: Vec<Message>) {
        self.histories.lock().unwrap().insert(chat, messages);
    }

    /// The next `op` on `chat` fails with `err` (queued, one per call).
    pub fn fail_next(&self, op: Op, chat: ChatId, err: TransportError) {
        self.scripted
            .lock()
            .unwrap()
            .entry((op, chat))
            .or_default()
            .push_back(err);
    }

    /// Every `op` on `chat` fails with `err`.
    pub fn fail_always(&self, op: Op, chat: ChatId, err: TransportError) {
        self.always.lock().unwrap().insert((op, chat), err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Send { .. }))
            .collect()
    }

    pub fn sends_to(&self, chat: ChatId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Send { chat: to, .. } if *to == chat))
            .count()
    }

    pub fn edits(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Edit { .. }))
            .collect()
    }

    pub fn deletes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete { .. }))
            .collect()
    }

    fn injected(&self, op: Op, chat: ChatId) -> Option<TransportError> {
        if let Some(err) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&(op, chat))
            .and_then(VecDeque::pop_front)
        {
            return Some(err);
        }
        self.always.lock().unwrap().get(&(op, chat)).cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn history(&self, chat: ChatId, limit: Option<usize>) -> HistoryStream<'_> {
        if let Some(err) = self.injected(Op::History, chat) {
            return stream::iter(vec![Err(err)]).boxed();
        }
        let all = self
            .histories
            .lock()
            .unwrap()
            .get(&chat)
            .cloned()
            .unwrap_or_default();
        let skip = limit.map_or(0, |l| all.len().saturating_sub(l));
        stream::iter(all.into_iter().skip(skip).map(Ok)).boxed()
    }

    async fn send(&self, chat: ChatId, message: &Message) -> Result<SentMessage> {
        if let Some(err) = self.injected(Op::Send, chat) {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call::Send {
            chat,
            source_msg_id: message.id,
            sent_id: id,
        });
        Ok(SentMessage { chat_id: chat, id })
    }

    async fn edit(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        entities: &[TextEntity],
    ) -> Result<()> {
        if let Some(err) = self.injected(Op::Edit, chat) {
            return Err(err);
        }
        self.calls.lock().unwrap().push(Call::Edit {
            chat,
            message_id,
            text: text.to_string(),
            entities: entities.to_vec(),
        });
        Ok(())
    }

    async fn delete(&self, chat: ChatId, message_id: MessageId) -> Result<()> {
        if let Some(err) = self.injected(Op::Delete, chat) {
            return Err(err);
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete { chat, message_id });
        Ok(())
    }
}
