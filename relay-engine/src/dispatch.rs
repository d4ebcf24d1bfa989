//! Event dispatch: ordered lanes feeding the [`RelayEngine`].
//!
//! ```text
//! ┌──────────────┐  msg id % N  ┌────────┐     ┌─────────────┐
//! │ update source │────────────▶│ lane k │────▶│ RelayEngine │
//! └──────────────┘              └────────┘     └─────────────┘
//! ```
//!
//! Events of the same source message always land in the same lane and are processed in arrival
//! order, so an edit never overtakes the creation it refers to. Lanes stay closed until
//! [`Dispatcher::open`] is called (after the startup backlog pass); events queue meanwhile.
//! Redeliveries are timed inside the lane and never block unrelated messages. On shutdown a
//! pending redelivery gets one immediate final attempt.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use relay_core::{Message, MessageId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::RelayEngine;
use crate::error::RelayError;

/// Default capacity of each lane queue.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A source-chat event as seen by the relay.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    New(Message),
    Edited(Message),
}

impl RelayEvent {
    pub fn message(&self) -> &Message {
        match self {
            Self::New(m) | Self::Edited(m) => m,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::Edited(_) => "edited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaneState {
    Held,
    Open,
    Closing,
}

/// Cloneable submit side of a [`Dispatcher`], handed to update handlers.
#[derive(Clone)]
pub struct DispatchHandle {
    lanes: Arc<Vec<mpsc::Sender<RelayEvent>>>,
}

impl DispatchHandle {
    /// Queues an event on the lane of its source message. Waits while that lane is full.
    pub async fn submit(&self, event: RelayEvent) -> Result<(), RelayError> {
        let lane = lane_index(event.message().id, self.lanes.len());
        self.lanes[lane]
            .send(event)
            .await
            .map_err(|_| RelayError::DispatcherClosed)
    }
}

/// Owns the lane workers.
pub struct Dispatcher {
    handle: DispatchHandle,
    state: watch::Sender<LaneState>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `lanes` workers (at least one). Events are accepted immediately but processed
    /// only after [`Dispatcher::open`].
    pub fn start(engine: Arc<RelayEngine>, lanes: usize) -> Self {
        Self::with_capacity(engine, lanes, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(engine: Arc<RelayEngine>, lanes: usize, capacity: usize) -> Self {
        let lanes = lanes.max(1);
        let (state, _) = watch::channel(LaneState::Held);
        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);

        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_lane(
                lane,
                Arc::clone(&engine),
                rx,
                state.subscribe(),
            )));
        }

        info!(lanes, "Dispatcher started");
        Self {
            handle: DispatchHandle {
                lanes: Arc::new(senders),
            },
            state,
            workers,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub async fn submit(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.handle.submit(event).await
    }

    /// Lets the lanes start processing.
    pub fn open(&self) {
        self.state.send_if_modified(|state| {
            if *state == LaneState::Held {
                *state = LaneState::Open;
                true
            } else {
                false
            }
        });
        info!("Dispatcher open");
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == LaneState::Open
    }

    /// Processes everything already queued, then stops the workers.
    pub async fn shutdown(self) {
        self.state.send_replace(LaneState::Closing);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Lane worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }
}

fn lane_index(message_id: i32, lanes: usize) -> usize {
    (message_id.unsigned_abs() as usize) % lanes.max(1)
}

/// A queued event and how many times it has been redelivered.
struct LaneItem {
    event: RelayEvent,
    attempt: u32,
}

impl LaneItem {
    fn fresh(event: RelayEvent) -> Self {
        Self { event, attempt: 0 }
    }
}

/// Worker state of one lane.
///
/// A retryable failure schedules the event again after `redelivery_delay` instead of sleeping,
/// so other messages on the lane keep flowing. Later events of the same message are parked
/// behind the pending redelivery to keep their order.
struct Lane {
    index: usize,
    engine: Arc<RelayEngine>,
    parked: HashMap<MessageId, VecDeque<RelayEvent>>,
    /// Pending redeliveries; due times are non-decreasing since the delay is fixed.
    retries: VecDeque<(Instant, LaneItem)>,
}

impl Lane {
    fn new(index: usize, engine: Arc<RelayEngine>) -> Self {
        Self {
            index,
            engine,
            parked: HashMap::new(),
            retries: VecDeque::new(),
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.retries.front().map(|(due, _)| *due)
    }

    async fn accept(&mut self, event: RelayEvent, redeliver: bool) {
        let id = event.message().id;
        if let Some(waiting) = self.parked.get_mut(&id) {
            debug!(
                lane = self.index,
                source_msg_id = id,
                event = event.kind(),
                "Parked behind pending redelivery"
            );
            waiting.push_back(event);
            return;
        }
        self.run_from(LaneItem::fresh(event), redeliver).await;
    }

    /// Runs `item`, then the events parked behind its message until one needs redelivery.
    async fn run_from(&mut self, item: LaneItem, redeliver: bool) {
        let id = item.event.message().id;
        let delay = self.engine.governor().policy().redelivery_delay;
        let mut next = Some(item);

        while let Some(item) = next {
            if let Some(retry) = self.attempt(item, redeliver).await {
                self.parked.entry(id).or_default();
                self.retries.push_back((Instant::now() + delay, retry));
                return;
            }
            next = self
                .parked
                .get_mut(&id)
                .and_then(VecDeque::pop_front)
                .map(LaneItem::fresh);
        }
        self.parked.remove(&id);
    }

    async fn redeliver_due(&mut self) {
        let now = Instant::now();
        while self.retries.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, item)) = self.retries.pop_front() {
                self.run_from(item, true).await;
            }
        }
    }

    /// Final attempt for pending redeliveries and the events parked behind them.
    async fn flush(&mut self) {
        while let Some((_, item)) = self.retries.pop_front() {
            self.run_from(item, false).await;
        }
    }

    /// Hands the event to the engine. Returns the item to redeliver when a retryable failure
    /// remains and the redelivery budget allows it.
    async fn attempt(&self, item: LaneItem, redeliver: bool) -> Option<LaneItem> {
        let event = &item.event;
        let message = event.message();
        let result = match event {
            RelayEvent::New(m) => self.engine.handle_new(m).await,
            RelayEvent::Edited(m) => self.engine.handle_edit(m).await,
        };

        let retry = match &result {
            Ok(report) => report.needs_retry(),
            Err(e) => {
                error!(event = event.kind(), source_msg_id = message.id, error = %e, "Event failed");
                e.is_retryable()
            }
        };
        if !retry {
            return None;
        }

        let policy = self.engine.governor().policy();
        if !redeliver || item.attempt >= policy.max_redeliveries {
            error!(
                event = event.kind(),
                source_msg_id = message.id,
                redeliveries = item.attempt,
                shutting_down = !redeliver,
                "Giving up on event"
            );
            return None;
        }

        warn!(
            event = event.kind(),
            source_msg_id = message.id,
            redelivery = item.attempt + 1,
            delay_ms = policy.redelivery_delay.as_millis() as u64,
            "Scheduling redelivery"
        );
        Some(LaneItem {
            attempt: item.attempt + 1,
            ..item
        })
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn run_lane(
    index: usize,
    engine: Arc<RelayEngine>,
    mut rx: mpsc::Receiver<RelayEvent>,
    mut state: watch::Receiver<LaneState>,
) {
    if state
        .wait_for(|s| *s != LaneState::Held)
        .await
        .is_err()
    {
        return;
    }

    let mut lane = Lane::new(index, engine);
    loop {
        if *state.borrow() == LaneState::Closing {
            break;
        }
        let due = lane.next_due();
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => lane.accept(event, true).await,
                None => break,
            },
            _ = sleep_until_due(due) => lane.redeliver_due().await,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        lane.accept(event, false).await;
    }
    lane.flush().await;
    debug!(lane = index, "Lane drained");
}
