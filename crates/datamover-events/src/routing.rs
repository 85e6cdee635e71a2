//! Event bus routing helpers.
//!
//! # Design
//! - Id assignment, journaling, and broadcast happen under one lock so ids are
//!   delivered in order even when several blocking threads publish.
//! - Publishing never blocks and needs no runtime; late subscribers catch up
//!   from the journal with [`EventBus::backlog_since`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Stream wrapper used by async subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

struct Journal {
    next_id: EventId,
    recent: VecDeque<EventEnvelope>,
}

/// Shared event bus built on top of `tokio::broadcast` with a bounded journal.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    journal: Arc<Mutex<Journal>>,
    capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Bus keeping the last `capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            journal: Arc::new(Mutex::new(Journal {
                next_id: 1,
                recent: VecDeque::with_capacity(capacity),
            })),
            capacity,
        }
    }

    /// Bus with the default journal capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Async stream of events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.receiver())
    }

    /// Raw receiver, usable from blocking code via `try_recv`.
    #[must_use]
    pub fn receiver(&self) -> Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish `event` and return its id. Ids start at 1.
    pub fn publish(&self, event: Event) -> EventId {
        let mut journal = self.lock_journal();
        let id = journal.next_id;
        journal.next_id = id.saturating_add(1);

        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if journal.recent.len() == self.capacity {
            journal.recent.pop_front();
        }
        journal.recent.push_back(envelope.clone());
        // No subscribers is fine; the journal keeps the event.
        let _ = self.sender.send(envelope);
        drop(journal);
        id
    }

    /// Id of the newest journaled event.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_journal().recent.back().map(|envelope| envelope.id)
    }

    /// Journaled events newer than `id`, oldest first.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock_journal()
            .recent
            .iter()
            .filter(|envelope| envelope.id > id)
            .cloned()
            .collect()
    }

    fn lock_journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
