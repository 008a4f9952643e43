//! Bounded per-connection outbound queue.
//!
//! Fan-out never awaits a client socket: events are pushed here without
//! blocking and the connection's own task drains them. When the queue is
//! full, the oldest lossy event is evicted to make room. A chat message that
//! still does not fit is refused with [`DeliveryError::Overflow`] so the hub
//! can disconnect the client instead of silently losing the message.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::events::OutboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection is gone; nothing more will be delivered to it.
    Closed,
    /// The queue is full of events that may not be dropped.
    Overflow,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("connection closed"),
            Self::Overflow => f.write_str("outbound queue overflow"),
        }
    }
}

impl std::error::Error for DeliveryError {}

struct OutboxState {
    queue: VecDeque<Arc<OutboundEvent>>,
    closed: bool,
    dropped: u64,
}

pub struct Outbox {
    state: Mutex<OutboxState>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue an event without blocking.
    pub fn push(&self, event: Arc<OutboundEvent>) -> Result<(), DeliveryError> {
        let mut s = self.state.lock();
        if s.closed {
            return Err(DeliveryError::Closed);
        }

        if s.queue.len() >= self.capacity {
            match s.queue.iter().position(|e| e.is_lossy()) {
                Some(oldest_lossy) => {
                    if let Some(evicted) = s.queue.remove(oldest_lossy) {
                        tracing::debug!(
                            event = evicted.name(),
                            dropped = s.dropped + 1,
                            "outbox full, evicted oldest lossy event"
                        );
                    }
                    s.dropped += 1;
                }
                None if event.is_lossy() => {
                    s.dropped += 1;
                    tracing::debug!(
                        event = event.name(),
                        dropped = s.dropped,
                        "outbox full of messages, lossy event dropped"
                    );
                    return Ok(());
                }
                None => return Err(DeliveryError::Overflow),
            }
        }

        s.queue.push_back(event);
        drop(s);
        self.notify.notify_one();
        Ok(())
    }

    /// Refuse further pushes. Already-queued events can still be drained.
    pub fn close(&self) {
        let mut s = self.state.lock();
        if s.closed {
            return;
        }
        s.closed = true;
        drop(s);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lossy events evicted or refused so far.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Pop the next event without waiting.
    pub fn try_recv(&self) -> Option<Arc<OutboundEvent>> {
        self.state.lock().queue.pop_front()
    }

    /// Wait for the next event. Returns `None` once the outbox is closed and
    /// drained.
    pub async fn recv(&self) -> Option<Arc<OutboundEvent>> {
        loop {
            {
                let mut s = self.state.lock();
                if let Some(event) = s.queue.pop_front() {
                    return Some(event);
                }
                if s.closed {
                    return None;
                }
            }
            // Single consumer: `notify_one` stores a permit if we are not
            // parked yet, so no wakeup is lost between the check and here.
            self.notify.notified().await;
        }
    }
}
