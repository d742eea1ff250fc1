//! Bounded event bus for the sandbox's network/file/exec event stream.
//!
//! Unlike a broadcast channel, the bus never blocks a producer and never
//! lags a slow consumer: it uses a single bounded `mpsc` channel with
//! try-send semantics, so a full queue simply drops the event.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::event::MatchlockEvent;

/// Default bus capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Producer handle for the event bus. Cheaply cloneable; every component
/// that emits events (proxy, hook engine, relay) holds one.
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::Sender<MatchlockEvent>,
}

impl EventBus {
    /// Create a new event bus and its single receiver.
    #[must_use]
    pub fn new() -> (Self, EventReceiver) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with a custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, EventReceiver { receiver })
    }

    /// Publish an event. Never blocks; drops the event and returns `false`
    /// if the bus is full or the receiver has been dropped.
    pub fn publish(&self, event: MatchlockEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event_type = event.event_type(), "event bus full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                trace!(event_type = event.event_type(), "event bus closed, dropping event");
                false
            }
        }
    }

    /// The bus capacity this handle was constructed with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

/// The single consumer side of an [`EventBus`].
pub struct EventReceiver {
    receiver: mpsc::Receiver<MatchlockEvent>,
}

impl EventReceiver {
    /// Receive the next event. Returns `None` once every [`EventBus`]
    /// handle has been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<MatchlockEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<MatchlockEvent> {
        self.receiver.try_recv().ok()
    }
}
