//! Broadcast channel for booking events.
//!
//! Services publish a [`BookingEvent`] only after the transition it
//! describes has committed. Notifiers either take the whole stream with
//! [`EventBus::subscribe`] or follow a single match with
//! [`EventBus::subscribe_match`], which is what a per-match push channel
//! (roster page, waitlist notifier) needs.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{BookingEvent, MatchId};

/// Broadcast bus for [`BookingEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BookingEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a committed transition to all subscribers.
    ///
    /// Returns the number of receivers the event reached. An event with
    /// no receivers is dropped and logged at `debug`; the transition
    /// itself is already durable.
    pub fn publish(&self, event: BookingEvent) -> usize {
        let event_type = event.event_type_str();
        let match_id = event.match_id();
        match self.sender.send(event) {
            Ok(delivered) => {
                tracing::trace!(event_type, %match_id, delivered, "booking event published");
                delivered
            }
            Err(_) => {
                tracing::debug!(event_type, %match_id, "no subscribers, booking event dropped");
                0
            }
        }
    }

    /// Creates a receiver for every future event, across all matches.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }

    /// Follows the future events of one match only.
    #[must_use]
    pub fn subscribe_match(&self, match_id: MatchId) -> MatchSubscription {
        MatchSubscription {
            match_id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiver filtered to a single match, see [`EventBus::subscribe_match`].
#[derive(Debug)]
pub struct MatchSubscription {
    match_id: MatchId,
    receiver: broadcast::Receiver<BookingEvent>,
}

impl MatchSubscription {
    /// The match this subscription follows.
    #[must_use]
    pub const fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Waits for the next event of the followed match.
    ///
    /// Events of other matches are skipped. If the subscriber fell behind
    /// the ring buffer, the overwritten events are logged and skipped too.
    /// Returns `None` once every [`EventBus`] clone is gone.
    pub async fn recv(&mut self) -> Option<BookingEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.match_id() == self.match_id => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(match_id = %self.match_id, missed, "match subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
