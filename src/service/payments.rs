//! Payment flag maintained by the match creator.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{Booking, BookingEvent, BookingId, EventBus, UserId};
use crate::error::{Result, denied};
use crate::persistence::{BookingStore, StoreTransaction, run_in_transaction};

/// Records whether a booking's match fee was paid.
///
/// Only confirmed and paid bookings take part in team generation, so this
/// flag decides who gets onto a team.
#[derive(Debug)]
pub struct PaymentLedger<S> {
    store: Arc<S>,
    event_bus: EventBus,
}

impl<S> Clone for PaymentLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: BookingStore> PaymentLedger<S> {
    /// Creates a new `PaymentLedger`.
    #[must_use]
    pub fn new(store: Arc<S>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Sets the payment flag of `booking_id`. Only the match creator may
    /// do this. Setting the current value again is a no-op that still
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - [`crate::BookingError::BookingNotFound`] if the booking does not exist.
    /// - [`crate::BookingError::Unauthorized`] if the requester did not
    ///   create the match.
    /// - [`crate::BookingError::Persistence`] on store failure.
    pub async fn set_paid_status(
        &self,
        booking_id: BookingId,
        requester_id: UserId,
        is_paid: bool,
    ) -> Result<Booking> {
        let booking = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let match_id = tx.get_booking(booking_id).await?.match_id;
                let record = tx.lock_match_for_update(match_id).await?;
                if !record.is_administered_by(requester_id) {
                    tracing::warn!(%booking_id, %requester_id, "payment update denied");
                    return Err(denied(requester_id, "update payment of", *booking_id.as_uuid()));
                }

                let mut booking = tx.get_booking(booking_id).await?;
                if booking.is_paid != is_paid {
                    booking.is_paid = is_paid;
                    booking.updated_at = Utc::now();
                    tx.update_booking(&booking).await?;
                }
                Ok(booking)
            })
        })
        .await?;

        tracing::info!(%booking_id, match_id = %booking.match_id, is_paid, "payment updated");
        let _ = self.event_bus.publish(BookingEvent::PaymentUpdated {
            booking_id,
            match_id: booking.match_id,
            is_paid,
            timestamp: Utc::now(),
        });
        Ok(booking)
    }
}
