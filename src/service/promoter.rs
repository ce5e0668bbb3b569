//! Cancellation and waitlist promotion.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{Booking, BookingEvent, BookingId, BookingStatus, EventBus, UserId};
use crate::error::{BookingError, Result, denied};
use crate::persistence::{BookingStore, StoreTransaction, run_in_transaction};

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    /// The booking, now cancelled.
    pub cancelled: Booking,
    /// The waitlisted booking that took the freed seat, if any.
    pub promoted: Option<Booking>,
}

/// Cancels bookings and promotes the head of the waitlist into a freed
/// confirmed seat.
///
/// Cancellation takes the same match-row lock as
/// [`super::BookingAllocator::join_match`], so a promotion can never race
/// a concurrent join for the freed seat.
#[derive(Debug)]
pub struct WaitlistPromoter<S> {
    store: Arc<S>,
    event_bus: EventBus,
}

impl<S> Clone for WaitlistPromoter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: BookingStore> WaitlistPromoter<S> {
    /// Creates a new `WaitlistPromoter`.
    #[must_use]
    pub fn new(store: Arc<S>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Cancels `booking_id` on behalf of `requester_id`.
    ///
    /// If the booking held a confirmed seat, the lowest-ranked waitlisted
    /// booking of the same (match, position) is confirmed. At most one
    /// booking is promoted and the ranks of the others are left as they
    /// are.
    ///
    /// # Errors
    ///
    /// - [`BookingError::BookingNotFound`] if the booking does not exist.
    /// - [`BookingError::Unauthorized`] unless the requester owns the
    ///   booking or `is_admin` is set.
    /// - [`BookingError::AlreadyCancelled`] if it is already cancelled.
    /// - [`BookingError::Persistence`] on store failure (nothing written).
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        requester_id: UserId,
        is_admin: bool,
    ) -> Result<CancelOutcome> {
        let outcome = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let match_id = tx.get_booking(booking_id).await?.match_id;
                tx.lock_match_for_update(match_id).await?;
                tracing::debug!(%match_id, %booking_id, "match row locked for cancel");

                // Re-read: the booking may have changed while we waited.
                let mut booking = tx.get_booking(booking_id).await?;
                if booking.user_id != requester_id && !is_admin {
                    tracing::warn!(%booking_id, %requester_id, "cancellation denied");
                    return Err(denied(requester_id, "cancel booking", *booking_id.as_uuid()));
                }
                if booking.status == BookingStatus::Cancelled {
                    return Err(BookingError::AlreadyCancelled(booking_id));
                }

                let was_confirmed = booking.status == BookingStatus::Confirmed;
                booking.cancel();
                tx.update_booking(&booking).await?;

                let mut promoted = None;
                if was_confirmed {
                    let waitlist = tx.list_waitlist(match_id, booking.position).await?;
                    if let Some(mut next) = waitlist.into_iter().next() {
                        let previous_order = next.waitlist_order;
                        next.promote();
                        tx.update_booking(&next).await?;
                        promoted = Some((next, previous_order));
                    }
                }
                Ok((booking, was_confirmed, promoted))
            })
        })
        .await;

        let (cancelled, was_confirmed, promoted) = outcome?;
        let match_id = cancelled.match_id;

        tracing::info!(
            %booking_id,
            %match_id,
            cancelled_by = %requester_id,
            was_confirmed,
            "booking cancelled"
        );
        let _ = self.event_bus.publish(BookingEvent::BookingCancelled {
            booking_id,
            match_id,
            user_id: cancelled.user_id,
            cancelled_by: requester_id,
            was_confirmed,
            timestamp: Utc::now(),
        });

        let promoted = promoted.map(|(next, previous_order)| {
            tracing::info!(
                booking_id = %next.id,
                %match_id,
                position = %next.position,
                previous_order,
                "waitlisted booking promoted"
            );
            let _ = self.event_bus.publish(BookingEvent::BookingPromoted {
                booking_id: next.id,
                match_id,
                user_id: next.user_id,
                position: next.position,
                previous_order,
                timestamp: Utc::now(),
            });
            next
        });

        Ok(CancelOutcome {
            cancelled,
            promoted,
        })
    }
}
