//! Join requests: confirmed seat or waitlist rank.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Booking, BookingEvent, BookingStatus, EventBus, MatchId, Position, QuotaResolver, UserId,
};
use crate::error::{BookingError, Result};
use crate::persistence::{BookingStore, StoreTransaction, run_in_transaction};

/// Decides whether a join request gets a confirmed seat or a waitlist rank.
///
/// Every join runs in one transaction that takes the match-row lock before
/// reading anything else. Joins to the same match are therefore totally
/// ordered, and the capacity check plus insert of one join is never
/// interleaved with another's.
#[derive(Debug)]
pub struct BookingAllocator<S> {
    store: Arc<S>,
    resolver: QuotaResolver,
    event_bus: EventBus,
}

impl<S> Clone for BookingAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: self.resolver.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: BookingStore> BookingAllocator<S> {
    /// Creates a new `BookingAllocator`.
    #[must_use]
    pub fn new(store: Arc<S>, resolver: QuotaResolver, event_bus: EventBus) -> Self {
        Self {
            store,
            resolver,
            event_bus,
        }
    }

    /// Returns the quota resolver in use.
    #[must_use]
    pub fn resolver(&self) -> &QuotaResolver {
        &self.resolver
    }

    /// Books `user_id` into `match_id` at `position`.
    ///
    /// The new booking is confirmed while the position has free seats and
    /// waitlisted behind the current last rank otherwise.
    ///
    /// # Errors
    ///
    /// - [`BookingError::MatchNotFound`] if the match does not exist.
    /// - [`BookingError::AlreadyBooked`] if the user holds a non-cancelled
    ///   booking for the match.
    /// - [`BookingError::Persistence`] on lock timeout or store failure;
    ///   nothing is written in that case.
    pub async fn join_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
        position: Position,
    ) -> Result<Booking> {
        let resolver = self.resolver.clone();
        let (booking, creator_id) = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let record = tx.lock_match_for_update(match_id).await?;
                tracing::debug!(%match_id, %user_id, "match row locked for join");

                let bookings = tx.list_bookings(match_id).await?;
                if bookings.iter().any(|b| b.user_id == user_id && b.is_active()) {
                    return Err(BookingError::AlreadyBooked { user_id, match_id });
                }

                let tally = SeatTally::of(&bookings, position);
                let capacity = resolver.capacity(record.position_quotas.as_ref(), position);
                tracing::debug!(
                    %match_id,
                    %position,
                    confirmed = tally.confirmed,
                    %capacity,
                    "capacity resolved"
                );

                let booking = if capacity.admits(tally.confirmed) {
                    Booking::confirmed(match_id, user_id, position)
                } else {
                    Booking::waitlisted(
                        match_id,
                        user_id,
                        position,
                        tally.last_waitlist_order.saturating_add(1),
                    )
                };
                tx.create_booking(&booking).await?;
                Ok((booking, record.creator_id))
            })
        })
        .await?;

        tracing::info!(
            booking_id = %booking.id,
            %match_id,
            %user_id,
            %position,
            status = booking.status.as_str(),
            waitlist_order = booking.waitlist_order,
            "booking created"
        );

        let _ = self.event_bus.publish(BookingEvent::BookingCreated {
            booking_id: booking.id,
            match_id,
            user_id,
            creator_id,
            position,
            status: booking.status,
            waitlist_order: booking.waitlist_order,
            timestamp: Utc::now(),
        });

        Ok(booking)
    }

    /// Like [`Self::join_match`], with the position given as its code.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidPosition`] for an unknown code, and
    /// otherwise the errors of [`Self::join_match`].
    pub async fn join_match_code(
        &self,
        user_id: UserId,
        match_id: MatchId,
        position: &str,
    ) -> Result<Booking> {
        let position: Position = position.parse()?;
        self.join_match(user_id, match_id, position).await
    }
}

/// Occupancy of one position, computed under the match-row lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SeatTally {
    confirmed: usize,
    last_waitlist_order: u32,
}

impl SeatTally {
    fn of(bookings: &[Booking], position: Position) -> Self {
        bookings
            .iter()
            .filter(|b| b.position == position)
            .fold(Self::default(), |mut tally, b| {
                match b.status {
                    BookingStatus::Confirmed => tally.confirmed += 1,
                    BookingStatus::Waitlist => {
                        tally.last_waitlist_order = tally.last_waitlist_order.max(b.waitlist_order);
                    }
                    BookingStatus::Cancelled => {}
                }
                tally
            })
    }
}
