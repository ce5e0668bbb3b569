//! [`BookingEngine`]: one store, one event bus, all four components.

use std::sync::Arc;

use crate::config::BookingConfig;
use crate::domain::{
    Booking, BookingEvent, BookingId, EventBus, Match, MatchId, MatchSubscription, Position,
    QuotaPolicy, QuotaResolver, RandomSource, StdRandom, TeamId, TeamMember, TeamMemberId,
    TeamRoster, UserId,
};
use crate::error::Result;
use crate::persistence::{BookingStore, StoreTransaction, run_in_transaction};

use super::{BookingAllocator, CancelOutcome, PaymentLedger, TeamAssigner, WaitlistPromoter};

/// Facade over the booking allocation engine.
///
/// Cheap to clone: every component shares the same store handle and
/// event bus. This is the type callers (transport handlers, the CLI, the
/// stress run) hold.
#[derive(Debug)]
pub struct BookingEngine<S> {
    store: Arc<S>,
    event_bus: EventBus,
    allocator: BookingAllocator<S>,
    promoter: WaitlistPromoter<S>,
    payments: PaymentLedger<S>,
    teams: TeamAssigner<S>,
}

impl<S> Clone for BookingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            event_bus: self.event_bus.clone(),
            allocator: self.allocator.clone(),
            promoter: self.promoter.clone(),
            payments: self.payments.clone(),
            teams: self.teams.clone(),
        }
    }
}

impl<S: BookingStore> BookingEngine<S> {
    /// Wires the engine around `store`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        policy: QuotaPolicy,
        random: Arc<dyn RandomSource>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            allocator: BookingAllocator::new(
                Arc::clone(&store),
                QuotaResolver::new(policy),
                event_bus.clone(),
            ),
            promoter: WaitlistPromoter::new(Arc::clone(&store), event_bus.clone()),
            payments: PaymentLedger::new(Arc::clone(&store), event_bus.clone()),
            teams: TeamAssigner::new(Arc::clone(&store), random, event_bus.clone()),
            store,
            event_bus,
        }
    }

    /// Wires the engine from configuration, shuffling teams with an
    /// OS-seeded generator.
    #[must_use]
    pub fn from_config(store: Arc<S>, config: &BookingConfig) -> Self {
        Self::new(
            store,
            config.quota_policy.clone(),
            Arc::new(StdRandom::from_os()),
            EventBus::new(config.event_bus_capacity),
        )
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the event bus.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribes to committed booking events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BookingEvent> {
        self.event_bus.subscribe()
    }

    /// Subscribes to committed events of one match.
    #[must_use]
    pub fn subscribe_match(&self, match_id: MatchId) -> MatchSubscription {
        self.event_bus.subscribe_match(match_id)
    }

    /// Stores a match record so that it can be booked.
    ///
    /// Match management lives outside the engine; this is the hook it (and
    /// the stress run) uses to hand a match over.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookingError::Persistence`] on store failure.
    #[tracing::instrument(skip(self, record), fields(match_id = %record.id))]
    pub async fn register_match(&self, record: &Match) -> Result<()> {
        let record = record.clone();
        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.insert_match(&record).await })
        })
        .await
    }

    /// See [`BookingAllocator::join_match`].
    ///
    /// # Errors
    ///
    /// See [`BookingAllocator::join_match`].
    #[tracing::instrument(skip(self))]
    pub async fn join_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
        position: Position,
    ) -> Result<Booking> {
        self.allocator.join_match(user_id, match_id, position).await
    }

    /// See [`BookingAllocator::join_match_code`].
    ///
    /// # Errors
    ///
    /// See [`BookingAllocator::join_match_code`].
    #[tracing::instrument(skip(self))]
    pub async fn join_match_code(
        &self,
        user_id: UserId,
        match_id: MatchId,
        position: &str,
    ) -> Result<Booking> {
        self.allocator
            .join_match_code(user_id, match_id, position)
            .await
    }

    /// See [`WaitlistPromoter::cancel_booking`].
    ///
    /// # Errors
    ///
    /// See [`WaitlistPromoter::cancel_booking`].
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        requester_id: UserId,
        is_admin: bool,
    ) -> Result<CancelOutcome> {
        self.promoter
            .cancel_booking(booking_id, requester_id, is_admin)
            .await
    }

    /// Cancels with admin rights derived from the match: the creator of
    /// the booking's match counts as its admin.
    ///
    /// # Errors
    ///
    /// See [`WaitlistPromoter::cancel_booking`].
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking_as(
        &self,
        booking_id: BookingId,
        requester_id: UserId,
    ) -> Result<CancelOutcome> {
        let mut tx = self.store.begin().await?;
        let lookup = async {
            let booking = tx.get_booking(booking_id).await?;
            tx.get_match(booking.match_id).await
        }
        .await;
        tx.rollback().await?;

        let is_admin = lookup?.is_administered_by(requester_id);
        self.promoter
            .cancel_booking(booking_id, requester_id, is_admin)
            .await
    }

    /// See [`PaymentLedger::set_paid_status`].
    ///
    /// # Errors
    ///
    /// See [`PaymentLedger::set_paid_status`].
    #[tracing::instrument(skip(self))]
    pub async fn set_paid_status(
        &self,
        booking_id: BookingId,
        requester_id: UserId,
        is_paid: bool,
    ) -> Result<Booking> {
        self.payments
            .set_paid_status(booking_id, requester_id, is_paid)
            .await
    }

    /// See [`TeamAssigner::generate_teams`].
    ///
    /// # Errors
    ///
    /// See [`TeamAssigner::generate_teams`].
    #[tracing::instrument(skip(self))]
    pub async fn generate_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        self.teams.generate_teams(match_id).await
    }

    /// See [`TeamAssigner::get_teams`].
    ///
    /// # Errors
    ///
    /// See [`TeamAssigner::get_teams`].
    pub async fn get_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        self.teams.get_teams(match_id).await
    }

    /// See [`TeamAssigner::move_team_member`].
    ///
    /// # Errors
    ///
    /// See [`TeamAssigner::move_team_member`].
    #[tracing::instrument(skip(self))]
    pub async fn move_team_member(
        &self,
        member_id: TeamMemberId,
        target_team_id: TeamId,
        requester_id: UserId,
    ) -> Result<TeamMember> {
        self.teams
            .move_team_member(member_id, target_team_id, requester_id)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{BookingStatus, StdRandom};
    use crate::error::BookingError;
    use crate::persistence::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    fn engine() -> BookingEngine<MemoryStore> {
        BookingEngine::new(
            Arc::new(MemoryStore::new()),
            QuotaPolicy::default(),
            Arc::new(StdRandom::seeded(1)),
            EventBus::new(32),
        )
    }

    #[tokio::test]
    async fn creator_cancels_as_admin() {
        let engine = engine();
        let record = Match::new(UserId::new(), "Saturday league", 12);
        assert_ok!(engine.register_match(&record).await);

        let booking = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);

        let err = assert_err!(engine.cancel_booking_as(booking.id, UserId::new()).await);
        assert!(matches!(err, BookingError::Unauthorized(_)));

        let outcome = assert_ok!(engine.cancel_booking_as(booking.id, record.creator_id).await);
        assert_eq!(outcome.cancelled.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_as_reports_missing_booking() {
        let engine = engine();
        let err = assert_err!(engine.cancel_booking_as(BookingId::new(), UserId::new()).await);
        assert!(matches!(err, BookingError::BookingNotFound(_)));
    }

    #[test]
    fn from_config_uses_configured_policy() {
        let mut config = BookingConfig::default();
        config.quota_policy.default_goalkeeper = 4;
        let engine = BookingEngine::from_config(Arc::new(MemoryStore::new()), &config);
        assert_eq!(engine.allocator.resolver().policy().default_goalkeeper, 4);
    }
}
