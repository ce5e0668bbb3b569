//! Persistence layer: the match/booking store collaborator.
//!
//! The engine talks to storage through two traits. [`BookingStore`] opens
//! transactions; every read and write then goes through the explicit
//! transaction handle ([`StoreTransaction`]) it returns, so nothing can
//! accidentally bypass the transaction. [`run_in_transaction`] wraps the
//! begin / commit / rollback dance.
//!
//! Two implementations ship with the crate: [`MemoryStore`] (in-process,
//! used by tests and the in-memory stress run) and [`PgStore`] (PostgreSQL via
//! `sqlx`).

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::domain::{
    Booking, BookingId, Match, MatchId, Position, Team, TeamId, TeamMember, TeamMemberId,
    TeamRoster,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Entry point to a transactional match/booking store.
#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    /// Transaction handle type.
    type Tx: StoreTransaction;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookingError::Persistence`] if the store is
    /// unreachable.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Reads the current teams of a match outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookingError::Persistence`] on store failure.
    async fn list_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>>;
}

/// Operations available inside one store transaction.
///
/// Dropping a transaction without calling [`StoreTransaction::commit`]
/// discards its writes and releases its locks. Unless stated otherwise,
/// every method fails with [`crate::BookingError::Persistence`] when the
/// store itself fails.
#[async_trait]
pub trait StoreTransaction: Send + 'static {
    /// Inserts a match record.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn insert_match(&mut self, record: &Match) -> Result<()>;

    /// Reads a match without locking it.
    ///
    /// # Errors
    ///
    /// `MatchNotFound` if it does not exist.
    async fn get_match(&mut self, id: MatchId) -> Result<Match>;

    /// Reads a match and takes its exclusive row lock until the
    /// transaction ends. Blocks while another transaction holds it.
    ///
    /// # Errors
    ///
    /// `MatchNotFound` if it does not exist; `Persistence` on lock
    /// timeout.
    async fn lock_match_for_update(&mut self, id: MatchId) -> Result<Match>;

    /// All bookings of a match, in creation order.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn list_bookings(&mut self, match_id: MatchId) -> Result<Vec<Booking>>;

    /// Reads one booking.
    ///
    /// # Errors
    ///
    /// `BookingNotFound` if missing.
    async fn get_booking(&mut self, id: BookingId) -> Result<Booking>;

    /// Inserts a booking.
    ///
    /// # Errors
    ///
    /// `AlreadyBooked` if the user already holds a non-cancelled booking
    /// for the match.
    async fn create_booking(&mut self, booking: &Booking) -> Result<()>;

    /// Persists status, waitlist rank and payment flag of a booking.
    ///
    /// # Errors
    ///
    /// `BookingNotFound` if the row does not exist.
    async fn update_booking(&mut self, booking: &Booking) -> Result<()>;

    /// Waitlisted bookings of one (match, position), lowest rank first.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn list_waitlist(&mut self, match_id: MatchId, position: Position)
    -> Result<Vec<Booking>>;

    /// Deletes the members of the match's teams, then the teams.
    /// Returns the number of teams removed.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn delete_teams_and_members(&mut self, match_id: MatchId) -> Result<u64>;

    /// Inserts a team.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn create_team(&mut self, team: &Team) -> Result<()>;

    /// Inserts a team member.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn create_team_member(&mut self, member: &TeamMember) -> Result<()>;

    /// Reads one team.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` if missing.
    async fn get_team(&mut self, id: TeamId) -> Result<Team>;

    /// Reads one team member.
    ///
    /// # Errors
    ///
    /// `TeamMemberNotFound` if missing.
    async fn get_team_member(&mut self, id: TeamMemberId) -> Result<TeamMember>;

    /// Reassigns a member to another team.
    ///
    /// # Errors
    ///
    /// `TeamMemberNotFound` if missing.
    async fn move_team_member(&mut self, id: TeamMemberId, team_id: TeamId) -> Result<()>;

    /// Teams of a match in palette order, with resolved members.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn list_teams(&mut self, match_id: MatchId) -> Result<Vec<TeamRoster>>;

    /// Makes all writes visible and releases locks.
    ///
    /// # Errors
    ///
    /// `Persistence` if the commit fails; the writes are then discarded.
    async fn commit(self) -> Result<()>;

    /// Discards all writes and releases locks.
    ///
    /// # Errors
    ///
    /// Store failure only.
    async fn rollback(self) -> Result<()>;
}

/// Runs `f` inside a fresh transaction of `store`.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A
/// failing rollback is logged and the original error is returned.
///
/// # Errors
///
/// Returns the error produced by `f`, or a store error from `begin` /
/// `commit`.
pub async fn run_in_transaction<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: BookingStore + ?Sized,
    T: Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>> + Send,
{
    let mut tx = store.begin().await?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
