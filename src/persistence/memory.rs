//! In-process store with real transaction semantics.
//!
//! [`MemoryStore`] behaves like a read-committed relational store:
//!
//! - each transaction buffers its writes privately and sees them on top
//!   of the latest committed state;
//! - commit applies the buffer atomically, drop/rollback discards it;
//! - [`StoreTransaction::lock_match_for_update`] takes a per-match
//!   exclusive lock held until the transaction ends, so concurrent joins
//!   on one match run strictly one after another.
//!
//! It also enforces the "one non-cancelled booking per user per match"
//! constraint that the PostgreSQL schema carries as a unique index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookingStore, StoreTransaction};
use crate::domain::{
    Booking, BookingId, BookingStatus, Match, MatchId, Position, RosterEntry, Team, TeamId,
    TeamMember, TeamMemberId, TeamRoster,
};
use crate::error::{BookingError, Result};

/// Committed rows.
#[derive(Debug, Default)]
struct Tables {
    matches: HashMap<MatchId, Match>,
    bookings: Vec<Booking>,
    teams: Vec<Team>,
    members: Vec<TeamMember>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<MatchId, Arc<Mutex<()>>>>,
    fail_next_commit: AtomicBool,
}

/// In-memory [`BookingStore`].
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail with a persistence error, discarding
    /// that transaction's writes.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            pending: PendingWrites::default(),
        })
    }

    async fn list_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        let mut tx = self.begin().await?;
        tx.list_teams(match_id).await
    }
}

/// Writes buffered by one transaction.
#[derive(Debug, Default)]
struct PendingWrites {
    matches: Vec<Match>,
    bookings: Vec<Booking>,
    cleared: HashSet<MatchId>,
    teams: Vec<Team>,
    members: Vec<TeamMember>,
}

/// Transaction handle of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    held: HashMap<MatchId, OwnedMutexGuard<()>>,
    pending: PendingWrites,
}

/// Replaces committed rows by their pending versions and appends the
/// pending rows that are new.
fn overlay<'a, T, K>(
    committed: impl Iterator<Item = &'a T>,
    pending: &[T],
    key: impl Fn(&T) -> K,
) -> Vec<T>
where
    T: Clone + 'a,
    K: PartialEq,
{
    let newest = |k: &K| pending.iter().rev().find(|p| key(*p) == *k);
    let mut seen = Vec::new();
    let mut rows: Vec<T> = committed
        .map(|row| {
            let k = key(row);
            let picked = newest(&k).unwrap_or(row).clone();
            seen.push(k);
            picked
        })
        .collect();
    for row in pending {
        let k = key(row);
        if seen.contains(&k) {
            continue;
        }
        if let Some(latest) = newest(&k) {
            rows.push(latest.clone());
        }
        seen.push(k);
    }
    rows
}

impl MemoryTransaction {
    async fn view_bookings(&self, match_id: MatchId) -> Vec<Booking> {
        let tables = self.shared.tables.lock().await;
        overlay(
            tables.bookings.iter().filter(|b| b.match_id == match_id),
            &self.pending.bookings,
            |b| b.id,
        )
        .into_iter()
        .filter(|b| b.match_id == match_id)
        .collect()
    }

    async fn view_teams(&self) -> (Vec<Team>, Vec<TeamMember>) {
        let tables = self.shared.tables.lock().await;
        let teams = overlay(
            tables
                .teams
                .iter()
                .filter(|t| !self.pending.cleared.contains(&t.match_id)),
            &self.pending.teams,
            |t| t.id,
        );
        let visible: HashSet<TeamId> = teams.iter().map(|t| t.id).collect();
        let members = overlay(
            tables.members.iter().filter(|m| visible.contains(&m.team_id)),
            &self.pending.members,
            |m| m.id,
        );
        (teams, members)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_match(&mut self, record: &Match) -> Result<()> {
        self.pending.matches.push(record.clone());
        Ok(())
    }

    async fn get_match(&mut self, id: MatchId) -> Result<Match> {
        if let Some(record) = self.pending.matches.iter().rev().find(|m| m.id == id) {
            return Ok(record.clone());
        }
        let tables = self.shared.tables.lock().await;
        tables
            .matches
            .get(&id)
            .cloned()
            .ok_or(BookingError::MatchNotFound(id))
    }

    async fn lock_match_for_update(&mut self, id: MatchId) -> Result<Match> {
        if !self.held.contains_key(&id) {
            let row_lock = {
                let mut locks = self.shared.row_locks.lock().await;
                // Only the table itself references a lock nobody holds or awaits.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                Arc::clone(locks.entry(id).or_default())
            };
            let guard = row_lock.lock_owned().await;
            tracing::trace!(match_id = %id, "match row locked");
            self.held.insert(id, guard);
        }
        self.get_match(id).await
    }

    async fn list_bookings(&mut self, match_id: MatchId) -> Result<Vec<Booking>> {
        Ok(self.view_bookings(match_id).await)
    }

    async fn get_booking(&mut self, id: BookingId) -> Result<Booking> {
        if let Some(booking) = self.pending.bookings.iter().rev().find(|b| b.id == id) {
            return Ok(booking.clone());
        }
        let tables = self.shared.tables.lock().await;
        tables
            .bookings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(BookingError::BookingNotFound(id))
    }

    async fn create_booking(&mut self, booking: &Booking) -> Result<()> {
        let duplicate = self
            .view_bookings(booking.match_id)
            .await
            .iter()
            .any(|b| b.is_active() && b.user_id == booking.user_id && b.id != booking.id);
        if duplicate && booking.is_active() {
            return Err(BookingError::AlreadyBooked {
                user_id: booking.user_id,
                match_id: booking.match_id,
            });
        }
        self.pending.bookings.push(booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<()> {
        // Existence check mirrors an UPDATE that must hit one row.
        self.get_booking(booking.id).await?;
        self.pending.bookings.push(booking.clone());
        Ok(())
    }

    async fn list_waitlist(
        &mut self,
        match_id: MatchId,
        position: Position,
    ) -> Result<Vec<Booking>> {
        let mut waitlist: Vec<Booking> = self
            .view_bookings(match_id)
            .await
            .into_iter()
            .filter(|b| b.status == BookingStatus::Waitlist && b.position == position)
            .collect();
        waitlist.sort_by_key(|b| (b.waitlist_order, b.created_at));
        Ok(waitlist)
    }

    async fn delete_teams_and_members(&mut self, match_id: MatchId) -> Result<u64> {
        let (teams, _) = self.view_teams().await;
        let doomed: HashSet<TeamId> = teams
            .iter()
            .filter(|t| t.match_id == match_id)
            .map(|t| t.id)
            .collect();
        self.pending.members.retain(|m| !doomed.contains(&m.team_id));
        self.pending.teams.retain(|t| t.match_id != match_id);
        self.pending.cleared.insert(match_id);
        Ok(u64::try_from(doomed.len()).unwrap_or(u64::MAX))
    }

    async fn create_team(&mut self, team: &Team) -> Result<()> {
        self.pending.teams.push(team.clone());
        Ok(())
    }

    async fn create_team_member(&mut self, member: &TeamMember) -> Result<()> {
        self.get_team(member.team_id).await?;
        self.pending.members.push(member.clone());
        Ok(())
    }

    async fn get_team(&mut self, id: TeamId) -> Result<Team> {
        let (teams, _) = self.view_teams().await;
        teams
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(BookingError::TeamNotFound(id))
    }

    async fn get_team_member(&mut self, id: TeamMemberId) -> Result<TeamMember> {
        let (_, members) = self.view_teams().await;
        members
            .into_iter()
            .find(|m| m.id == id)
            .ok_or(BookingError::TeamMemberNotFound(id))
    }

    async fn move_team_member(&mut self, id: TeamMemberId, team_id: TeamId) -> Result<()> {
        let mut member = self.get_team_member(id).await?;
        member.team_id = team_id;
        self.pending.members.push(member);
        Ok(())
    }

    async fn list_teams(&mut self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        let (teams, members) = self.view_teams().await;
        let bookings = self.view_bookings(match_id).await;

        let mut teams: Vec<Team> = teams.into_iter().filter(|t| t.match_id == match_id).collect();
        teams.sort_by_key(|t| t.slot);

        Ok(teams
            .into_iter()
            .map(|team| {
                let members = members
                    .iter()
                    .filter(|m| m.team_id == team.id)
                    .filter_map(|m| {
                        let booking = bookings.iter().find(|b| b.id == m.booking_id)?;
                        Some(RosterEntry {
                            member: m.clone(),
                            position: booking.position,
                            is_paid: booking.is_paid,
                        })
                    })
                    .collect();
                TeamRoster { team, members }
            })
            .collect())
    }

    async fn commit(self) -> Result<()> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(BookingError::Persistence(
                "commit failed: injected failure".to_string(),
            ));
        }

        let PendingWrites {
            matches,
            bookings,
            cleared,
            teams,
            members,
        } = self.pending;

        let mut tables = self.shared.tables.lock().await;
        for record in matches {
            tables.matches.insert(record.id, record);
        }
        for booking in bookings {
            match tables.bookings.iter_mut().find(|b| b.id == booking.id) {
                Some(row) => *row = booking,
                None => tables.bookings.push(booking),
            }
        }
        if !cleared.is_empty() {
            let doomed: HashSet<TeamId> = tables
                .teams
                .iter()
                .filter(|t| cleared.contains(&t.match_id))
                .map(|t| t.id)
                .collect();
            tables.members.retain(|m| !doomed.contains(&m.team_id));
            tables.teams.retain(|t| !doomed.contains(&t.id));
        }
        for team in teams {
            match tables.teams.iter_mut().find(|t| t.id == team.id) {
                Some(row) => *row = team,
                None => tables.teams.push(team),
            }
        }
        for member in members {
            match tables.members.iter_mut().find(|m| m.id == member.id) {
                Some(row) => *row = member,
                None => tables.members.push(member),
            }
        }
        drop(tables);
        // Row locks in `self.held` are released when the guards drop here.
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
