//! PostgreSQL implementation of the store collaborator.
//!
//! The match-row lock is `SELECT ... FOR UPDATE` on `matches`; it lives
//! until the surrounding transaction commits or rolls back. Every
//! transaction sets `lock_timeout` so a stuck lock surfaces as an error
//! instead of an indefinite wait.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{BookingRow, MatchRow, RosterRow, TeamMemberRow, TeamRow};
use super::{BookingStore, StoreTransaction};
use crate::config::BookingConfig;
use crate::domain::{
    Booking, BookingId, Match, MatchId, Position, RosterEntry, Team, TeamId, TeamMember,
    TeamMemberId, TeamRoster,
};
use crate::error::{BookingError, Result};

const MATCH_COLUMNS: &str =
    "id, creator_id, title, max_players, position_quotas, status, created_at, updated_at";

const BOOKING_COLUMNS: &str =
    "id, match_id, user_id, position, status, waitlist_order, is_paid, created_at, updated_at";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgStore {
    /// Creates a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    /// Opens a connection pool as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] if the database cannot be
    /// reached.
    pub async fn connect(config: &BookingConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres"
        );
        Ok(Self::new(pool, config.database_lock_timeout_ms))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let mut tx = self.pool.begin().await?;
        if self.lock_timeout_ms > 0 {
            // SET does not accept bind parameters; the value is an integer.
            let stmt = format!("SET LOCAL lock_timeout = {}", self.lock_timeout_ms);
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        Ok(PgTransaction { tx })
    }

    async fn list_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        // Teams and members must come from one snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let rosters = fetch_rosters(&mut tx, match_id).await?;
        tx.commit().await?;
        Ok(rosters)
    }
}

/// Transaction handle of a [`PgStore`].
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

fn to_i32(value: u32, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| BookingError::InvalidRequest(format!("{what} out of range")))
}

async fn fetch_match(conn: &mut PgConnection, id: MatchId, lock: bool) -> Result<Match> {
    let sql = if lock {
        format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1")
    };
    sqlx::query_as::<_, MatchRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(Match::from)
        .ok_or(BookingError::MatchNotFound(id))
}

async fn fetch_rosters(conn: &mut PgConnection, match_id: MatchId) -> Result<Vec<TeamRoster>> {
    let teams = sqlx::query_as::<_, TeamRow>(
        "SELECT id, match_id, slot, name, color, created_at FROM teams \
         WHERE match_id = $1 ORDER BY slot ASC",
    )
    .bind(match_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let rows = sqlx::query_as::<_, RosterRow>(
        "SELECT tm.id, tm.team_id, tm.user_id, tm.booking_id, b.position, b.is_paid \
         FROM team_members tm \
         JOIN teams t ON t.id = tm.team_id \
         JOIN bookings b ON b.id = tm.booking_id \
         WHERE t.match_id = $1 ORDER BY tm.seq ASC",
    )
    .bind(match_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let mut by_team: HashMap<Uuid, Vec<RosterEntry>> = HashMap::new();
    for row in rows {
        let team_id = row.team_id;
        by_team
            .entry(team_id)
            .or_default()
            .push(RosterEntry::try_from(row)?);
    }

    Ok(teams
        .into_iter()
        .map(|row| {
            let members = by_team.remove(&row.id).unwrap_or_default();
            TeamRoster {
                team: Team::from(row),
                members,
            }
        })
        .collect())
}

fn bookings_from_rows(rows: Vec<BookingRow>) -> Result<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert_match(&mut self, record: &Match) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches \
             (id, creator_id, title, max_players, position_quotas, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id.as_uuid())
        .bind(record.creator_id.as_uuid())
        .bind(&record.title)
        .bind(to_i32(record.max_players, "max_players")?)
        .bind(record.position_quotas.as_ref().map(|q| q.to_json()))
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_match(&mut self, id: MatchId) -> Result<Match> {
        fetch_match(&mut self.tx, id, false).await
    }

    async fn lock_match_for_update(&mut self, id: MatchId) -> Result<Match> {
        fetch_match(&mut self.tx, id, true).await
    }

    async fn list_bookings(&mut self, match_id: MatchId) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE match_id = $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(match_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        bookings_from_rows(rows)
    }

    async fn get_booking(&mut self, id: BookingId) -> Result<Booking> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(BookingError::BookingNotFound(id))?;
        Booking::try_from(row)
    }

    async fn create_booking(&mut self, booking: &Booking) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO bookings \
             (id, match_id, user_id, position, status, waitlist_order, is_paid, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.match_id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.position.code())
        .bind(booking.status.as_str())
        .bind(to_i32(booking.waitlist_order, "waitlist_order")?)
        .bind(booking.is_paid)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(BookingError::AlreadyBooked {
                    user_id: booking.user_id,
                    match_id: booking.match_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $2, waitlist_order = $3, is_paid = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.status.as_str())
        .bind(to_i32(booking.waitlist_order, "waitlist_order")?)
        .bind(booking.is_paid)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BookingError::BookingNotFound(booking.id));
        }
        Ok(())
    }

    async fn list_waitlist(
        &mut self,
        match_id: MatchId,
        position: Position,
    ) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE match_id = $1 AND position = $2 AND status = 'waitlist' \
             ORDER BY waitlist_order ASC, created_at ASC"
        ))
        .bind(match_id.as_uuid())
        .bind(position.code())
        .fetch_all(&mut *self.tx)
        .await?;
        bookings_from_rows(rows)
    }

    async fn delete_teams_and_members(&mut self, match_id: MatchId) -> Result<u64> {
        sqlx::query(
            "DELETE FROM team_members WHERE team_id IN (SELECT id FROM teams WHERE match_id = $1)",
        )
        .bind(match_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        let result = sqlx::query("DELETE FROM teams WHERE match_id = $1")
            .bind(match_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_team(&mut self, team: &Team) -> Result<()> {
        sqlx::query(
            "INSERT INTO teams (id, match_id, slot, name, color, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(team.id.as_uuid())
        .bind(team.match_id.as_uuid())
        .bind(i16::from(team.slot))
        .bind(&team.name)
        .bind(&team.color)
        .bind(team.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn create_team_member(&mut self, member: &TeamMember) -> Result<()> {
        sqlx::query(
            "INSERT INTO team_members (id, team_id, user_id, booking_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(member.id.as_uuid())
        .bind(member.team_id.as_uuid())
        .bind(member.user_id.as_uuid())
        .bind(member.booking_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_team(&mut self, id: TeamId) -> Result<Team> {
        sqlx::query_as::<_, TeamRow>(
            "SELECT id, match_id, slot, name, color, created_at FROM teams WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Team::from)
        .ok_or(BookingError::TeamNotFound(id))
    }

    async fn get_team_member(&mut self, id: TeamMemberId) -> Result<TeamMember> {
        sqlx::query_as::<_, TeamMemberRow>(
            "SELECT id, team_id, user_id, booking_id FROM team_members WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(TeamMember::from)
        .ok_or(BookingError::TeamMemberNotFound(id))
    }

    async fn move_team_member(&mut self, id: TeamMemberId, team_id: TeamId) -> Result<()> {
        let result = sqlx::query("UPDATE team_members SET team_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(team_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookingError::TeamMemberNotFound(id));
        }
        Ok(())
    }

    async fn list_teams(&mut self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        fetch_rosters(&mut self.tx, match_id).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
