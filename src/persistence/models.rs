//! Database row models and their conversion into domain types.
//!
//! Rows mirror the tables in `migrations/`. Conversion is where stored
//! text becomes typed data: quota JSON becomes [`PositionQuotas`], status
//! and position codes become enums.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Booking, BookingStatus, Match, MatchStatus, Position, PositionQuotas, RosterEntry, Team,
    TeamMember,
};
use crate::error::BookingError;

/// A row of the `matches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchRow {
    /// Match ID.
    pub id: Uuid,
    /// Creator / admin.
    pub creator_id: Uuid,
    /// Display title.
    pub title: String,
    /// Announced head count.
    pub max_players: i32,
    /// Raw quota JSON, possibly absent or malformed.
    pub position_quotas: Option<String>,
    /// Status code.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        Self {
            id: row.id.into(),
            creator_id: row.creator_id.into(),
            title: row.title,
            max_players: u32::try_from(row.max_players).unwrap_or(0),
            position_quotas: PositionQuotas::from_stored(row.position_quotas.as_deref()),
            status: MatchStatus::from_stored(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A row of the `bookings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    /// Booking ID.
    pub id: Uuid,
    /// Match ID.
    pub match_id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Position code.
    pub position: String,
    /// Status code.
    pub status: String,
    /// Waitlist rank.
    pub waitlist_order: i32,
    /// Payment flag.
    pub is_paid: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let position: Position = row.position.parse().map_err(|_| {
            BookingError::Persistence(format!(
                "booking {} has unknown position {:?}",
                row.id, row.position
            ))
        })?;
        let status = BookingStatus::from_stored(&row.status).ok_or_else(|| {
            BookingError::Persistence(format!(
                "booking {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        Ok(Self {
            id: row.id.into(),
            match_id: row.match_id.into(),
            user_id: row.user_id.into(),
            position,
            status,
            waitlist_order: u32::try_from(row.waitlist_order).unwrap_or(0),
            is_paid: row.is_paid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of the `teams` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamRow {
    /// Team ID.
    pub id: Uuid,
    /// Match ID.
    pub match_id: Uuid,
    /// Palette slot.
    pub slot: i16,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Self {
            id: row.id.into(),
            match_id: row.match_id.into(),
            slot: u8::try_from(row.slot).unwrap_or(u8::MAX),
            name: row.name,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

/// A row of the `team_members` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamMemberRow {
    /// Membership ID.
    pub id: Uuid,
    /// Team ID.
    pub team_id: Uuid,
    /// Owner of the qualifying booking.
    pub user_id: Uuid,
    /// Qualifying booking.
    pub booking_id: Uuid,
}

impl From<TeamMemberRow> for TeamMember {
    fn from(row: TeamMemberRow) -> Self {
        Self {
            id: row.id.into(),
            team_id: row.team_id.into(),
            user_id: row.user_id.into(),
            booking_id: row.booking_id.into(),
        }
    }
}

/// A team member joined with its booking.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RosterRow {
    /// Membership ID.
    pub id: Uuid,
    /// Team ID.
    pub team_id: Uuid,
    /// Owner of the qualifying booking.
    pub user_id: Uuid,
    /// Qualifying booking.
    pub booking_id: Uuid,
    /// Booking position code.
    pub position: String,
    /// Booking payment flag.
    pub is_paid: bool,
}

impl TryFrom<RosterRow> for RosterEntry {
    type Error = BookingError;

    fn try_from(row: RosterRow) -> Result<Self, Self::Error> {
        let position: Position = row.position.parse().map_err(|_| {
            BookingError::Persistence(format!(
                "booking {} has unknown position {:?}",
                row.booking_id, row.position
            ))
        })?;
        Ok(Self {
            member: TeamMember {
                id: row.id.into(),
                team_id: row.team_id.into(),
                user_id: row.user_id.into(),
                booking_id: row.booking_id.into(),
            },
            position,
            is_paid: row.is_paid,
        })
    }
}
