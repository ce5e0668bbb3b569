//! Bookings and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, MatchId, Position, UserId};

/// Lifecycle state of a booking.
///
/// Cancellation is a state transition; booking rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Holds a seat within the position quota.
    Confirmed,
    /// Queued behind the quota, ranked by `waitlist_order`.
    Waitlist,
    /// Withdrawn.
    Cancelled,
}

impl BookingStatus {
    /// Stored code for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Waitlist => "waitlist",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stored code.
    #[must_use]
    pub fn from_stored(code: &str) -> Option<Self> {
        match code {
            "confirmed" => Some(Self::Confirmed),
            "waitlist" => Some(Self::Waitlist),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One user's claim on a position in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// Match the booking belongs to.
    pub match_id: MatchId,
    /// Booking owner.
    pub user_id: UserId,
    /// Requested position.
    pub position: Position,
    /// Lifecycle state.
    pub status: BookingStatus,
    /// Rank among waitlisted bookings of the same (match, position);
    /// `0` unless `status` is [`BookingStatus::Waitlist`].
    pub waitlist_order: u32,
    /// Whether the match fee has been paid.
    pub is_paid: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a confirmed booking.
    #[must_use]
    pub fn confirmed(match_id: MatchId, user_id: UserId, position: Position) -> Self {
        let now = Utc::now();
        Self {
            id: BookingId::new(),
            match_id,
            user_id,
            position,
            status: BookingStatus::Confirmed,
            waitlist_order: 0,
            is_paid: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a waitlisted booking at rank `order`.
    #[must_use]
    pub fn waitlisted(match_id: MatchId, user_id: UserId, position: Position, order: u32) -> Self {
        Self {
            status: BookingStatus::Waitlist,
            waitlist_order: order,
            ..Self::confirmed(match_id, user_id, position)
        }
    }

    /// Returns `true` unless the booking is cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    /// Returns `true` for confirmed and paid bookings.
    #[must_use]
    pub fn is_team_eligible(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.is_paid
    }

    /// Transitions to cancelled, clearing the waitlist rank.
    pub fn cancel(&mut self) {
        self.status = BookingStatus::Cancelled;
        self.waitlist_order = 0;
        self.updated_at = Utc::now();
    }

    /// Transitions a waitlisted booking to confirmed.
    pub fn promote(&mut self) {
        self.status = BookingStatus::Confirmed;
        self.waitlist_order = 0;
        self.updated_at = Utc::now();
    }
}
