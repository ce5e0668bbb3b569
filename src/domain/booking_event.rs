//! Domain events reflecting committed booking-state changes.
//!
//! Every committed transition publishes a [`BookingEvent`] through the
//! [`super::EventBus`]. The caller (transport layer, notifier) subscribes
//! to relay them, e.g. to notify the match creator about a new join.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BookingId, BookingStatus, MatchId, Position, TeamId, TeamMemberId, UserId};

/// Domain event emitted after a transaction commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum BookingEvent {
    /// A join request produced a booking.
    BookingCreated {
        /// New booking.
        booking_id: BookingId,
        /// Match joined.
        match_id: MatchId,
        /// Joining user.
        user_id: UserId,
        /// Match creator, to be notified.
        creator_id: UserId,
        /// Requested position.
        position: Position,
        /// Confirmed or waitlisted.
        status: BookingStatus,
        /// Waitlist rank (`0` when confirmed).
        waitlist_order: u32,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A booking was cancelled.
    BookingCancelled {
        /// Cancelled booking.
        booking_id: BookingId,
        /// Its match.
        match_id: MatchId,
        /// Booking owner.
        user_id: UserId,
        /// Who cancelled (owner or admin).
        cancelled_by: UserId,
        /// Whether the booking held a confirmed seat.
        was_confirmed: bool,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A waitlisted booking took a freed seat.
    BookingPromoted {
        /// Promoted booking.
        booking_id: BookingId,
        /// Its match.
        match_id: MatchId,
        /// Booking owner.
        user_id: UserId,
        /// Position of the freed seat.
        position: Position,
        /// Rank the booking held before promotion.
        previous_order: u32,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The match creator changed a booking's payment flag.
    PaymentUpdated {
        /// Updated booking.
        booking_id: BookingId,
        /// Its match.
        match_id: MatchId,
        /// New payment flag.
        is_paid: bool,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Teams were regenerated for a match.
    TeamsGenerated {
        /// Match.
        match_id: MatchId,
        /// Number of teams created.
        team_count: usize,
        /// Number of members assigned.
        member_count: usize,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A team member was moved to another team.
    TeamMemberMoved {
        /// Match.
        match_id: MatchId,
        /// Moved membership.
        member_id: TeamMemberId,
        /// Previous team.
        from_team: TeamId,
        /// New team.
        to_team: TeamId,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl BookingEvent {
    /// Returns the match ID associated with this event.
    #[must_use]
    pub fn match_id(&self) -> MatchId {
        match self {
            Self::BookingCreated { match_id, .. }
            | Self::BookingCancelled { match_id, .. }
            | Self::BookingPromoted { match_id, .. }
            | Self::PaymentUpdated { match_id, .. }
            | Self::TeamsGenerated { match_id, .. }
            | Self::TeamMemberMoved { match_id, .. } => *match_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::BookingCreated { .. } => "booking_created",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::BookingPromoted { .. } => "booking_promoted",
            Self::PaymentUpdated { .. } => "payment_updated",
            Self::TeamsGenerated { .. } => "teams_generated",
            Self::TeamMemberMoved { .. } => "team_member_moved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_serializes_with_tag() {
        let event = BookingEvent::BookingCreated {
            booking_id: BookingId::new(),
            match_id: MatchId::new(),
            user_id: UserId::new(),
            creator_id: UserId::new(),
            position: Position::Gk,
            status: BookingStatus::Waitlist,
            waitlist_order: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains(r#""event_type":"booking_created""#));
        assert!(json.contains(r#""status":"waitlist""#));
        assert!(json.contains(r#""position":"gk""#));
    }

    #[test]
    fn match_id_accessor() {
        let id = MatchId::new();
        let event = BookingEvent::TeamsGenerated {
            match_id: id,
            team_count: 3,
            member_count: 11,
            timestamp: Utc::now(),
        };
        assert_eq!(event.match_id(), id);
        assert_eq!(event.event_type_str(), "teams_generated");
    }
}
