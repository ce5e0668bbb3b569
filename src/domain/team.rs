//! Generated teams and their members.
//!
//! Teams have no lifecycle of their own: each generation run for a match
//! destroys the previous set and creates a fresh one from the palette.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, MatchId, Position, TeamId, TeamMemberId, UserId};

/// Fixed team names and colors, in creation order.
pub const TEAM_PALETTE: [(&str, &str); 3] = [
    ("Team A", "#ef4444"),
    ("Team B", "#3b82f6"),
    ("Team C", "#10b981"),
];

/// A team generated for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team identifier.
    pub id: TeamId,
    /// Owning match.
    pub match_id: MatchId,
    /// Palette slot (0-based); teams are listed in slot order.
    pub slot: u8,
    /// Display name.
    pub name: String,
    /// Display color (hex).
    pub color: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// Builds the palette team for `slot`, or `None` past the palette end.
    #[must_use]
    pub fn from_palette(match_id: MatchId, slot: u8) -> Option<Self> {
        let (name, color) = TEAM_PALETTE.get(usize::from(slot))?;
        Some(Self {
            id: TeamId::new(),
            match_id,
            slot,
            name: (*name).to_string(),
            color: (*color).to_string(),
            created_at: Utc::now(),
        })
    }
}

/// Links one booking to one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Membership identifier.
    pub id: TeamMemberId,
    /// Team the booking was assigned to.
    pub team_id: TeamId,
    /// Booking owner.
    pub user_id: UserId,
    /// Qualifying booking.
    pub booking_id: BookingId,
}

impl TeamMember {
    /// Creates a membership for `booking_id` on `team_id`.
    #[must_use]
    pub fn new(team_id: TeamId, user_id: UserId, booking_id: BookingId) -> Self {
        Self {
            id: TeamMemberId::new(),
            team_id,
            user_id,
            booking_id,
        }
    }
}

/// Team member with its booking details resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Membership row.
    pub member: TeamMember,
    /// Position of the qualifying booking.
    pub position: Position,
    /// Payment flag of the qualifying booking.
    pub is_paid: bool,
}

/// A team with its resolved members, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    /// The team.
    pub team: Team,
    /// Its members.
    pub members: Vec<RosterEntry>,
}

impl TeamRoster {
    /// Number of goalkeepers on the team.
    #[must_use]
    pub fn goalkeeper_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.position.is_goalkeeper())
            .count()
    }
}
