//! Match record as seen by the booking engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchId, PositionQuotas, UserId};

/// Publication state of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Being prepared by its creator.
    #[default]
    Draft,
    /// Visible and open for bookings.
    Published,
    /// Called off.
    Cancelled,
}

impl MatchStatus {
    /// Stored code for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stored code. Unknown codes (including the legacy `open`)
    /// map to `Published`, `closed` maps to `Cancelled`.
    #[must_use]
    pub fn from_stored(code: &str) -> Self {
        match code {
            "draft" => Self::Draft,
            "cancelled" | "closed" => Self::Cancelled,
            _ => Self::Published,
        }
    }
}

/// A capacity-limited match.
///
/// Owned and mutated by match management; the engine only reads it and
/// takes its row lock. Quotas are already typed: `None` means the match
/// carries no usable quota configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Match identifier.
    pub id: MatchId,
    /// User who created (and administers) the match.
    pub creator_id: UserId,
    /// Display title.
    pub title: String,
    /// Overall head count announced for the match.
    pub max_players: u32,
    /// Per-position capacities.
    pub position_quotas: Option<PositionQuotas>,
    /// Publication state.
    pub status: MatchStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Creates a published match owned by `creator_id`.
    #[must_use]
    pub fn new(creator_id: UserId, title: impl Into<String>, max_players: u32) -> Self {
        let now = Utc::now();
        Self {
            id: MatchId::new(),
            creator_id,
            title: title.into(),
            max_players,
            position_quotas: None,
            status: MatchStatus::Published,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the match with the given quota table.
    #[must_use]
    pub fn with_quotas(mut self, quotas: PositionQuotas) -> Self {
        self.position_quotas = Some(quotas);
        self
    }

    /// Returns `true` if `user_id` administers this match.
    #[must_use]
    pub fn is_administered_by(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }
}
