//! Booking engine error types with stable numeric codes.
//!
//! [`BookingError`] is the central error type of the crate. Every failure
//! the engine can report to its caller is a distinct, named variant; none
//! of them is retried internally. Transport layers map variants to their
//! own status codes using [`BookingError::error_code`] or
//! [`BookingError::kind`].

use uuid::Uuid;

use crate::domain::{BookingId, MatchId, TeamId, TeamMemberId, UserId};

/// Convenience alias used throughout the crate.
pub type Result<T, E = BookingError> = std::result::Result<T, E>;

/// Coarse classification of a [`BookingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced match, booking, team or team member does not exist.
    NotFound,
    /// The user already holds a non-cancelled booking for the match.
    AlreadyBooked,
    /// The booking is already cancelled.
    AlreadyCancelled,
    /// The requester may not perform the operation.
    Unauthorized,
    /// The position code is not recognised.
    InvalidPosition,
    /// No confirmed and paid bookings exist for team generation.
    NoEligiblePlayers,
    /// The request is malformed in some other way.
    InvalidRequest,
    /// Store failure (opaque to the caller).
    Infrastructure,
}

/// Engine error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 1000–1999 | Validation            |
/// | 2000–2999 | Not Found / State     |
/// | 3000–3999 | Infrastructure        |
/// | 4000–4999 | Authorization         |
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Match with the given ID was not found.
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    /// Booking with the given ID was not found.
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),

    /// Team with the given ID was not found.
    #[error("team not found: {0}")]
    TeamNotFound(TeamId),

    /// Team member with the given ID was not found.
    #[error("team member not found: {0}")]
    TeamMemberNotFound(TeamMemberId),

    /// The user already holds an active booking for this match.
    #[error("user {user_id} already booked for match {match_id}")]
    AlreadyBooked {
        /// Requesting user.
        user_id: UserId,
        /// Target match.
        match_id: MatchId,
    },

    /// The booking was already cancelled.
    #[error("booking already cancelled: {0}")]
    AlreadyCancelled(BookingId),

    /// The requester is neither the owner nor an admin of the match.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown position code.
    #[error("invalid position: {0:?}")]
    InvalidPosition(String),

    /// No confirmed and paid bookings exist for the match.
    #[error("no eligible paid players for match {0}")]
    NoEligiblePlayers(MatchId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store failure (lock timeout, connection loss, constraint, ...).
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl BookingError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidPosition(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::MatchNotFound(_) => 2001,
            Self::BookingNotFound(_) => 2002,
            Self::TeamNotFound(_) => 2003,
            Self::TeamMemberNotFound(_) => 2004,
            Self::AlreadyBooked { .. } => 2101,
            Self::AlreadyCancelled(_) => 2102,
            Self::NoEligiblePlayers(_) => 2103,
            Self::Persistence(_) => 3001,
            Self::Unauthorized(_) => 4001,
        }
    }

    /// Returns the coarse [`ErrorKind`] for this variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MatchNotFound(_)
            | Self::BookingNotFound(_)
            | Self::TeamNotFound(_)
            | Self::TeamMemberNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyBooked { .. } => ErrorKind::AlreadyBooked,
            Self::AlreadyCancelled(_) => ErrorKind::AlreadyCancelled,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidPosition(_) => ErrorKind::InvalidPosition,
            Self::NoEligiblePlayers(_) => ErrorKind::NoEligiblePlayers,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Persistence(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns `true` for any of the "not found" variants.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }
}

/// Converts a raw store error into [`BookingError::Persistence`].
///
/// Callers that can attribute a missing row to a specific entity map
/// `RowNotFound` themselves before falling back to this conversion.
impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for BookingError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(format!("migration failed: {err}"))
    }
}

/// Builds an [`BookingError::Unauthorized`] for a requester acting on
/// someone else's resource.
pub(crate) fn denied(requester: UserId, action: &str, resource: Uuid) -> BookingError {
    BookingError::Unauthorized(format!("user {requester} may not {action} {resource}"))
}
