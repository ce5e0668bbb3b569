//! Domain layer: core types, quota resolution, randomness and events.
//!
//! This module contains the engine's data model (matches, bookings,
//! teams), the pure [`QuotaResolver`], the injected [`RandomSource`] used
//! for team shuffling, and the event bus for broadcasting committed
//! state changes.

pub mod booking;
pub mod booking_event;
pub mod event_bus;
pub mod ids;
pub mod match_record;
pub mod position;
pub mod quota;
pub mod random;
pub mod team;

pub use booking::{Booking, BookingStatus};
pub use booking_event::BookingEvent;
pub use event_bus::{EventBus, MatchSubscription};
pub use ids::{BookingId, MatchId, TeamId, TeamMemberId, UserId};
pub use match_record::{Match, MatchStatus};
pub use position::Position;
pub use quota::{Capacity, MissingPositionPolicy, PositionQuotas, QuotaPolicy, QuotaResolver};
pub use random::{RandomSource, StdRandom};
pub use team::{RosterEntry, TEAM_PALETTE, Team, TeamMember, TeamRoster};
