//! Service layer: the booking allocation engine.
//!
//! Each component owns one transactional operation against the store and
//! publishes a [`crate::domain::BookingEvent`] once its transaction has
//! committed:
//!
//! - [`BookingAllocator`]: join requests (confirmed seat or waitlist rank).
//! - [`WaitlistPromoter`]: cancellations and the promotion they trigger.
//! - [`PaymentLedger`]: the creator-only payment flag.
//! - [`TeamAssigner`]: team generation, listing and manual moves.
//!
//! [`BookingEngine`] wires all four around one store and one event bus.

pub mod allocator;
pub mod engine;
pub mod payments;
pub mod promoter;
pub mod team_assigner;

pub use allocator::BookingAllocator;
pub use engine::BookingEngine;
pub use payments::PaymentLedger;
pub use promoter::{CancelOutcome, WaitlistPromoter};
pub use team_assigner::TeamAssigner;
