//! # squad-booking
//!
//! Booking allocation engine for capacity-limited matches.
//!
//! Each match declares per-position seat quotas. Players ask for a
//! position and are either confirmed or put on an ordered waitlist;
//! cancelling a confirmed seat promotes the next waitlisted player; paid
//! players are dealt into three balanced teams. All ordering guarantees
//! come from the store's transactions and the match-row lock.
//!
//! ## Architecture
//!
//! ```text
//! Callers (transport handlers, CLI, stress run)
//!     │
//!     ├── BookingEngine (service/)
//!     │     ├── BookingAllocator   join   (match-row lock)
//!     │     ├── WaitlistPromoter   cancel (match-row lock)
//!     │     ├── PaymentLedger      paid flag
//!     │     └── TeamAssigner       teams  (injected RandomSource)
//!     │
//!     ├── QuotaResolver, EventBus (domain/)
//!     │
//!     └── BookingStore (persistence/)
//!           ├── MemoryStore
//!           └── PgStore (PostgreSQL)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod stress;

pub use config::BookingConfig;
pub use error::{BookingError, ErrorKind, Result};
pub use service::BookingEngine;
