//! Concurrent-join race check.
//!
//! Fires many joins for one (match, position) at the same instant and
//! checks the outcome for oversell: more confirmed bookings than the
//! position's capacity, or a waitlist whose ranks are not exactly
//! `1..=n`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Barrier;

use crate::domain::{BookingStatus, Capacity, MatchId, Position, UserId};
use crate::persistence::BookingStore;
use crate::service::BookingEngine;

/// Outcome of one [`run_join_race`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaceReport {
    /// Joins that got a confirmed seat.
    pub confirmed: usize,
    /// Joins that were waitlisted.
    pub waitlisted: usize,
    /// Joins that returned an error (or whose task died).
    pub failed: usize,
    /// Waitlist ranks handed out, ascending.
    pub waitlist_orders: Vec<u32>,
    /// Error messages of the failed joins.
    pub errors: Vec<String>,
}

impl RaceReport {
    /// Returns `true` if more seats were confirmed than `capacity` allows.
    #[must_use]
    pub fn oversold(&self, capacity: Capacity) -> bool {
        match capacity {
            Capacity::Limited(limit) => {
                usize::try_from(limit).map_or(false, |limit| self.confirmed > limit)
            }
            Capacity::Unlimited => false,
        }
    }

    /// Returns `true` if the waitlist ranks are exactly `1..=waitlisted`.
    #[must_use]
    pub fn waitlist_is_contiguous(&self) -> bool {
        self.waitlist_orders.len() == self.waitlisted
            && self
                .waitlist_orders
                .iter()
                .zip(1u32..)
                .all(|(order, expected)| *order == expected)
    }

    /// Returns `true` if the race ended without oversell, with a
    /// contiguous waitlist and no failures.
    #[must_use]
    pub fn is_clean(&self, capacity: Capacity) -> bool {
        !self.oversold(capacity) && self.waitlist_is_contiguous() && self.failed == 0
    }
}

impl fmt::Display for RaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "confirmed={} waitlisted={} failed={} waitlist_orders={:?}",
            self.confirmed, self.waitlisted, self.failed, self.waitlist_orders
        )
    }
}

/// Has `users` distinct users join `match_id` at `position` concurrently.
///
/// All tasks wait on one barrier so that their transactions start
/// together. Each join is independent; errors are counted, not
/// propagated.
pub async fn run_join_race<S: BookingStore>(
    engine: &BookingEngine<S>,
    match_id: MatchId,
    position: Position,
    users: usize,
) -> RaceReport {
    let barrier = Arc::new(Barrier::new(users.max(1)));
    let handles: Vec<_> = (0..users)
        .map(|_| {
            let engine = engine.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                engine.join_match(UserId::new(), match_id, position).await
            })
        })
        .collect();

    let mut report = RaceReport::default();
    for handle in handles {
        match handle.await {
            Ok(Ok(booking)) => match booking.status {
                BookingStatus::Confirmed => report.confirmed += 1,
                BookingStatus::Waitlist => {
                    report.waitlisted += 1;
                    report.waitlist_orders.push(booking.waitlist_order);
                }
                BookingStatus::Cancelled => {
                    report.failed += 1;
                    report.errors.push(format!("join returned cancelled booking {}", booking.id));
                }
            },
            Ok(Err(err)) => {
                tracing::warn!(error = %err, %match_id, "join failed during race");
                report.failed += 1;
                report.errors.push(err.to_string());
            }
            Err(join_err) => {
                report.failed += 1;
                report.errors.push(join_err.to_string());
            }
        }
    }
    report.waitlist_orders.sort_unstable();

    tracing::info!(%match_id, %position, users, %report, "join race finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(confirmed: usize, orders: Vec<u32>) -> RaceReport {
        RaceReport {
            confirmed,
            waitlisted: orders.len(),
            waitlist_orders: orders,
            ..RaceReport::default()
        }
    }

    #[test]
    fn oversell_is_detected() {
        assert!(report(6, vec![]).oversold(Capacity::Limited(5)));
        assert!(!report(5, vec![]).oversold(Capacity::Limited(5)));
        assert!(!report(500, vec![]).oversold(Capacity::Unlimited));
    }

    #[test]
    fn waitlist_must_be_one_to_n() {
        assert!(report(5, vec![1, 2, 3, 4, 5]).waitlist_is_contiguous());
        assert!(report(5, vec![]).waitlist_is_contiguous());
        assert!(!report(5, vec![1, 1, 2]).waitlist_is_contiguous());
        assert!(!report(5, vec![2, 3]).waitlist_is_contiguous());
    }

    #[test]
    fn failures_make_a_race_unclean() {
        let mut r = report(5, vec![1]);
        assert!(r.is_clean(Capacity::Limited(5)));
        r.failed = 1;
        assert!(!r.is_clean(Capacity::Limited(5)));
    }
}
