//! End-to-end booking scenarios against the in-memory store.
//!
//! Joins, cancellations, payments and team generation go through
//! [`BookingEngine`] exactly as a transport layer would call them.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio_test::{assert_err, assert_ok};

use squad_booking::domain::{
    Booking, BookingId, BookingStatus, Capacity, EventBus, Match, MatchId, Position,
    PositionQuotas, QuotaPolicy, RandomSource, StdRandom, UserId,
};
use squad_booking::persistence::{BookingStore, MemoryStore, StoreTransaction};
use squad_booking::stress::run_join_race;
use squad_booking::{BookingEngine, BookingError};

fn engine_with(random: Arc<dyn RandomSource>) -> BookingEngine<MemoryStore> {
    BookingEngine::new(
        Arc::new(MemoryStore::new()),
        QuotaPolicy::default(),
        random,
        EventBus::new(256),
    )
}

fn engine() -> BookingEngine<MemoryStore> {
    engine_with(Arc::new(StdRandom::seeded(11)))
}

async fn seed(engine: &BookingEngine<MemoryStore>, quotas: PositionQuotas) -> Match {
    let record = Match::new(UserId::new(), "Five-a-side", 10).with_quotas(quotas);
    assert_ok!(engine.register_match(&record).await);
    record
}

async fn bookings_of(engine: &BookingEngine<MemoryStore>, match_id: MatchId) -> Vec<Booking> {
    let Ok(mut tx) = engine.store().begin().await else {
        panic!("begin failed");
    };
    let Ok(bookings) = tx.list_bookings(match_id).await else {
        panic!("list bookings failed");
    };
    bookings
}

async fn booking(engine: &BookingEngine<MemoryStore>, id: BookingId) -> Booking {
    let Ok(mut tx) = engine.store().begin().await else {
        panic!("begin failed");
    };
    let Ok(found) = tx.get_booking(id).await else {
        panic!("booking {id} missing");
    };
    found
}

fn confirmed_at(bookings: &[Booking], position: Position) -> usize {
    bookings
        .iter()
        .filter(|b| b.position == position && b.status == BookingStatus::Confirmed)
        .count()
}

#[tokio::test]
async fn goalkeeper_waitlist_is_promoted_on_cancel() {
    let engine = engine();
    let record = seed(
        &engine,
        PositionQuotas::new().with("gk", 1).with("player_front", 2),
    )
    .await;
    let (a, b) = (UserId::new(), UserId::new());

    let first = assert_ok!(engine.join_match(a, record.id, Position::Gk).await);
    assert_eq!(first.status, BookingStatus::Confirmed);

    let second = assert_ok!(engine.join_match(b, record.id, Position::Gk).await);
    assert_eq!(second.status, BookingStatus::Waitlist);
    assert_eq!(second.waitlist_order, 1);

    assert_ok!(engine.cancel_booking(first.id, a, false).await);

    let promoted = booking(&engine, second.id).await;
    assert_eq!(promoted.status, BookingStatus::Confirmed);
    assert_eq!(promoted.waitlist_order, 0);
    let cancelled = booking(&engine, first.id).await;
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.waitlist_order, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_oversell() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("player_front", 5)).await;

    let report = run_join_race(&engine, record.id, Position::PlayerFront, 10).await;

    assert_eq!(report.failed, 0, "errors: {:?}", report.errors);
    assert_eq!(report.confirmed, 5);
    assert_eq!(report.waitlisted, 5);
    assert_eq!(report.waitlist_orders, vec![1, 2, 3, 4, 5]);
    assert!(report.is_clean(Capacity::Limited(5)));

    let stored = bookings_of(&engine, record.id).await;
    assert_eq!(confirmed_at(&stored, Position::PlayerFront), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn races_respect_every_capacity() {
    for capacity in [0u32, 1, 3, 8, 20] {
        let engine = engine();
        let record = seed(&engine, PositionQuotas::new().with("defender", capacity)).await;

        let report = run_join_race(&engine, record.id, Position::Defender, 16).await;

        let expected_confirmed = usize::try_from(capacity).unwrap_or(usize::MAX).min(16);
        assert_eq!(report.confirmed, expected_confirmed, "capacity {capacity}");
        assert_eq!(report.waitlisted, 16 - expected_confirmed, "capacity {capacity}");
        assert!(report.waitlist_is_contiguous(), "capacity {capacity}: {report}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellations_racing_joins_keep_quota() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("midfielder", 3)).await;

    let mut seated = Vec::new();
    for _ in 0..6 {
        seated.push(assert_ok!(
            engine
                .join_match(UserId::new(), record.id, Position::Midfielder)
                .await
        ));
    }

    let mut handles = Vec::new();
    for b in seated.iter().filter(|b| b.status == BookingStatus::Confirmed).take(2) {
        let engine = engine.clone();
        let (id, owner) = (b.id, b.user_id);
        handles.push(tokio::spawn(async move {
            engine.cancel_booking(id, owner, false).await.map(|_| ())
        }));
    }
    for _ in 0..4 {
        let engine = engine.clone();
        let match_id = record.id;
        handles.push(tokio::spawn(async move {
            engine
                .join_match(UserId::new(), match_id, Position::Midfielder)
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        let Ok(result) = handle.await else {
            panic!("task panicked");
        };
        assert_ok!(result);
    }

    let stored = bookings_of(&engine, record.id).await;
    assert_eq!(confirmed_at(&stored, Position::Midfielder), 3);

    let mut orders: Vec<u32> = stored
        .iter()
        .filter(|b| b.status == BookingStatus::Waitlist)
        .map(|b| b.waitlist_order)
        .collect();
    let unique: HashSet<u32> = orders.iter().copied().collect();
    assert_eq!(unique.len(), orders.len(), "duplicate waitlist ranks: {orders:?}");
    orders.sort_unstable();
    assert!(orders.iter().all(|o| *o > 0));
}

#[tokio::test]
async fn second_join_by_same_user_is_rejected() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("player_front", 4)).await;
    let user = UserId::new();

    let first = assert_ok!(engine.join_match(user, record.id, Position::PlayerFront).await);
    assert_eq!(first.status, BookingStatus::Confirmed);

    let err = assert_err!(engine.join_match(user, record.id, Position::Gk).await);
    assert!(matches!(err, BookingError::AlreadyBooked { user_id, .. } if user_id == user));

    let stored = bookings_of(&engine, record.id).await;
    assert_eq!(stored.iter().filter(|b| b.user_id == user).count(), 1);
}

#[tokio::test]
async fn user_can_rejoin_after_cancelling() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("forward", 1)).await;
    let user = UserId::new();

    let first = assert_ok!(engine.join_match(user, record.id, Position::Forward).await);
    assert_ok!(engine.cancel_booking(first.id, user, false).await);
    let again = assert_ok!(engine.join_match(user, record.id, Position::Forward).await);
    assert_eq!(again.status, BookingStatus::Confirmed);
    assert_ne!(again.id, first.id);
}

#[tokio::test]
async fn teams_hold_exactly_the_paid_confirmed_players() {
    let engine = engine();
    let record = seed(
        &engine,
        PositionQuotas::new().with("gk", 2).with("player_front", 12),
    )
    .await;

    let mut paid = HashSet::new();
    let mut unpaid = HashSet::new();
    for i in 0..14 {
        let position = if i < 2 { Position::Gk } else { Position::PlayerFront };
        let b = assert_ok!(engine.join_match(UserId::new(), record.id, position).await);
        assert_eq!(b.status, BookingStatus::Confirmed);
        if i < 11 {
            assert_ok!(engine.set_paid_status(b.id, record.creator_id, true).await);
            paid.insert(b.id);
        } else {
            unpaid.insert(b.id);
        }
    }
    // A paid booking that ended up waitlisted stays off the teams too.
    let queued = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    assert_eq!(queued.status, BookingStatus::Waitlist);
    assert_ok!(engine.set_paid_status(queued.id, record.creator_id, true).await);

    let teams = assert_ok!(engine.generate_teams(record.id).await);
    let names: Vec<&str> = teams.iter().map(|t| t.team.name.as_str()).collect();
    assert_eq!(names, ["Team A", "Team B", "Team C"]);
    let colors: Vec<&str> = teams.iter().map(|t| t.team.color.as_str()).collect();
    assert_eq!(colors, ["#ef4444", "#3b82f6", "#10b981"]);

    let assigned: HashSet<BookingId> = teams
        .iter()
        .flat_map(|t| t.members.iter().map(|m| m.member.booking_id))
        .collect();
    assert_eq!(assigned, paid);
    assert!(assigned.is_disjoint(&unpaid));
    assert!(!assigned.contains(&queued.id));
    assert!(teams.iter().flat_map(|t| &t.members).all(|m| m.is_paid));

    let goalkeepers: Vec<usize> = teams.iter().map(|t| t.goalkeeper_count()).collect();
    assert_eq!(goalkeepers.iter().sum::<usize>(), 2);
    assert!(goalkeepers.iter().all(|n| *n <= 1));
}

#[tokio::test]
async fn seeded_random_gives_exact_teams() {
    const SEED: u64 = 5;
    let engine = engine_with(Arc::new(StdRandom::seeded(SEED)));
    let record = seed(&engine, PositionQuotas::new().with("gk", 3).with("player", 10)).await;

    let mut keepers = Vec::new();
    let mut outfield = Vec::new();
    for i in 0..7 {
        let position = if i < 2 { Position::Gk } else { Position::Defender };
        let b = assert_ok!(engine.join_match(UserId::new(), record.id, position).await);
        assert_ok!(engine.set_paid_status(b.id, record.creator_id, true).await);
        if position.is_goalkeeper() {
            keepers.push(b.id);
        } else {
            outfield.push(b.id);
        }
    }

    let teams = assert_ok!(engine.generate_teams(record.id).await);
    let members: Vec<HashSet<BookingId>> = teams
        .iter()
        .map(|t| t.members.iter().map(|m| m.member.booking_id).collect())
        .collect();

    // Same generator, same draw order: keepers first, then outfield, each
    // dealt so that shuffled index i lands on team i % 3.
    let mut rng = StdRng::seed_from_u64(SEED);
    keepers.shuffle(&mut rng);
    outfield.shuffle(&mut rng);
    let expected: Vec<HashSet<BookingId>> = (0..3)
        .map(|team| {
            let dealt = |ids: &[BookingId]| -> Vec<BookingId> {
                ids.iter()
                    .enumerate()
                    .filter(|(i, _)| i % 3 == team)
                    .map(|(_, id)| *id)
                    .collect()
            };
            dealt(&keepers).into_iter().chain(dealt(&outfield)).collect()
        })
        .collect();
    assert_eq!(members, expected);
}

#[tokio::test]
async fn regenerating_replaces_previous_teams() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("player", 10)).await;
    for _ in 0..4 {
        let b = assert_ok!(
            engine
                .join_match(UserId::new(), record.id, Position::Forward)
                .await
        );
        assert_ok!(engine.set_paid_status(b.id, record.creator_id, true).await);
    }

    let first = assert_ok!(engine.generate_teams(record.id).await);
    let second = assert_ok!(engine.generate_teams(record.id).await);
    let first_ids: HashSet<_> = first.iter().map(|t| t.team.id).collect();
    let current = assert_ok!(engine.get_teams(record.id).await);

    assert_eq!(current, second);
    assert!(current.iter().all(|t| !first_ids.contains(&t.team.id)));
    assert_eq!(current.iter().map(|t| t.members.len()).sum::<usize>(), 4);
}

#[tokio::test]
async fn no_eligible_players_still_clears_teams() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("player", 10)).await;
    let b = assert_ok!(
        engine
            .join_match(UserId::new(), record.id, Position::Midfielder)
            .await
    );
    assert_ok!(engine.set_paid_status(b.id, record.creator_id, true).await);
    assert_ok!(engine.generate_teams(record.id).await);

    assert_ok!(engine.set_paid_status(b.id, record.creator_id, false).await);
    let err = assert_err!(engine.generate_teams(record.id).await);
    assert!(matches!(err, BookingError::NoEligiblePlayers(_)));
    assert!(assert_ok!(engine.get_teams(record.id).await).is_empty());
}

#[tokio::test]
async fn failed_commit_leaves_no_partial_state() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("gk", 1)).await;
    let user = UserId::new();

    engine.store().fail_next_commit();
    let err = assert_err!(engine.join_match(user, record.id, Position::Gk).await);
    assert!(matches!(err, BookingError::Persistence(_)));
    assert!(bookings_of(&engine, record.id).await.is_empty());

    let retry = assert_ok!(engine.join_match(user, record.id, Position::Gk).await);
    assert_eq!(retry.status, BookingStatus::Confirmed);

    let waiting = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    engine.store().fail_next_commit();
    assert_err!(engine.cancel_booking(retry.id, user, false).await);
    assert_eq!(booking(&engine, retry.id).await.status, BookingStatus::Confirmed);
    assert_eq!(booking(&engine, waiting.id).await.waitlist_order, 1);
}

#[tokio::test]
async fn creator_moves_member_between_teams() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("player", 10)).await;
    for _ in 0..3 {
        let b = assert_ok!(
            engine
                .join_match(UserId::new(), record.id, Position::PlayerBack)
                .await
        );
        assert_ok!(engine.set_paid_status(b.id, record.creator_id, true).await);
    }
    let teams = assert_ok!(engine.generate_teams(record.id).await);
    let (Some(team_a), Some(team_c)) = (teams.first(), teams.get(2)) else {
        panic!("expected three teams");
    };
    let Some(entry) = team_a.members.first() else {
        panic!("team A is empty");
    };

    let err = assert_err!(
        engine
            .move_team_member(entry.member.id, team_c.team.id, entry.member.user_id)
            .await
    );
    assert!(matches!(err, BookingError::Unauthorized(_)));

    let other = seed(&engine, PositionQuotas::new().with("player", 10)).await;
    let b = assert_ok!(engine.join_match(UserId::new(), other.id, Position::Gk).await);
    assert_ok!(engine.set_paid_status(b.id, other.creator_id, true).await);
    let foreign = assert_ok!(engine.generate_teams(other.id).await);
    let Some(foreign_team) = foreign.first() else {
        panic!("expected foreign teams");
    };
    let err = assert_err!(
        engine
            .move_team_member(entry.member.id, foreign_team.team.id, record.creator_id)
            .await
    );
    assert!(matches!(err, BookingError::InvalidRequest(_)));

    let moved = assert_ok!(
        engine
            .move_team_member(entry.member.id, team_c.team.id, record.creator_id)
            .await
    );
    assert_eq!(moved.team_id, team_c.team.id);

    let after = assert_ok!(engine.get_teams(record.id).await);
    let sizes: Vec<usize> = after.iter().map(|t| t.members.len()).collect();
    assert_eq!(sizes, vec![0, 1, 2]);
}

#[tokio::test]
async fn committed_transitions_are_published() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let record = seed(&engine, PositionQuotas::new().with("gk", 1)).await;

    let first = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    assert_ok!(engine.cancel_booking_as(first.id, record.creator_id).await);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.match_id(), record.id);
        kinds.push(event.event_type_str());
    }
    assert_eq!(
        kinds,
        [
            "booking_created",
            "booking_created",
            "booking_cancelled",
            "booking_promoted"
        ]
    );

    engine.store().fail_next_commit();
    assert_err!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn match_subscriber_sees_only_its_match() {
    let engine = engine();
    let record = seed(&engine, PositionQuotas::new().with("gk", 1)).await;
    let other = seed(&engine, PositionQuotas::new().with("gk", 1)).await;
    let mut sub = engine.subscribe_match(record.id);

    let holder = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    assert_ok!(engine.join_match(UserId::new(), other.id, Position::Gk).await);
    let waiting = assert_ok!(engine.join_match(UserId::new(), record.id, Position::Gk).await);
    let outcome = assert_ok!(engine.cancel_booking_as(holder.id, record.creator_id).await);
    assert_eq!(outcome.promoted.map(|b| b.id), Some(waiting.id));

    let mut kinds = Vec::new();
    for _ in 0..4 {
        let Some(event) = sub.recv().await else {
            panic!("subscription closed early");
        };
        assert_eq!(event.match_id(), record.id);
        kinds.push(event.event_type_str());
    }
    assert_eq!(
        kinds,
        [
            "booking_created",
            "booking_created",
            "booking_cancelled",
            "booking_promoted"
        ]
    );
}
