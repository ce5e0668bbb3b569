//! Team generation from confirmed and paid bookings.

use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::domain::{
    Booking, BookingEvent, EventBus, MatchId, RandomSource, Team, TeamId, TeamMember,
    TeamMemberId, TeamRoster, UserId,
};
use crate::error::{BookingError, Result, denied};
use crate::persistence::{BookingStore, StoreTransaction, run_in_transaction};

/// Splits a match's eligible players into the three palette teams.
///
/// Goalkeepers and outfield players are shuffled separately with the
/// injected [`RandomSource`] and dealt round robin by two independent
/// counters, so each team gets a fair share of both.
#[derive(Debug)]
pub struct TeamAssigner<S> {
    store: Arc<S>,
    random: Arc<dyn RandomSource>,
    event_bus: EventBus,
}

impl<S> Clone for TeamAssigner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            random: Arc::clone(&self.random),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<S: BookingStore> TeamAssigner<S> {
    /// Creates a new `TeamAssigner` drawing shuffles from `random`.
    #[must_use]
    pub fn new(store: Arc<S>, random: Arc<dyn RandomSource>, event_bus: EventBus) -> Self {
        Self {
            store,
            random,
            event_bus,
        }
    }

    /// Replaces the teams of `match_id` with a freshly generated set.
    ///
    /// Existing teams are always removed, even when no new ones can be
    /// built.
    ///
    /// # Errors
    ///
    /// - [`BookingError::MatchNotFound`] if the match does not exist.
    /// - [`BookingError::NoEligiblePlayers`] if no booking is both
    ///   confirmed and paid; the previous teams are gone all the same.
    /// - [`BookingError::Persistence`] on store failure (nothing written).
    pub async fn generate_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        let random = Arc::clone(&self.random);
        let rosters = run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.get_match(match_id).await?;
                let cleared = tx.delete_teams_and_members(match_id).await?;
                tracing::debug!(%match_id, cleared, "previous teams removed");

                let (mut goalkeepers, mut outfield): (Vec<Booking>, Vec<Booking>) = tx
                    .list_bookings(match_id)
                    .await?
                    .into_iter()
                    .filter(Booking::is_team_eligible)
                    .partition(|b| b.position.is_goalkeeper());
                if goalkeepers.is_empty() && outfield.is_empty() {
                    // Commit the clearing, report after.
                    return Ok(None);
                }

                random.with_rng(&mut |rng| {
                    goalkeepers.shuffle(rng);
                    outfield.shuffle(rng);
                });

                let teams: Vec<Team> = (0..=u8::MAX)
                    .map_while(|slot| Team::from_palette(match_id, slot))
                    .collect();
                for team in &teams {
                    tx.create_team(team).await?;
                }
                for member in deal(&goalkeepers, &teams)
                    .into_iter()
                    .chain(deal(&outfield, &teams))
                {
                    tx.create_team_member(&member).await?;
                }

                tx.list_teams(match_id).await.map(Some)
            })
        })
        .await?;

        let Some(rosters) = rosters else {
            tracing::info!(%match_id, "no eligible players, teams cleared");
            return Err(BookingError::NoEligiblePlayers(match_id));
        };

        let member_count = rosters.iter().map(|r| r.members.len()).sum();
        tracing::info!(%match_id, team_count = rosters.len(), member_count, "teams generated");
        let _ = self.event_bus.publish(BookingEvent::TeamsGenerated {
            match_id,
            team_count: rosters.len(),
            member_count,
            timestamp: Utc::now(),
        });
        Ok(rosters)
    }

    /// Current teams of `match_id`, in palette order. Empty if none were
    /// generated.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] on store failure.
    pub async fn get_teams(&self, match_id: MatchId) -> Result<Vec<TeamRoster>> {
        self.store.list_teams(match_id).await
    }

    /// Moves a generated team member onto another team of the same match.
    /// Only the match creator may do this.
    ///
    /// # Errors
    ///
    /// - [`BookingError::TeamMemberNotFound`] / [`BookingError::TeamNotFound`]
    ///   for unknown ids.
    /// - [`BookingError::Unauthorized`] if the requester did not create
    ///   the match.
    /// - [`BookingError::InvalidRequest`] if the target team belongs to a
    ///   different match.
    pub async fn move_team_member(
        &self,
        member_id: TeamMemberId,
        target_team_id: TeamId,
        requester_id: UserId,
    ) -> Result<TeamMember> {
        let (member, from_team, match_id) =
            run_in_transaction(self.store.as_ref(), move |tx| {
                Box::pin(async move {
                    let mut member = tx.get_team_member(member_id).await?;
                    let current = tx.get_team(member.team_id).await?;
                    let target = tx.get_team(target_team_id).await?;
                    let record = tx.get_match(current.match_id).await?;

                    if !record.is_administered_by(requester_id) {
                        tracing::warn!(%member_id, %requester_id, "team move denied");
                        return Err(denied(requester_id, "move team member", *member_id.as_uuid()));
                    }
                    if target.match_id != current.match_id {
                        return Err(BookingError::InvalidRequest(format!(
                            "team {target_team_id} does not belong to match {}",
                            current.match_id
                        )));
                    }

                    if member.team_id != target.id {
                        tx.move_team_member(member_id, target.id).await?;
                        member.team_id = target.id;
                    }
                    Ok((member, current.id, current.match_id))
                })
            })
            .await?;

        tracing::info!(%member_id, from = %from_team, to = %target_team_id, "team member moved");
        let _ = self.event_bus.publish(BookingEvent::TeamMemberMoved {
            match_id,
            member_id,
            from_team,
            to_team: target_team_id,
            timestamp: Utc::now(),
        });
        Ok(member)
    }
}

/// Deals `players` onto `teams` round robin: player `i` joins team
/// `i mod teams.len()`.
fn deal(players: &[Booking], teams: &[Team]) -> Vec<TeamMember> {
    players
        .iter()
        .zip(teams.iter().cycle())
        .map(|(booking, team)| TeamMember::new(team.id, booking.user_id, booking.id))
        .collect()
}
