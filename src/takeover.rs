/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic, negotiation-free election of the robot that absorbs a missing robot's territory.
//!
//! When a meeting resolves with one expected robot missing, every attendee independently runs
//! [`on_missing_robot_at_meeting`] on the same sorted lists of present and missing robots, and
//! therefore elects the same winner without another round of messages. Only the winner
//! [absorbs](absorb) the territory; the other attendees learn about the new owner through the
//! replicated ownership store.
//!
//! Three strategies are available:
//! - [`Immediate`](TakeoverStrategy::Immediate): the i-th present robot takes over the i-th missing
//!   robot. Only `min(|present|, |missing|)` robots are ever replaced; any remainder waits for the next
//!   occurrence.
//! - [`QuasiRandom`](TakeoverStrategy::QuasiRandom): like `Immediate`, but the designated robot only
//!   takes over if a coin seeded from the run seed, its id, and the tick comes up heads. Every attendee
//!   can flip the same coin, so they still agree.
//! - [`BestNeighborCount`](TakeoverStrategy::BestNeighborCount): the present robot with the fewest
//!   adjacent meeting points wins (ties to the lowest id), and skips meeting points it would be left
//!   alone at.

use std::collections::BTreeSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    graph::TravelTimeEstimator,
    partition::{territories_owned_by, OwnershipStore},
    patrol::PatrolAlgorithm,
    rendezvous::{MeetingStore, RendezvousError},
    scheduler::MeetingPlan,
    types::{
        basic::{MeetingPointId, PartitionId, RobotId, Tick, VertexId},
        meeting::{Meeting, MeetingRecord},
    },
};

/// How the robot that absorbs a missing robot's territory is elected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TakeoverStrategy {
    Immediate,
    QuasiRandom { probability: f64 },
    BestNeighborCount,
}

/// One elected replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Takeover {
    pub winner: RobotId,
    pub missing: RobotId,

    /// Meeting points the winner should stop attending.
    pub skip: BTreeSet<MeetingPointId>,
}

/// The shared knowledge every attendee elects from.
pub struct TakeoverContext<'a> {
    pub seed: u64,
    pub tick: Tick,
    pub plan: &'a MeetingPlan,
    pub ownership: &'a OwnershipStore,
}

/// Elect a replacement for (some of) the `missing` robots of `meeting` among the `present` ones.
pub fn on_missing_robot_at_meeting(
    strategy: TakeoverStrategy,
    meeting: &Meeting,
    missing: &BTreeSet<RobotId>,
    present: &BTreeSet<RobotId>,
    ctx: &TakeoverContext,
) -> Result<Vec<Takeover>, RendezvousError> {
    let takeovers: Vec<Takeover> = match strategy {
        TakeoverStrategy::Immediate => ranked(missing, present).collect(),
        TakeoverStrategy::QuasiRandom { probability } => ranked(missing, present)
            .filter(|takeover| coin(ctx.seed, takeover.winner, ctx.tick, probability))
            .collect(),
        TakeoverStrategy::BestNeighborCount => {
            let load = |robot: &RobotId| {
                ctx.plan
                    .points_of(&territories_owned_by(ctx.ownership, *robot))
                    .len()
            };
            missing
                .iter()
                .filter_map(|absent| {
                    let winner = *present.iter().min_by_key(|robot| (load(robot), **robot))?;
                    Some(Takeover {
                        winner,
                        missing: *absent,
                        skip: exclusive_points(ctx, winner, *absent),
                    })
                })
                .collect()
        }
    };

    if let Some(stray) = takeovers
        .iter()
        .find(|takeover| !present.contains(&takeover.winner))
    {
        return Err(RendezvousError::TakeoverTargetNotPresent {
            point: meeting.point,
            winner: stray.winner,
        });
    }
    Ok(takeovers)
}

/// Pair the i-th present robot with the i-th missing robot, both in ascending id order.
fn ranked<'a>(
    missing: &'a BTreeSet<RobotId>,
    present: &'a BTreeSet<RobotId>,
) -> impl Iterator<Item = Takeover> + 'a {
    present.iter().zip(missing.iter()).map(|(winner, absent)| Takeover {
        winner: *winner,
        missing: *absent,
        skip: BTreeSet::new(),
    })
}

/// A coin every robot can flip identically for `robot` at `tick`.
fn coin(seed: u64, robot: RobotId, tick: Tick, probability: f64) -> bool {
    if !(probability > 0.0) {
        return false;
    }
    if probability >= 1.0 {
        return true;
    }
    let mut rng = StdRng::seed_from_u64(seed ^ (u64::from(robot.int()) << 32) ^ tick.int());
    rng.gen_bool(probability)
}

/// Meeting points that only join territories the winner will own once it absorbed `absent`.
fn exclusive_points(
    ctx: &TakeoverContext,
    winner: RobotId,
    absent: RobotId,
) -> BTreeSet<MeetingPointId> {
    let mut owned = territories_owned_by(ctx.ownership, winner);
    owned.extend(territories_owned_by(ctx.ownership, absent));
    ctx.plan
        .points_of(&owned)
        .into_iter()
        .filter(|point| {
            ctx.plan
                .point(point)
                .is_some_and(|point| point.territories.is_subset(&owned))
        })
        .collect()
}

/// Replace every elected missing robot by its winner in a meeting point's attendee list.
pub fn reassign_attendees(record: &mut MeetingRecord, takeovers: &[Takeover]) {
    for takeover in takeovers {
        if record.attendees.remove(&takeover.missing) {
            record.attendees.insert(takeover.winner);
        }
    }
}

/// Apply `takeover` on the winning robot: write itself as the owner of every territory the missing robot
/// owned, reset the patrol algorithm's seen-tracking for the absorbed vertices, and move the missing
/// robot's place at every other affected meeting point to itself. Returns the absorbed territories.
///
/// The record of `meeting` itself is left alone; every attendee updates it when the meeting resolves.
#[allow(clippy::too_many_arguments)]
pub fn absorb(
    takeover: &Takeover,
    meeting: &Meeting,
    plan: &MeetingPlan,
    ownership: &mut OwnershipStore,
    meetings: &mut MeetingStore,
    patrol: &mut dyn PatrolAlgorithm,
    estimator: &dyn TravelTimeEstimator,
    at: VertexId,
    now: Tick,
) -> BTreeSet<PartitionId> {
    let absorbed = territories_owned_by(ownership, takeover.missing);
    let mut vertices = BTreeSet::new();
    for partition in &absorbed {
        ownership.put(*partition, takeover.winner);
        if let Some(territory) = plan.territory(partition) {
            vertices.extend(territory.vertices.iter().copied());
        }
    }
    patrol.reset_seen(&vertices);

    for point in plan.points_of(&absorbed) {
        if point == meeting.point {
            continue;
        }
        let Some(record) = meetings.try_get_non_sending(&point) else {
            continue;
        };
        let mut record = plan.next_meeting(&point, record, now);
        reassign_attendees(&mut record, std::slice::from_ref(takeover));

        // The winner may be too far away for the very next occurrence.
        let in_time = plan
            .point(&point)
            .and_then(|point| estimator.estimate(at, point.vertex))
            .is_some_and(|travel| now + travel <= record.current_next);
        record.might_miss_current_next = !in_time;
        meetings.put(point, record);
    }

    log::debug!(
        "{} absorbed {:?} from {} (tick {})",
        takeover.winner,
        absorbed,
        takeover.missing,
        now
    );
    absorbed
}
