//! Naive load-balancing policies that move a robot between pre-existing partitions.
//!
//! Unlike the [rendezvous](crate::rendezvous) protocol, these policies never schedule meetings or write
//! to the replicated stores. A robot running one of them patrols a single partition at a time and, once
//! per tick, asks its [`Redistributor`] whether it should switch to another one. They exist as baselines
//! to compare the rendezvous-based coordination against.
//!
//! Neighbouring partitions are the ones that share a meeting point of the [`MeetingPlan`].

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    graph::TravelTimeEstimator,
    networking::messages::Hello,
    scheduler::MeetingPlan,
    types::basic::{PartitionId, RobotId, Tick, VertexId},
};

/// Which rule a [`Redistributor`] applies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RedistributionPolicy {
    /// Keep a switch probability per neighbouring partition that grows by `step` every time an exchange
    /// with it fails, and drops back to zero when one succeeds.
    CommunicationDriven { step: f64 },

    /// Switch to the nearest partition with probability `1 / distance`.
    DistanceWeighted,

    /// Every `interval` ticks, switch to a uniformly random other partition.
    PeriodicRandom { interval: u64 },
}

/// What [`Redistributor::decide`] looks at.
pub struct RedistributionContext<'a> {
    pub now: Tick,

    /// The partition the robot currently patrols.
    pub current: PartitionId,

    pub plan: &'a MeetingPlan,
    pub estimator: &'a dyn TravelTimeEstimator,

    /// Whether the patrol algorithm has seen every vertex of the current partition.
    pub seen_all: bool,
}

pub struct Redistributor {
    policy: RedistributionPolicy,
    rng: StdRng,
    switch_probabilities: BTreeMap<PartitionId, f64>,

    /// Nearest other partition and its distance, per partition.
    nearest: BTreeMap<PartitionId, Option<(PartitionId, u64)>>,
}

impl Redistributor {
    pub fn new(policy: RedistributionPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
            switch_probabilities: BTreeMap::new(),
            nearest: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> RedistributionPolicy {
        self.policy
    }

    /// The current switch probability towards `partition`.
    pub fn switch_probability(&self, partition: &PartitionId) -> f64 {
        self.switch_probabilities
            .get(partition)
            .copied()
            .unwrap_or(0.0)
    }

    /// Record the outcome of an attempted exchange with the robot of `neighbour`. Only
    /// [`CommunicationDriven`](RedistributionPolicy::CommunicationDriven) uses it.
    pub fn record_exchange(&mut self, neighbour: PartitionId, success: bool) {
        let RedistributionPolicy::CommunicationDriven { step } = self.policy else {
            return;
        };
        let probability = self.switch_probabilities.entry(neighbour).or_insert(0.0);
        if success {
            *probability = 0.0;
        } else {
            *probability = (*probability + step).min(1.0);
        }
    }

    /// The partition to switch to this tick, if any.
    pub fn decide(&mut self, ctx: &RedistributionContext) -> Option<PartitionId> {
        match self.policy {
            RedistributionPolicy::CommunicationDriven { .. } => {
                if !ctx.seen_all {
                    return None;
                }
                for neighbour in neighbours(ctx.plan, ctx.current) {
                    let probability = self.switch_probability(&neighbour);
                    if probability > 0.0 && self.rng.gen::<f64>() < probability {
                        self.switch_probabilities.insert(neighbour, 0.0);
                        return Some(neighbour);
                    }
                }
                None
            }
            RedistributionPolicy::DistanceWeighted => {
                if !ctx.seen_all {
                    return None;
                }
                let (nearest, distance) = *self
                    .nearest
                    .entry(ctx.current)
                    .or_insert_with(|| nearest_partition(ctx.plan, ctx.estimator, ctx.current))
                    .as_ref()?;
                self.rng
                    .gen_bool(1.0 / distance.max(1) as f64)
                    .then_some(nearest)
            }
            RedistributionPolicy::PeriodicRandom { interval } => {
                let now = ctx.now.int();
                if interval == 0 || now == 0 || now % interval != 0 {
                    return None;
                }
                let others: Vec<PartitionId> = ctx
                    .plan
                    .territories()
                    .keys()
                    .copied()
                    .filter(|partition| *partition != ctx.current)
                    .collect();
                others.choose(&mut self.rng).copied()
            }
        }
    }
}

/// Partitions that share a meeting point with `partition`.
pub fn neighbours(plan: &MeetingPlan, partition: PartitionId) -> BTreeSet<PartitionId> {
    plan.points_of(&[partition].into_iter().collect())
        .iter()
        .filter_map(|point| plan.point(point))
        .flat_map(|point| point.territories.iter().copied())
        .filter(|other| *other != partition)
        .collect()
}

/// Whether any of this tick's `hellos` came from a robot that stood at `at` when it broadcast, which is
/// what counts as a successful exchange at a partition boundary.
pub(crate) fn met_at(hellos: &[(RobotId, Hello)], at: VertexId) -> bool {
    hellos.iter().any(|(_, hello)| hello.start == at)
}

/// The other partition with the smallest travel time from `partition`, ties broken by id.
///
/// Stitching makes neighbouring territories share their meeting vertex, so distances are measured
/// between the vertices each territory does not share with the other. Territories with nothing of their
/// own left count as one tick apart, as does any pair of adjacent vertices.
fn nearest_partition(
    plan: &MeetingPlan,
    estimator: &dyn TravelTimeEstimator,
    partition: PartitionId,
) -> Option<(PartitionId, u64)> {
    let own = plan.territory(&partition)?;
    plan.territories()
        .values()
        .filter(|other| other.id != partition)
        .filter_map(|other| {
            let mine: Vec<VertexId> = own.vertices.difference(&other.vertices).copied().collect();
            let theirs: Vec<VertexId> = other.vertices.difference(&own.vertices).copied().collect();
            if mine.is_empty() || theirs.is_empty() {
                return Some((other.id, 1));
            }
            mine.iter()
                .flat_map(|a| theirs.iter().map(move |b| (*a, *b)))
                .filter_map(|(a, b)| estimator.estimate(a, b))
                .min()
                .map(|distance| (other.id, distance.max(1)))
        })
        .min_by_key(|(id, distance)| (*distance, *id))
}
