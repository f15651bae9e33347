/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Offline construction of the meeting plan, and the occurrence arithmetic used at run time.
//!
//! Like [partitioning](crate::partition), the plan is a pure function of inputs every robot knows, so
//! every robot builds the same plan locally. Building it takes five steps:
//! 1. **Adjacency**: two territories are adjacent if they share a vertex or a graph edge crosses from one
//!    to the other.
//! 2. **Meeting vertices**: each adjacent pair gets one meeting point. If the pair shares vertices, the
//!    smallest shared vertex is used. Otherwise the pair is *stitched*: the endpoint (in the larger
//!    territory) of the cheapest crossing edge is added to the smaller territory and used as the meeting
//!    vertex.
//! 3. **Interval**: every territory asks the [`IntervalEstimator`] how often it needs to meet; the global
//!    interval is the maximum answer (and at least 1).
//! 4. **Colouring**: meeting points that share a robot conflict, since one robot cannot be at two places
//!    at once. A [Welsh–Powell colouring](colouring::welsh_powell) separates them.
//! 5. **Schedules**: a point of colour `c` fires at `start_delay + c * interval + k * interval * colours`,
//!    where `start_delay` gives every robot time to reach the territories of the point from its start
//!    position.
//!
//! A plan for a single territory has nobody to meet. It gets one synthetic meeting point that
//! [never](MeetingSchedule::Never) fires, so that downstream code never has to special-case it.

pub mod colouring;
pub mod estimators;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    graph::{PatrolGraph, TravelTimeEstimator},
    types::{
        basic::{MeetingPointId, PartitionId, RobotId, Tick, VertexId},
        meeting::{MeetingPoint, MeetingRecord, MeetingSchedule},
        territory::Territory,
    },
};

pub use estimators::{DiameterIntervalEstimator, FixedIntervalEstimator, IntervalEstimator};

/// Territories (with their meeting points filled in) plus the meeting points and their schedules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeetingPlan {
    territories: BTreeMap<PartitionId, Territory>,
    points: BTreeMap<MeetingPointId, MeetingPoint>,
    global_interval: u64,
    colours: u32,
}

impl MeetingPlan {
    /// Build the plan for `territories`.
    ///
    /// `start_positions` are the vertices the robots start at. Robots missing from it do not delay the
    /// first occurrences.
    pub fn build(
        mut territories: BTreeMap<PartitionId, Territory>,
        graph: &PatrolGraph,
        estimator: &dyn TravelTimeEstimator,
        interval_estimator: &dyn IntervalEstimator,
        start_positions: &BTreeMap<RobotId, VertexId>,
    ) -> MeetingPlan {
        if territories.len() == 1 {
            return Self::solo(territories, interval_estimator);
        }

        // Meeting vertices.
        let pairs = adjacent_pairs(&territories, graph);
        let mut points = BTreeMap::new();
        for (index, (a, b)) in pairs.into_iter().enumerate() {
            let Some(vertex) = meeting_vertex(&mut territories, graph, a, b) else {
                continue;
            };
            let id = MeetingPointId::new(index as u32);
            let mut attendees = BTreeSet::new();
            for partition in [a, b] {
                if let Some(territory) = territories.get_mut(&partition) {
                    territory.meeting_points.insert(id);
                    attendees.insert(territory.initial_owner);
                }
            }
            points.insert(
                id,
                MeetingPoint {
                    id,
                    vertex,
                    territories: [a, b].into_iter().collect(),
                    initial_attendees: attendees,
                    colour: 0,
                    schedule: MeetingSchedule::Never,
                },
            );
        }

        // Interval.
        let global_interval = territories
            .values()
            .filter(|territory| !territory.meeting_points.is_empty())
            .map(|territory| interval_estimator.estimate(territory))
            .max()
            .unwrap_or(1)
            .max(1);

        // Colouring.
        let ids: BTreeSet<MeetingPointId> = points.keys().copied().collect();
        let mut conflicts: BTreeMap<MeetingPointId, BTreeSet<MeetingPointId>> = BTreeMap::new();
        for (id, point) in &points {
            for (other_id, other) in &points {
                if id != other_id
                    && !point
                        .initial_attendees
                        .is_disjoint(&other.initial_attendees)
                {
                    conflicts.entry(*id).or_default().insert(*other_id);
                }
            }
        }
        let colouring = colouring::welsh_powell(&ids, &conflicts);
        let colours = colouring::colour_count(&colouring);

        // Schedules.
        let cycle = global_interval.saturating_mul(colours as u64);
        for point in points.values_mut() {
            point.colour = colouring.get(&point.id).copied().unwrap_or(0);
            let start_delay = point
                .territories
                .iter()
                .filter_map(|partition| territories.get(partition))
                .map(|territory| time_to_reach(territory, start_positions, estimator))
                .max()
                .unwrap_or(0);
            point.schedule = MeetingSchedule::Periodic {
                start_delay,
                phase_offset: (point.colour as u64).saturating_mul(global_interval),
                cycle,
            };
        }

        MeetingPlan {
            territories,
            points,
            global_interval,
            colours,
        }
    }

    fn solo(
        mut territories: BTreeMap<PartitionId, Territory>,
        interval_estimator: &dyn IntervalEstimator,
    ) -> MeetingPlan {
        let id = MeetingPointId::new(0);
        let mut points = BTreeMap::new();
        let mut global_interval = 1;
        if let Some(territory) = territories.values_mut().next() {
            if let Some(vertex) = territory.vertices.first().copied() {
                territory.meeting_points.insert(id);
                points.insert(
                    id,
                    MeetingPoint {
                        id,
                        vertex,
                        territories: [territory.id].into_iter().collect(),
                        initial_attendees: [territory.initial_owner].into_iter().collect(),
                        colour: 0,
                        schedule: MeetingSchedule::Never,
                    },
                );
            }
            global_interval = interval_estimator.estimate(territory).max(1);
        }
        MeetingPlan {
            territories,
            points,
            global_interval,
            colours: 1,
        }
    }

    pub fn territories(&self) -> &BTreeMap<PartitionId, Territory> {
        &self.territories
    }

    pub fn territory(&self, partition: &PartitionId) -> Option<&Territory> {
        self.territories.get(partition)
    }

    pub fn points(&self) -> &BTreeMap<MeetingPointId, MeetingPoint> {
        &self.points
    }

    pub fn point(&self, id: &MeetingPointId) -> Option<&MeetingPoint> {
        self.points.get(id)
    }

    pub fn global_interval(&self) -> u64 {
        self.global_interval
    }

    pub fn colours(&self) -> u32 {
        self.colours
    }

    /// Ticks between two occurrences of the same meeting point.
    pub fn cycle(&self) -> u64 {
        self.global_interval.saturating_mul(self.colours as u64)
    }

    /// The meeting points any of `partitions` participates in.
    pub fn points_of(&self, partitions: &BTreeSet<PartitionId>) -> BTreeSet<MeetingPointId> {
        partitions
            .iter()
            .filter_map(|partition| self.territories.get(partition))
            .flat_map(|territory| territory.meeting_points.iter().copied())
            .collect()
    }

    /// The records every robot seeds its meeting store with.
    pub fn initial_records(&self) -> impl Iterator<Item = (MeetingPointId, MeetingRecord)> + '_ {
        self.points
            .values()
            .map(|point| (point.id, point.initial_record()))
    }

    /// The first occurrence of `point` strictly after `tick`, or [`Tick::NEVER`] if the point is unknown
    /// or never fires.
    pub fn next_occurrence_after(&self, point: &MeetingPointId, tick: Tick) -> Tick {
        self.points
            .get(point)
            .map_or(Tick::NEVER, |point| point.schedule.first_after(tick))
    }

    /// The record after the occurrence at `record.current_next` has been held: the former next-next
    /// occurrence becomes the next one.
    pub fn held_meeting(&self, point: &MeetingPointId, record: &MeetingRecord) -> MeetingRecord {
        let current_next = if record.next_next > record.current_next {
            record.next_next
        } else {
            self.next_occurrence_after(point, record.current_next)
        };
        MeetingRecord {
            current_next,
            next_next: self.next_occurrence_after(point, current_next),
            might_miss_current_next: false,
            attendees: record.attendees.clone(),
        }
    }

    /// Advance `record` past every occurrence that lies before `now`. `current_next` strictly increases
    /// on every step until it reaches `now` or [`Tick::NEVER`], so this always terminates.
    pub fn next_meeting(
        &self,
        point: &MeetingPointId,
        record: &MeetingRecord,
        now: Tick,
    ) -> MeetingRecord {
        let mut record = record.clone();
        while record.current_next < now {
            record = self.held_meeting(point, &record);
        }
        record
    }
}

/// Every unordered pair of distinct territories that share a vertex or are joined by an edge.
fn adjacent_pairs(
    territories: &BTreeMap<PartitionId, Territory>,
    graph: &PatrolGraph,
) -> BTreeSet<(PartitionId, PartitionId)> {
    let mut containing: BTreeMap<VertexId, BTreeSet<PartitionId>> = BTreeMap::new();
    for territory in territories.values() {
        for vertex in &territory.vertices {
            containing.entry(*vertex).or_default().insert(territory.id);
        }
    }

    let mut pairs = BTreeSet::new();
    let mut connect = |left: &BTreeSet<PartitionId>, right: &BTreeSet<PartitionId>| {
        for a in left {
            for b in right {
                if a != b {
                    pairs.insert((*a.min(b), *a.max(b)));
                }
            }
        }
    };
    let none = BTreeSet::new();
    for members in containing.values() {
        connect(members, members);
    }
    for (u, v, _) in graph.edges() {
        connect(
            containing.get(&u).unwrap_or(&none),
            containing.get(&v).unwrap_or(&none),
        );
    }
    pairs
}

/// Pick (stitching if needed) the meeting vertex for the adjacent pair `(a, b)`.
fn meeting_vertex(
    territories: &mut BTreeMap<PartitionId, Territory>,
    graph: &PatrolGraph,
    a: PartitionId,
    b: PartitionId,
) -> Option<VertexId> {
    let (left, right) = (territories.get(&a)?, territories.get(&b)?);
    if let Some(shared) = left.vertices.intersection(&right.vertices).next() {
        return Some(*shared);
    }

    // Orient the pair so that `smaller` receives the stitched vertex.
    let (smaller, larger) = if (left.len(), left.id) <= (right.len(), right.id) {
        (left, right)
    } else {
        (right, left)
    };
    let (_, _, _, stitched) = graph
        .edges()
        .filter_map(|(u, v, cost)| {
            if smaller.contains(&u) && larger.contains(&v) {
                Some((cost, u, v, v))
            } else if smaller.contains(&v) && larger.contains(&u) {
                Some((cost, u, v, u))
            } else {
                None
            }
        })
        .min()?;

    let receiver = smaller.id;
    territories.get_mut(&receiver)?.vertices.insert(stitched);
    Some(stitched)
}

/// How long the slowest of the closest robots needs to reach any vertex of `territory`: the minimum,
/// over all robot start positions, of the distance to the nearest vertex of the territory.
fn time_to_reach(
    territory: &Territory,
    start_positions: &BTreeMap<RobotId, VertexId>,
    estimator: &dyn TravelTimeEstimator,
) -> u64 {
    start_positions
        .values()
        .filter_map(|start| {
            territory
                .vertices
                .iter()
                .filter_map(|vertex| estimator.estimate(*start, *vertex))
                .min()
        })
        .min()
        .unwrap_or(0)
}
