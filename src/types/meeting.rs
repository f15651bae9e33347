/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Meeting points, their schedules, and the transient meetings robots reason about.
//!
//! There are three related types in this module:
//! 1. [`MeetingPoint`]: a static waypoint plus the robots that must rendezvous there and the recurring
//!    [`MeetingSchedule`] it follows. Created once by the [scheduler](crate::scheduler).
//! 2. [`MeetingRecord`]: the replicated, mutable part of a meeting point: the next two meeting ticks, the
//!    "might miss current next" flag, and the current attendee list. Stored in the replicated store.
//! 3. [`Meeting`]: one concrete occurrence of a meeting point (vertex, tick, expected attendees), the unit
//!    that the [rendezvous state machine](crate::rendezvous) works with.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};

use super::basic::{MeetingPointId, PartitionId, RobotId, Tick, VertexId};

/// When the occurrences of a meeting point happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeetingSchedule {
    /// The k-th occurrence happens at `start_delay + phase_offset + k * cycle`.
    Periodic {
        start_delay: u64,
        phase_offset: u64,
        cycle: u64,
    },

    /// The meeting point never fires. Used for the synthetic meeting point of a single-robot plan.
    Never,
}

impl MeetingSchedule {
    /// Tick of the `k`-th occurrence (counting from 0).
    pub fn occurrence(&self, k: u64) -> Tick {
        match self {
            MeetingSchedule::Periodic {
                start_delay,
                phase_offset,
                cycle,
            } => Tick::new(
                start_delay
                    .saturating_add(*phase_offset)
                    .saturating_add(k.saturating_mul(*cycle)),
            ),
            MeetingSchedule::Never => Tick::NEVER,
        }
    }

    /// The first occurrence strictly later than `tick`.
    pub fn first_after(&self, tick: Tick) -> Tick {
        match self {
            MeetingSchedule::Periodic { cycle, .. } => {
                let base = self.occurrence(0);
                if tick < base {
                    return base;
                }
                let cycle = (*cycle).max(1);
                let k = tick.ticks_since(base) / cycle + 1;
                self.occurrence(k)
            }
            MeetingSchedule::Never => Tick::NEVER,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, MeetingSchedule::Never)
    }
}

/// A fixed waypoint where a fixed set of robots rendezvous on a recurring schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeetingPoint {
    pub id: MeetingPointId,
    pub vertex: VertexId,

    /// The territories whose owners meet here.
    pub territories: BTreeSet<PartitionId>,

    /// The robots expected at the first occurrence. Later occurrences use the attendee list of the
    /// point's [`MeetingRecord`].
    pub initial_attendees: BTreeSet<RobotId>,

    /// Colour assigned by the Welsh–Powell colouring of the meeting point conflict graph.
    pub colour: u32,

    pub schedule: MeetingSchedule,
}

impl MeetingPoint {
    /// The record every robot seeds its meeting store with before the first occurrence.
    pub fn initial_record(&self) -> MeetingRecord {
        let current_next = self.schedule.first_after(Tick::init());
        MeetingRecord {
            current_next,
            next_next: self.schedule.first_after(current_next),
            might_miss_current_next: false,
            attendees: self.initial_attendees.clone(),
        }
    }
}

/// The replicated, mutable state of a meeting point.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MeetingRecord {
    pub current_next: Tick,
    pub next_next: Tick,

    /// Set when a robot has just taken over a territory adjacent to this point and may not reach
    /// `current_next` in time. A missing robot at that occurrence is tolerated instead of being treated
    /// as a failure.
    pub might_miss_current_next: bool,

    pub attendees: BTreeSet<RobotId>,
}

impl MeetingRecord {
    /// Whether nobody but `me` is expected here, so there is no one to meet.
    pub fn is_solo(&self, me: RobotId) -> bool {
        self.attendees.iter().all(|attendee| *attendee == me)
    }
}

/// One concrete occurrence of a [`MeetingPoint`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Meeting {
    pub point: MeetingPointId,
    pub vertex: VertexId,
    pub tick: Tick,
    pub attendees: BTreeSet<RobotId>,
}

impl Meeting {
    /// Whether `other` denotes the same occurrence: same point, vertex, and tick. The attendee sets may
    /// legitimately differ between robots right after a takeover.
    pub fn same_occurrence(&self, other: &Meeting) -> bool {
        self.point == other.point && self.vertex == other.vertex && self.tick == other.tick
    }
}
