//! The [`Territory`] type: the set of waypoints a single robot is responsible for patrolling.

use std::collections::BTreeSet;

use super::basic::{MeetingPointId, PartitionId, RobotId, VertexId};

/// A partition of the patrol graph.
///
/// Territories are generated once, at start-up, and are never regenerated. The robot that *currently* owns
/// a territory is not stored here but in the replicated ownership store, keyed by [`Territory::id`], so
/// that ownership changes caused by a takeover are globally observable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Territory {
    pub id: PartitionId,

    /// The robot the territory was generated for.
    pub initial_owner: RobotId,

    pub vertices: BTreeSet<VertexId>,

    /// Meeting points this territory participates in. Filled in by the
    /// [scheduler](crate::scheduler) when it builds the meeting plan.
    pub meeting_points: BTreeSet<MeetingPointId>,

    /// Maximum estimated travel time between any two vertices of the territory.
    pub diameter: u64,
}

impl Territory {
    pub fn new(
        id: PartitionId,
        initial_owner: RobotId,
        vertices: BTreeSet<VertexId>,
        diameter: u64,
    ) -> Self {
        Self {
            id,
            initial_owner,
            vertices,
            meeting_points: BTreeSet::new(),
            diameter,
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.vertices.contains(vertex)
    }
}
