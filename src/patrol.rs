//! The patrol algorithm a robot follows while it is not travelling to a meeting.
//!
//! Choosing which vertex to patrol next is not this crate's concern; [`PatrolAlgorithm`] is the seam
//! through which it is plugged in. [`LeastRecentlyVisited`] is a small reference implementation.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::basic::{Tick, VertexId};

/// External collaborator that suggests patrol targets and tracks which vertices have been seen.
pub trait PatrolAlgorithm {
    /// The vertex to visit next, given where the robot is and the territory it currently patrols.
    fn suggest_next(&mut self, at: VertexId, territory: &BTreeSet<VertexId>, now: Tick) -> VertexId;

    /// Whether every vertex of `territory` has been seen since it was last reset.
    fn has_seen_all(&self, territory: &BTreeSet<VertexId>) -> bool;

    /// Forget that `vertices` were seen, e.g. because they were just taken over.
    fn reset_seen(&mut self, vertices: &BTreeSet<VertexId>);

    /// Called whenever the robot reaches a vertex.
    fn on_reach_vertex(&mut self, vertex: VertexId, now: Tick);
}

/// Always heads for the vertex of the territory that was visited longest ago (never-visited vertices
/// first, ties broken by vertex id).
#[derive(Clone, Debug, Default)]
pub struct LeastRecentlyVisited {
    last_visit: BTreeMap<VertexId, Tick>,
    seen: BTreeSet<VertexId>,
}

impl LeastRecentlyVisited {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatrolAlgorithm for LeastRecentlyVisited {
    fn suggest_next(&mut self, at: VertexId, territory: &BTreeSet<VertexId>, _now: Tick) -> VertexId {
        territory
            .iter()
            .filter(|vertex| **vertex != at)
            .min_by_key(|vertex| (self.last_visit.get(vertex).copied(), **vertex))
            .copied()
            .unwrap_or(at)
    }

    fn has_seen_all(&self, territory: &BTreeSet<VertexId>) -> bool {
        territory.is_subset(&self.seen)
    }

    fn reset_seen(&mut self, vertices: &BTreeSet<VertexId>) {
        self.seen.retain(|vertex| !vertices.contains(vertex));
    }

    fn on_reach_vertex(&mut self, vertex: VertexId, now: Tick) {
        self.seen.insert(vertex);
        self.last_visit.insert(vertex, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvisited_vertices_come_first() {
        let territory: BTreeSet<_> = (0..3).map(VertexId::new).collect();
        let mut patrol = LeastRecentlyVisited::new();
        patrol.on_reach_vertex(VertexId::new(0), Tick::new(1));
        patrol.on_reach_vertex(VertexId::new(1), Tick::new(2));

        let next = patrol.suggest_next(VertexId::new(1), &territory, Tick::new(3));
        assert_eq!(next, VertexId::new(2));

        patrol.on_reach_vertex(VertexId::new(2), Tick::new(3));
        assert!(patrol.has_seen_all(&territory));
        let next = patrol.suggest_next(VertexId::new(2), &territory, Tick::new(4));
        assert_eq!(next, VertexId::new(0));
    }

    #[test]
    fn reset_forgets_seen_vertices() {
        let territory: BTreeSet<_> = (0..2).map(VertexId::new).collect();
        let mut patrol = LeastRecentlyVisited::new();
        for vertex in &territory {
            patrol.on_reach_vertex(*vertex, Tick::new(1));
        }
        assert!(patrol.has_seen_all(&territory));

        patrol.reset_seen(&[VertexId::new(1)].into_iter().collect());
        assert!(!patrol.has_seen_all(&territory));
    }
}
