/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The patrol graph and the travel-time estimation interface.
//!
//! Map generation and path finding are provided by the library user. rendezvous-rs only needs:
//! 1. A [`PatrolGraph`]: the waypoints and the weighted edges between them, used to find territory
//!    boundaries and to stitch territories together.
//! 2. A [`TravelTimeEstimator`]: how many ticks a robot needs to travel between two waypoints.
//!
//! [`ShortestPaths`] is a reference estimator that precomputes all-pairs shortest paths with Dijkstra's
//! algorithm. It also answers "which vertex is the next hop towards `to`", which simple movers use.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, BinaryHeap},
};

use crate::types::basic::VertexId;

/// Estimates travel times between waypoints.
pub trait TravelTimeEstimator {
    /// Number of ticks needed to travel from `from` to `to`, or `None` if `to` cannot be reached.
    fn estimate(&self, from: VertexId, to: VertexId) -> Option<u64>;
}

/// An undirected graph of waypoints with positive integer edge costs (in ticks).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatrolGraph {
    adjacency: BTreeMap<VertexId, BTreeMap<VertexId, u64>>,
}

impl PatrolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an edge list. Every endpoint becomes a vertex.
    pub fn from_edges(edges: impl IntoIterator<Item = (VertexId, VertexId, u64)>) -> Self {
        let mut graph = Self::new();
        for (a, b, cost) in edges {
            graph.add_edge(a, b, cost);
        }
        graph
    }

    pub fn add_vertex(&mut self, vertex: VertexId) {
        self.adjacency.entry(vertex).or_default();
    }

    /// Insert or replace the undirected edge `a`-`b`. Costs are clamped to at least one tick.
    pub fn add_edge(&mut self, a: VertexId, b: VertexId, cost: u64) {
        let cost = cost.max(1);
        self.adjacency.entry(a).or_default().insert(b, cost);
        self.adjacency.entry(b).or_default().insert(a, cost);
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.adjacency.contains_key(vertex)
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn vertex_set(&self) -> BTreeSet<VertexId> {
        self.adjacency.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Neighbors of `vertex` together with the cost of the connecting edge.
    pub fn neighbors(&self, vertex: VertexId) -> impl Iterator<Item = (VertexId, u64)> + '_ {
        self.adjacency
            .get(&vertex)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(v, cost)| (*v, *cost)))
    }

    /// Every undirected edge exactly once, as `(smaller, larger, cost)`, in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId, u64)> + '_ {
        self.adjacency.iter().flat_map(|(a, edges)| {
            edges
                .iter()
                .filter(move |(b, _)| a < *b)
                .map(move |(b, cost)| (*a, *b, *cost))
        })
    }
}

/// All-pairs shortest paths over a [`PatrolGraph`].
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    /// `distances[from][to]`: cost of the cheapest path.
    distances: BTreeMap<VertexId, BTreeMap<VertexId, u64>>,

    /// `first_hops[from][to]`: the vertex after `from` on the cheapest path to `to`.
    first_hops: BTreeMap<VertexId, BTreeMap<VertexId, VertexId>>,
}

impl ShortestPaths {
    /// Run Dijkstra's algorithm from every vertex of `graph`.
    pub fn new(graph: &PatrolGraph) -> Self {
        let mut distances = BTreeMap::new();
        let mut first_hops = BTreeMap::new();
        for source in graph.vertices() {
            let (dist, hops) = dijkstra(graph, source);
            distances.insert(source, dist);
            first_hops.insert(source, hops);
        }
        Self {
            distances,
            first_hops,
        }
    }

    /// The next vertex to step to when travelling from `from` to `to`. Returns `to` itself if the two are
    /// adjacent, and `None` if `from == to` or `to` is unreachable.
    pub fn next_hop(&self, from: VertexId, to: VertexId) -> Option<VertexId> {
        self.first_hops.get(&from)?.get(&to).copied()
    }
}

impl TravelTimeEstimator for ShortestPaths {
    fn estimate(&self, from: VertexId, to: VertexId) -> Option<u64> {
        self.distances.get(&from)?.get(&to).copied()
    }
}

fn dijkstra(
    graph: &PatrolGraph,
    source: VertexId,
) -> (BTreeMap<VertexId, u64>, BTreeMap<VertexId, VertexId>) {
    let mut dist = BTreeMap::new();
    let mut first_hop: BTreeMap<VertexId, VertexId> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0u64);
    heap.push(Reverse((0u64, source)));

    while let Some(Reverse((cost, vertex))) = heap.pop() {
        if dist.get(&vertex).is_some_and(|best| cost > *best) {
            continue;
        }
        for (next, edge_cost) in graph.neighbors(vertex) {
            let candidate = cost.saturating_add(edge_cost);
            let improves = dist.get(&next).map_or(true, |best| candidate < *best);
            if improves {
                dist.insert(next, candidate);
                // The first hop of a direct neighbor of the source is the neighbor itself.
                let hop = if vertex == source {
                    next
                } else {
                    first_hop[&vertex]
                };
                first_hop.insert(next, hop);
                heap.push(Reverse((candidate, next)));
            }
        }
    }

    (dist, first_hop)
}
