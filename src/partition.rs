/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic, locally computed partitioning of the patrol graph into territories.
//!
//! Every robot runs the same [`PartitionGenerator`] with the same graph, the same seed, and the same set
//! of robot ids, and therefore computes exactly the same territories without ever communicating them.
//! The only communication needed is discovering which robot ids participate (see
//! [`Robot`](crate::robot::Robot)).
//!
//! After generation, the owning relation is written into the replicated ownership store, keyed by
//! territory id, so that later ownership changes (from a [takeover](crate::takeover)) are observable by
//! everyone. Problems in this module are configuration errors: they indicate a broken scenario setup and
//! are never retried.

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    graph::{PatrolGraph, TravelTimeEstimator},
    store::ReplicatedStore,
    types::{
        basic::{PartitionId, RobotId, VertexId},
        territory::Territory,
    },
};

/// The replicated component that maps every territory to its current owner.
pub type OwnershipStore = ReplicatedStore<PartitionId, RobotId>;

/// Computes one territory per robot.
pub trait PartitionGenerator {
    /// Must be a pure function of its inputs (and of the generator's own seed).
    fn generate(
        &self,
        graph: &PatrolGraph,
        estimator: &dyn TravelTimeEstimator,
        robots: &BTreeSet<RobotId>,
    ) -> Result<BTreeMap<RobotId, Territory>, ConfigurationError>;
}

/// Grows one region per robot, breadth-first and round-robin, from seed vertices chosen by a seeded
/// shuffle.
///
/// The i-th smallest robot id receives territory `PartitionId(i)`. Vertices that no region can reach
/// (disconnected components) are handed to whichever region is smallest at that moment, so the
/// territories always cover the whole graph and are pairwise disjoint.
#[derive(Clone, Copy, Debug)]
pub struct RegionGrowingGenerator {
    seed: u64,
}

impl RegionGrowingGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl PartitionGenerator for RegionGrowingGenerator {
    fn generate(
        &self,
        graph: &PatrolGraph,
        estimator: &dyn TravelTimeEstimator,
        robots: &BTreeSet<RobotId>,
    ) -> Result<BTreeMap<RobotId, Territory>, ConfigurationError> {
        if robots.is_empty() {
            return Err(ConfigurationError::NoRobots);
        }
        if robots.len() > graph.len() {
            return Err(ConfigurationError::TooManyPartitions {
                requested: robots.len(),
                waypoints: graph.len(),
            });
        }

        let mut candidates: Vec<VertexId> = graph.vertices().collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        candidates.shuffle(&mut rng);

        let n = robots.len();
        let mut owner_of: BTreeMap<VertexId, usize> = BTreeMap::new();
        let mut regions: Vec<BTreeSet<VertexId>> = vec![BTreeSet::new(); n];
        let mut frontiers: Vec<BTreeSet<VertexId>> = vec![BTreeSet::new(); n];

        let claim = |vertex: VertexId,
                     region: usize,
                     owner_of: &mut BTreeMap<VertexId, usize>,
                     regions: &mut Vec<BTreeSet<VertexId>>,
                     frontiers: &mut Vec<BTreeSet<VertexId>>| {
            owner_of.insert(vertex, region);
            regions[region].insert(vertex);
            frontiers[region].extend(
                graph
                    .neighbors(vertex)
                    .map(|(next, _)| next)
                    .filter(|next| !owner_of.contains_key(next)),
            );
        };

        for (region, seed_vertex) in candidates.iter().take(n).enumerate() {
            claim(
                *seed_vertex,
                region,
                &mut owner_of,
                &mut regions,
                &mut frontiers,
            );
        }

        while owner_of.len() < graph.len() {
            let mut progressed = false;
            for region in 0..n {
                frontiers[region].retain(|vertex| !owner_of.contains_key(vertex));
                if let Some(vertex) = frontiers[region].pop_first() {
                    claim(vertex, region, &mut owner_of, &mut regions, &mut frontiers);
                    progressed = true;
                }
            }

            if !progressed {
                // Only unreachable components are left.
                let orphan = graph
                    .vertices()
                    .find(|vertex| !owner_of.contains_key(vertex));
                let smallest = (0..n).min_by_key(|region| (regions[*region].len(), *region));
                if let (Some(orphan), Some(smallest)) = (orphan, smallest) {
                    claim(orphan, smallest, &mut owner_of, &mut regions, &mut frontiers);
                }
            }
        }

        Ok(robots
            .iter()
            .zip(regions)
            .enumerate()
            .map(|(index, (robot, vertices))| {
                let span = diameter(&vertices, estimator);
                let territory =
                    Territory::new(PartitionId::new(index as u32), *robot, vertices, span);
                (*robot, territory)
            })
            .collect())
    }
}

/// Run `generator` and check that it produced exactly one territory per robot.
pub fn generate_territories(
    generator: &dyn PartitionGenerator,
    graph: &PatrolGraph,
    estimator: &dyn TravelTimeEstimator,
    robots: &BTreeSet<RobotId>,
) -> Result<BTreeMap<PartitionId, Territory>, ConfigurationError> {
    let generated = generator.generate(graph, estimator, robots)?;
    if generated.len() != robots.len() || !robots.iter().all(|r| generated.contains_key(r)) {
        return Err(ConfigurationError::TerritoryCountMismatch {
            robots: robots.len(),
            territories: generated.len(),
        });
    }
    Ok(generated
        .into_values()
        .map(|territory| (territory.id, territory))
        .collect())
}

/// Maximum estimated travel time between any two vertices of `vertices`. Unreachable pairs are ignored.
pub fn diameter(vertices: &BTreeSet<VertexId>, estimator: &dyn TravelTimeEstimator) -> u64 {
    vertices
        .iter()
        .flat_map(|a| vertices.iter().map(move |b| (*a, *b)))
        .filter(|(a, b)| a < b)
        .filter_map(|(a, b)| estimator.estimate(a, b))
        .max()
        .unwrap_or(0)
}

/// Write the initial owner of every territory into the ownership store.
pub fn seed_ownership(store: &mut OwnershipStore, territories: &BTreeMap<PartitionId, Territory>) {
    store.seed(
        territories
            .values()
            .map(|territory| (territory.id, territory.initial_owner)),
    );
}

/// The current owner of `partition` according to the local copy of the store.
pub fn owner_of(
    store: &OwnershipStore,
    partition: PartitionId,
) -> Result<RobotId, ConfigurationError> {
    store
        .get_seeded(&partition)
        .copied()
        .map_err(|_| ConfigurationError::UnknownPartition { partition })
}

/// Every territory currently owned by `robot`. Empty if the robot lost all of its territories.
pub fn territories_owned_by(store: &OwnershipStore, robot: RobotId) -> BTreeSet<PartitionId> {
    store
        .entries()
        .filter(|entry| entry.value == robot)
        .map(|entry| entry.key)
        .collect()
}

/// Read back `robot`'s start-up assignment. A robot that owns nothing right after seeding indicates a
/// broken setup.
pub fn assignment_of(
    store: &OwnershipStore,
    robot: RobotId,
) -> Result<BTreeSet<PartitionId>, ConfigurationError> {
    let owned = territories_owned_by(store, robot);
    if owned.is_empty() {
        Err(ConfigurationError::UnknownRobot { robot })
    } else {
        Ok(owned)
    }
}

/// Unrecoverable scenario setup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Partitioning was requested for an empty robot set.
    NoRobots,

    /// More territories were requested than there are waypoints.
    TooManyPartitions { requested: usize, waypoints: usize },

    /// A generator returned a territory count that differs from the robot count.
    TerritoryCountMismatch { robots: usize, territories: usize },

    /// A territory id was read that the ownership store does not know.
    UnknownPartition { partition: PartitionId },

    /// A robot id was used to read back an assignment, but it owns nothing.
    UnknownRobot { robot: RobotId },

    /// A robot's start vertex is not a waypoint of the patrol graph.
    UnknownStartVertex { robot: RobotId, vertex: VertexId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::ShortestPaths, store::LowestWriterWins};

    fn grid(width: u32, height: u32) -> PatrolGraph {
        let mut graph = PatrolGraph::new();
        for y in 0..height {
            for x in 0..width {
                let id = VertexId::new(y * width + x);
                graph.add_vertex(id);
                if x + 1 < width {
                    graph.add_edge(id, VertexId::new(y * width + x + 1), 1);
                }
                if y + 1 < height {
                    graph.add_edge(id, VertexId::new((y + 1) * width + x), 1);
                }
            }
        }
        graph
    }

    fn robots(n: u32) -> BTreeSet<RobotId> {
        (0..n).map(RobotId::new).collect()
    }

    #[test]
    fn territories_cover_the_graph_and_are_disjoint() {
        let graph = grid(5, 4);
        let paths = ShortestPaths::new(&graph);
        let territories =
            generate_territories(&RegionGrowingGenerator::new(7), &graph, &paths, &robots(3))
                .unwrap();

        assert_eq!(territories.len(), 3);
        let mut union = BTreeSet::new();
        let mut total = 0;
        for territory in territories.values() {
            assert!(!territory.is_empty());
            total += territory.len();
            union.extend(territory.vertices.iter().copied());
        }
        assert_eq!(union, graph.vertex_set());
        assert_eq!(total, graph.len());
    }

    #[test]
    fn generation_is_deterministic() {
        let graph = grid(6, 6);
        let paths = ShortestPaths::new(&graph);
        let generator = RegionGrowingGenerator::new(99);
        let first = generator.generate(&graph, &paths, &robots(4)).unwrap();
        let second = generator.generate(&graph, &paths, &robots(4)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn disconnected_components_are_still_assigned() {
        let mut graph = grid(3, 1);
        graph.add_edge(VertexId::new(10), VertexId::new(11), 1);
        let paths = ShortestPaths::new(&graph);
        let territories =
            generate_territories(&RegionGrowingGenerator::new(1), &graph, &paths, &robots(1))
                .unwrap();
        assert_eq!(territories[&PartitionId::new(0)].len(), 5);
    }

    #[test]
    fn too_many_partitions_is_a_configuration_error() {
        let graph = grid(2, 1);
        let paths = ShortestPaths::new(&graph);
        let result =
            generate_territories(&RegionGrowingGenerator::new(0), &graph, &paths, &robots(3));
        assert_eq!(
            result,
            Err(ConfigurationError::TooManyPartitions {
                requested: 3,
                waypoints: 2
            })
        );
    }

    #[test]
    fn ownership_readback() {
        let graph = grid(4, 1);
        let paths = ShortestPaths::new(&graph);
        let territories =
            generate_territories(&RegionGrowingGenerator::new(3), &graph, &paths, &robots(2))
                .unwrap();

        let mut store = OwnershipStore::new(RobotId::new(0), Box::new(LowestWriterWins), 1);
        seed_ownership(&mut store, &territories);

        assert_eq!(owner_of(&store, PartitionId::new(1)), Ok(RobotId::new(1)));
        assert_eq!(
            assignment_of(&store, RobotId::new(0)),
            Ok([PartitionId::new(0)].into_iter().collect())
        );
        assert_eq!(
            assignment_of(&store, RobotId::new(7)),
            Err(ConfigurationError::UnknownRobot {
                robot: RobotId::new(7)
            })
        );
        assert_eq!(
            owner_of(&store, PartitionId::new(5)),
            Err(ConfigurationError::UnknownPartition {
                partition: PartitionId::new(5)
            })
        );
    }
}
