//! A leaderless coordination core for teams of patrolling robots.
//!
//! Robots patrol a graph of waypoints that is partitioned among them. Every robot computes the same
//! [territories](partition) and [meeting plan](scheduler) locally, shares ownership and meeting schedules
//! through gossip-[replicated stores](store), meets its neighbours through a per-robot
//! [rendezvous](rendezvous) state machine, and, when a neighbour fails to show up, elects by a
//! deterministic local rule who [takes over](takeover) its territory.
//!
//! Execution is single-threaded and tick-driven: a [`Robot`](robot::Robot) is advanced by calling
//! [`tick`](robot::Robot::tick) once per logical step.

pub mod types;

pub mod graph;

pub mod store;

pub mod partition;

pub mod scheduler;

pub mod rendezvous;

pub mod takeover;

pub mod redistribution;

pub mod patrol;

pub mod networking;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod robot;
