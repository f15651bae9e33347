//! Pluggable broadcast networking.
//!
//! Robots only ever *broadcast*; there is no addressed send. Whatever a robot broadcasts at tick `t` is
//! visible to every robot the [network](network::Network) deems in range at tick `t + 1`, never earlier.
//! [`medium::BroadcastMedium`] is an in-memory implementation with exactly these semantics, used by
//! simulations and tests.

pub mod network;

pub mod messages;

pub mod medium;

pub(crate) mod receiving;

pub(crate) mod sending;
