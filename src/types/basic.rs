/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" identifier and time types used throughout rendezvous-rs.
//!
//! All types in this module follow the newtype pattern: they are sent around in messages and stored in
//! the replicated store, but have no behavior of their own beyond construction, inspection, and (for
//! [`Tick`]) arithmetic.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, Sub},
};

/// Identifier of a robot. Lower ids win every deterministic tie-break in the protocol.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct RobotId(u32);

impl RobotId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for RobotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of a waypoint in the patrol graph.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct VertexId(u32);

impl VertexId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for VertexId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of a territory (partition).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct PartitionId(u32);

impl PartitionId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for PartitionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier of a meeting point.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct MeetingPointId(u32);

impl MeetingPointId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for MeetingPointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// One discrete unit of logical simulation time.
///
/// Ticks saturate instead of overflowing, so that [`Tick::NEVER`] stays "never" no matter how much is
/// added to it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Tick(u64);

impl Tick {
    /// A tick that is never reached by any run.
    pub const NEVER: Tick = Tick(u64::MAX);

    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub const fn is_never(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Number of ticks from `earlier` to `self`, or 0 if `earlier` is not earlier.
    pub fn ticks_since(&self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            Display::fmt(&self.0, f)
        }
    }
}

impl Add<u64> for Tick {
    type Output = Tick;

    fn add(self, rhs: u64) -> Self::Output {
        Tick(self.0.saturating_add(rhs))
    }
}

impl Sub<u64> for Tick {
    type Output = Tick;

    fn sub(self, rhs: u64) -> Self::Output {
        Tick(self.0.saturating_sub(rhs))
    }
}
