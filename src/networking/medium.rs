/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-memory broadcast medium with one-tick latency.
//!
//! Every robot of a simulation gets a [`MediumHandle`] from [`BroadcastMedium::join`]. Messages are
//! borsh-encoded on [`broadcast`](Network::broadcast) and decoded again on [`recv`](Network::recv), so
//! receivers never share state with the sender. The simulation driver calls
//! [`advance`](BroadcastMedium::advance) once after every robot has ticked: this delivers the tick's
//! broadcasts to every robot the reachability predicate accepts and discards whatever a robot left
//! undrained in its inbox.
//!
//! The medium is single-threaded and shared through `Rc<RefCell<_>>`. No borrow is ever held across a
//! call into robot code.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{RobotId, Tick};

use super::{messages::Message, network::Network};

/// Decides whether a broadcast by `sender` at `tick` reaches `receiver`.
pub type Reachability = Box<dyn Fn(RobotId, RobotId, Tick) -> bool>;

struct MediumState {
    now: Tick,
    members: BTreeSet<RobotId>,
    reachable: Reachability,
    in_flight: Vec<(RobotId, Vec<u8>)>,
    inboxes: BTreeMap<RobotId, VecDeque<(RobotId, Vec<u8>)>>,
    delivered: u64,
}

/// The shared medium. Cloning yields another reference to the same medium.
#[derive(Clone)]
pub struct BroadcastMedium {
    state: Rc<RefCell<MediumState>>,
}

impl BroadcastMedium {
    /// A medium on which every robot is always in range of every other robot.
    pub fn new() -> Self {
        Self::with_reachability(Box::new(|_, _, _| true))
    }

    pub fn with_reachability(reachable: Reachability) -> Self {
        Self {
            state: Rc::new(RefCell::new(MediumState {
                now: Tick::init(),
                members: BTreeSet::new(),
                reachable,
                in_flight: Vec::new(),
                inboxes: BTreeMap::new(),
                delivered: 0,
            })),
        }
    }

    /// Register `robot` and return its handle.
    pub fn join(&self, robot: RobotId) -> MediumHandle {
        let mut state = self.state.borrow_mut();
        state.members.insert(robot);
        state.inboxes.entry(robot).or_default();
        MediumHandle {
            me: robot,
            state: Rc::clone(&self.state),
        }
    }

    /// End the current tick: deliver its broadcasts and move to the next tick.
    pub fn advance(&self) {
        let mut state = self.state.borrow_mut();
        let sent_at = state.now;
        let in_flight = std::mem::take(&mut state.in_flight);

        let mut inboxes: BTreeMap<RobotId, VecDeque<(RobotId, Vec<u8>)>> = state
            .members
            .iter()
            .map(|member| (*member, VecDeque::new()))
            .collect();
        let mut delivered = 0;
        for (sender, bytes) in in_flight {
            for (receiver, inbox) in inboxes.iter_mut() {
                if *receiver != sender && (state.reachable)(sender, *receiver, sent_at) {
                    inbox.push_back((sender, bytes.clone()));
                    delivered += 1;
                }
            }
        }

        state.inboxes = inboxes;
        state.delivered += delivered;
        state.now = sent_at + 1;
    }

    /// The tick whose broadcasts are currently being collected.
    pub fn now(&self) -> Tick {
        self.state.borrow().now
    }

    /// Total number of (message, receiver) deliveries so far.
    pub fn delivered(&self) -> u64 {
        self.state.borrow().delivered
    }
}

impl Default for BroadcastMedium {
    fn default() -> Self {
        Self::new()
    }
}

/// One robot's access point to a [`BroadcastMedium`].
#[derive(Clone)]
pub struct MediumHandle {
    me: RobotId,
    state: Rc<RefCell<MediumState>>,
}

impl MediumHandle {
    pub fn me(&self) -> RobotId {
        self.me
    }
}

impl Network for MediumHandle {
    fn broadcast(&mut self, message: Message) {
        match message.try_to_vec() {
            Ok(bytes) => self.state.borrow_mut().in_flight.push((self.me, bytes)),
            Err(err) => log::warn!("{} dropped an unencodable {}: {}", self.me, message.kind(), err),
        }
    }

    fn recv(&mut self) -> Option<(RobotId, Message)> {
        loop {
            let (origin, bytes) = self
                .state
                .borrow_mut()
                .inboxes
                .get_mut(&self.me)?
                .pop_front()?;
            match Message::try_from_slice(&bytes) {
                Ok(message) => return Some((origin, message)),
                Err(err) => log::warn!("{} dropped an undecodable message from {}: {}", self.me, origin, err),
            }
        }
    }
}
