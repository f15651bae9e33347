//! Per-robot state machine that brings robots with touching territories together.
//!
//! # Overview
//!
//! Every robot runs one [`Rendezvous`](implementation::Rendezvous) state machine. The
//! [meeting plan](crate::scheduler::MeetingPlan) says where and roughly when robots should meet; the
//! replicated meeting store says when the *next* occurrence of each meeting point actually is and who is
//! expected there. The state machine turns these into a decision, once per tick, of where to go and
//! what to broadcast:
//!
//! ```text
//! Patrolling ──► EnRouteToMeeting ──► AtMeetingWaitingForPeers ──┬─► ExchangingInfo ──────┐
//!     ▲                                                          ├─► HandlingUnknownRobot ─┤
//!     │                                                          └─► HandlingMissingRobot ─┤
//!     └────────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Leaving patrolling
//!
//! While patrolling, a robot compares the time it would need to first visit the vertex its patrol
//! algorithm suggests, and then reach the next meeting vertex, against the meeting's tick. If it could
//! not make it in time any more, it departs for the meeting instead. A robot also departs immediately if
//! it hears a peer's [`MeetingIntent`](messages::MeetingIntent) for the very same occurrence, so that
//! nobody waits alone for peers that have already committed.
//!
//! ## Waiting and resolution
//!
//! A robot heading to or waiting at a meeting broadcasts its intent every tick. Waiting ends when the
//! meeting's tick is reached, or earlier if every expected peer has announced that it arrived. The
//! attendees the robot heard from are then compared with the expected attendees:
//! - equal: [`ExchangingInfo`](types::RendezvousState::ExchangingInfo),
//! - more than expected: [`HandlingUnknownRobot`](types::RendezvousState::HandlingUnknownRobot),
//! - one fewer: [`HandlingMissingRobot`](types::RendezvousState::HandlingMissingRobot), which triggers a
//!   [takeover](crate::takeover),
//! - two or more fewer: a fatal [`RendezvousError::MultipleMissingRobots`](implementation::RendezvousError).
//!
//! Every attendee proposes a next occurrence; the maximum proposal wins, so that an attendee with more
//! work than the others is never scheduled into a meeting it cannot reach. Resolution states last a
//! single tick.
//!
//! The state machine itself does no I/O. [`Robot`](crate::robot::Robot) feeds it the inbox and acts on
//! its [`StepOutput`](types::StepOutput).

pub mod messages;

pub mod types;

pub mod implementation;

use crate::{
    scheduler::MeetingPlan,
    store::ReplicatedStore,
    types::{basic::MeetingPointId, meeting::MeetingRecord},
};

pub use implementation::{Rendezvous, RendezvousError};

/// The replicated component holding every meeting point's [`MeetingRecord`].
pub type MeetingStore = ReplicatedStore<MeetingPointId, MeetingRecord>;

/// Seed `store` with the initial record of every meeting point of `plan`.
pub fn seed_meetings(store: &mut MeetingStore, plan: &MeetingPlan) {
    store.seed(plan.initial_records());
}
