//! Definitions of types specific to the [rendezvous](super) protocol.

use std::{collections::BTreeSet, fmt};

use crate::{
    graph::TravelTimeEstimator,
    scheduler::MeetingPlan,
    types::{
        basic::{RobotId, Tick, VertexId},
        meeting::Meeting,
    },
};

use super::{messages::MeetingIntent, MeetingStore};

/// The state of one robot's rendezvous state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RendezvousState {
    /// Following the patrol algorithm's suggestions.
    Patrolling,

    /// Travelling to the vertex of `meeting`.
    EnRouteToMeeting { meeting: Meeting },

    /// At (or out of time for) `meeting`, waiting for the expected peers.
    AtMeetingWaitingForPeers { meeting: Meeting },

    /// Every expected attendee was present.
    ExchangingInfo { meeting: Meeting },

    /// Robots that were not expected attended, and join the meeting point from now on.
    HandlingUnknownRobot {
        meeting: Meeting,
        unknown: BTreeSet<RobotId>,
    },

    /// One expected attendee did not show up.
    HandlingMissingRobot { meeting: Meeting, missing: RobotId },
}

impl RendezvousState {
    pub fn phase(&self) -> RendezvousPhase {
        match self {
            RendezvousState::Patrolling => RendezvousPhase::Patrolling,
            RendezvousState::EnRouteToMeeting { .. } => RendezvousPhase::EnRouteToMeeting,
            RendezvousState::AtMeetingWaitingForPeers { .. } => {
                RendezvousPhase::AtMeetingWaitingForPeers
            }
            RendezvousState::ExchangingInfo { .. } => RendezvousPhase::ExchangingInfo,
            RendezvousState::HandlingUnknownRobot { .. } => RendezvousPhase::HandlingUnknownRobot,
            RendezvousState::HandlingMissingRobot { .. } => RendezvousPhase::HandlingMissingRobot,
        }
    }

    /// The meeting the state refers to, if any.
    pub fn meeting(&self) -> Option<&Meeting> {
        match self {
            RendezvousState::Patrolling => None,
            RendezvousState::EnRouteToMeeting { meeting }
            | RendezvousState::AtMeetingWaitingForPeers { meeting }
            | RendezvousState::ExchangingInfo { meeting }
            | RendezvousState::HandlingUnknownRobot { meeting, .. }
            | RendezvousState::HandlingMissingRobot { meeting, .. } => Some(meeting),
        }
    }
}

/// The data-less discriminant of [`RendezvousState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RendezvousPhase {
    Patrolling,
    EnRouteToMeeting,
    AtMeetingWaitingForPeers,
    ExchangingInfo,
    HandlingUnknownRobot,
    HandlingMissingRobot,
}

impl fmt::Display for RendezvousPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a meeting ended, from the point of view of one attendee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeetingOutcome {
    /// Everybody expected was there (or the one absentee was excused by
    /// [`might_miss_current_next`](crate::types::meeting::MeetingRecord::might_miss_current_next)).
    Exchange,

    /// Robots that were not expected attended.
    Unknown(BTreeSet<RobotId>),

    /// One expected robot was absent.
    Missing(RobotId),
}

/// A resolved meeting, handed to the [robot](crate::robot::Robot) to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub meeting: Meeting,
    pub outcome: MeetingOutcome,

    /// Every robot sensed at the meeting, including this robot.
    pub present: BTreeSet<RobotId>,

    /// The agreed next occurrence: the maximum of every present attendee's proposal.
    pub next: Tick,
}

/// Everything one [`step`](super::Rendezvous::step) reads.
pub struct StepContext<'a> {
    pub now: Tick,

    /// Where the robot stands.
    pub at: VertexId,

    /// Where the patrol algorithm would go next.
    pub suggestion: VertexId,

    pub plan: &'a MeetingPlan,
    pub meetings: &'a MeetingStore,
    pub estimator: &'a dyn TravelTimeEstimator,

    /// Meeting intents delivered this tick.
    pub intents: &'a [(RobotId, MeetingIntent)],

    /// Number of territories the robot currently owns.
    pub workload: usize,
}

/// What one [`step`](super::Rendezvous::step) decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutput {
    /// The vertex to head for.
    pub target: VertexId,

    /// The intent to broadcast this tick, if any.
    pub intent: Option<MeetingIntent>,

    /// Set on the tick the robot leaves patrolling for a meeting.
    pub started_travel: Option<Meeting>,

    /// Set on the tick a meeting resolves.
    pub resolution: Option<Resolution>,
}

impl StepOutput {
    pub(crate) fn patrol(suggestion: VertexId) -> Self {
        Self {
            target: suggestion,
            intent: None,
            started_travel: None,
            resolution: None,
        }
    }
}
