//! Definitions of the "track info" events a [robot](crate::robot::Robot) emits.
//!
//! Note: an event for a given action indicates that the action has been completed. Every event carries
//! the tick it was emitted at and the robot that emitted it.

use std::{collections::BTreeSet, sync::mpsc::Sender};

use crate::types::{
    basic::{PartitionId, RobotId, Tick, VertexId},
    meeting::Meeting,
};

pub enum Event {
    // Meeting outcomes.
    ExchangeInfoAtMeeting(ExchangeInfoAtMeetingEvent),
    MissingRobotsAtMeeting(MissingRobotsAtMeetingEvent),
    UnknownRobotAtMeeting(UnknownRobotAtMeetingEvent),
    // Movement.
    StartMeetingTravel(StartMeetingTravelEvent),
    ReachVertex(ReachVertexEvent),
    // Changes of the patrolled area.
    TakeOver(TakeOverEvent),
    Redistribute(RedistributeEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The receiving end lives as long as the robot does.
            let _ = event_publisher.send(event);
        }
    }
}

pub struct ExchangeInfoAtMeetingEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub meeting: Meeting,
    pub present: BTreeSet<RobotId>,
}

pub struct MissingRobotsAtMeetingEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub meeting: Meeting,
    pub missing: BTreeSet<RobotId>,
    pub present: BTreeSet<RobotId>,
}

pub struct UnknownRobotAtMeetingEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub meeting: Meeting,
    pub unknown: BTreeSet<RobotId>,
}

pub struct StartMeetingTravelEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub meeting: Meeting,
}

pub struct ReachVertexEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub vertex: VertexId,
}

/// `robot` absorbed every territory `missing` owned.
pub struct TakeOverEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub missing: RobotId,
    pub partitions: BTreeSet<PartitionId>,
}

pub struct RedistributeEvent {
    pub tick: Tick,
    pub robot: RobotId,
    pub from: PartitionId,
    pub to: PartitionId,
}
