/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the robot's
//! [config](crate::robot::Configuration).
//!
//! rendezvous-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least three values. The first three values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The tick the event was emitted at.
//! 3. The id of the robot that emitted it.
//!
//! Ids are printed with a one-letter prefix: `r` for robots, `p` for partitions, `m` for meeting points
//! and `v` for vertices.
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [MissingRobotsAtMeeting](crate::events::MissingRobotsAtMeetingEvent) is printed:
//!
//! ```text
//! MissingRobotsAtMeeting, 100, r0, m0, v3, r1, r0
//! ```
//!
//! In the snippet:
//! - The fourth and fifth values are the meeting point and the vertex it is held at.
//! - The sixth value lists the missing robots, separated by spaces.
//! - The seventh value lists the robots that were present, separated by spaces.

use crate::events::*;
use log;
use std::fmt::Display;

// Names of each event in PascalCase for printing:
pub const EXCHANGE_INFO_AT_MEETING: &str = "ExchangeInfoAtMeeting";
pub const MISSING_ROBOTS_AT_MEETING: &str = "MissingRobotsAtMeeting";
pub const UNKNOWN_ROBOT_AT_MEETING: &str = "UnknownRobotAtMeeting";

pub const START_MEETING_TRAVEL: &str = "StartMeetingTravel";
pub const REACH_VERTEX: &str = "ReachVertex";

pub const TAKE_OVER: &str = "TakeOver";
pub const REDISTRIBUTE: &str = "Redistribute";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger: Sized + 'static {
    /// The CSV line printed for the event.
    fn log_line(&self) -> String;

    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self)> {
        Box::new(|event: &Self| log::info!("{}", event.log_line()))
    }
}

impl Logger for ExchangeInfoAtMeetingEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            EXCHANGE_INFO_AT_MEETING,
            self.tick,
            self.robot,
            self.meeting.point,
            self.meeting.vertex,
            space_separated(&self.present)
        )
    }
}

impl Logger for MissingRobotsAtMeetingEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}, {}",
            MISSING_ROBOTS_AT_MEETING,
            self.tick,
            self.robot,
            self.meeting.point,
            self.meeting.vertex,
            space_separated(&self.missing),
            space_separated(&self.present)
        )
    }
}

impl Logger for UnknownRobotAtMeetingEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            UNKNOWN_ROBOT_AT_MEETING,
            self.tick,
            self.robot,
            self.meeting.point,
            self.meeting.vertex,
            space_separated(&self.unknown)
        )
    }
}

impl Logger for StartMeetingTravelEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            START_MEETING_TRAVEL,
            self.tick,
            self.robot,
            self.meeting.point,
            self.meeting.vertex,
            self.meeting.tick
        )
    }
}

impl Logger for ReachVertexEvent {
    fn log_line(&self) -> String {
        format!("{}, {}, {}, {}", REACH_VERTEX, self.tick, self.robot, self.vertex)
    }
}

impl Logger for TakeOverEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            TAKE_OVER,
            self.tick,
            self.robot,
            self.missing,
            space_separated(&self.partitions)
        )
    }
}

impl Logger for RedistributeEvent {
    fn log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            REDISTRIBUTE, self.tick, self.robot, self.from, self.to
        )
    }
}

fn space_separated<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
