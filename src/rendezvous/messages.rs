/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the messages robots broadcast as part of the [rendezvous](super) protocol.
//!
//! There is a single message type, [`MeetingIntent`], broadcast every tick by a robot that is on its way
//! to, waiting at, or resolving a meeting. Peers use it for three things:
//! 1. To be pulled out of patrolling when a peer has already departed for a meeting they share.
//! 2. To sense which expected attendees are present when the meeting resolves.
//! 3. To learn each attendee's proposal for the next occurrence.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{basic::Tick, meeting::Meeting};

/// "I am going to (or am at) this meeting."
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MeetingIntent {
    pub meeting: Meeting,

    /// Whether the sender is standing on the meeting vertex.
    pub arrived: bool,

    /// The occurrence the sender proposes to hold next. Attendees agree on the maximum proposal.
    pub proposed_next: Tick,
}

impl MeetingIntent {
    /// Whether this intent refers to the same occurrence as `meeting`.
    pub fn is_for(&self, meeting: &Meeting) -> bool {
        self.meeting.same_occurrence(meeting)
    }
}
