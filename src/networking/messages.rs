//! Exhaustive enumeration of every message variant robots broadcast.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    rendezvous::messages::MeetingIntent,
    store::Entry,
    types::{
        basic::{MeetingPointId, PartitionId, RobotId, VertexId},
        meeting::MeetingRecord,
    },
};

/// All message variants broadcast between robots.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`Hello`].
    Hello(Hello),

    /// Full snapshot of the sender's territory ownership store.
    OwnershipSync(Vec<Entry<PartitionId, RobotId>>),

    /// Full snapshot of the sender's meeting record store.
    MeetingSync(Vec<Entry<MeetingPointId, MeetingRecord>>),

    /// See: [`MeetingIntent`].
    Intent(MeetingIntent),
}

impl Message {
    /// Name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "Hello",
            Message::OwnershipSync(_) => "OwnershipSync",
            Message::MeetingSync(_) => "MeetingSync",
            Message::Intent(_) => "Intent",
        }
    }
}

/// Announces the sender and the vertex it stands at: during discovery, and as a presence beacon at
/// partition boundaries under a redistribution policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Hello {
    pub start: VertexId,
}

impl From<Hello> for Message {
    fn from(value: Hello) -> Self {
        Message::Hello(value)
    }
}

impl From<MeetingIntent> for Message {
    fn from(value: MeetingIntent) -> Self {
        Message::Intent(value)
    }
}
