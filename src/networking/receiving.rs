//! Functions and types for receiving messages from the broadcast network.

use crate::{
    rendezvous::messages::MeetingIntent,
    store::Entry,
    types::{
        basic::{MeetingPointId, PartitionId, RobotId},
        meeting::MeetingRecord,
    },
};

use super::{
    messages::{Hello, Message},
    network::Network,
};

/// Everything delivered to a robot in one tick, sorted by the component that consumes it.
#[derive(Default)]
pub(crate) struct Inbox {
    pub(crate) hellos: Vec<(RobotId, Hello)>,
    pub(crate) ownership: Vec<Vec<Entry<PartitionId, RobotId>>>,
    pub(crate) meetings: Vec<Vec<Entry<MeetingPointId, MeetingRecord>>>,
    pub(crate) intents: Vec<(RobotId, MeetingIntent)>,
}

impl Inbox {
    /// Drain this tick's messages from `network`. Messages that claim to come from `me` are dropped.
    pub(crate) fn drain<N: Network>(network: &mut N, me: RobotId) -> Inbox {
        let mut inbox = Inbox::default();
        while let Some((origin, msg)) = network.recv() {
            if origin == me {
                continue;
            }
            match msg {
                Message::Hello(hello) => inbox.hellos.push((origin, hello)),
                Message::OwnershipSync(entries) => inbox.ownership.push(entries),
                Message::MeetingSync(entries) => inbox.meetings.push(entries),
                Message::Intent(intent) => inbox.intents.push((origin, intent)),
            }
        }
        inbox
    }
}
