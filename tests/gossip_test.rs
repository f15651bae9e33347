use std::collections::BTreeMap;

use log::LevelFilter;
use rendezvous_rs::{
    networking::{
        medium::{BroadcastMedium, MediumHandle},
        messages::Message,
        network::Network,
    },
    partition::OwnershipStore,
    store::LowestWriterWins,
    types::basic::{PartitionId, RobotId, Tick},
};

mod common;

use crate::common::logging::setup_logger;

struct Peer {
    store: OwnershipStore,
    handle: MediumHandle,
}

impl Peer {
    fn new(medium: &BroadcastMedium, me: u32) -> Peer {
        let me = RobotId::new(me);
        let mut store = OwnershipStore::new(me, Box::new(LowestWriterWins), 4);
        store.seed((0..3).map(|i| (PartitionId::new(i), RobotId::new(i))));
        Peer {
            store,
            handle: medium.join(me),
        }
    }

    fn tick(&mut self, now: Tick) {
        while let Some((_, message)) = self.handle.recv() {
            if let Message::OwnershipSync(entries) = message {
                self.store.merge(entries);
            }
        }
        if let Some(entries) = self.store.take_outgoing(now) {
            self.handle.broadcast(Message::OwnershipSync(entries));
        }
    }

    fn view(&self) -> BTreeMap<PartitionId, RobotId> {
        self.store
            .entries()
            .map(|entry| (entry.key, entry.value))
            .collect()
    }
}

#[test]
fn concurrent_writes_converge_after_a_partition_heals() {
    setup_logger(LevelFilter::Info);

    // Robot 2 is out of everyone's range until tick 20.
    let medium = BroadcastMedium::with_reachability(Box::new(
        |sender: RobotId, receiver: RobotId, tick: Tick| {
            tick.int() >= 20 || (sender != RobotId::new(2) && receiver != RobotId::new(2))
        },
    ));
    let mut peers: Vec<Peer> = (0..3).map(|i| Peer::new(&medium, i)).collect();

    for now in 0..40 {
        // Robots 1 and 2 both claim partition 1 while they cannot hear each other.
        if now == 5 {
            peers[2].store.put(PartitionId::new(1), RobotId::new(2));
            peers[1].store.put(PartitionId::new(1), RobotId::new(1));
        }
        for peer in &mut peers {
            peer.tick(Tick::new(now));
        }
        medium.advance();

        if now == 15 {
            assert_ne!(peers[0].view(), peers[2].view());
        }
    }

    // Same version, so the write by the lower robot id survives everywhere.
    let expected: BTreeMap<PartitionId, RobotId> =
        (0..3).map(|i| (PartitionId::new(i), RobotId::new(i))).collect();
    for peer in &peers {
        assert_eq!(peer.view(), expected);
        assert_eq!(peer.store.entry(&PartitionId::new(1)).unwrap().version, 1);
    }
}
