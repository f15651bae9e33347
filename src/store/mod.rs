/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Gossip-replicated key-value store ("virtual stigmergy").
//!
//! The replicated store is the *only* channel through which territory ownership and meeting schedules
//! are shared between robots. There is no acknowledgement or consensus round: every robot keeps a local
//! copy, broadcasts its full knowledge, and merges whatever it receives using a pluggable
//! [`ConflictResolver`]. Convergence is therefore probabilistic and bounded in ticks, not guaranteed by
//! any quorum.
//!
//! ## Operations
//!
//! - [`put`](ReplicatedStore::put) writes locally, bumps the entry's version, and marks the store dirty
//!   so that the next [`take_outgoing`](ReplicatedStore::take_outgoing) produces a broadcast.
//! - [`try_get`](ReplicatedStore::try_get) returns the best locally known value and requests (at most)
//!   one broadcast of the current knowledge.
//! - [`try_get_non_sending`](ReplicatedStore::try_get_non_sending) is a pure local read, used inside
//!   protocol steps that have already synchronized.
//! - [`merge`](ReplicatedStore::merge) folds inbound entries into the local copy.
//!
//! ## Tolerated anomalies
//!
//! A robot may act on an entry that is about to be overwritten (stale read), broadcasts may arrive out
//! of order, and a robot may join mid-run with no knowledge at all. The latter must
//! [`seed`](ReplicatedStore::seed) its store, or receive a first merge, before its reads are meaningful;
//! [`get_seeded`](ReplicatedStore::get_seeded) enforces this.

pub mod resolvers;

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{RobotId, Tick};

pub use resolvers::{ConflictResolver, LatestMeetingWins, LowestWriterWins, Survivor};

/// A value in the replicated store together with its provenance.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,

    /// The robot that most recently wrote this entry.
    pub writer: RobotId,

    /// Number of writes that preceded this one. Seeded entries have version 0.
    pub version: u64,
}

/// A single robot's copy of one replicated component (e.g. territory ownership).
pub struct ReplicatedStore<K: Ord + Clone, V: Clone> {
    me: RobotId,
    entries: BTreeMap<K, Entry<K, V>>,
    resolver: Box<dyn ConflictResolver<K, V>>,

    /// How often (in ticks) the full knowledge is re-broadcast even if nothing changed. 0 disables
    /// periodic gossip.
    gossip_period: u64,

    dirty: bool,
    sync_requested: bool,
    seeded: bool,
    last_broadcast: Option<Tick>,
}

impl<K: Ord + Clone, V: Clone> ReplicatedStore<K, V> {
    pub fn new(me: RobotId, resolver: Box<dyn ConflictResolver<K, V>>, gossip_period: u64) -> Self {
        Self {
            me,
            entries: BTreeMap::new(),
            resolver,
            gossip_period,
            dirty: false,
            sync_requested: false,
            seeded: false,
            last_broadcast: None,
        }
    }

    /// Store `value` locally under `key`, authored by this robot, and mark it for the next broadcast.
    pub fn put(&mut self, key: K, value: V) -> &Entry<K, V> {
        let version = self
            .entries
            .get(&key)
            .map_or(0, |entry| entry.version.saturating_add(1));
        self.dirty = true;
        self.seeded = true;
        self.entries.insert(
            key.clone(),
            Entry {
                key: key.clone(),
                value,
                writer: self.me,
                version,
            },
        );
        &self.entries[&key]
    }

    /// Return the best locally known value for `key`, and request a broadcast of the current knowledge
    /// so that peers can correct us if we are stale.
    pub fn try_get(&mut self, key: &K) -> Option<&V> {
        self.sync_requested = true;
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Request a broadcast of the current knowledge without reading anything.
    pub fn request_sync(&mut self) {
        self.sync_requested = true;
    }

    /// Return the best locally known value for `key` without causing any communication.
    pub fn try_get_non_sending(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Like [`try_get_non_sending`](Self::try_get_non_sending), but fails loudly if the store was never
    /// seeded or the key is unknown.
    pub fn get_seeded(&self, key: &K) -> Result<&V, StoreError> {
        if !self.seeded {
            return Err(StoreError::NotSeeded);
        }
        self.try_get_non_sending(key).ok_or(StoreError::MissingKey)
    }

    pub fn entry(&self, key: &K) -> Option<&Entry<K, V>> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Seed the store with locally computed start-up knowledge. Seeded entries have version 0, so any
    /// later write, by anyone, supersedes them; entries already received from peers are resolved as in
    /// [`merge`](Self::merge).
    pub fn seed(&mut self, values: impl IntoIterator<Item = (K, V)>) {
        let me = self.me;
        let seeded = values
            .into_iter()
            .map(|(key, value)| Entry {
                key,
                value,
                writer: me,
                version: 0,
            })
            .collect();
        self.merge(seeded);
        self.seeded = true;
        self.dirty = true;
    }

    /// Merge inbound entries into the local copy. Returns the number of keys whose value changed.
    ///
    /// A change marks the store dirty, so that what we learned is gossiped on to robots that may be out
    /// of the original writer's range.
    pub fn merge(&mut self, incoming: Vec<Entry<K, V>>) -> usize {
        let mut changed = 0;
        for entry in incoming {
            self.seeded = true;
            let replace = match self.entries.get(&entry.key) {
                None => true,
                Some(local) => {
                    self.resolver.resolve(&entry.key, local, &entry) == Survivor::Incoming
                }
            };
            if replace {
                self.entries.insert(entry.key.clone(), entry);
                changed += 1;
            }
        }
        if changed > 0 {
            self.dirty = true;
        }
        changed
    }

    /// Return the full local knowledge if a broadcast is due at `now`, clearing the dirty and
    /// sync-requested flags. At most one broadcast is produced per tick, and none before the store is
    /// seeded.
    pub fn take_outgoing(&mut self, now: Tick) -> Option<Vec<Entry<K, V>>> {
        if !self.seeded || self.last_broadcast == Some(now) {
            return None;
        }
        let periodic_due = self.gossip_period > 0
            && self
                .last_broadcast
                .map_or(true, |last| now.ticks_since(last) >= self.gossip_period);
        if !(self.dirty || self.sync_requested || periodic_due) {
            return None;
        }

        self.dirty = false;
        self.sync_requested = false;
        self.last_broadcast = Some(now);
        Some(self.entries.values().cloned().collect())
    }
}

/// Enumerates the ways a checked read of the [`ReplicatedStore`] can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store has neither been seeded nor received any entry from a peer.
    NotSeeded,

    /// The store is seeded but holds no entry for the requested key.
    MissingKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(me: u32) -> ReplicatedStore<u32, &'static str> {
        ReplicatedStore::new(RobotId::new(me), Box::new(LowestWriterWins), 1)
    }

    #[test]
    fn unseeded_store_refuses_checked_reads() {
        let store = store(0);
        assert_eq!(store.get_seeded(&1), Err(StoreError::NotSeeded));
    }

    #[test]
    fn put_bumps_version_and_marks_dirty() {
        let mut store = store(4);
        store.seed([(1, "a")]);
        assert_eq!(store.entry(&1).unwrap().version, 0);
        assert!(store.take_outgoing(Tick::new(0)).is_some());
        assert!(store.take_outgoing(Tick::new(0)).is_none());

        let entry = store.put(1, "b");
        assert_eq!(entry.version, 1);
        assert_eq!(entry.writer, RobotId::new(4));
        let outgoing = store.take_outgoing(Tick::new(1)).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].value, "b");
    }

    #[test]
    fn try_get_requests_a_single_broadcast() {
        let mut store: ReplicatedStore<u32, &str> =
            ReplicatedStore::new(RobotId::new(0), Box::new(LowestWriterWins), 0);
        store.seed([(1, "a")]);
        let _ = store.take_outgoing(Tick::new(0));
        assert!(store.take_outgoing(Tick::new(1)).is_none());

        assert_eq!(store.try_get(&1), Some(&"a"));
        assert!(store.take_outgoing(Tick::new(2)).is_some());
        assert!(store.take_outgoing(Tick::new(3)).is_none());
    }

    #[test]
    fn merge_prefers_newer_versions_then_lower_writers() {
        let mut mine = store(2);
        mine.seed([(7, "mine")]);

        let newer = Entry {
            key: 7,
            value: "newer",
            writer: RobotId::new(9),
            version: 1,
        };
        assert_eq!(mine.merge(vec![newer]), 1);
        assert_eq!(mine.try_get_non_sending(&7), Some(&"newer"));

        let same_version_lower_writer = Entry {
            key: 7,
            value: "lower",
            writer: RobotId::new(1),
            version: 1,
        };
        assert_eq!(mine.merge(vec![same_version_lower_writer]), 1);
        assert_eq!(mine.try_get_non_sending(&7), Some(&"lower"));

        let stale = Entry {
            key: 7,
            value: "stale",
            writer: RobotId::new(0),
            version: 0,
        };
        assert_eq!(mine.merge(vec![stale]), 0);
        assert_eq!(mine.try_get_non_sending(&7), Some(&"lower"));
    }

    #[test]
    fn merging_into_an_empty_store_seeds_it() {
        let mut joiner = store(5);
        let entry = Entry {
            key: 3,
            value: "known",
            writer: RobotId::new(1),
            version: 2,
        };
        joiner.merge(vec![entry]);
        assert!(joiner.is_seeded());
        assert_eq!(joiner.get_seeded(&3), Ok(&"known"));
        assert_eq!(joiner.get_seeded(&4), Err(StoreError::MissingKey));
    }
}
