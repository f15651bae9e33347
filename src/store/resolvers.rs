//! Pluggable conflict resolution for the [replicated store](super::ReplicatedStore).
//!
//! When two robots hold different entries for the same key, every robot independently calls the same
//! resolver on the same pair and therefore keeps the same survivor, no matter in which order the entries
//! arrived. Resolvers must be a total order over entries for this to converge.

use crate::types::meeting::MeetingRecord;

use super::Entry;

/// Which of two conflicting entries survives a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Survivor {
    Local,
    Incoming,
}

/// Chooses the surviving entry when a local and an incoming entry for the same key disagree.
pub trait ConflictResolver<K, V> {
    fn resolve(&self, key: &K, local: &Entry<K, V>, incoming: &Entry<K, V>) -> Survivor;
}

/// Default resolver: the later write (higher version) wins; between writes of the same version, the
/// entry authored by the lower-numbered robot wins.
///
/// This is a cheap deterministic tie-break without any consensus round.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowestWriterWins;

impl<K, V> ConflictResolver<K, V> for LowestWriterWins {
    fn resolve(&self, _key: &K, local: &Entry<K, V>, incoming: &Entry<K, V>) -> Survivor {
        let incoming_rank = (incoming.version, std::cmp::Reverse(incoming.writer));
        let local_rank = (local.version, std::cmp::Reverse(local.writer));
        if incoming_rank > local_rank {
            Survivor::Incoming
        } else {
            Survivor::Local
        }
    }
}

/// Resolver for [`MeetingRecord`]s: the later write wins; between writes of the same version the record
/// that schedules the *later* next meeting wins (so that a slow or recovering attendee is never
/// scheduled into a meeting it cannot reach), then the lower writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestMeetingWins;

impl<K> ConflictResolver<K, MeetingRecord> for LatestMeetingWins {
    fn resolve(
        &self,
        _key: &K,
        local: &Entry<K, MeetingRecord>,
        incoming: &Entry<K, MeetingRecord>,
    ) -> Survivor {
        let rank = |entry: &Entry<K, MeetingRecord>| {
            (
                entry.version,
                entry.value.current_next,
                std::cmp::Reverse(entry.writer),
            )
        };
        if rank(incoming) > rank(local) {
            Survivor::Incoming
        } else {
            Survivor::Local
        }
    }
}
