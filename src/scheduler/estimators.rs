//! Pluggable estimation of how often a territory's owner should meet its neighbours.

use crate::types::territory::Territory;

/// Estimates the meeting interval (in ticks) a single territory needs.
///
/// The [plan](super::MeetingPlan) uses the maximum estimate over all territories as its global interval.
pub trait IntervalEstimator {
    fn estimate(&self, territory: &Territory) -> u64;
}

/// `ceil(|territory| / |meeting points of the territory|) * diameter`.
///
/// Intuitively: the owner splits its territory into one slice per meeting point and needs about one
/// diameter's worth of travel per vertex of a slice.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiameterIntervalEstimator;

impl IntervalEstimator for DiameterIntervalEstimator {
    fn estimate(&self, territory: &Territory) -> u64 {
        let points = territory.meeting_points.len().max(1) as u64;
        let size = territory.len() as u64;
        size.div_ceil(points).saturating_mul(territory.diameter)
    }
}

/// Every territory gets the same, fixed interval.
#[derive(Clone, Copy, Debug)]
pub struct FixedIntervalEstimator(pub u64);

impl IntervalEstimator for FixedIntervalEstimator {
    fn estimate(&self, _territory: &Territory) -> u64 {
        self.0
    }
}
