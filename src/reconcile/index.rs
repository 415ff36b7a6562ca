//! Sorted interval index over a repaired volume grid.

use super::VolumeInterval;

/// Overlap queries against one route's canonical intervals.
///
/// The grid produced by overlap repair is sorted by start and its corrected
/// ends never decrease, so the first candidate is found by binary search on
/// the end and the scan stops at the first interval starting past the query.
/// A query costs O(log n + k) for k matches.
pub struct IntervalIndex<'a> {
    intervals: &'a [VolumeInterval],
}

impl<'a> IntervalIndex<'a> {
    pub fn new(intervals: &'a [VolumeInterval]) -> Self {
        debug_assert!(
            intervals
                .windows(2)
                .all(|w| w[0].start() <= w[1].start() && w[0].end() <= w[1].end()),
            "interval index requires a repaired, ordered grid"
        );
        Self { intervals }
    }

    /// Intervals sharing at least one point with the half-open `[start, end)`.
    ///
    /// Zero-length intervals contain no points and never match.
    pub fn overlapping(&self, start: f64, end: f64) -> impl Iterator<Item = &'a VolumeInterval> + 'a {
        let intervals = self.intervals;
        let first = intervals.partition_point(|iv| iv.end() <= start);
        intervals[first..]
            .iter()
            .take_while(move |iv| iv.start() < end)
            .filter(|iv| iv.start() < iv.end())
    }
}
