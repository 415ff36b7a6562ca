//! Aggregation of apportioned crash rows onto the interval grid.

use std::collections::BTreeMap;

use super::IntervalId;
use super::apportion::ApportionedCrash;
use crate::config::Parameters;
use crate::severity::CrashCounts;

/// Crash measures of one canonical interval, recomputed after apportionment.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashAggregate {
    pub counts: CrashCounts,
    /// Smallest start of the contributing crash segments.
    pub crash_start: f64,
    /// Largest end of the contributing crash segments.
    pub crash_end: f64,
    /// Sum of the full lengths of the contributing crash segments.
    pub crash_length: f64,
    /// Sum of the contributing lengths that fall inside the interval.
    pub apportioned_length: f64,
    pub severity_index: f64,
    /// Crashes per mile per year.
    pub crash_rate: f64,
}

impl CrashAggregate {
    pub fn incident_factor(&self, aadt: f64, divisor: f64) -> f64 {
        self.crash_rate * aadt / divisor
    }
}

/// Sums apportioned rows per interval and derives the interval's severity
/// index and crash rate from the summed counts.
pub fn aggregate(rows: &[ApportionedCrash], params: &Parameters) -> BTreeMap<IntervalId, CrashAggregate> {
    let mut groups: BTreeMap<IntervalId, Vec<&ApportionedCrash>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.interval).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(interval, members)| (interval, aggregate_group(&members, params)))
        .collect()
}

fn aggregate_group(members: &[&ApportionedCrash], params: &Parameters) -> CrashAggregate {
    let mut counts = CrashCounts::default();
    let mut crash_start = f64::INFINITY;
    let mut crash_end = f64::NEG_INFINITY;
    let mut crash_length = 0.0;
    let mut apportioned_length = 0.0;

    for row in members {
        counts += row.counts;
        crash_start = crash_start.min(row.crash_start);
        crash_end = crash_end.max(row.crash_end);
        crash_length += row.crash_length;
        apportioned_length += row.overlap;
    }

    // apportioned_length > 0: every row carries a positive overlap.
    let crash_rate = counts.total / apportioned_length / params.crash_years;

    CrashAggregate {
        severity_index: params.severity_weights.index(&counts),
        counts,
        crash_start,
        crash_end,
        crash_length,
        apportioned_length,
        crash_rate,
    }
}
