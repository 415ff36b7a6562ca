//! Length-ratio apportionment of crash counts onto volume intervals.
//!
//! Crashes are assumed uniformly distributed along a crash segment, so the
//! share of its counts that belongs to a volume interval is the share of its
//! length that falls inside that interval.

use serde::Serialize;

use super::index::IntervalIndex;
use super::{IntervalId, VolumeInterval};
use crate::error::{PipelineError, Result};
use crate::loaders::CrashSegment;
use crate::severity::CrashCounts;

/// Tolerance above 1 accepted for a length ratio before it is treated as a
/// logic error; covers rounding in `ve - vs` against `ce - cs`.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Where a crash segment `[cs, ce)` sits relative to a volume interval `[vs, ve)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Starts before the interval and ends inside it.
    LeftOverrun,
    /// Starts before and ends after the interval.
    SpansBoth,
    /// Lies entirely inside the interval.
    Contained,
    /// Starts inside the interval and ends after it.
    RightOverrun,
}

impl Position {
    pub fn classify(cs: f64, ce: f64, vs: f64, ve: f64) -> Self {
        match (cs < vs, ce > ve) {
            (true, false) => Position::LeftOverrun,
            (true, true) => Position::SpansBoth,
            (false, false) => Position::Contained,
            (false, true) => Position::RightOverrun,
        }
    }

    /// Length of the crash segment lying inside the interval.
    pub fn overlap(self, cs: f64, ce: f64, vs: f64, ve: f64) -> f64 {
        let len = ce - cs;
        match self {
            Position::LeftOverrun => len - (vs - cs),
            Position::SpansBoth => ve - vs,
            Position::Contained => len,
            Position::RightOverrun => len - (ce - ve),
        }
    }
}

/// One crash segment's share of one volume interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ApportionedCrash {
    pub interval: IntervalId,
    pub position: Position,
    pub crash_start: f64,
    pub crash_end: f64,
    /// Full length of the crash segment.
    pub crash_length: f64,
    /// Length of the crash segment inside the interval.
    pub overlap: f64,
    pub ratio: f64,
    pub counts: CrashCounts,
}

/// Splits a crash segment across every volume interval it overlaps.
///
/// Returns one row per overlapped interval; an empty result means the crash
/// segment falls entirely in a gap of the volume grid.
///
/// # Errors
///
/// [`PipelineError::DegenerateSegment`] when the crash segment has no length,
/// and [`PipelineError::InvalidApportionRatio`] when an overlap produces a
/// ratio outside `(0, 1]`.
pub fn apportion(crash: &CrashSegment, index: &IntervalIndex<'_>) -> Result<Vec<ApportionedCrash>> {
    let (cs, ce) = (crash.start, crash.end);
    let len = crash.length();
    if len <= 0.0 {
        return Err(PipelineError::DegenerateSegment {
            route_id: crash.route.route_id.clone(),
            start: cs,
            end: ce,
        });
    }

    index
        .overlapping(cs, ce)
        .map(|iv| apportion_one(crash, iv, len))
        .collect()
}

fn apportion_one(crash: &CrashSegment, interval: &VolumeInterval, len: f64) -> Result<ApportionedCrash> {
    let (cs, ce) = (crash.start, crash.end);
    let (vs, ve) = (interval.start(), interval.end());

    let position = Position::classify(cs, ce, vs, ve);
    let overlap = position.overlap(cs, ce, vs, ve);
    let ratio = overlap / len;

    if !(ratio > 0.0 && ratio <= 1.0 + RATIO_TOLERANCE) {
        return Err(PipelineError::InvalidApportionRatio {
            route_id: crash.route.route_id.clone(),
            crash_start: cs,
            crash_end: ce,
            interval_start: vs,
            interval_end: ve,
            ratio,
        });
    }
    let ratio = ratio.min(1.0);

    Ok(ApportionedCrash {
        interval: interval.id(),
        position,
        crash_start: cs,
        crash_end: ce,
        crash_length: len,
        overlap,
        ratio,
        counts: crash.counts.scaled(ratio),
    })
}
