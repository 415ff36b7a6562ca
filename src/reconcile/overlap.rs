//! Overlap repair for volume segments on one route.

use serde::Serialize;

use super::VolumeInterval;
use crate::loaders::VolumeSegment;

/// Audit record for a volume segment whose end was clamped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapRepair {
    pub route_id: String,
    pub st_mp_pt: f64,
    pub end_mp_pt: f64,
    pub next_st_mp_pt: f64,
    pub end_mp_pt_cor: f64,
}

/// Turns the volume segments of one route into the canonical interval grid.
///
/// Segments are ordered by start milepost. Each segment's end is clamped to
/// the start of its successor when it runs past it; the last segment keeps
/// its end. The result is ordered and non-overlapping, and every clamp is
/// returned as an [`OverlapRepair`].
pub fn repair_overlaps(mut segments: Vec<VolumeSegment>) -> (Vec<VolumeInterval>, Vec<OverlapRepair>) {
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let next_starts: Vec<f64> = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| segments.get(i + 1).map_or(seg.end, |next| next.start))
        .collect();

    let mut repairs = Vec::new();
    let intervals = segments
        .into_iter()
        .zip(next_starts)
        .map(|(segment, next_start)| {
            let corrected_end = segment.end.min(next_start);
            if next_start < segment.end {
                repairs.push(OverlapRepair {
                    route_id: segment.route.route_id.clone(),
                    st_mp_pt: segment.start,
                    end_mp_pt: segment.end,
                    next_st_mp_pt: next_start,
                    end_mp_pt_cor: corrected_end,
                });
            }
            VolumeInterval::new(segment, corrected_end)
        })
        .collect();

    (intervals, repairs)
}
