//! Linear-referencing reconciliation of volume and crash segments.
//!
//! The volume and crash datasets break each route into mileage intervals at
//! unrelated points. For every route this module:
//!
//! 1. repairs overlaps in the volume segments, producing the canonical grid
//!    ([`overlap::repair_overlaps`]);
//! 2. splits every crash segment across the grid intervals it overlaps, in
//!    proportion to length ([`apportion::apportion`]);
//! 3. sums the pieces per interval and recomputes severity index, crash rate
//!    and incident factor on the new boundaries ([`aggregate::aggregate`]).
//!
//! Routes are independent, so the per-route work runs on the rayon pool when
//! enabled. Results are collected in route order, which keeps the output and
//! the audit trail deterministic.

pub mod aggregate;
pub mod apportion;
pub mod index;
pub mod overlap;

pub use aggregate::CrashAggregate;
pub use apportion::{ApportionedCrash, Position};
pub use index::IntervalIndex;
pub use overlap::OverlapRepair;

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::Parameters;
use crate::diagnostics::StageReport;
use crate::error::{PipelineError, Result};
use crate::loaders::{CrashSegment, VolumeSegment};
use crate::route::RouteKey;

pub const STAGE: &str = "reconcile";

/// Identity of a canonical interval within its route: `(start, corrected end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalId {
    pub start: OrderedFloat<f64>,
    pub end: OrderedFloat<f64>,
}

impl IntervalId {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: OrderedFloat(start),
            end: OrderedFloat(end),
        }
    }
}

/// Join key shared by every stage downstream of reconciliation: route id
/// plus the left bound of the canonical interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey {
    pub route_id: String,
    pub left: OrderedFloat<f64>,
}

impl GridKey {
    pub fn new(route_id: impl Into<String>, left: f64) -> Self {
        Self {
            route_id: route_id.into(),
            left: OrderedFloat(left),
        }
    }
}

/// A volume segment on the repaired grid, `[start, corrected_end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInterval {
    pub segment: VolumeSegment,
    pub corrected_end: f64,
}

impl VolumeInterval {
    pub fn new(segment: VolumeSegment, corrected_end: f64) -> Self {
        Self {
            segment,
            corrected_end,
        }
    }

    pub fn start(&self) -> f64 {
        self.segment.start
    }

    pub fn end(&self) -> f64 {
        self.corrected_end
    }

    pub fn id(&self) -> IntervalId {
        IntervalId::new(self.start(), self.end())
    }

    pub fn route(&self) -> &RouteKey {
        &self.segment.route
    }
}

/// One canonical interval with its reconciled crash measures.
///
/// `crash` is `None` when no crash segment contributes to the interval,
/// including every interval of a route with no crash data at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSegment {
    pub interval: VolumeInterval,
    pub crash: Option<CrashAggregate>,
    pub incident_factor: Option<f64>,
}

impl ReconciledSegment {
    pub fn route(&self) -> &RouteKey {
        self.interval.route()
    }

    pub fn left(&self) -> f64 {
        self.interval.start()
    }

    pub fn right(&self) -> f64 {
        self.interval.end()
    }

    pub fn grid_key(&self) -> GridKey {
        GridKey::new(self.route().route_id.clone(), self.left())
    }

    pub fn severity_index(&self) -> Option<f64> {
        self.crash.as_ref().map(|c| c.severity_index)
    }
}

/// A crash segment excluded from apportionment because it has no length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegenerateCrash {
    pub route_id: String,
    pub st_mp_pt: f64,
    pub end_mp_pt: f64,
    pub total_cnt: f64,
}

/// Output of the reconciliation stage.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub segments: Vec<ReconciledSegment>,
    /// Routes with volume data and no crash rows.
    pub missing_crash_routes: BTreeSet<String>,
    /// Routes with crash rows and no volume data.
    pub crash_without_volume_routes: BTreeSet<String>,
    pub repairs: Vec<OverlapRepair>,
    pub degenerate: Vec<DegenerateCrash>,
    pub report: StageReport,
}

/// Per-route result before merging.
#[derive(Debug)]
struct RouteReconciliation {
    segments: Vec<ReconciledSegment>,
    repairs: Vec<OverlapRepair>,
    degenerate: Vec<DegenerateCrash>,
    missing_crash: bool,
    unmatched_crash_segments: usize,
    duplicate_crash_rows: usize,
}

/// Reconciles one route's volume segments with its crash segments.
fn reconcile_route(
    volume: Vec<VolumeSegment>,
    crashes: Option<&[&CrashSegment]>,
    params: &Parameters,
) -> Result<RouteReconciliation> {
    let (intervals, repairs) = overlap::repair_overlaps(volume);

    let Some(crashes) = crashes.filter(|c| !c.is_empty()) else {
        let segments = intervals
            .into_iter()
            .map(|interval| ReconciledSegment {
                interval,
                crash: None,
                incident_factor: None,
            })
            .collect();
        return Ok(RouteReconciliation {
            segments,
            repairs,
            degenerate: Vec::new(),
            missing_crash: true,
            unmatched_crash_segments: 0,
            duplicate_crash_rows: 0,
        });
    };

    let index = IntervalIndex::new(&intervals);
    let mut rows = Vec::new();
    let mut seen: HashSet<(IntervalId, OrderedFloat<f64>, OrderedFloat<f64>)> = HashSet::new();
    let mut degenerate = Vec::new();
    let mut unmatched_crash_segments = 0;
    let mut duplicate_crash_rows = 0;

    for crash in crashes {
        let pieces = match apportion::apportion(crash, &index) {
            Ok(pieces) => pieces,
            Err(PipelineError::DegenerateSegment { route_id, start, end }) => {
                degenerate.push(DegenerateCrash {
                    route_id,
                    st_mp_pt: start,
                    end_mp_pt: end,
                    total_cnt: crash.counts.total,
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        if pieces.is_empty() {
            unmatched_crash_segments += 1;
        }
        for piece in pieces {
            // One row per (interval, crash extent); repeated source rows are dropped.
            let key = (
                piece.interval,
                OrderedFloat(piece.crash_start),
                OrderedFloat(piece.crash_end),
            );
            if seen.insert(key) {
                rows.push(piece);
            } else {
                duplicate_crash_rows += 1;
            }
        }
    }

    // Only zero-length crash rows: the route has no usable crash data.
    let missing_crash = degenerate.len() == crashes.len();

    let aggregates = aggregate::aggregate(&rows, params);
    let segments = intervals
        .into_iter()
        .map(|interval| {
            let crash = aggregates.get(&interval.id()).cloned();
            let incident_factor = crash
                .as_ref()
                .map(|c| c.incident_factor(interval.segment.aadt, params.incident_factor_divisor));
            ReconciledSegment {
                interval,
                crash,
                incident_factor,
            }
        })
        .collect();

    Ok(RouteReconciliation {
        segments,
        repairs,
        degenerate,
        missing_crash,
        unmatched_crash_segments,
        duplicate_crash_rows,
    })
}

/// Builds the canonical grid for every volume route and apportions crash
/// counts onto it.
#[tracing::instrument(skip_all, fields(volume = volume.len(), crash = crash.len(), parallel = params.parallel))]
pub fn reconcile(
    volume: Vec<VolumeSegment>,
    crash: &[CrashSegment],
    params: &Parameters,
) -> Result<Reconciliation> {
    let volume_rows = volume.len();

    let mut volume_by_route: BTreeMap<RouteKey, Vec<VolumeSegment>> = BTreeMap::new();
    for seg in volume {
        volume_by_route.entry(seg.route.clone()).or_default().push(seg);
    }

    let mut crash_by_route: HashMap<&str, Vec<&CrashSegment>> = HashMap::new();
    for seg in crash {
        crash_by_route.entry(seg.route.route_id.as_str()).or_default().push(seg);
    }
    for segs in crash_by_route.values_mut() {
        segs.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    let volume_routes: HashSet<&str> = volume_by_route.keys().map(|k| k.route_id.as_str()).collect();
    let crash_without_volume_routes: BTreeSet<String> = crash_by_route
        .keys()
        .filter(|route_id| !volume_routes.contains(*route_id))
        .map(|route_id| route_id.to_string())
        .collect();

    let work: Vec<(RouteKey, Vec<VolumeSegment>)> = volume_by_route.into_iter().collect();
    let run = |(route, segs): (RouteKey, Vec<VolumeSegment>)| {
        let crashes = crash_by_route.get(route.route_id.as_str()).map(Vec::as_slice);
        reconcile_route(segs, crashes, params).map(|r| (route, r))
    };
    let results: Vec<(RouteKey, RouteReconciliation)> = if params.parallel {
        work.into_par_iter().map(run).collect::<Result<_>>()?
    } else {
        work.into_iter().map(run).collect::<Result<_>>()?
    };

    let route_count = results.len();
    let mut segments = Vec::with_capacity(volume_rows);
    let mut missing_crash_routes = BTreeSet::new();
    let mut repairs = Vec::new();
    let mut degenerate = Vec::new();
    let mut unmatched = 0;
    let mut duplicates = 0;

    for (route, r) in results {
        for repair in &r.repairs {
            debug!(
                route = %route,
                st_mp_pt = repair.st_mp_pt,
                end_mp_pt = repair.end_mp_pt,
                end_mp_pt_cor = repair.end_mp_pt_cor,
                "Overlapping volume interval repaired"
            );
        }
        for d in &r.degenerate {
            warn!(
                route = %route,
                st_mp_pt = d.st_mp_pt,
                "Zero-length crash segment excluded from apportionment"
            );
        }
        if r.missing_crash {
            debug!(route = %route, "No crash data for route");
            missing_crash_routes.insert(route.route_id.clone());
        }
        segments.extend(r.segments);
        repairs.extend(r.repairs);
        degenerate.extend(r.degenerate);
        unmatched += r.unmatched_crash_segments;
        duplicates += r.duplicate_crash_rows;
    }

    let intervals_without_crash = segments
        .iter()
        .filter(|s| s.crash.is_none() && !missing_crash_routes.contains(&s.route().route_id))
        .count();

    let mut report = StageReport::new(STAGE).with_rows(volume_rows, segments.len());
    report.count("routes", route_count);
    report.count("overlap_repairs", repairs.len());
    report.count("missing_crash_routes", missing_crash_routes.len());
    report.count("crash_routes_without_volume", crash_without_volume_routes.len());
    report.count("degenerate_crash_segments", degenerate.len());
    report.count("duplicate_crash_rows", duplicates);
    report.count("unmatched_crash_segments", unmatched);
    report.count("intervals_without_crash", intervals_without_crash);

    info!(
        routes = route_count,
        intervals = segments.len(),
        repairs = repairs.len(),
        missing_crash_routes = missing_crash_routes.len(),
        "Reconciliation complete"
    );

    Ok(Reconciliation {
        segments,
        missing_crash_routes,
        crash_without_volume_routes,
        repairs,
        degenerate,
        report,
    })
}
