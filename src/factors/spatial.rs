//! Spatial-join crosswalks.
//!
//! Point-in-polygon and line-intersection joins run in an external GIS step.
//! Its result arrives here as a crosswalk table of
//! `(route_id, aadt_interval_left, <feature id>)`, one row per intersecting
//! pair.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::reader::Table;
use crate::reconcile::{GridKey, ReconciledSegment};
use crate::route::RouteIdParts;

/// One grid interval intersecting one external feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrosswalkMatch {
    pub key: GridKey,
    pub feature_id: String,
}

/// Drops a fractional suffix left on identifiers exported as floats.
pub(crate) fn strip_fraction(raw: &str) -> &str {
    match raw.split_once('.') {
        Some((whole, frac)) if frac.bytes().all(|b| b == b'0') => whole,
        _ => raw,
    }
}

/// Loads a crosswalk whose feature identifier lives in `feature_column`.
pub fn load_crosswalk(table: &Table, feature_column: &str) -> Result<Vec<CrosswalkMatch>> {
    let route_col = table.column("route_id")?;
    let left_col = table.column("aadt_interval_left")?;
    let feature_col = table.column(feature_column)?;

    table
        .rows()
        .map(|row| {
            let raw = row.required_str(&route_col)?;
            let route = RouteIdParts::parse(raw).map_err(|e| row.invalid(&route_col, e.to_string()))?;
            let left = row.required_f64(&left_col)?;
            let feature_id = strip_fraction(row.required_str(&feature_col)?).to_string();
            Ok(CrosswalkMatch {
                key: GridKey::new(route.route_id, left),
                feature_id,
            })
        })
        .collect()
}

/// The set of grid keys a crosswalk may refer to.
pub fn grid_keys(segments: &[ReconciledSegment]) -> BTreeSet<GridKey> {
    segments.iter().map(ReconciledSegment::grid_key).collect()
}
