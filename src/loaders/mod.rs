//! Dataset loaders for the two linear-referenced inputs.
//!
//! Both loaders decode the route identifier, validate the rows the pipeline
//! depends on and drop route classes above the configured maximum. Any
//! validation failure aborts the load.

pub mod crash;
pub mod volume;

pub use crash::{CrashSegment, load_crash_segments};
pub use volume::{VolumeSegment, load_volume_segments};

use crate::error::{PipelineError, Result};
use crate::reader::{Column, Row};
use crate::route::{RouteIdParts, RouteKey};

/// Checks the county encoded in the route against the reported county.
pub(crate) fn check_county(dataset: &str, route: &RouteKey, reported: u32) -> Result<()> {
    if route.county != reported {
        return Err(PipelineError::CountyMismatch {
            dataset: dataset.to_string(),
            route_id: route.route_id.clone(),
            derived: route.county,
            reported,
        });
    }
    Ok(())
}

/// Reads a `[start, end]` milepost pair and enforces `start <= end`.
pub(crate) fn read_mileposts(row: &Row<'_>, start: &Column, end: &Column) -> Result<(f64, f64)> {
    let st = row.required_f64(start)?;
    let en = row.required_f64(end)?;
    if st > en {
        return Err(row.invalid(end, format!("end milepost {en} precedes start milepost {st}")));
    }
    Ok((st, en))
}

/// Decodes the route column, wrapping identifier errors with the row position.
pub(crate) fn read_route(row: &Row<'_>, column: &Column) -> Result<RouteIdParts> {
    let raw = row.required_str(column)?;
    RouteIdParts::parse(raw).map_err(|e| row.invalid(column, e.to_string()))
}
