//! Crash (section safety score) segments.

use tracing::info;

use super::{check_county, read_mileposts, read_route};
use crate::config::PipelineConfig;
use crate::diagnostics::StageReport;
use crate::error::Result;
use crate::reader::{Column, Row, Table};
use crate::route::RouteKey;
use crate::severity::CrashCounts;

pub const STAGE: &str = "crash_segments";

/// One crash segment with its counts over the reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashSegment {
    pub route: RouteKey,
    pub start: f64,
    pub end: f64,
    pub counts: CrashCounts,
    /// Severity index of the segment as published, before apportionment.
    pub severity_index: f64,
    pub geometry: Option<String>,
}

impl CrashSegment {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

fn count(row: &Row<'_>, column: &Column) -> Result<f64> {
    let value = row.required_f64(column)?;
    if value < 0.0 {
        return Err(row.invalid(column, format!("crash count cannot be negative, got {value}")));
    }
    Ok(value)
}

/// Loads crash segments, validates counties and computes a severity index
/// per segment.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_crash_segments(
    table: &Table,
    config: &PipelineConfig,
) -> Result<(Vec<CrashSegment>, StageReport)> {
    let fields = &config.fields;
    let route_col = table.column(&fields.crash_route)?;
    let start_col = table.column("st_mp_pt")?;
    let end_col = table.column("end_mp_pt")?;
    let county_col = table.column("county")?;
    let ka_col = table.column("ka_cnt")?;
    let bc_col = table.column("bc_cnt")?;
    let pdo_col = table.column("pdo_cnt")?;
    let total_col = table.column(&fields.crash_total)?;
    let geometry_col = table.optional_column("geometry");

    let weights = config.parameters.severity_weights;
    let mut report = StageReport::new(STAGE);
    let mut segments = Vec::with_capacity(table.len());
    let mut filtered_class = 0;
    let mut zero_length = 0;

    for row in table.rows() {
        let parts = read_route(&row, &route_col)?;
        if parts.class_code > config.parameters.max_route_class {
            filtered_class += 1;
            continue;
        }
        let route = parts.into_key().map_err(|e| row.invalid(&route_col, e.to_string()))?;
        check_county(table.dataset(), &route, row.required_u32(&county_col)?)?;

        let (start, end) = read_mileposts(&row, &start_col, &end_col)?;
        if start == end {
            zero_length += 1;
        }

        let counts = CrashCounts {
            ka: count(&row, &ka_col)?,
            bc: count(&row, &bc_col)?,
            pdo: count(&row, &pdo_col)?,
            total: count(&row, &total_col)?,
        };

        segments.push(CrashSegment {
            severity_index: weights.index(&counts),
            route,
            start,
            end,
            counts,
            geometry: row.get_opt(geometry_col.as_ref()).map(str::to_string),
        });
    }

    report.count("filtered_route_class", filtered_class);
    report.count("zero_length_segments", zero_length);
    let report = report.with_rows(table.len(), segments.len());

    info!(
        kept = segments.len(),
        filtered_class, zero_length, "Crash segments loaded"
    );
    Ok((segments, report))
}
