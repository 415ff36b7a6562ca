//! Traffic volume (AADT) segments.

use tracing::{info, warn};

use super::{check_county, read_mileposts, read_route};
use crate::config::PipelineConfig;
use crate::diagnostics::StageReport;
use crate::error::Result;
use crate::reader::Table;
use crate::route::RouteKey;

pub const STAGE: &str = "volume_segments";

/// One traffic volume segment along a route.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSegment {
    pub route: RouteKey,
    pub start: f64,
    pub end: f64,
    pub aadt: f64,
    pub aadtt: Option<f64>,
    pub source: Option<String>,
    /// Line geometry as WKT.
    pub geometry: String,
}

impl VolumeSegment {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Loads and validates volume segments.
///
/// Required values: route id, begin/end milepost and the configured AADT
/// field. Rows with no geometry are dropped after class filtering.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_volume_segments(
    table: &Table,
    config: &PipelineConfig,
) -> Result<(Vec<VolumeSegment>, StageReport)> {
    let fields = &config.fields;
    let route_col = table.column("route_id")?;
    let begin_col = table.column("begin_mp")?;
    let end_col = table.column("end_mp")?;
    let aadt_col = table.column(&fields.aadt)?;
    let aadtt_col = table.optional_column(&fields.aadtt);
    let county_col = table.optional_column("county");
    let source_col = table.optional_column("source");
    let geometry_col = table.optional_column("geometry");

    if aadtt_col.is_none() {
        warn!(column = %fields.aadtt, "Truck AADT column not found; aadtt_val will be empty");
    }

    let mut report = StageReport::new(STAGE);
    let mut segments = Vec::with_capacity(table.len());
    let mut filtered_class = 0;
    let mut missing_geometry = 0;

    for row in table.rows() {
        let parts = read_route(&row, &route_col)?;
        let (start, end) = read_mileposts(&row, &begin_col, &end_col)?;
        let aadt = row.required_f64(&aadt_col)?;
        let aadtt = row.optional_f64(aadtt_col.as_ref())?;

        if parts.class_code > config.parameters.max_route_class {
            filtered_class += 1;
            continue;
        }
        let route = parts.into_key().map_err(|e| row.invalid(&route_col, e.to_string()))?;

        if let Some(county) = row.optional_u32(county_col.as_ref())? {
            check_county(table.dataset(), &route, county)?;
        }

        let Some(geometry) = row.get_opt(geometry_col.as_ref()) else {
            missing_geometry += 1;
            continue;
        };

        segments.push(VolumeSegment {
            route,
            start,
            end,
            aadt,
            aadtt,
            source: row.get_opt(source_col.as_ref()).map(str::to_string),
            geometry: geometry.to_string(),
        });
    }

    report.count("filtered_route_class", filtered_class);
    report.count("missing_geometry", missing_geometry);
    let report = report.with_rows(table.len(), segments.len());

    info!(
        kept = segments.len(),
        filtered_class, missing_geometry, "Volume segments loaded"
    );
    Ok((segments, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::route::RouteClass;

    const HEADER: &str = "route_id,begin_mp,end_mp,aadt_2018,aadtt2018,county,source,geometry";

    fn load(rows: &[&str]) -> Result<(Vec<VolumeSegment>, StageReport)> {
        let csv = format!("{HEADER}\n{}\n", rows.join("\n"));
        let table = Table::from_reader("volume", csv.as_bytes()).unwrap();
        load_volume_segments(&table, &PipelineConfig::default())
    }

    #[test]
    fn test_load_derives_route_fields() {
        let (segments, report) =
            load(&["10000495092,0.0,5.0,42000,3100,92,NCDOT,\"LINESTRING (0 0, 1 1)\""]).unwrap();
        assert_eq!(segments.len(), 1);
        let seg = &segments[0];
        assert_eq!(seg.route.class, RouteClass::Interstate);
        assert_eq!(seg.route.number, 495);
        assert_eq!(seg.length(), 5.0);
        assert_eq!(seg.aadtt, Some(3100.0));
        assert_eq!(report.rows_out, 1);
    }

    #[test]
    fn test_secondary_routes_are_filtered() {
        let (segments, report) = load(&[
            "40001234092,0.0,1.0,800,,92,,\"LINESTRING (0 0, 1 1)\"",
            "30000054092,0.0,1.0,9000,,92,,\"LINESTRING (0 0, 1 1)\"",
        ])
        .unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(report.get("filtered_route_class"), 1);
    }

    #[test]
    fn test_missing_geometry_is_dropped_and_counted() {
        let (segments, report) = load(&["10000495092,0.0,5.0,42000,,92,,"]).unwrap();
        assert!(segments.is_empty());
        assert_eq!(report.get("missing_geometry"), 1);
    }

    #[test]
    fn test_non_numeric_aadt_is_fatal() {
        let err = load(&["10000495092,0.0,5.0,lots,,92,,\"LINESTRING (0 0, 1 1)\""]).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn test_missing_aadt_is_fatal() {
        assert!(load(&["10000495092,0.0,5.0,,,92,,\"LINESTRING (0 0, 1 1)\""]).is_err());
    }

    #[test]
    fn test_county_mismatch_is_fatal() {
        let err = load(&["10000495092,0.0,5.0,42000,,91,,\"LINESTRING (0 0, 1 1)\""]).unwrap_err();
        assert!(matches!(err, PipelineError::CountyMismatch { .. }));
    }

    #[test]
    fn test_inverted_mileposts_are_fatal() {
        assert!(load(&["10000495092,5.0,1.0,42000,,92,,\"LINESTRING (0 0, 1 1)\""]).is_err());
    }
}
