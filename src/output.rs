//! Output writers for the scored dataset and its side artifacts.
//!
//! Tables are written as CSV, optionally gzip compressed; the run
//! diagnostics as pretty-printed JSON.

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::diagnostics::RunDiagnostics;
use crate::error::Result;
use crate::reconcile::{Reconciliation, ReconciledSegment};

pub const SCORED_SEGMENTS: &str = "scored_segments.csv";
pub const RECONCILED_SEGMENTS: &str = "reconciled_segments.csv";
pub const MISSING_CRASH_ROUTES: &str = "missing_crash_routes.csv";
pub const MISSING_CRASH_ROWS: &str = "missing_crash_rows.csv";
pub const OVERLAP_REPAIRS: &str = "overlap_repairs.csv";
pub const DEGENERATE_CRASH_SEGMENTS: &str = "degenerate_crash_segments.csv";
pub const RUN_DIAGNOSTICS: &str = "run_diagnostics.json";

/// Writes `rows` as CSV with a header row. With `gzip` the file gets a `.gz`
/// suffix and is compressed. Returns the path written.
pub fn write_csv<'a, T, I>(path: &Path, rows: I, gzip: bool) -> Result<PathBuf>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (path, count) = if gzip {
        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        let path = PathBuf::from(name);
        let file = File::create(&path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let (encoder, count) = serialize_rows(encoder, rows)?;
        encoder.finish()?.flush()?;
        (path, count)
    } else {
        let file = File::create(path)?;
        let (mut sink, count) = serialize_rows(BufWriter::new(file), rows)?;
        sink.flush()?;
        (path.to_path_buf(), count)
    };

    debug!(path = %path.display(), rows = count, gzip, "CSV written");
    Ok(path)
}

fn serialize_rows<'a, W, T, I>(sink: W, rows: I) -> Result<(W, usize)>
where
    W: Write,
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(sink);
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    let sink = writer.into_inner().map_err(|e| e.into_error())?;
    Ok((sink, count))
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Logs the run diagnostics as pretty-printed JSON.
pub fn print_json(diagnostics: &RunDiagnostics) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(diagnostics)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct MissingCrashRoute<'a> {
    route_id: &'a str,
}

/// Reconciled grid row, written by the reconcile-only run.
#[derive(Debug, Serialize)]
pub struct ReconciledRecord<'a> {
    pub route_id: &'a str,
    pub route_class: &'static str,
    pub aadt_interval_left: f64,
    pub aadt_interval_right: f64,
    pub st_end_diff_aadt: f64,
    pub aadt_val: f64,
    pub aadtt_val: Option<f64>,
    pub st_mp_pt_crash: Option<f64>,
    pub end_mp_pt_crash: Option<f64>,
    pub st_end_diff_crash: Option<f64>,
    pub seg_len_in_interval: Option<f64>,
    pub ka_cnt: Option<f64>,
    pub bc_cnt: Option<f64>,
    pub pdo_cnt: Option<f64>,
    pub total_cnt: Option<f64>,
    pub severity_index: Option<f64>,
    pub crash_rate_per_mile_per_year: Option<f64>,
    pub inc_fac: Option<f64>,
    pub geometry: &'a str,
}

impl<'a> From<&'a ReconciledSegment> for ReconciledRecord<'a> {
    fn from(seg: &'a ReconciledSegment) -> Self {
        let crash = seg.crash.as_ref();
        let volume = &seg.interval.segment;
        Self {
            route_id: &volume.route.route_id,
            route_class: volume.route.class.label(),
            aadt_interval_left: seg.left(),
            aadt_interval_right: seg.right(),
            st_end_diff_aadt: volume.length(),
            aadt_val: volume.aadt,
            aadtt_val: volume.aadtt,
            st_mp_pt_crash: crash.map(|c| c.crash_start),
            end_mp_pt_crash: crash.map(|c| c.crash_end),
            st_end_diff_crash: crash.map(|c| c.crash_length),
            seg_len_in_interval: crash.map(|c| c.apportioned_length),
            ka_cnt: crash.map(|c| c.counts.ka),
            bc_cnt: crash.map(|c| c.counts.bc),
            pdo_cnt: crash.map(|c| c.counts.pdo),
            total_cnt: crash.map(|c| c.counts.total),
            severity_index: crash.map(|c| c.severity_index),
            crash_rate_per_mile_per_year: crash.map(|c| c.crash_rate),
            inc_fac: seg.incident_factor,
            geometry: &volume.geometry,
        }
    }
}

/// Writes the reconciliation side artifacts: missing-crash routes, overlap
/// repairs and degenerate crash segments.
pub fn write_reconciliation_artifacts(dir: &Path, reconciliation: &Reconciliation) -> Result<()> {
    let missing: Vec<MissingCrashRoute<'_>> = reconciliation
        .missing_crash_routes
        .iter()
        .map(|route_id| MissingCrashRoute { route_id })
        .collect();
    write_csv(&dir.join(MISSING_CRASH_ROUTES), &missing, false)?;
    write_csv(&dir.join(OVERLAP_REPAIRS), &reconciliation.repairs, false)?;
    write_csv(&dir.join(DEGENERATE_CRASH_SEGMENTS), &reconciliation.degenerate, false)?;
    info!(
        dir = %dir.display(),
        missing_crash_routes = missing.len(),
        repairs = reconciliation.repairs.len(),
        degenerate = reconciliation.degenerate.len(),
        "Reconciliation artifacts written"
    );
    Ok(())
}

/// Writes the reconciled grid itself.
pub fn write_reconciled(path: &Path, segments: &[ReconciledSegment], gzip: bool) -> Result<PathBuf> {
    let records: Vec<ReconciledRecord<'_>> = segments.iter().map(ReconciledRecord::from).collect();
    write_csv(path, &records, gzip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[derive(Serialize)]
    struct Row {
        route_id: String,
        value: Option<f64>,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                route_id: "10000040001".into(),
                value: Some(1.5),
            },
            Row {
                route_id: "20000070001".into(),
                value: None,
            },
        ]
    }

    #[test]
    fn test_write_csv_plain() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir.path().join("rows.csv"), &rows(), false).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["route_id,value", "10000040001,1.5", "20000070001,"]);
    }

    #[test]
    fn test_write_csv_gzip_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir.path().join("rows.csv"), &rows(), true).unwrap();
        assert!(path.to_string_lossy().ends_with("rows.csv.gz"));

        let mut content = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.starts_with("route_id,value\n"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_write_csv_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("rows.csv");
        write_csv(&path, &rows(), false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_json_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RUN_DIAGNOSTICS);
        let mut diagnostics = RunDiagnostics::new();
        diagnostics.finish();
        write_json(&path, &diagnostics).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["stages"].as_array().unwrap().is_empty());
        assert!(value["finished_at"].is_string());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&RunDiagnostics::new()).unwrap();
    }
}
