//! Stage runner.
//!
//! Runs the stages in dependency order, records each stage's report and
//! writes the scored dataset with its side artifacts to the output
//! directory.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::classify::{classify_routes, load_national_highways};
use crate::config::PipelineConfig;
use crate::diagnostics::RunDiagnostics;
use crate::factors::{join_growth, join_seasonal, load_census_growth, load_crosswalk, load_seasonal_volumes, scale_severity};
use crate::loaders::{load_crash_segments, load_volume_segments};
use crate::merge::{MergeInputs, ScoredSegment, load_detour_scores, merge};
use crate::output;
use crate::reader::Table;
use crate::reconcile::{Reconciliation, reconcile};
use crate::route::RouteKey;

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub rows: usize,
    pub output: PathBuf,
    pub diagnostics: RunDiagnostics,
}

fn load_table(dataset: &str, path: &Path) -> Result<Table> {
    Table::from_path(dataset, path).with_context(|| format!("Failed to read {dataset} from {}", path.display()))
}

/// Stages 1 to 3: load both linear-referenced datasets and reconcile them.
#[tracing::instrument(skip_all)]
pub fn reconcile_stage(config: &PipelineConfig, diagnostics: &mut RunDiagnostics) -> Result<Reconciliation> {
    let inputs = &config.inputs;

    let table = load_table("volume_segments", &inputs.volume_segments)?;
    let (volume, report) = load_volume_segments(&table, config)?;
    diagnostics.record(report);

    let table = load_table("crash_segments", &inputs.crash_segments)?;
    let (crash, report) = load_crash_segments(&table, config)?;
    diagnostics.record(report);

    let reconciliation = reconcile(volume, &crash, &config.parameters)?;
    diagnostics.record(reconciliation.report.clone());
    Ok(reconciliation)
}

/// Runs every stage and writes the scored dataset.
#[tracing::instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let mut diagnostics = RunDiagnostics::new();
    let inputs = &config.inputs;
    let params = &config.parameters;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let reconciliation = reconcile_stage(config, &mut diagnostics)?;
    output::write_reconciliation_artifacts(&config.output_dir, &reconciliation)?;
    let segments = &reconciliation.segments;

    let table = load_table("national_highways", &inputs.national_highways)?;
    let (hpms, report) = load_national_highways(&table)?;
    diagnostics.record(report);
    let routes: BTreeSet<RouteKey> = segments.iter().map(|s| s.route().clone()).collect();
    let (importance, report) = classify_routes(&routes, &hpms);
    diagnostics.record(report);

    let table = load_table("seasonal_volumes", &inputs.seasonal_volumes)?;
    let (seasonal_records, report) = load_seasonal_volumes(&table)?;
    diagnostics.record(report);
    let table = load_table("seasonal_crosswalk", &inputs.seasonal_crosswalk)?;
    let crosswalk = load_crosswalk(&table, "feature_id")?;
    let (seasonal, report) = join_seasonal(segments, &seasonal_records, &crosswalk);
    diagnostics.record(report);

    let table = load_table("census_growth", &inputs.census_growth)?;
    let (tracts, report) = load_census_growth(&table, params)?;
    diagnostics.record(report);
    let table = load_table("census_crosswalk", &inputs.census_crosswalk)?;
    let crosswalk = load_crosswalk(&table, "geoid10")?;
    let (growth, report) = join_growth(segments, &tracts, &crosswalk, params);
    diagnostics.record(report);

    let (severity, report) = scale_severity(segments, params);
    diagnostics.record(report);

    let table = load_table("detour_scores", &inputs.detour_scores)?;
    let (detour, report) = load_detour_scores(&table, params)?;
    diagnostics.record(report);

    let (scored, report) = merge(&MergeInputs {
        segments,
        severity: &severity,
        importance: &importance,
        seasonal: &seasonal,
        growth: &growth,
        detour: &detour,
    });
    diagnostics.record(report);

    let path = output::write_csv(&config.output_path(output::SCORED_SEGMENTS), &scored, config.gzip)
        .context("Failed to write scored segments")?;
    let missing: Vec<&ScoredSegment> = scored.iter().filter(|r| !r.has_crash_data()).collect();
    output::write_csv(
        &config.output_path(output::MISSING_CRASH_ROWS),
        missing.iter().copied(),
        false,
    )?;

    finish(config, diagnostics, scored.len(), path)
}

/// Runs stages 1 to 3 only and writes the reconciled grid.
#[tracing::instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub fn run_reconcile(config: &PipelineConfig) -> Result<RunSummary> {
    let mut diagnostics = RunDiagnostics::new();
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let reconciliation = reconcile_stage(config, &mut diagnostics)?;
    output::write_reconciliation_artifacts(&config.output_dir, &reconciliation)?;
    let path = output::write_reconciled(
        &config.output_path(output::RECONCILED_SEGMENTS),
        &reconciliation.segments,
        config.gzip,
    )
    .context("Failed to write reconciled segments")?;

    finish(config, diagnostics, reconciliation.segments.len(), path)
}

fn finish(config: &PipelineConfig, mut diagnostics: RunDiagnostics, rows: usize, path: PathBuf) -> Result<RunSummary> {
    diagnostics.finish();
    output::write_json(&config.output_path(output::RUN_DIAGNOSTICS), &diagnostics)?;
    output::print_json(&diagnostics)?;
    info!(rows, output = %path.display(), "Run complete");
    Ok(RunSummary {
        rows,
        output: path,
        diagnostics,
    })
}
