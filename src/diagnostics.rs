//! Per-stage run diagnostics.
//!
//! Every stage reports how many rows it consumed and produced, plus named
//! counts of the non-fatal conditions it handled (missing matches, repairs,
//! dropped rows). The collected report is logged at completion and written
//! next to the scored output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub conditions: BTreeMap<String, usize>,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Default::default()
        }
    }

    pub fn with_rows(mut self, rows_in: usize, rows_out: usize) -> Self {
        self.rows_in = rows_in;
        self.rows_out = rows_out;
        self
    }

    /// Adds `n` to a named condition. Zero counts are still recorded so the
    /// report lists every condition a stage checks.
    pub fn count(&mut self, condition: &str, n: usize) {
        *self.conditions.entry(condition.to_string()).or_default() += n;
    }

    pub fn get(&self, condition: &str) -> usize {
        self.conditions.get(condition).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDiagnostics {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
}

impl Default for RunDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunDiagnostics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Records a finished stage and logs its counts.
    pub fn record(&mut self, report: StageReport) {
        info!(
            stage = %report.stage,
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            conditions = ?report.conditions,
            "Stage complete"
        );
        self.stages.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
