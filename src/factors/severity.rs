//! Scaled severity index (`si_fac`).

use tracing::info;

use crate::config::Parameters;
use crate::diagnostics::StageReport;
use crate::percentile::PercentileScaler;
use crate::reconcile::ReconciledSegment;

pub const STAGE: &str = "severity_scaler";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityScore {
    /// Severity index after filling missing values.
    pub severity_index: f64,
    pub si_fac: f64,
    pub above_cut: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityScaling {
    pub cut: Option<f64>,
    /// One score per input segment, in input order.
    pub scores: Vec<SeverityScore>,
}

/// Scales the reconciled severity index of every grid interval.
#[tracing::instrument(skip_all, fields(intervals = segments.len()))]
pub fn scale_severity(segments: &[ReconciledSegment], params: &Parameters) -> (SeverityScaling, StageReport) {
    let values: Vec<Option<f64>> = segments.iter().map(ReconciledSegment::severity_index).collect();
    let scaled = PercentileScaler::new(params.severity_cut_quantile).scale(&values);

    let scores: Vec<SeverityScore> = scaled
        .filled
        .iter()
        .zip(&scaled.above_cut)
        .zip(&scaled.scaled)
        .map(|((&severity_index, &above_cut), &si_fac)| SeverityScore {
            severity_index,
            si_fac,
            above_cut,
        })
        .collect();

    let missing = values.iter().filter(|v| v.is_none()).count();
    let above = scores.iter().filter(|s| s.above_cut).count();

    let mut report = StageReport::new(STAGE).with_rows(segments.len(), scores.len());
    report.count("filled_missing_severity", missing);
    report.count("above_cut", above);

    info!(cut = ?scaled.cut, missing, above, "Severity index scaled");
    (
        SeverityScaling {
            cut: scaled.cut,
            scores,
        },
        report,
    )
}
