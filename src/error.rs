//! Error types for the roadway rating pipeline.

use thiserror::Error;

/// Result type used across the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that stop a pipeline run.
///
/// Non-fatal conditions (missing cross-dataset matches, overlap repairs,
/// degenerate crash segments) never surface here; they are counted in
/// [`crate::diagnostics::RunDiagnostics`] and written to side artifacts.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A required column is absent from an input table header.
    #[error("{dataset}: required column '{column}' not found")]
    MissingColumn { dataset: String, column: String },

    /// A value is missing or malformed in a required column.
    #[error("{dataset}: row {row}, column '{column}': {message}")]
    Validation {
        dataset: String,
        row: usize,
        column: String,
        message: String,
    },

    #[error("invalid route identifier '{route_id}': {reason}")]
    InvalidRouteId { route_id: String, reason: String },

    /// The county encoded in the route identifier disagrees with the
    /// reported county column.
    #[error("{dataset}: route {route_id} encodes county {derived} but row reports county {reported}")]
    CountyMismatch {
        dataset: String,
        route_id: String,
        derived: u32,
        reported: u32,
    },

    /// An overlap computation produced a length ratio outside (0, 1].
    #[error(
        "route {route_id}: crash segment [{crash_start}, {crash_end}) against interval \
         [{interval_start}, {interval_end}) produced ratio {ratio}"
    )]
    InvalidApportionRatio {
        route_id: String,
        crash_start: f64,
        crash_end: f64,
        interval_start: f64,
        interval_end: f64,
        ratio: f64,
    },

    /// A zero-length segment was offered as an apportionment denominator.
    #[error("route {route_id}: degenerate segment [{start}, {end}) has no length")]
    DegenerateSegment {
        route_id: String,
        start: f64,
        end: f64,
    },

    /// The two census growth formulations disagree for a tract.
    #[error("tract {geoid}: yearly growth {from_rate} (from rate) != {from_flows} (from flows)")]
    GrowthRateMismatch {
        geoid: String,
        from_rate: f64,
        from_flows: f64,
    },
}

impl PipelineError {
    pub(crate) fn validation(
        dataset: &str,
        row: usize,
        column: &str,
        message: impl Into<String>,
    ) -> Self {
        PipelineError::Validation {
            dataset: dataset.to_string(),
            row,
            column: column.to_string(),
            message: message.into(),
        }
    }
}
