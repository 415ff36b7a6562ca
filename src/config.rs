//! Pipeline configuration.
//!
//! Stored as a JSON object on disk; every key is optional and falls back to
//! the defaults below:
//! ```json
//! {
//!   "inputs": {
//!     "volume_segments": "data/raw/aadt_segments.csv",
//!     "crash_segments": "data/raw/section_scores.csv"
//!   },
//!   "fields": { "aadt": "aadt_2020", "aadtt": "aadtt_2020" },
//!   "output_dir": "output",
//!   "parameters": { "crash_years": 5.0, "parallel": true }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::severity::SeverityWeights;

/// Locations of every input table the pipeline reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub volume_segments: PathBuf,
    pub crash_segments: PathBuf,
    pub national_highways: PathBuf,
    pub seasonal_volumes: PathBuf,
    pub seasonal_crosswalk: PathBuf,
    pub census_growth: PathBuf,
    pub census_crosswalk: PathBuf,
    pub detour_scores: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        let raw = Path::new("data").join("raw");
        Self {
            volume_segments: raw.join("aadt_segments.csv"),
            crash_segments: raw.join("section_safety_scores.csv"),
            national_highways: raw.join("hpms_routes.csv"),
            seasonal_volumes: raw.join("padt_segments.csv"),
            seasonal_crosswalk: raw.join("padt_crosswalk.csv"),
            census_growth: raw.join("census_tract_growth.csv"),
            census_crosswalk: raw.join("census_tract_crosswalk.csv"),
            detour_scores: raw.join("detour_scores.csv"),
        }
    }
}

/// Source column names that change with each data vintage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub aadt: String,
    pub aadtt: String,
    pub crash_route: String,
    pub crash_total: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            aadt: "aadt_2018".to_string(),
            aadtt: "aadtt2018".to_string(),
            crash_route: "route_gis".to_string(),
            crash_total: "total_cnt".to_string(),
        }
    }
}

/// Numeric knobs of the scoring model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Highest route class kept (1 Interstate, 2 US, 3 State, 4 Secondary).
    pub max_route_class: u8,
    /// Years covered by the crash dataset.
    pub crash_years: f64,
    /// Divisor applied when turning crash rate × AADT into an incident factor.
    pub incident_factor_divisor: f64,
    pub severity_weights: SeverityWeights,
    pub severity_cut_quantile: f64,
    pub growth_base_year: u32,
    pub growth_horizon_year: u32,
    /// Reconcile routes on the rayon pool.
    pub parallel: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            max_route_class: 3,
            crash_years: 5.0,
            incident_factor_divisor: 100_000.0,
            severity_weights: SeverityWeights::default(),
            severity_cut_quantile: 0.90,
            growth_base_year: 2015,
            growth_horizon_year: 2040,
            parallel: true,
        }
    }
}

/// Top-level configuration handed to every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    pub fields: FieldNames,
    pub output_dir: PathBuf,
    pub gzip: bool,
    pub parameters: Parameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: InputPaths::default(),
            fields: FieldNames::default(),
            output_dir: PathBuf::from("output"),
            gzip: false,
            parameters: Parameters::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.parameters;
        if !(1..=4).contains(&p.max_route_class) {
            return Err(PipelineError::Config(format!(
                "max_route_class must be between 1 and 4, got {}",
                p.max_route_class
            )));
        }
        if p.crash_years <= 0.0 {
            return Err(PipelineError::Config(format!(
                "crash_years must be positive, got {}",
                p.crash_years
            )));
        }
        if p.incident_factor_divisor <= 0.0 {
            return Err(PipelineError::Config(format!(
                "incident_factor_divisor must be positive, got {}",
                p.incident_factor_divisor
            )));
        }
        if !(0.0..=1.0).contains(&p.severity_cut_quantile) {
            return Err(PipelineError::Config(format!(
                "severity_cut_quantile must be within [0, 1], got {}",
                p.severity_cut_quantile
            )));
        }
        if p.growth_horizon_year <= p.growth_base_year {
            return Err(PipelineError::Config(format!(
                "growth_horizon_year ({}) must be after growth_base_year ({})",
                p.growth_horizon_year, p.growth_base_year
            )));
        }
        Ok(())
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}
