pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod factors;
pub mod loaders;
pub mod merge;
pub mod output;
pub mod percentile;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod route;
pub mod scaling;
pub mod severity;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
