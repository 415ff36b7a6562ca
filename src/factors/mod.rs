//! Factors joined onto the reconciled interval grid.
//!
//! Each joiner takes the grid and returns its factor keyed by
//! [`GridKey`](crate::reconcile::GridKey), plus a stage report. Intervals a
//! joiner cannot place are absent from its map and come out null in the
//! scored dataset.

pub mod growth;
pub mod seasonal;
pub mod severity;
pub mod spatial;

pub use growth::{GrowthFactor, TractGrowth, join_growth, load_census_growth};
pub use seasonal::{SeasonalFactor, SeasonalRecord, join_seasonal, load_seasonal_volumes};
pub use severity::{SeverityScaling, SeverityScore, scale_severity};
pub use spatial::{CrosswalkMatch, load_crosswalk};
