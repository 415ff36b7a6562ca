//! Crash severity index.
//!
//! The index is the weighted mean severity of the crashes on a segment:
//!
//! ```text
//! SI = (w_ka * ka + w_bc * bc + w_pdo * pdo) / total
//! ```
//!
//! A segment with no crashes has index 1.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Per-severity crash counts.
///
/// `ka` is fatal and serious injury, `bc` minor and possible injury, `pdo`
/// property damage only. Counts are `f64` because apportionment splits them
/// across interval boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashCounts {
    pub ka: f64,
    pub bc: f64,
    pub pdo: f64,
    pub total: f64,
}

impl CrashCounts {
    pub fn scaled(self, ratio: f64) -> Self {
        Self {
            ka: self.ka * ratio,
            bc: self.bc * ratio,
            pdo: self.pdo * ratio,
            total: self.total * ratio,
        }
    }
}

impl AddAssign for CrashCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.ka += rhs.ka;
        self.bc += rhs.bc;
        self.pdo += rhs.pdo;
        self.total += rhs.total;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub ka: f64,
    pub bc: f64,
    pub pdo: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            ka: 76.8,
            bc: 8.4,
            pdo: 1.0,
        }
    }
}

impl SeverityWeights {
    pub fn index(&self, counts: &CrashCounts) -> f64 {
        if counts.total == 0.0 {
            return 1.0;
        }
        (self.ka * counts.ka + self.bc * counts.bc + self.pdo * counts.pdo) / counts.total
    }
}
