//! Percentile-split min-max scaling.

use serde::Serialize;

use crate::scaling::{min_max_scale, quantile};

/// Value substituted for missing inputs; matches the no-crash severity index.
pub const FILL_VALUE: f64 = 1.0;

/// Splits a column at a quantile and scales the lower partition.
///
/// Missing inputs are filled with [`FILL_VALUE`]. The cut value is the
/// quantile of the non-missing inputs. Rows at or below the cut are min-max
/// scaled among themselves; rows above it are set to 1.
#[derive(Debug, Clone, Copy)]
pub struct PercentileScaler {
    pub quantile: f64,
}

impl Default for PercentileScaler {
    fn default() -> Self {
        Self { quantile: 0.90 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PercentileScaled {
    /// `None` when the column had no values at all.
    pub cut: Option<f64>,
    pub filled: Vec<f64>,
    pub above_cut: Vec<bool>,
    pub scaled: Vec<f64>,
}

impl PercentileScaler {
    pub fn new(quantile: f64) -> Self {
        Self { quantile }
    }

    pub fn scale(&self, values: &[Option<f64>]) -> PercentileScaled {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let cut = quantile(&present, self.quantile);

        let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(FILL_VALUE)).collect();
        let above_cut: Vec<bool> = filled
            .iter()
            .map(|&v| cut.is_some_and(|c| v > c))
            .collect();

        // Scale only the lower partition; the upper one is masked out so it
        // cannot stretch the range.
        let lower: Vec<Option<f64>> = filled
            .iter()
            .zip(&above_cut)
            .map(|(&v, &above)| (!above).then_some(v))
            .collect();
        let scaled = min_max_scale(&lower)
            .into_iter()
            .map(|v| v.unwrap_or(1.0))
            .collect();

        PercentileScaled {
            cut,
            filled,
            above_cut,
            scaled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(n: usize) -> Vec<Option<f64>> {
        (1..=n).map(|v| Some(v as f64)).collect()
    }

    #[test]
    fn test_above_cut_is_exactly_one() {
        let result = PercentileScaler::default().scale(&column(20));
        for (scaled, above) in result.scaled.iter().zip(&result.above_cut) {
            if *above {
                assert_eq!(*scaled, 1.0);
            }
        }
        assert!(result.above_cut.iter().any(|a| *a));
    }

    #[test]
    fn test_lower_partition_spans_unit_interval() {
        let result = PercentileScaler::default().scale(&column(20));
        let lower: Vec<f64> = result
            .scaled
            .iter()
            .zip(&result.above_cut)
            .filter(|(_, above)| !**above)
            .map(|(s, _)| *s)
            .collect();
        assert!(lower.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(lower.iter().cloned().fold(f64::INFINITY, f64::min), 0.0);
        assert_eq!(lower.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 1.0);
    }

    #[test]
    fn test_missing_values_fill_with_one() {
        let result = PercentileScaler::default().scale(&[Some(0.5), None, Some(3.0), Some(40.0)]);
        assert_eq!(result.filled[1], 1.0);
    }

    #[test]
    fn test_cut_ignores_missing_values() {
        let with_missing = PercentileScaler::default().scale(&[Some(2.0), None, Some(4.0)]);
        let without = PercentileScaler::default().scale(&[Some(2.0), Some(4.0)]);
        assert_eq!(with_missing.cut, without.cut);
    }

    #[test]
    fn test_outlier_does_not_compress_lower_partition() {
        let mut values = column(9);
        values.push(Some(1000.0));
        let result = PercentileScaler::default().scale(&values);
        assert!(result.above_cut[9]);
        assert_eq!(result.scaled[9], 1.0);
        assert_eq!(result.scaled[8], 1.0);
        assert_eq!(result.scaled[0], 0.0);
    }

    #[test]
    fn test_all_missing_column() {
        let result = PercentileScaler::default().scale(&[None, None]);
        assert_eq!(result.cut, None);
        assert_eq!(result.filled, vec![1.0, 1.0]);
        assert_eq!(result.scaled, vec![0.0, 0.0]);
    }
}
