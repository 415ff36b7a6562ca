/// Computes the arithmetic mean of a slice of values. Returns `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Min-max scales the present values of a column to `[0, 1]`.
///
/// Missing values stay missing and do not take part in the extremes. A
/// column whose present values are all equal scales to 0.
pub fn min_max_scale(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let (min, max) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    values
        .iter()
        .map(|v| {
            v.map(|v| {
                if range > 0.0 {
                    (v - min) / range
                } else {
                    0.0
                }
            })
        })
        .collect()
}

/// Quantile with linear interpolation between closest ranks.
///
/// For `n` sorted values the quantile `q` sits at rank `(n - 1) * q`.
/// Returns `None` for empty input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_mean_values() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn test_min_max_scale_maps_extremes() {
        let scaled = min_max_scale(&[Some(2.0), Some(4.0), Some(3.0)]);
        assert_eq!(scaled, vec![Some(0.0), Some(1.0), Some(0.5)]);
    }

    #[test]
    fn test_min_max_scale_keeps_missing() {
        let scaled = min_max_scale(&[Some(10.0), None, Some(20.0)]);
        assert_eq!(scaled, vec![Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn test_min_max_scale_constant_column() {
        let scaled = min_max_scale(&[Some(5.0), Some(5.0)]);
        assert_eq!(scaled, vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_min_max_scale_all_missing() {
        assert_eq!(min_max_scale(&[None, None]), vec![None, None]);
    }

    #[test]
    fn test_quantile_interpolates() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        // rank 8.1 between 9 and 10
        let q = quantile(&values, 0.9).unwrap();
        assert!((q - 9.1).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_unsorted_input() {
        assert_eq!(quantile(&[3.0, 1.0, 2.0], 0.5), Some(2.0));
    }

    #[test]
    fn test_quantile_single_value() {
        assert_eq!(quantile(&[4.2], 0.9), Some(4.2));
    }
}
