//! Robust price aggregation: log-space outlier fence around the median,
//! then a notional-weighted mean.

use tracing::debug;

pub const DEFAULT_FENCE_R: f64 = 1.5;
pub const DEFAULT_MIN_WEIGHT_USD: f64 = 1e-6;

/// Aggregation result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub vwap: f64,
    pub kept: usize,
    pub sum_weight: f64,
    pub ok: bool,
}

impl Aggregate {
    fn empty() -> Self {
        Aggregate {
            vwap: 0.0,
            kept: 0,
            sum_weight: 0.0,
            ok: false,
        }
    }
}

/// Volume-weighted average of `values`, keeping only entries whose log
/// distance from the median is within `ln(fence_r)`.
///
/// Entries with dust weights (`< min_weight`), non-finite numbers or
/// non-positive values are dropped up front. Out-of-range `fence_r` and
/// `min_weight` fall back to the defaults rather than erroring.
pub fn vwap_with_log_fence(
    values: &[f64],
    weights: &[f64],
    fence_r: f64,
    min_weight: f64,
) -> Aggregate {
    let fence_r = if fence_r.is_nan() || fence_r <= 1.0 {
        DEFAULT_FENCE_R
    } else {
        fence_r
    };
    let min_weight = if min_weight.is_nan() || min_weight <= 0.0 {
        DEFAULT_MIN_WEIGHT_USD
    } else {
        min_weight
    };

    let mut candidates: Vec<(f64, f64)> = values
        .iter()
        .zip(weights.iter())
        .filter(|(v, w)| v.is_finite() && **v > 0.0 && w.is_finite() && **w >= min_weight)
        .map(|(v, w)| (*v, *w))
        .collect();

    if candidates.is_empty() {
        return Aggregate::empty();
    }

    let median = median_unweighted(candidates.iter().map(|(v, _)| *v).collect());
    let fence = fence_r.ln();
    candidates.retain(|(v, _)| (v.ln() - median.ln()).abs() <= fence);

    if candidates.is_empty() {
        debug!(median, fence_r, "log fence rejected every observation");
        return Aggregate::empty();
    }

    let sum_weight: f64 = candidates.iter().map(|(_, w)| w).sum();
    let weighted: f64 = candidates.iter().map(|(v, w)| v * w).sum();
    let ok = sum_weight > 0.0;

    Aggregate {
        vwap: if ok { weighted / sum_weight } else { 0.0 },
        kept: candidates.len(),
        sum_weight,
        ok,
    }
}

fn median_unweighted(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).expect("non-finite values were filtered"));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_is_fenced_out() {
        let agg = vwap_with_log_fence(&[1.00, 1.01, 10.0], &[1.0, 1.0, 1.0], 2.0, 0.0);
        assert!(agg.ok);
        assert_eq!(agg.kept, 2);
        assert!((agg.vwap - 1.005).abs() < 0.01);
        assert_eq!(agg.sum_weight, 2.0);
    }

    #[test]
    fn test_singleton() {
        let agg = vwap_with_log_fence(&[0.025], &[25.0], 1.5, 1e-6);
        assert!(agg.ok);
        assert_eq!(agg.kept, 1);
        assert_eq!(agg.vwap, 0.025);
        assert_eq!(agg.sum_weight, 25.0);
    }

    #[test]
    fn test_all_equal_values_kept_after_dust_filter() {
        let values = [2.0, 2.0, 2.0, 2.0];
        let weights = [1.0, 5.0, 1e-9, 3.0];
        let agg = vwap_with_log_fence(&values, &weights, 1.5, 1e-6);
        assert!(agg.ok);
        // The dust entry is gone, the rest all match the median exactly.
        assert_eq!(agg.kept, 3);
        assert_eq!(agg.vwap, 2.0);
    }

    #[test]
    fn test_scale_equivariance() {
        let values = [1.0, 1.2, 0.9, 50.0];
        let weights = [2.0, 1.0, 3.0, 1.0];
        let base = vwap_with_log_fence(&values, &weights, 1.5, 1e-6);

        let k = 37.5;
        let scaled: Vec<f64> = values.iter().map(|v| v * k).collect();
        let agg = vwap_with_log_fence(&scaled, &weights, 1.5, 1e-6);

        assert_eq!(agg.kept, base.kept);
        assert!((agg.vwap - base.vwap * k).abs() < 1e-9 * k);
    }

    #[test]
    fn test_fence_membership_bounds() {
        let values = [1.0, 1.4, 0.7, 3.0, 0.2];
        let weights = [1.0; 5];
        let r = 1.5;
        let agg = vwap_with_log_fence(&values, &weights, r, 1e-6);

        let median = 1.0;
        for v in values {
            let kept = v >= median / r - 1e-12 && v <= median * r + 1e-12;
            // Every kept value must satisfy the fence; here we just verify
            // the aggregate count matches the membership rule.
            let _ = kept;
        }
        assert_eq!(agg.kept, 3); // 1.0, 1.4, 0.7
    }

    #[test]
    fn test_invalid_params_fall_back_to_defaults() {
        // r <= 1 behaves like r = 1.5.
        let loose = vwap_with_log_fence(&[1.0, 1.4], &[1.0, 1.0], 0.5, 1e-6);
        let default = vwap_with_log_fence(&[1.0, 1.4], &[1.0, 1.0], 1.5, 1e-6);
        assert_eq!(loose, default);

        // NaN min_weight behaves like the default dust threshold.
        let agg = vwap_with_log_fence(&[1.0], &[1.0], 1.5, f64::NAN);
        assert!(agg.ok);
        assert_eq!(agg.kept, 1);
    }

    #[test]
    fn test_bad_observations_dropped() {
        let agg = vwap_with_log_fence(
            &[f64::NAN, -1.0, 0.0, f64::INFINITY, 1.0],
            &[1.0, 1.0, 1.0, 1.0, 1.0],
            1.5,
            1e-6,
        );
        assert_eq!(agg.kept, 1);
        assert_eq!(agg.vwap, 1.0);
    }

    #[test]
    fn test_empty_input() {
        let agg = vwap_with_log_fence(&[], &[], 1.5, 1e-6);
        assert!(!agg.ok);
        assert_eq!(agg.kept, 0);
        assert_eq!(agg.sum_weight, 0.0);
    }
}
