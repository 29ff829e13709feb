//! Normalization and feature selection applied ahead of differential testing.

use crate::data::FeatureMatrix;
use anyhow::{Result, anyhow};
use ndarray::Array1;
use single_utilities::traits::FloatOpsTS;

/// Transform every stored value to log(1 + x) in place.
///
/// Implicit zeros are untouched, which matches log1p(0) = 0.
pub fn log1p_normalize<T>(data: &mut FeatureMatrix<T>)
where
    T: FloatOpsTS,
{
    for value in data.matrix_mut().values_mut() {
        *value = value.ln_1p();
    }
}

/// Parameters of the dispersion-based highly-variable feature filter.
///
/// Defaults follow the conventional single-cell settings: features are kept when their mean on
/// the original count scale lies strictly inside (0.0125, 3) and their normalized dispersion
/// reaches 0.5, with normalization against 20 feature-mean bins. These cutoffs are fixed by the
/// defaults rather than exposed through the differential driver.
#[derive(Debug, Clone)]
pub struct HighlyVariableParams {
    pub min_mean: f64,
    pub max_mean: f64,
    pub min_dispersion: f64,
    pub n_bins: usize,
}

impl Default for HighlyVariableParams {
    fn default() -> Self {
        HighlyVariableParams {
            min_mean: 0.0125,
            max_mean: 3.0,
            min_dispersion: 0.5,
            n_bins: 20,
        }
    }
}

/// Flag features whose variance-to-mean dispersion stands out among features of similar mean.
///
/// Expects log1p-transformed values; per-feature statistics are computed after mapping back
/// through expm1. Each feature's dispersion (variance over mean) is log-transformed and
/// z-scored against the other features in the same log-mean bin; bins with fewer than two
/// members or without spread fall back to the global dispersion distribution. Returns one flag
/// per feature.
pub fn highly_variable_features<T>(
    data: &FeatureMatrix<T>,
    params: &HighlyVariableParams,
) -> Result<Vec<bool>>
where
    T: FloatOpsTS,
{
    let matrix = data.matrix();
    let n_cells = matrix.nrows();
    let n_features = matrix.ncols();

    if n_cells < 2 {
        return Err(anyhow!(
            "Highly-variable selection needs at least two cells, found {}",
            n_cells
        ));
    }
    if params.n_bins == 0 {
        return Err(anyhow!("Number of mean bins must be positive"));
    }

    let mut sums = Array1::<f64>::zeros(n_features);
    let mut sum_squares = Array1::<f64>::zeros(n_features);
    for (_, col, value) in matrix.triplet_iter() {
        let count = value.to_f64().unwrap_or(0.0).exp_m1();
        sums[col] += count;
        sum_squares[col] += count * count;
    }

    let n = n_cells as f64;
    let means: Array1<f64> = sums.mapv(|sum| sum / n);
    let variances: Array1<f64> = Array1::from_shape_fn(n_features, |i| {
        (sum_squares[i] - sums[i] * sums[i] / n) / (n - 1.0)
    });
    let dispersions: Array1<f64> = Array1::from_shape_fn(n_features, |i| {
        if means[i] > 0.0 {
            variances[i] / means[i]
        } else {
            0.0
        }
    });
    let log_means: Array1<f64> = means.mapv(f64::ln_1p);

    // Equal-width bins over the observed log-mean range
    let lo = log_means.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = log_means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    let bin_of = |log_mean: f64| -> usize {
        if span <= 0.0 {
            0
        } else {
            (((log_mean - lo) / span * params.n_bins as f64) as usize).min(params.n_bins - 1)
        }
    };

    let mut bin_count = vec![0usize; params.n_bins];
    let mut bin_sum = vec![0.0f64; params.n_bins];
    let mut bin_sum_sq = vec![0.0f64; params.n_bins];
    let mut global_count = 0usize;
    let mut global_sum = 0.0f64;
    let mut global_sum_sq = 0.0f64;
    for i in 0..n_features {
        if dispersions[i] <= 0.0 {
            continue;
        }
        let log_disp = dispersions[i].ln();
        let bin = bin_of(log_means[i]);
        bin_count[bin] += 1;
        bin_sum[bin] += log_disp;
        bin_sum_sq[bin] += log_disp * log_disp;
        global_count += 1;
        global_sum += log_disp;
        global_sum_sq += log_disp * log_disp;
    }
    if global_count == 0 {
        // Nothing shows any dispersion, nothing can stand out
        return Ok(vec![false; n_features]);
    }

    let mean_and_std = |count: usize, sum: f64, sum_sq: f64| -> (f64, f64) {
        let c = count as f64;
        let mean = sum / c;
        let var = if count > 1 {
            (sum_sq - sum * sum / c) / (c - 1.0)
        } else {
            0.0
        };
        (mean, var.max(0.0).sqrt())
    };
    let (global_center, global_spread) = mean_and_std(global_count, global_sum, global_sum_sq);

    let mut keep = vec![false; n_features];
    for i in 0..n_features {
        if dispersions[i] <= 0.0 {
            continue;
        }
        if means[i] <= params.min_mean || means[i] >= params.max_mean {
            continue;
        }

        let bin = bin_of(log_means[i]);
        let (mut center, mut spread) = mean_and_std(bin_count[bin], bin_sum[bin], bin_sum_sq[bin]);
        if bin_count[bin] < 2 || spread <= 0.0 {
            center = global_center;
            spread = global_spread;
        }

        let normalized = if spread > 0.0 {
            (dispersions[i].ln() - center) / spread
        } else {
            0.0
        };
        if normalized >= params.min_dispersion {
            keep[i] = true;
        }
    }

    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CellMetadata;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};

    fn feature_matrix(matrix: CsrMatrix<f64>) -> FeatureMatrix<f64> {
        let n_cells = matrix.nrows();
        let n_features = matrix.ncols();
        FeatureMatrix::new(
            matrix,
            (0..n_cells).map(|i| format!("cell_{i}")).collect(),
            (0..n_features).map(|i| format!("f_{i}")).collect(),
            CellMetadata::new(n_cells),
        )
        .unwrap()
    }

    #[test]
    fn test_log1p_normalize() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        coo.push(1, 1, 3.0);
        let mut data = feature_matrix(CsrMatrix::from(&coo));

        log1p_normalize(&mut data);

        let first = data.matrix().get_entry(0, 0).unwrap().into_value();
        let second = data.matrix().get_entry(1, 1).unwrap().into_value();
        assert_abs_diff_eq!(first, 2.0f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(second, 4.0f64.ln(), epsilon = 1e-12);
        // Implicit zeros stay zero
        let zero = data.matrix().get_entry(0, 1).unwrap().into_value();
        assert_abs_diff_eq!(zero, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_highly_variable_selection() {
        // 6 cells x 6 features of raw counts. Features 0..4 share a moderate on/off pattern,
        // feature 4 concentrates its counts in one cell, feature 5 is variable but its mean
        // exceeds the upper bound.
        let mut coo = CooMatrix::new(6, 6);
        for feature in 0..4 {
            for cell in [1usize, 3, 5] {
                coo.push(cell, feature, 1.0);
            }
        }
        coo.push(5, 4, 6.0);
        for cell in 0..6 {
            coo.push(cell, 5, if cell % 2 == 0 { 10.0 } else { 30.0 });
        }
        let mut data = feature_matrix(CsrMatrix::from(&coo));

        log1p_normalize(&mut data);
        let keep = highly_variable_features(&data, &HighlyVariableParams::default()).unwrap();

        assert_eq!(
            keep,
            vec![false, false, false, false, true, false],
            "only the concentrated feature stands out within the mean bounds"
        );
    }

    #[test]
    fn test_flat_features_are_never_variable() {
        let mut coo = CooMatrix::new(4, 3);
        for cell in 0..4 {
            for feature in 0..3 {
                coo.push(cell, feature, 2.0);
            }
        }
        let mut data = feature_matrix(CsrMatrix::from(&coo));

        log1p_normalize(&mut data);
        let keep = highly_variable_features(&data, &HighlyVariableParams::default()).unwrap();
        assert_eq!(keep, vec![false; 3]);
    }

    #[test]
    fn test_too_few_cells_is_rejected() {
        let mut coo = CooMatrix::new(1, 2);
        coo.push(0, 0, 1.0);
        let data = feature_matrix(CsrMatrix::from(&coo));

        let err = highly_variable_features(&data, &HighlyVariableParams::default()).unwrap_err();
        assert!(err.to_string().contains("at least two cells"));
    }
}
