use crate::testing::{Alternative, TestResult};
use num_traits::Float;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Wilcoxon rank-sum (Mann-Whitney U) test between two samples.
///
/// Ranks are tie-averaged and the p-value comes from the continuity-corrected normal
/// approximation of the U statistic. The reported statistic is U for `x`.
pub fn mann_whitney<T>(x: &[T], y: &[T], alternative: Alternative) -> TestResult<T>
where
    T: FloatOps,
{
    let nx = x.len();
    let ny = y.len();

    if nx == 0 || ny == 0 {
        return TestResult::new(<T as Float>::nan(), T::one()); // Insufficient data
    }

    // Combine samples and assign group labels (0 for x, 1 for y)
    let mut combined: Vec<(T, usize)> = Vec::with_capacity(nx + ny);
    combined.extend(x.iter().map(|&v| (v, 0)));
    combined.extend(y.iter().map(|&v| (v, 1)));

    // Sort by value
    combined.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Assign ranks (with ties averaged)
    let mut ranks = vec![T::zero(); nx + ny];
    let mut i = 0;
    while i < combined.len() {
        let val = combined[i].0;
        let mut j = i + 1;

        // Find tied values
        while j < combined.len() && combined[j].0 == val {
            j += 1;
        }

        // Assign average rank to ties
        let rank = T::from(i + j - 1).unwrap() / T::from(2.0).unwrap() + T::one();
        for k in i..j {
            ranks[k] = rank;
        }

        i = j;
    }

    // Calculate rank sum for group X
    let mut rank_sum_x = T::zero();
    for k in 0..combined.len() {
        if combined[k].1 == 0 {
            rank_sum_x += ranks[k];
        }
    }

    let u_x = rank_sum_x - T::from(nx * (nx + 1)).unwrap() / T::from(2.0).unwrap();

    let mean_u = T::from(nx * ny).unwrap() / T::from(2.0).unwrap();
    let var_u = T::from(nx * ny * (nx + ny + 1)).unwrap() / T::from(12.0).unwrap();

    // Continuity-corrected z-score of U around its null mean
    let correction = T::from(0.5).unwrap();
    let diff = u_x - mean_u;
    let z = if diff > T::zero() {
        (diff - correction) / var_u.sqrt()
    } else if diff < T::zero() {
        (diff + correction) / var_u.sqrt()
    } else {
        T::zero()
    };

    let normal = Normal::new(0.0, 1.0).unwrap();
    let z_f64 = z.to_f64().unwrap();

    let p_value = match alternative {
        Alternative::TwoSided => (2.0 * (1.0 - normal.cdf(z_f64.abs()))).min(1.0),
        Alternative::Less => normal.cdf(z_f64),
        Alternative::Greater => 1.0 - normal.cdf(z_f64),
    };

    TestResult::new(u_x, T::from(p_value).unwrap())
}
