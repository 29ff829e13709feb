//! Parametric tests for single-cell group comparisons.

use crate::testing::{TTestType, TestResult};
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Perform a two-sample t-test comparing two groups of cells for one feature.
///
/// Either Student's t-test (pooled variance) or Welch's t-test (unequal variances).
/// The p-value is two-sided. Groups with fewer than two observations yield a null result.
pub fn t_test<T>(x: &[T], y: &[T], test_type: TTestType) -> TestResult<T>
where
    T: FloatOps,
{
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;

    if n1 < 2.0 || n2 < 2.0 {
        return TestResult::new(T::zero(), T::one());
    }

    let (mut sum1, mut sum_sq1) = (0.0f64, 0.0f64);
    for &v in x {
        let v = v.to_f64().unwrap();
        sum1 += v;
        sum_sq1 += v * v;
    }
    let (mut sum2, mut sum_sq2) = (0.0f64, 0.0f64);
    for &v in y {
        let v = v.to_f64().unwrap();
        sum2 += v;
        sum_sq2 += v * v;
    }

    let mean1 = sum1 / n1;
    let mean2 = sum2 / n2;

    // Variances via the computational formula
    let var1 = (sum_sq1 - sum1 * sum1 / n1) / (n1 - 1.0);
    let var2 = (sum_sq2 - sum2 * sum2 / n2) / (n2 - 1.0);

    let mean_diff = mean1 - mean2;

    let (t_stat, df) = match test_type {
        TTestType::Student => {
            let pooled_var = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0);
            let std_err = (pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt();
            (mean_diff / std_err, n1 + n2 - 2.0)
        }
        TTestType::Welch => {
            let term1 = var1 / n1;
            let term2 = var2 / n2;
            let std_err = (term1 + term2).sqrt();
            let t = mean_diff / std_err;

            // Welch-Satterthwaite equation for degrees of freedom
            let df = (term1 + term2) * (term1 + term2)
                / (term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2 - 1.0));
            (t, df)
        }
    };

    let p_value = two_sided_p_value(t_stat, df);
    TestResult::new(T::from(t_stat).unwrap(), T::from(p_value).unwrap())
}

fn two_sided_p_value(t_stat: f64, df: f64) -> f64 {
    if !t_stat.is_finite() {
        // Perfect separation of zero-variance groups
        return if t_stat.is_infinite() { 0.0 } else { 1.0 };
    }

    if df <= 0.0 || !df.is_finite() {
        return 1.0;
    }

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => 2.0 * (1.0 - t_dist.cdf(t_stat.abs())),
        Err(_) => 1.0,
    }
}
