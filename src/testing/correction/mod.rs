use crate::testing::CorrectionMethod;
use anyhow::{Result, anyhow};
use single_utilities::traits::FloatOps;
use std::cmp::Ordering;

/// Multiple testing correction methods to control for false positives
/// when performing many statistical tests simultaneously.

/// Adjust p-values with the requested correction method
pub fn adjust<T>(method: CorrectionMethod, p_values: &[T]) -> Result<Vec<T>>
where
    T: FloatOps,
{
    match method {
        CorrectionMethod::BenjaminiHochberg => benjamini_hochberg_correction(p_values),
        CorrectionMethod::Bonferroni => bonferroni_correction(p_values),
    }
}

/// Apply Bonferroni correction to p-values
///
/// Bonferroni correction is a simple but conservative method that multiplies
/// each p-value by the number of tests.
///
/// # Arguments
/// * `p_values` - A slice of p-values to adjust
///
/// # Returns
/// * `Result<Vec<T>>` - Vector of adjusted p-values
///
/// # Example
/// ```
/// use single_differential::testing::correction::bonferroni_correction;
///
/// let p_values = vec![0.01, 0.03, 0.05];
/// let adjusted = bonferroni_correction(&p_values).unwrap();
/// assert_eq!(adjusted.len(), 3);
/// ```
pub fn bonferroni_correction<T>(p_values: &[T]) -> Result<Vec<T>>
where
    T: FloatOps,
{
    let n = p_values.len();

    if n == 0 {
        return Err(anyhow!("Empty p-value array"));
    }

    validate_p_values(p_values)?;

    // Multiply each p-value by n, capping at 1.0
    let n_t = T::from(n).unwrap();
    let adjusted = p_values
        .iter()
        .map(|&p| num_traits::Float::min(p * n_t, T::one()))
        .collect();

    Ok(adjusted)
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
///
/// # Arguments
/// * `p_values` - A slice of p-values to adjust
///
/// # Returns
/// * `Result<Vec<T>>` - Vector of adjusted p-values
///
/// # Example
/// ```
/// use single_differential::testing::correction::benjamini_hochberg_correction;
///
/// let p_values = vec![0.01, 0.03, 0.05];
/// let adjusted = benjamini_hochberg_correction(&p_values).unwrap();
/// assert_eq!(adjusted.len(), 3);
/// ```
pub fn benjamini_hochberg_correction<T>(p_values: &[T]) -> Result<Vec<T>>
where
    T: FloatOps,
{
    let n = p_values.len();
    if n == 0 {
        return Err(anyhow!("Empty p-value array"));
    }

    validate_p_values(p_values)?;

    // Create index-value pairs and sort by p-value in ascending order
    let mut indexed_p_values: Vec<(usize, T)> =
        p_values.iter().enumerate().map(|(i, &p)| (i, p)).collect();

    indexed_p_values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    // Calculate adjusted p-values with monitoring of minimum value
    let n_t = T::from(n).unwrap();
    let mut adjusted_p_values = vec![T::zero(); n];
    let mut current_min = T::one();

    // Process from largest to smallest p-value
    for i in (0..n).rev() {
        let (orig_idx, p_val) = indexed_p_values[i];
        let rank = T::from(i + 1).unwrap();

        // Calculate adjustment and take minimum of current and previous
        let adjustment = num_traits::Float::min(p_val * n_t / rank, T::one());
        current_min = num_traits::Float::min(adjustment, current_min);
        adjusted_p_values[orig_idx] = current_min;
    }

    Ok(adjusted_p_values)
}

fn validate_p_values<T>(p_values: &[T]) -> Result<()>
where
    T: FloatOps,
{
    for (i, &p) in p_values.iter().enumerate() {
        if p < T::zero() || p > T::one() {
            return Err(anyhow!(
                "Invalid p-value at index {}: {}",
                i,
                p.to_f64().unwrap_or(f64::NAN)
            ));
        }
    }
    Ok(())
}
