use single_utilities::traits::FloatOps;

/// Pseudo-count guarding the fold-change ratio when one side has no signal
pub const LOG2FC_PSEUDO_COUNT: f64 = 1e-9;

/// Calculate the log2 fold change between two groups of log1p-transformed values
///
/// Means are taken on the log scale and mapped back through expm1, so the ratio compares
/// average expression levels on the original count scale.
pub fn log2_fold_change<T>(group: &[T], rest: &[T], pseudo_count: f64) -> f64
where
    T: FloatOps,
{
    let mean_group = mean(group);
    let mean_rest = mean(rest);

    ((mean_group.exp_m1() + pseudo_count) / (mean_rest.exp_m1() + pseudo_count)).log2()
}

fn mean<T>(values: &[T]) -> f64
where
    T: FloatOps,
{
    if values.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0;
    for &value in values {
        sum += value.to_f64().unwrap_or(0.0);
    }
    sum / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_log2_fold_change() {
        // Counts of 5 in the group against counts of 1 in the rest, on the log1p scale
        let group = vec![6.0f64.ln(); 4];
        let rest = vec![2.0f64.ln(); 4];

        let fc = log2_fold_change(&group, &rest, LOG2FC_PSEUDO_COUNT);
        assert_abs_diff_eq!(fc, 5.0f64.log2(), epsilon = 1e-6);
    }

    #[test]
    fn test_log2_fold_change_is_antisymmetric() {
        let group = vec![6.0f64.ln(); 3];
        let rest = vec![2.0f64.ln(); 3];

        let up = log2_fold_change(&group, &rest, LOG2FC_PSEUDO_COUNT);
        let down = log2_fold_change(&rest, &group, LOG2FC_PSEUDO_COUNT);
        assert_abs_diff_eq!(up, -down, epsilon = 1e-6);
    }

    #[test]
    fn test_log2_fold_change_silent_group() {
        let group = vec![0.0f64; 3];
        let rest = vec![2.0f64.ln(); 3];

        // Only the pseudo-count keeps the ratio finite
        let fc = log2_fold_change(&group, &rest, LOG2FC_PSEUDO_COUNT);
        assert!(fc < -20.0);
        assert!(fc.is_finite());
    }

    #[test]
    fn test_equal_groups_have_zero_fold_change() {
        let group = vec![2.0f64.ln(); 5];
        let rest = vec![2.0f64.ln(); 5];

        let fc = log2_fold_change(&group, &rest, LOG2FC_PSEUDO_COUNT);
        assert_abs_diff_eq!(fc, 0.0, epsilon = 1e-9);
    }
}
