use crate::data::FeatureMatrix;
use crate::testing::utils::{split_by_category, unique_categories};
use crate::testing::{
    Alternative, CorrectionMethod, GroupTestResults, TestMethod, TestResult, correction, effect,
};
use nalgebra_sparse::CsrMatrix;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOpsTS;

pub mod nonparametric;

pub mod parametric;

/// Test every feature for every category of a grouping variable against the remaining cells.
///
/// The matrix is expected in cells × features orientation with log1p-transformed values. For
/// each category of `variable`, the cells are partitioned into the category and the rest, every
/// feature is tested with `method`, p-values are adjusted across features with
/// `correction_method`, and log2 fold changes of the category over the rest are attached.
///
/// Fails if the variable is missing from the metadata, if it has fewer than two categories, or
/// if the matrix carries no features.
pub fn rank_features_groups<T>(
    data: &FeatureMatrix<T>,
    variable: &str,
    method: TestMethod,
    correction_method: CorrectionMethod,
) -> anyhow::Result<Vec<GroupTestResults<T>>>
where
    T: FloatOpsTS,
{
    let labels = data.metadata().column(variable)?;
    let categories = unique_categories(labels);
    if categories.len() < 2 {
        return Err(anyhow::anyhow!(
            "Grouping variable '{}' must have at least two categories, found {}",
            variable,
            categories.len()
        ));
    }

    let matrix = data.matrix();
    let n_features = matrix.ncols();

    let mut results = Vec::with_capacity(categories.len());
    for category in categories {
        let (group_indices, rest_indices) = split_by_category(labels, &category);

        let per_feature: Vec<(TestResult<T>, f64)> = (0..n_features)
            .into_par_iter()
            .map(|feature| {
                let group_values = column_values(matrix, feature, &group_indices);
                let rest_values = column_values(matrix, feature, &rest_indices);

                let test = match method {
                    TestMethod::Wilcoxon => nonparametric::mann_whitney(
                        &group_values,
                        &rest_values,
                        Alternative::TwoSided,
                    ),
                    TestMethod::TTest(test_type) => {
                        parametric::t_test(&group_values, &rest_values, test_type)
                    }
                };
                let log2_fc = effect::log2_fold_change(
                    &group_values,
                    &rest_values,
                    effect::LOG2FC_PSEUDO_COUNT,
                );

                (test, log2_fc)
            })
            .collect();

        let statistics: Vec<T> = per_feature.iter().map(|(t, _)| t.statistic).collect();
        let p_values: Vec<T> = per_feature.iter().map(|(t, _)| t.p_value).collect();
        let log2_fold_changes: Vec<f64> = per_feature.iter().map(|&(_, fc)| fc).collect();
        let adjusted_p_values = correction::adjust(correction_method, &p_values)?;

        results.push(GroupTestResults {
            group: category,
            statistics,
            p_values,
            adjusted_p_values,
            log2_fold_changes,
        });
    }

    Ok(results)
}

fn column_values<T>(matrix: &CsrMatrix<T>, feature: usize, cells: &[usize]) -> Vec<T>
where
    T: FloatOpsTS,
{
    let mut values = Vec::with_capacity(cells.len());
    for &cell in cells {
        if let Some(entry) = matrix.get_entry(cell, feature) {
            values.push(entry.into_value());
        }
    }
    values
}
