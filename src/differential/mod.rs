//! Differential feature driver: DEGs and DARs per category of a grouping variable.

use crate::data::{FeatureMatrix, MultiomeAnalysis, transpose_csr};
use crate::preprocessing::{self, HighlyVariableParams};
use crate::testing::inference::rank_features_groups;
use crate::testing::{CorrectionMethod, TestMethod};
use anyhow::{Result, anyhow};
use log::info;
use single_utilities::traits::FloatOpsTS;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Kind of contrast computed for a grouping variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContrastKind {
    /// Differentially expressed genes, tested on the expression matrix
    Degs,
    /// Differentially accessible regions, tested on the transposed accessibility matrix
    Dars,
}

impl fmt::Display for ContrastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContrastKind::Degs => write!(f, "DEGs"),
            ContrastKind::Dars => write!(f, "DARs"),
        }
    }
}

/// Settings for one driver invocation.
#[derive(Debug, Clone)]
pub struct DifferentialParams {
    /// Contrast kinds to compute, in order
    pub contrasts: Vec<ContrastKind>,
    /// Restrict testing to highly-variable features
    pub use_hvg: bool,
    /// Keep features with adjusted p-value at or below this threshold
    pub adj_pval_threshold: f64,
    /// Keep features with log2 fold change at or above this threshold
    pub log2fc_threshold: f64,
    pub method: TestMethod,
    pub correction: CorrectionMethod,
}

impl Default for DifferentialParams {
    fn default() -> Self {
        DifferentialParams {
            contrasts: vec![ContrastKind::Dars, ContrastKind::Degs],
            use_hvg: true,
            adj_pval_threshold: 0.05,
            log2fc_threshold: 1.5f64.log2(),
            method: TestMethod::Wilcoxon,
            correction: CorrectionMethod::BenjaminiHochberg,
        }
    }
}

/// One feature retained by [`format_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialFeature {
    pub name: String,
    pub log2_fold_change: f64,
    pub adjusted_p_value: f64,
}

/// Filtered, sorted differential features for one category, tagged with its contrast label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DifferentialTable {
    contrast: String,
    rows: Vec<DifferentialFeature>,
}

impl DifferentialTable {
    /// Category label the rows were tested for
    pub fn contrast(&self) -> &str {
        &self.contrast
    }

    pub fn rows(&self) -> &[DifferentialFeature] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature names in table order
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.name.as_str())
    }
}

/// Reshape one per-group test result into a filtered, sorted table.
///
/// Keeps features whose adjusted p-value is at most `adj_pval_threshold` and whose log2 fold
/// change is at least `log2fc_threshold`. The fold-change filter is a lower bound rather than
/// an absolute value, so only features upregulated in the group survive. Rows are ordered by
/// log2 fold change descending, then adjusted p-value ascending.
pub fn format_table(
    names: &[String],
    log2_fold_changes: &[f64],
    adjusted_p_values: &[f64],
    contrast: &str,
    adj_pval_threshold: f64,
    log2fc_threshold: f64,
) -> Result<DifferentialTable> {
    if names.len() != log2_fold_changes.len() || names.len() != adjusted_p_values.len() {
        return Err(anyhow!(
            "Mismatched result columns: {} names, {} fold changes, {} adjusted p-values",
            names.len(),
            log2_fold_changes.len(),
            adjusted_p_values.len()
        ));
    }

    let mut rows: Vec<DifferentialFeature> = names
        .iter()
        .zip(log2_fold_changes)
        .zip(adjusted_p_values)
        .filter(|&((_, &log2_fc), &adj_p)| {
            adj_p <= adj_pval_threshold && log2_fc >= log2fc_threshold
        })
        .map(|((name, &log2_fc), &adj_p)| DifferentialFeature {
            name: name.clone(),
            log2_fold_change: log2_fc,
            adjusted_p_value: adj_p,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.log2_fold_change
            .partial_cmp(&a.log2_fold_change)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.adjusted_p_value
                    .partial_cmp(&b.adjusted_p_value)
                    .unwrap_or(Ordering::Equal)
            })
    });

    Ok(DifferentialTable {
        contrast: contrast.to_string(),
        rows,
    })
}

/// Compute differential feature tables for every category of a grouping variable and store
/// them on the analysis object.
///
/// For each requested contrast kind, the source matrix is copied into a transient
/// [`FeatureMatrix`] (the accessibility matrix is transposed into cells × regions),
/// log1p-normalized, optionally restricted to highly-variable features, and tested one
/// category against the rest. One formatted table per category is written to the analysis
/// cache under the contrast kind and variable name; entries of other variables and contrast
/// kinds are preserved. Contrast kinds run sequentially and the first failure aborts the
/// remaining ones.
///
/// Callers read results back through [`MultiomeAnalysis::results`].
pub fn differential_features<T>(
    analysis: &mut MultiomeAnalysis<T>,
    variable: &str,
    params: &DifferentialParams,
) -> Result<()>
where
    T: FloatOpsTS,
{
    for &contrast in &params.contrasts {
        info!("Calculating {} for variable {}", contrast, variable);

        let (matrix, feature_names) = match contrast {
            ContrastKind::Degs => (
                analysis.expression().clone(),
                analysis.gene_names().to_vec(),
            ),
            ContrastKind::Dars => (
                transpose_csr(analysis.accessibility()),
                analysis.region_names().to_vec(),
            ),
        };
        let mut data = FeatureMatrix::new(
            matrix,
            analysis.cell_names().to_vec(),
            feature_names,
            analysis.metadata().clone(),
        )?;

        preprocessing::log1p_normalize(&mut data);
        if params.use_hvg {
            let keep = preprocessing::highly_variable_features(&data, &HighlyVariableParams::default())?;
            data = data.select_features(&keep)?;
        }

        let group_results = rank_features_groups(&data, variable, params.method, params.correction)?;

        let mut tables = HashMap::with_capacity(group_results.len());
        for group_result in group_results {
            let adjusted: Vec<f64> = group_result
                .adjusted_p_values
                .iter()
                .map(|&p| p.to_f64().unwrap_or(1.0))
                .collect();
            let table = format_table(
                data.feature_names(),
                &group_result.log2_fold_changes,
                &adjusted,
                &group_result.group,
                params.adj_pval_threshold,
                params.log2fc_threshold,
            )?;
            tables.insert(group_result.group, table);
        }
        analysis.results.insert(contrast, variable, tables);

        info!("Finished calculating {} for variable {}", contrast, variable);
    }

    Ok(())
}
