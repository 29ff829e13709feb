//! Annotated matrices, per-cell metadata and the multiome analysis object.

use crate::differential::{ContrastKind, DifferentialTable};
use anyhow::{Result, anyhow};
use nalgebra_sparse::CsrMatrix;
use single_utilities::traits::FloatOpsTS;
use std::collections::HashMap;

/// Per-cell categorical metadata, one label vector per column name.
#[derive(Debug, Clone, Default)]
pub struct CellMetadata {
    n_cells: usize,
    columns: HashMap<String, Vec<String>>,
}

impl CellMetadata {
    pub fn new(n_cells: usize) -> Self {
        CellMetadata {
            n_cells,
            columns: HashMap::new(),
        }
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Add or replace a metadata column. The column must carry one label per cell.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        if values.len() != self.n_cells {
            return Err(anyhow!(
                "Metadata column has {} entries, expected {}",
                values.len(),
                self.n_cells
            ));
        }
        self.columns.insert(name.into(), values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&[String]> {
        self.columns
            .get(name)
            .map(|values| values.as_slice())
            .ok_or_else(|| anyhow!("Metadata column '{}' not found", name))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// A transient annotated matrix: numeric observations in cells × features orientation,
/// together with cell labels, feature labels and the per-cell metadata of the originating
/// analysis.
///
/// Instances live for the duration of one contrast computation and are discarded afterwards;
/// only the derived result tables are retained.
#[derive(Debug, Clone)]
pub struct FeatureMatrix<T> {
    matrix: CsrMatrix<T>,
    cell_names: Vec<String>,
    feature_names: Vec<String>,
    metadata: CellMetadata,
}

impl<T> FeatureMatrix<T>
where
    T: FloatOpsTS,
{
    pub fn new(
        matrix: CsrMatrix<T>,
        cell_names: Vec<String>,
        feature_names: Vec<String>,
        metadata: CellMetadata,
    ) -> Result<Self> {
        if matrix.nrows() != cell_names.len() {
            return Err(anyhow!(
                "Matrix has {} rows but {} cell names were given",
                matrix.nrows(),
                cell_names.len()
            ));
        }
        if matrix.ncols() != feature_names.len() {
            return Err(anyhow!(
                "Matrix has {} columns but {} feature names were given",
                matrix.ncols(),
                feature_names.len()
            ));
        }
        if metadata.n_cells() != cell_names.len() {
            return Err(anyhow!(
                "Metadata describes {} cells but the matrix has {}",
                metadata.n_cells(),
                cell_names.len()
            ));
        }

        Ok(FeatureMatrix {
            matrix,
            cell_names,
            feature_names,
            metadata,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut CsrMatrix<T> {
        &mut self.matrix
    }

    pub fn cell_names(&self) -> &[String] {
        &self.cell_names
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    /// Restrict the matrix to the features flagged in `keep`, remapping column indices.
    pub fn select_features(&self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.n_features() {
            return Err(anyhow!(
                "Selection mask has {} entries but the matrix has {} features",
                keep.len(),
                self.n_features()
            ));
        }

        let mut column_map = vec![usize::MAX; keep.len()];
        let mut kept_names = Vec::new();
        for (i, &flag) in keep.iter().enumerate() {
            if flag {
                column_map[i] = kept_names.len();
                kept_names.push(self.feature_names[i].clone());
            }
        }
        let n_kept = kept_names.len();

        let mut row_offsets = Vec::with_capacity(self.n_cells() + 1);
        row_offsets.push(0);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        for row in self.matrix.row_iter() {
            for (&col, value) in row.col_indices().iter().zip(row.values()) {
                if keep[col] {
                    col_indices.push(column_map[col]);
                    values.push(*value);
                }
            }
            row_offsets.push(col_indices.len());
        }

        let matrix =
            CsrMatrix::try_from_csr_data(self.n_cells(), n_kept, row_offsets, col_indices, values)
                .map_err(|e| anyhow!("Invalid feature selection result: {}", e))?;

        FeatureMatrix::new(
            matrix,
            self.cell_names.clone(),
            kept_names,
            self.metadata.clone(),
        )
    }
}

/// Transpose a CSR matrix by scattering its entries into per-column buckets.
pub(crate) fn transpose_csr<T>(matrix: &CsrMatrix<T>) -> CsrMatrix<T>
where
    T: FloatOpsTS,
{
    let nnz = matrix.nnz();
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());

    let mut row_offsets = vec![0usize; ncols + 1];
    for (_, col, _) in matrix.triplet_iter() {
        row_offsets[col + 1] += 1;
    }
    for col in 0..ncols {
        row_offsets[col + 1] += row_offsets[col];
    }

    let mut next_slot = row_offsets.clone();
    let mut col_indices = vec![0usize; nnz];
    let mut values = vec![T::zero(); nnz];
    for (row, col, value) in matrix.triplet_iter() {
        let slot = next_slot[col];
        col_indices[slot] = row;
        values[slot] = *value;
        next_slot[col] += 1;
    }

    CsrMatrix::try_from_csr_data(ncols, nrows, row_offsets, col_indices, values)
        .expect("scattered CSR data keeps the format invariants")
}

/// The analysis object shared across the differential workflow.
///
/// Owns the expression matrix (cells × genes), the accessibility matrix (regions × cells),
/// the corresponding name lists, per-cell metadata, and the cache the driver writes result
/// tables into. The cache accumulates across calls; recomputing a contrast for a variable
/// replaces only that entry.
#[derive(Debug, Clone)]
pub struct MultiomeAnalysis<T> {
    pub(crate) expression: CsrMatrix<T>,
    pub(crate) accessibility: CsrMatrix<T>,
    pub(crate) cell_names: Vec<String>,
    pub(crate) gene_names: Vec<String>,
    pub(crate) region_names: Vec<String>,
    pub(crate) metadata: CellMetadata,
    pub(crate) results: DifferentialResults,
}

impl<T> MultiomeAnalysis<T>
where
    T: FloatOpsTS,
{
    pub fn new(
        expression: CsrMatrix<T>,
        accessibility: CsrMatrix<T>,
        cell_names: Vec<String>,
        gene_names: Vec<String>,
        region_names: Vec<String>,
        metadata: CellMetadata,
    ) -> Result<Self> {
        if expression.nrows() != cell_names.len() || expression.ncols() != gene_names.len() {
            return Err(anyhow!(
                "Expression matrix is {}x{} but {} cells and {} genes were named",
                expression.nrows(),
                expression.ncols(),
                cell_names.len(),
                gene_names.len()
            ));
        }
        if accessibility.nrows() != region_names.len() || accessibility.ncols() != cell_names.len()
        {
            return Err(anyhow!(
                "Accessibility matrix is {}x{} but {} regions and {} cells were named",
                accessibility.nrows(),
                accessibility.ncols(),
                region_names.len(),
                cell_names.len()
            ));
        }
        if metadata.n_cells() != cell_names.len() {
            return Err(anyhow!(
                "Metadata describes {} cells but {} cell names were given",
                metadata.n_cells(),
                cell_names.len()
            ));
        }

        Ok(MultiomeAnalysis {
            expression,
            accessibility,
            cell_names,
            gene_names,
            region_names,
            metadata,
            results: DifferentialResults::default(),
        })
    }

    pub fn n_cells(&self) -> usize {
        self.cell_names.len()
    }

    pub fn expression(&self) -> &CsrMatrix<T> {
        &self.expression
    }

    pub fn accessibility(&self) -> &CsrMatrix<T> {
        &self.accessibility
    }

    pub fn cell_names(&self) -> &[String] {
        &self.cell_names
    }

    pub fn gene_names(&self) -> &[String] {
        &self.gene_names
    }

    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    pub fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut CellMetadata {
        &mut self.metadata
    }

    pub fn results(&self) -> &DifferentialResults {
        &self.results
    }
}

/// Two-level cache of differential result tables: contrast kind, then grouping variable,
/// then one table per category of that variable.
#[derive(Debug, Clone, Default)]
pub struct DifferentialResults {
    tables: HashMap<ContrastKind, HashMap<String, HashMap<String, DifferentialTable>>>,
}

impl DifferentialResults {
    /// Store the per-category tables computed for one contrast kind and grouping variable,
    /// replacing any previous entry for that pair and leaving other entries untouched.
    pub fn insert(
        &mut self,
        contrast: ContrastKind,
        variable: impl Into<String>,
        tables: HashMap<String, DifferentialTable>,
    ) {
        self.tables
            .entry(contrast)
            .or_default()
            .insert(variable.into(), tables);
    }

    pub fn get(
        &self,
        contrast: ContrastKind,
        variable: &str,
    ) -> Option<&HashMap<String, DifferentialTable>> {
        self.tables.get(&contrast)?.get(variable)
    }

    pub fn contains(&self, contrast: ContrastKind, variable: &str) -> bool {
        self.get(contrast, variable).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|per_variable| per_variable.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::CooMatrix;

    fn small_matrix() -> CsrMatrix<f64> {
        // 3 cells x 4 features
        let mut coo = CooMatrix::new(3, 4);
        coo.push(0, 0, 1.0);
        coo.push(0, 2, 2.0);
        coo.push(1, 1, 3.0);
        coo.push(1, 3, 4.0);
        coo.push(2, 0, 5.0);
        CsrMatrix::from(&coo)
    }

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}_{i}")).collect()
    }

    #[test]
    fn test_metadata_column_roundtrip() {
        let mut metadata = CellMetadata::new(3);
        metadata
            .insert_column("state", vec!["a".into(), "b".into(), "a".into()])
            .unwrap();

        assert!(metadata.contains_column("state"));
        assert_eq!(metadata.column("state").unwrap().len(), 3);
        assert!(metadata.column("missing").is_err());
    }

    #[test]
    fn test_metadata_rejects_wrong_length() {
        let mut metadata = CellMetadata::new(3);
        let err = metadata
            .insert_column("state", vec!["a".into()])
            .unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn test_feature_matrix_shape_validation() {
        let metadata = CellMetadata::new(3);
        assert!(
            FeatureMatrix::new(small_matrix(), names("cell", 3), names("f", 4), metadata.clone())
                .is_ok()
        );
        assert!(
            FeatureMatrix::new(small_matrix(), names("cell", 2), names("f", 4), metadata.clone())
                .is_err()
        );
        assert!(
            FeatureMatrix::new(small_matrix(), names("cell", 3), names("f", 5), metadata).is_err()
        );
        assert!(
            FeatureMatrix::new(
                small_matrix(),
                names("cell", 3),
                names("f", 4),
                CellMetadata::new(7)
            )
            .is_err()
        );
    }

    #[test]
    fn test_select_features() {
        let data = FeatureMatrix::new(
            small_matrix(),
            names("cell", 3),
            names("f", 4),
            CellMetadata::new(3),
        )
        .unwrap();

        let selected = data
            .select_features(&[true, false, true, false])
            .unwrap();
        assert_eq!(selected.n_features(), 2);
        assert_eq!(selected.feature_names(), &["f_0", "f_2"]);

        // Former column 2 is now column 1
        let entry = selected.matrix().get_entry(0, 1).unwrap().into_value();
        assert_abs_diff_eq!(entry, 2.0, epsilon = 1e-12);
        // Dropped columns no longer contribute entries
        assert_eq!(selected.matrix().nnz(), 3);

        let err = data.select_features(&[true, false]).unwrap_err();
        assert!(err.to_string().contains("mask"));
    }

    #[test]
    fn test_transpose_csr() {
        let matrix = small_matrix();
        let transposed = transpose_csr(&matrix);

        assert_eq!(transposed.nrows(), 4);
        assert_eq!(transposed.ncols(), 3);
        assert_eq!(transposed.nnz(), matrix.nnz());
        for (row, col, value) in matrix.triplet_iter() {
            let mirrored = transposed.get_entry(col, row).unwrap().into_value();
            assert_abs_diff_eq!(mirrored, *value, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_results_cache_accumulates_and_overwrites() {
        let mut results = DifferentialResults::default();
        assert!(results.is_empty());

        let mut tables = HashMap::new();
        tables.insert("a".to_string(), DifferentialTable::default());
        results.insert(ContrastKind::Degs, "celltype", tables.clone());
        results.insert(ContrastKind::Degs, "batch", tables.clone());
        results.insert(ContrastKind::Dars, "celltype", tables.clone());

        assert!(results.contains(ContrastKind::Degs, "celltype"));
        assert!(results.contains(ContrastKind::Degs, "batch"));
        assert!(results.contains(ContrastKind::Dars, "celltype"));
        assert!(!results.contains(ContrastKind::Dars, "batch"));

        // Recomputing a pair replaces only that entry
        let mut bigger = tables.clone();
        bigger.insert("b".to_string(), DifferentialTable::default());
        results.insert(ContrastKind::Degs, "celltype", bigger);
        assert_eq!(results.get(ContrastKind::Degs, "celltype").unwrap().len(), 2);
        assert_eq!(results.get(ContrastKind::Degs, "batch").unwrap().len(), 1);
    }
}
