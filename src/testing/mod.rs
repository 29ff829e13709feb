use single_utilities::traits::FloatOps;

pub mod correction;
pub mod effect;
pub mod inference;

pub mod utils;

/// Statistical test applied per feature when comparing a cell group against the rest.
#[derive(Debug, Clone, Copy)]
pub enum TestMethod {
    /// Wilcoxon rank-sum (Mann-Whitney U) with tie-averaged ranks
    Wilcoxon,
    TTest(TTestType),
}

#[derive(Debug, Clone, Copy)]
pub enum TTestType {
    Student, // Equal variance
    Welch,   // Unequal variance
}

#[derive(Debug, Clone, Copy)]
pub enum Alternative {
    TwoSided,
    Less,
    Greater,
}

/// Multiple testing correction applied across features within one group comparison.
#[derive(Debug, Clone, Copy)]
pub enum CorrectionMethod {
    BenjaminiHochberg,
    Bonferroni,
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (e.g. U statistic, t-statistic)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult { statistic, p_value }
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: T) -> bool {
        self.p_value < alpha
    }
}

/// Per-feature results for one category tested against all remaining cells.
#[derive(Debug, Clone)]
pub struct GroupTestResults<T> {
    /// Category label of the cells tested against the rest
    pub group: String,
    /// Test statistics, one per feature
    pub statistics: Vec<T>,
    /// Raw (unadjusted) p-values
    pub p_values: Vec<T>,
    /// Adjusted p-values (after multiple testing correction)
    pub adjusted_p_values: Vec<T>,
    /// Log2 fold changes of the category mean over the rest mean
    pub log2_fold_changes: Vec<f64>,
}

impl<T> GroupTestResults<T>
where
    T: FloatOps,
{
    pub fn n_features(&self) -> usize {
        self.p_values.len()
    }

    /// Get indices of significant features at the given adjusted threshold
    pub fn significant_indices(&self, alpha: T) -> Vec<usize> {
        self.adjusted_p_values
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| if p < alpha { Some(i) } else { None })
            .collect()
    }
}
