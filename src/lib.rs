//! # single-differential
//!
//! Differential feature analysis for single-cell multiome data, part of the single-rust ecosystem.
//!
//! Given an expression matrix (cells × genes), an accessibility matrix (regions × cells) and a
//! categorical grouping of the cells, this crate identifies differentially expressed genes (DEGs)
//! and differentially accessible regions (DARs) for every category of the grouping variable. Each
//! category is tested against all remaining cells with a rank-based test, and one filtered,
//! sorted result table per category is cached on the shared analysis object.
//!
//! ## Core Features
//!
//! - **Group-vs-rest testing**: Wilcoxon rank-sum (default) or t-tests for every category of a grouping variable
//! - **Multiple Testing Correction**: Benjamini-Hochberg FDR (default) or Bonferroni
//! - **Feature Selection**: optional dispersion-based highly-variable feature restriction
//! - **Sparse Matrix Support**: optimized for `CsrMatrix` from nalgebra-sparse
//!
//! ## Quick Start
//!
//! Build a [`data::MultiomeAnalysis`] from your matrices and per-cell metadata, then call
//! [`differential::differential_features`] with a grouping variable. Results are written back
//! onto the analysis object, keyed by contrast kind and variable name.
//!
//! The driver reports progress through the [`log`] facade; initialize a logger once at process
//! start (for example with `env_logger`) to see it.
//!
//! ## Module Organization
//!
//! - **[`data`]**: annotated matrices, per-cell metadata and the analysis object
//! - **[`preprocessing`]**: log-normalization and highly-variable feature selection
//! - **[`testing`]**: statistical tests, effect sizes and multiple testing correction
//! - **[`differential`]**: the DEG/DAR driver and result tables

pub mod data;
pub mod differential;
pub mod preprocessing;
pub mod testing;
