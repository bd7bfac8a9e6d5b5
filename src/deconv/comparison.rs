//! Gene-wise comparison of a fitted mixture against the observed sample
//!
//! For each selected gene, the observed share (of the sample's total over
//! the gene list) is set against the share predicted by the fitted mixture,
//! so systematic over- and under-estimation of single genes is visible.

use ndarray::Array1;
use serde::Serialize;

use crate::data::ExpressionMatrix;
use crate::error::{DeconvError, Result};

/// One gene's contribution to the comparison table.
#[derive(Debug, Clone, Serialize)]
pub struct GeneComparisonRow {
    pub gene: String,
    /// Share of the observed sample's total over the gene list.
    pub observed_share: f64,
    /// Share predicted by the fitted mixture.
    pub estimated_share: f64,
    /// Observed over estimated share.
    pub fold_change: f64,
    pub log10_fold_change: f64,
}

/// Build the gene-wise comparison for one sample.
///
/// `observed` holds the sample's raw expression over `gene_list`, in list
/// order; `weights` is the fitted (normalized) mixture for that sample.
/// NaN weights, as produced by a failed optimization, are rejected.
pub fn gene_expression_comparison(
    weights: &[f64],
    observed: &[f64],
    signature: &ExpressionMatrix,
    gene_list: &[String],
) -> Result<Vec<GeneComparisonRow>> {
    if weights.len() != signature.n_columns() {
        return Err(DeconvError::DimensionMismatch {
            expected: format!("{} weights", signature.n_columns()),
            got: format!("{} weights", weights.len()),
        });
    }
    if observed.len() != gene_list.len() {
        return Err(DeconvError::DimensionMismatch {
            expected: format!("{} observed values", gene_list.len()),
            got: format!("{} observed values", observed.len()),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(DeconvError::InvalidInput {
            reason: "Mixture weights must be finite".to_string(),
        });
    }
    if gene_list.is_empty() {
        return Err(DeconvError::EmptyData {
            reason: "Gene list for the comparison is empty".to_string(),
        });
    }

    let signature_subset = signature.subset_rows(gene_list)?;
    let mixed = signature_subset.dot(&Array1::from_vec(weights.to_vec()));

    let observed_total: f64 = observed.iter().sum();
    let mixed_total: f64 = mixed.iter().sum();
    if !(observed_total > 0.0) || !(mixed_total > 0.0) {
        return Err(DeconvError::InvalidInput {
            reason: "Observed and estimated totals must be positive".to_string(),
        });
    }

    let rows = gene_list
        .iter()
        .zip(observed.iter())
        .zip(mixed.iter())
        .map(|((gene, &obs), &est)| {
            let observed_share = obs / observed_total;
            let estimated_share = est / mixed_total;
            let fold_change = observed_share / estimated_share;
            GeneComparisonRow {
                gene: gene.clone(),
                observed_share,
                estimated_share,
                fold_change,
                log10_fold_change: fold_change.log10(),
            }
        })
        .collect();

    Ok(rows)
}
