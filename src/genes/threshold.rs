//! Per-sample expression threshold filter

use std::collections::HashSet;

use crate::error::{DeconvError, Result};

/// True if the identifier marks a mitochondrial transcript ("mt-" prefix,
/// case-insensitive).
pub(crate) fn is_mitochondrial(gene_id: &str) -> bool {
    gene_id.len() >= 3 && gene_id[..3].eq_ignore_ascii_case("mt-")
}

/// Select genes whose expression in one sample lies strictly between
/// `min_fraction` and `max_fraction` of the sample's total.
///
/// `values` and `gene_ids` describe one bulk sample as a labeled vector and
/// must have equal length. With `exclude_mitochondrial`, genes prefixed
/// "mt-" (any case) are dropped regardless of expression. Pure function:
/// identical arguments always produce the identical set.
pub fn select_threshold_genes(
    values: &[f64],
    gene_ids: &[String],
    min_fraction: f64,
    max_fraction: f64,
    exclude_mitochondrial: bool,
) -> Result<HashSet<String>> {
    if values.len() != gene_ids.len() {
        return Err(DeconvError::DimensionMismatch {
            expected: format!("{} values", gene_ids.len()),
            got: format!("{} values", values.len()),
        });
    }
    if values.iter().any(|&v| v < 0.0 || !v.is_finite()) {
        return Err(DeconvError::InvalidExpressionMatrix {
            reason: "Sample vector must contain non-negative finite values".to_string(),
        });
    }
    if min_fraction >= max_fraction {
        return Err(DeconvError::InvalidInput {
            reason: format!(
                "min_fraction ({}) must be smaller than max_fraction ({})",
                min_fraction, max_fraction
            ),
        });
    }

    let total: f64 = values.iter().sum();
    let lower = min_fraction * total;
    let upper = max_fraction * total;

    let selected = gene_ids
        .iter()
        .zip(values.iter())
        .filter(|(gene, &v)| {
            v > lower && v < upper && !(exclude_mitochondrial && is_mitochondrial(gene))
        })
        .map(|(gene, _)| gene.clone())
        .collect();

    Ok(selected)
}
