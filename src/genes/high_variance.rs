//! Highly variable gene selection across cell types
//!
//! Seurat-flavour procedure: dispersion (variance over mean) per gene on
//! column-normalized data, log-transformed and normalized against genes of
//! similar mean expression via 20 equal-width bins over log1p-mean.

use std::collections::HashSet;

use ndarray::Axis;

use crate::data::ExpressionMatrix;
use crate::error::{DeconvError, Result};

const N_BINS: usize = 20;
/// Means of exactly zero are clamped here to keep dispersion defined.
const MEAN_EPS: f64 = 1e-12;

/// Select genes whose bin-normalized log-dispersion across cell types
/// strictly exceeds `dispersion_floor`.
///
/// One-shot pure computation; no state is retained between calls.
pub fn select_high_variance_genes(
    signature: &ExpressionMatrix,
    dispersion_floor: f64,
) -> Result<HashSet<String>> {
    let n_types = signature.n_columns();
    if n_types < 2 {
        return Err(DeconvError::InvalidExpressionMatrix {
            reason: format!(
                "Need at least 2 cell type columns to compute dispersion, got {}",
                n_types
            ),
        });
    }

    // normalize each cell type column to sum 1
    let col_sums = signature.column_sums();
    if let Some(idx) = col_sums.iter().position(|&s| s == 0.0) {
        return Err(DeconvError::InvalidExpressionMatrix {
            reason: format!(
                "Cell type column '{}' sums to zero and cannot be normalized",
                signature.column_ids()[idx]
            ),
        });
    }

    let n_genes = signature.n_genes();
    let mut log_disp = vec![f64::NAN; n_genes];
    let mut log_mean = vec![0.0; n_genes];

    for (i, row) in signature.values().axis_iter(Axis(0)).enumerate() {
        let normalized: Vec<f64> = row
            .iter()
            .zip(col_sums.iter())
            .map(|(&v, &s)| v / s)
            .collect();

        let mut mean = normalized.iter().sum::<f64>() / n_types as f64;
        // unbiased sample variance across cell types
        let var = normalized
            .iter()
            .map(|&v| (v - mean).powi(2))
            .sum::<f64>()
            / (n_types - 1) as f64;

        if mean == 0.0 {
            mean = MEAN_EPS;
        }
        let dispersion = var / mean;
        if dispersion > 0.0 {
            log_disp[i] = dispersion.ln();
        }
        log_mean[i] = mean.ln_1p();
    }

    // bin genes into 20 equal-width bins over log-mean
    let min_mean = log_mean.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_mean = log_mean.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = (max_mean - min_mean) / N_BINS as f64;

    let bin_of = |m: f64| -> usize {
        if width <= 0.0 {
            return 0;
        }
        (((m - min_mean) / width) as usize).min(N_BINS - 1)
    };

    let mut bin_values: Vec<Vec<f64>> = vec![Vec::new(); N_BINS];
    for i in 0..n_genes {
        if log_disp[i].is_finite() {
            bin_values[bin_of(log_mean[i])].push(log_disp[i]);
        }
    }

    // per-bin mean and unbiased std of log-dispersion; single-gene bins get
    // mean 0 and std equal to the lone dispersion so that gene normalizes
    // to exactly 1
    let mut bin_mean = vec![f64::NAN; N_BINS];
    let mut bin_std = vec![f64::NAN; N_BINS];
    for (b, values) in bin_values.iter().enumerate() {
        match values.len() {
            0 => {}
            1 => {
                bin_mean[b] = 0.0;
                bin_std[b] = values[0];
            }
            n => {
                let mean = values.iter().sum::<f64>() / n as f64;
                let var = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>()
                    / (n - 1) as f64;
                bin_mean[b] = mean;
                bin_std[b] = var.sqrt();
            }
        }
    }

    let mut selected = HashSet::new();
    for i in 0..n_genes {
        let b = bin_of(log_mean[i]);
        let norm_disp = (log_disp[i] - bin_mean[b]) / bin_std[b];
        // NaN normalized dispersion counts as non-variable
        let norm_disp = if norm_disp.is_nan() { 0.0 } else { norm_disp };
        if norm_disp > dispersion_floor {
            selected.insert(signature.gene_ids()[i].clone());
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_variable_genes_beat_flat_genes() {
        // G_var swings wildly across types, G_flat does not; at a floor of 0
        // the variable gene must qualify and the flat one must not, given
        // both land in populated bins
        let signature = ExpressionMatrix::new(
            Array2::from_shape_vec(
                (4, 3),
                vec![
                    100.0, 1.0, 50.0, // variable
                    40.0, 40.0, 40.0, // flat
                    90.0, 2.0, 60.0, // variable, similar mean to the first
                    41.0, 40.0, 39.0, // flat, similar mean to the second
                ],
            )
            .unwrap(),
            ids(&["G_VAR1", "G_FLAT1", "G_VAR2", "G_FLAT2"]),
            ids(&["a", "b", "c"]),
        )
        .unwrap();

        let selected = select_high_variance_genes(&signature, 0.0).unwrap();
        assert!(selected.contains("G_VAR1") || selected.contains("G_VAR2"));
        assert!(!selected.contains("G_FLAT1") || !selected.contains("G_FLAT2"));
    }

    #[test]
    fn test_zero_column_sum_is_error() {
        let signature = ExpressionMatrix::new(
            Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 2.0, 0.0]).unwrap(),
            ids(&["G1", "G2"]),
            ids(&["a", "b"]),
        )
        .unwrap();
        assert!(matches!(
            select_high_variance_genes(&signature, 0.5),
            Err(DeconvError::InvalidExpressionMatrix { .. })
        ));
    }

    #[test]
    fn test_single_column_is_error() {
        let signature = ExpressionMatrix::new(
            Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap(),
            ids(&["G1", "G2"]),
            ids(&["a"]),
        )
        .unwrap();
        assert!(select_high_variance_genes(&signature, 0.5).is_err());
    }

    #[test]
    fn test_high_floor_selects_nothing() {
        let signature = ExpressionMatrix::new(
            Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 0.5, 3.0, 3.0]).unwrap(),
            ids(&["G1", "G2", "G3"]),
            ids(&["a", "b"]),
        )
        .unwrap();
        let selected = select_high_variance_genes(&signature, f64::INFINITY).unwrap();
        assert!(selected.is_empty());
    }
}
