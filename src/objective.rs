//! Rank-correlation objective for one bulk sample
//!
//! The optimizer proposes mixture weight vectors; the objective mixes the
//! signature profiles with those weights and scores the result against the
//! observed sample by Spearman correlation. This is the hot path of the
//! whole pipeline: it performs no I/O and no logging, and tolerates any
//! candidate vector (all-zero weights, single-gene lists) by returning NaN
//! instead of panicking.

use ndarray::{Array1, Array2, ArrayView2};

use crate::rank::rank;
use crate::stats::pearson;

/// The objective function for one sample, bound to that sample's ranked
/// observations and gene-subsetted signature matrix.
#[derive(Debug, Clone)]
pub struct MixtureObjective {
    /// Average ranks of the observed bulk vector over the selected genes
    observed_ranks: Vec<f64>,
    /// Signature matrix restricted to the selected genes (genes x cell types)
    signature: Array2<f64>,
}

impl MixtureObjective {
    pub fn new(observed_ranks: Vec<f64>, signature: Array2<f64>) -> Self {
        debug_assert_eq!(observed_ranks.len(), signature.nrows());
        Self {
            observed_ranks,
            signature,
        }
    }

    /// Number of cell types (the optimization dimension)
    pub fn n_cell_types(&self) -> usize {
        self.signature.ncols()
    }

    /// Number of selected genes backing the comparison
    pub fn n_genes(&self) -> usize {
        self.signature.nrows()
    }

    /// The gene-subsetted signature matrix this objective is bound to
    pub fn signature(&self) -> ArrayView2<'_, f64> {
        self.signature.view()
    }

    /// One minus the Spearman correlation between the weighted mixture and
    /// the observed sample, over the selected genes.
    ///
    /// `weights` need not be normalized; they are scaled to sum 1 before
    /// mixing. Range is [0, 2], lower is better, 0 is a perfect rank match.
    /// A weight sum of zero or a degenerate (constant / too short) mixture
    /// yields NaN, which the optimizer treats as an invalid, never-accepted
    /// cost.
    pub fn distance(&self, weights: &[f64]) -> f64 {
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return f64::NAN;
        }

        let scaled = Array1::from_iter(weights.iter().map(|&w| w / total));
        let mixed = self.signature.dot(&scaled).to_vec();

        let mixed_ranks = rank(&mixed);
        1.0 - pearson(&mixed_ranks, &self.observed_ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn exact_mixture_objective() -> (MixtureObjective, Vec<f64>) {
        let signature = array![
            [10.0, 1.0, 0.5],
            [2.0, 8.0, 1.0],
            [0.1, 3.0, 9.0],
            [5.0, 5.0, 0.2],
            [1.0, 0.2, 4.0],
        ];
        let truth = vec![0.2, 0.3, 0.5];
        let observed: Vec<f64> = (0..5)
            .map(|g| {
                (0..3)
                    .map(|k| truth[k] * signature[[g, k]])
                    .sum::<f64>()
            })
            .collect();
        let objective = MixtureObjective::new(rank(&observed), signature);
        (objective, truth)
    }

    #[test]
    fn test_exact_weights_give_zero_distance() {
        let (objective, truth) = exact_mixture_objective();
        assert_relative_eq!(objective.distance(&truth), 0.0, epsilon = 1e-12);
        // scale invariance: un-normalized weights with the right ratios too
        let scaled: Vec<f64> = truth.iter().map(|w| w * 7.0).collect();
        assert_relative_eq!(objective.distance(&scaled), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_weights_give_nan() {
        let (objective, _) = exact_mixture_objective();
        assert!(objective.distance(&[0.0, 0.0, 0.0]).is_nan());
    }

    #[test]
    fn test_single_gene_gives_nan() {
        let objective = MixtureObjective::new(vec![1.0], array![[1.0, 2.0]]);
        assert!(objective.distance(&[0.5, 0.5]).is_nan());
    }

    #[test]
    fn test_distance_within_range() {
        let (objective, _) = exact_mixture_objective();
        let d = objective.distance(&[0.9, 0.05, 0.05]);
        assert!(d.is_finite());
        assert!((0.0..=2.0).contains(&d));
    }
}
