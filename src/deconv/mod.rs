//! Deconvolution driver
//!
//! Runs one annealing optimization per bulk sample, in parallel, and
//! assembles the per-sample cell type fractions into a single table. A
//! sample whose optimization fails (for example because its gene list is
//! empty) yields a row of NaN fractions and a warning; the batch continues.

mod comparison;

pub use comparison::{gene_expression_comparison, GeneComparisonRow};

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::anneal::{optimize, AnnealParams};
use crate::data::{ExpressionMatrix, GeneDictionary};
use crate::error::{DeconvError, Result};
use crate::objective::MixtureObjective;
use crate::rank::rank;
use crate::stats::pearson;

/// Options of a deconvolution batch.
#[derive(Debug, Clone)]
pub struct DeconvOptions {
    /// Annealing iterations per sample.
    pub max_iterations: usize,
    /// Run Nelder-Mead refinements during the annealing.
    pub enable_local_search: bool,
    /// Base seed; sample `i` (alphabetically) draws from `seed + i`.
    pub seed: u64,
}

impl Default for DeconvOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            enable_local_search: true,
            seed: 0,
        }
    }
}

/// Cell type fractions and fit scores for a batch of samples.
///
/// Rows follow `sample_ids` (alphabetical), columns follow `cell_types`
/// (signature matrix column order). Failed samples carry NaN in their row
/// and in both scores.
#[derive(Debug, Clone)]
pub struct MixtureTable {
    pub sample_ids: Vec<String>,
    pub cell_types: Vec<String>,
    /// Samples x cell types; each finite row sums to 1.
    pub fractions: Array2<f64>,
    /// Spearman correlation between the fitted mixture and the observed
    /// sample, over the sample's gene list.
    pub rho_spearman: Vec<f64>,
    /// Pearson correlation of the same comparison.
    pub rho_pearson: Vec<f64>,
}

impl MixtureTable {
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Fitted weight row for one sample.
    pub fn sample_fractions(&self, sample: &str) -> Option<Vec<f64>> {
        let idx = self.sample_ids.iter().position(|s| s == sample)?;
        Some(self.fractions.row(idx).to_vec())
    }
}

struct SampleFit {
    fractions: Vec<f64>,
    rho_spearman: f64,
    rho_pearson: f64,
}

/// Deconvolve every sample in `gene_dict` against the signature matrix.
///
/// Samples are processed in the dictionary's (alphabetical) key order, so
/// results and seeds do not depend on thread scheduling. Structural errors
/// such as a gene list naming a gene absent from either matrix abort the
/// batch; a failed optimization only voids its own row.
pub fn deconvolve(
    signature: &ExpressionMatrix,
    bulk: &ExpressionMatrix,
    gene_dict: &GeneDictionary,
    options: &DeconvOptions,
) -> Result<MixtureTable> {
    if gene_dict.is_empty() {
        return Err(DeconvError::EmptyData {
            reason: "Gene dictionary contains no samples".to_string(),
        });
    }

    let cell_types = signature.column_ids().to_vec();
    let samples: Vec<(&String, &Vec<String>)> = gene_dict.iter().collect();
    info!(
        "Deconvolving {} samples against {} cell types",
        samples.len(),
        cell_types.len()
    );

    let fits: Vec<SampleFit> = samples
        .par_iter()
        .enumerate()
        .map(|(index, (sample, genes))| {
            deconvolve_sample(signature, bulk, sample, genes, options, index as u64)
        })
        .collect::<Result<Vec<_>>>()?;

    let n_samples = samples.len();
    let n_types = cell_types.len();
    let mut fractions = Array2::zeros((n_samples, n_types));
    let mut rho_spearman = Vec::with_capacity(n_samples);
    let mut rho_pearson = Vec::with_capacity(n_samples);
    for (i, fit) in fits.iter().enumerate() {
        for (k, &w) in fit.fractions.iter().enumerate() {
            fractions[[i, k]] = w;
        }
        rho_spearman.push(fit.rho_spearman);
        rho_pearson.push(fit.rho_pearson);
    }

    Ok(MixtureTable {
        sample_ids: samples.iter().map(|(s, _)| (*s).clone()).collect(),
        cell_types,
        fractions,
        rho_spearman,
        rho_pearson,
    })
}

fn deconvolve_sample(
    signature: &ExpressionMatrix,
    bulk: &ExpressionMatrix,
    sample: &str,
    genes: &[String],
    options: &DeconvOptions,
    sample_index: u64,
) -> Result<SampleFit> {
    let n_types = signature.n_columns();
    let observed = bulk.subset_column(sample, genes)?;
    let signature_subset = signature.subset_rows(genes)?;

    let observed_ranks = rank(&observed);
    let objective = MixtureObjective::new(observed_ranks.clone(), signature_subset);

    let params = AnnealParams {
        max_iterations: options.max_iterations,
        enable_local_search: options.enable_local_search,
        ..AnnealParams::default()
    };
    let bounds = vec![(0.0, 1.0); objective.n_cell_types()];
    let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(sample_index));

    let outcome = optimize(|w| objective.distance(w), &bounds, &params, &mut rng);
    let result = match outcome {
        Ok(result) => result,
        Err(DeconvError::OptimizationFailed { reason }) => {
            warn!(
                "Optimization failed for sample {} ({} genes): {}",
                sample,
                genes.len(),
                reason
            );
            return Ok(SampleFit {
                fractions: vec![f64::NAN; n_types],
                rho_spearman: f64::NAN,
                rho_pearson: f64::NAN,
            });
        }
        Err(e) => return Err(e),
    };

    let total: f64 = result.x.iter().sum();
    let fractions: Vec<f64> = result.x.iter().map(|&w| w / total).collect();

    let weights = Array1::from_vec(fractions.clone());
    let mixed = objective.signature().dot(&weights).to_vec();
    let mixed_ranks = rank(&mixed);
    let rho_spearman = pearson(&mixed_ranks, &observed_ranks);
    // Pearson is invariant under compositional rescaling, so the raw
    // vectors suffice
    let rho_pearson = pearson(&mixed, &observed);

    debug!(
        "Sample {}: distance {:.6}, rho_spearman {:.4}, {} fn calls",
        sample, result.value, rho_spearman, result.fn_calls
    );

    Ok(SampleFit {
        fractions,
        rho_spearman,
        rho_pearson,
    })
}
