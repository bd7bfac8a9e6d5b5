//! Stability analysis by repeated perturbed deconvolution
//!
//! Each repeat perturbs every sample's gene list (bootstrap resampling or
//! random subsampling), reruns the full deconvolution on the perturbed
//! lists, and records the fitted fraction of every (sample, cell type)
//! pair. The spread of those fractions across repeats measures how much a
//! fit depends on the exact gene selection.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::data::{ExpressionMatrix, GeneDictionary};
use crate::deconv::{deconvolve, DeconvOptions};
use crate::error::{DeconvError, Result};

/// Seed stride between repeats, so each repeat draws an independent stream.
const REPEAT_SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

/// How the gene lists are perturbed between repeats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerturbMode {
    /// Resample each gene list with replacement to its original length.
    Bootstrap,
    /// Keep a random subset of each gene list, without replacement.
    Subsample {
        /// Fraction of the list to keep, in (0, 1]. At least one gene is
        /// kept from any non-empty list.
        fraction: f64,
    },
}

/// One fitted fraction from one repeat.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityRecord {
    pub sample: String,
    pub cell_type: String,
    /// Repeat index, 0-based.
    pub run: usize,
    /// Fitted fraction; NaN when the repeat's optimization failed for this
    /// sample.
    pub fraction: f64,
}

/// Run `repeats` perturbed deconvolutions and collect all fitted fractions.
///
/// Output is long-form with exactly `repeats x samples x cell_types`
/// records, NaN rows included, ordered by run, then sample (alphabetical),
/// then cell type (signature column order). The same seed reproduces the
/// same records.
pub fn repeat_deconvolution(
    signature: &ExpressionMatrix,
    bulk: &ExpressionMatrix,
    gene_dict: &GeneDictionary,
    options: &DeconvOptions,
    mode: PerturbMode,
    repeats: usize,
) -> Result<Vec<StabilityRecord>> {
    if repeats == 0 {
        return Err(DeconvError::InvalidInput {
            reason: "repeats must be at least 1".to_string(),
        });
    }
    if let PerturbMode::Subsample { fraction } = mode {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(DeconvError::InvalidInput {
                reason: format!("subsample fraction must lie in (0, 1], got {}", fraction),
            });
        }
    }

    info!("Running {} perturbed deconvolutions ({:?})", repeats, mode);

    let mut records = Vec::with_capacity(repeats * gene_dict.len() * signature.n_columns());
    for run in 0..repeats {
        let run_seed = options
            .seed
            .wrapping_add(((run as u64) + 1).wrapping_mul(REPEAT_SEED_STRIDE));
        let mut rng = StdRng::seed_from_u64(run_seed);

        let mut perturbed = GeneDictionary::new();
        for (sample, genes) in gene_dict {
            perturbed.insert(sample.clone(), perturb_gene_list(genes, mode, &mut rng));
        }

        let run_options = DeconvOptions {
            seed: run_seed,
            ..options.clone()
        };
        let table = deconvolve(signature, bulk, &perturbed, &run_options)?;

        for (i, sample) in table.sample_ids.iter().enumerate() {
            for (k, cell_type) in table.cell_types.iter().enumerate() {
                records.push(StabilityRecord {
                    sample: sample.clone(),
                    cell_type: cell_type.clone(),
                    run,
                    fraction: table.fractions[[i, k]],
                });
            }
        }
    }

    Ok(records)
}

/// Perturb one gene list. Empty lists stay empty in either mode.
fn perturb_gene_list<R: Rng + ?Sized>(
    genes: &[String],
    mode: PerturbMode,
    rng: &mut R,
) -> Vec<String> {
    if genes.is_empty() {
        return Vec::new();
    }
    match mode {
        PerturbMode::Bootstrap => (0..genes.len())
            .map(|_| genes[rng.random_range(0..genes.len())].clone())
            .collect(),
        PerturbMode::Subsample { fraction } => {
            let keep = ((genes.len() as f64 * fraction).round() as usize).max(1);
            let mut indices: Vec<usize> =
                rand::seq::index::sample(rng, genes.len(), keep).into_vec();
            indices.sort_unstable();
            indices.into_iter().map(|i| genes[i].clone()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use std::collections::BTreeMap;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn small_dataset() -> (ExpressionMatrix, ExpressionMatrix, GeneDictionary) {
        let n_genes = 30;
        let gene_ids: Vec<String> = (0..n_genes).map(|g| format!("G{:02}", g)).collect();
        let mut values = Vec::with_capacity(n_genes * 2);
        for g in 0..n_genes {
            let x = g as f64;
            values.push((x * 0.43).sin().abs() * 50.0 + 1.0);
            values.push((x * 0.91 + 2.0).sin().abs() * 50.0 + 1.0);
        }
        let signature = ExpressionMatrix::new(
            Array2::from_shape_vec((n_genes, 2), values).unwrap(),
            gene_ids.clone(),
            ids(&["a", "b"]),
        )
        .unwrap();

        let weights = Array1::from_vec(vec![0.3, 0.7]);
        let mixed = signature.values().dot(&weights);
        let bulk = ExpressionMatrix::new(
            mixed.insert_axis(ndarray::Axis(1)),
            gene_ids.clone(),
            ids(&["s1"]),
        )
        .unwrap();

        let mut dict = BTreeMap::new();
        dict.insert("s1".to_string(), gene_ids);
        (signature, bulk, dict)
    }

    fn fast_options() -> DeconvOptions {
        DeconvOptions {
            max_iterations: 30,
            ..DeconvOptions::default()
        }
    }

    #[test]
    fn test_record_cardinality_and_run_indices() {
        let (signature, bulk, dict) = small_dataset();
        let records = repeat_deconvolution(
            &signature,
            &bulk,
            &dict,
            &fast_options(),
            PerturbMode::Bootstrap,
            3,
        )
        .unwrap();

        // 3 repeats x 1 sample x 2 cell types
        assert_eq!(records.len(), 6);
        let runs: Vec<usize> = records.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![0, 0, 1, 1, 2, 2]);
        assert!(records.iter().all(|r| r.sample == "s1"));
    }

    #[test]
    fn test_same_seed_reproduces_records() {
        let (signature, bulk, dict) = small_dataset();
        let run = || {
            repeat_deconvolution(
                &signature,
                &bulk,
                &dict,
                &fast_options(),
                PerturbMode::Subsample { fraction: 0.5 },
                2,
            )
            .unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(x.fraction == y.fraction || (x.fraction.is_nan() && y.fraction.is_nan()));
        }
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        let (signature, bulk, dict) = small_dataset();
        assert!(repeat_deconvolution(
            &signature,
            &bulk,
            &dict,
            &fast_options(),
            PerturbMode::Bootstrap,
            0,
        )
        .is_err());
        assert!(repeat_deconvolution(
            &signature,
            &bulk,
            &dict,
            &fast_options(),
            PerturbMode::Subsample { fraction: 0.0 },
            2,
        )
        .is_err());
        assert!(repeat_deconvolution(
            &signature,
            &bulk,
            &dict,
            &fast_options(),
            PerturbMode::Subsample { fraction: 1.5 },
            2,
        )
        .is_err());
    }

    #[test]
    fn test_perturb_modes() {
        let genes = ids(&["G1", "G2", "G3", "G4", "G5", "G6", "G7", "G8"]);
        let mut rng = StdRng::seed_from_u64(5);

        let boot = perturb_gene_list(&genes, PerturbMode::Bootstrap, &mut rng);
        assert_eq!(boot.len(), genes.len());
        assert!(boot.iter().all(|g| genes.contains(g)));

        let sub = perturb_gene_list(&genes, PerturbMode::Subsample { fraction: 0.5 }, &mut rng);
        assert_eq!(sub.len(), 4);
        // without replacement, all kept genes are distinct
        let mut unique = sub.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), sub.len());

        // tiny fraction still keeps one gene from a non-empty list
        let tiny = perturb_gene_list(&genes, PerturbMode::Subsample { fraction: 1e-6 }, &mut rng);
        assert_eq!(tiny.len(), 1);

        let empty = perturb_gene_list(&[], PerturbMode::Bootstrap, &mut rng);
        assert!(empty.is_empty());
    }
}
