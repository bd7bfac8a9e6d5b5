//! Gene selection for deconvolution
//!
//! Each bulk sample is deconvolved on its own gene subset: genes that are
//! highly variable across the signature's cell types, intersected with the
//! genes whose expression in that sample falls between two fractional
//! thresholds (dropping mitochondrial transcripts by default).

mod high_variance;
mod threshold;

pub use high_variance::select_high_variance_genes;
pub use threshold::select_threshold_genes;

use log::{debug, info};

use crate::data::{ExpressionMatrix, GeneDictionary};
use crate::error::{DeconvError, Result};

/// Parameters for gene selection.
#[derive(Debug, Clone)]
pub struct GeneSelectionParams {
    /// Normalized-dispersion floor a gene must exceed to count as highly
    /// variable in the signature matrix.
    pub dispersion_floor: f64,
    /// Minimum expression, as a fraction of the sample's total, a gene must
    /// strictly exceed.
    pub min_fraction: f64,
    /// Maximum expression, as a fraction of the sample's total, a gene must
    /// stay strictly below.
    pub max_fraction: f64,
    /// Drop genes whose identifier starts with "mt-" (case-insensitive).
    pub exclude_mitochondrial: bool,
}

impl Default for GeneSelectionParams {
    fn default() -> Self {
        Self {
            dispersion_floor: 0.5,
            min_fraction: 1e-5,
            max_fraction: 0.01,
            exclude_mitochondrial: true,
        }
    }
}

impl GeneSelectionParams {
    /// Validate the parameter combination.
    pub fn validate(&self) -> Result<()> {
        if !self.min_fraction.is_finite() || self.min_fraction < 0.0 {
            return Err(DeconvError::InvalidInput {
                reason: format!("min_fraction must be a non-negative number, got {}", self.min_fraction),
            });
        }
        if self.min_fraction >= self.max_fraction {
            return Err(DeconvError::InvalidInput {
                reason: format!(
                    "min_fraction ({}) must be smaller than max_fraction ({})",
                    self.min_fraction, self.max_fraction
                ),
            });
        }
        Ok(())
    }
}

/// Build the per-sample gene lists for a dataset.
///
/// The highly variable gene set is computed once from the signature matrix;
/// each bulk sample (processed alphabetically by name) then contributes the
/// intersection of its threshold-passing genes with that set. An empty list
/// for a sample is valid output here; the driver reports the failure when it
/// later tries to optimize over it.
pub fn make_gene_dictionary(
    signature: &ExpressionMatrix,
    bulk: &ExpressionMatrix,
    params: &GeneSelectionParams,
) -> Result<GeneDictionary> {
    params.validate()?;

    let high_var = select_high_variance_genes(signature, params.dispersion_floor)?;
    info!(
        "{} highly variable genes identified in the cell type reference",
        high_var.len()
    );

    let mut sample_names: Vec<&String> = bulk.column_ids().iter().collect();
    sample_names.sort();

    let mut gene_dict = GeneDictionary::new();
    for sample in sample_names {
        let column = bulk.column(sample)?.to_vec();
        let passing = select_threshold_genes(
            &column,
            bulk.gene_ids(),
            params.min_fraction,
            params.max_fraction,
            params.exclude_mitochondrial,
        )?;
        // keep the bulk matrix's row order so the list is deterministic
        let selected: Vec<String> = bulk
            .gene_ids()
            .iter()
            .filter(|g| passing.contains(g.as_str()) && high_var.contains(g.as_str()))
            .cloned()
            .collect();
        debug!(
            "{} of these are within thresholds for sample {}",
            selected.len(),
            sample
        );
        gene_dict.insert(sample.clone(), selected);
    }

    Ok(gene_dict)
}
