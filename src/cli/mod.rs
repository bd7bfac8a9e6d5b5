//! Command-line interface for bulk_deconv

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bulk_deconv")]
#[command(version)]
#[command(about = "Bulk gene expression deconvolution by simulated annealing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deconvolve bulk samples into cell type fractions
    #[command(
        long_about = "Deconvolve bulk samples into cell type fractions\n\n\
            Selects informative genes per sample (highly variable across the\n\
            signature's cell types, within expression thresholds in the sample),\n\
            then fits mixture weights by simulated annealing against a Spearman\n\
            correlation objective.",
        after_long_help = "\
Examples:
  # Default parameters
  bulk_deconv run -s signature.csv -b bulk.csv -o results/

  # Looser gene selection and a fixed seed
  bulk_deconv run -s signature.csv -b bulk.csv -o results/ \\
    --dispersion-floor 0.25 --bulk-max 0.05 --seed 7

  # Faster, without the Nelder-Mead refinement
  bulk_deconv run -s signature.csv -b bulk.csv -o results/ \\
    --maxiter 200 --no-local-search"
    )]
    Run {
        /// Path to the signature matrix file
        #[arg(short, long,
            long_help = "Path to the signature matrix file.\n\
                Format: first column = gene IDs, remaining columns = expected\n\
                expression per cell type. CSV/TSV delimiters are auto-detected.")]
        signature: String,

        /// Path to the bulk expression matrix file
        #[arg(short, long,
            long_help = "Path to the bulk expression matrix file.\n\
                Format: first column = gene IDs, remaining columns = expression\n\
                per bulk sample. CSV/TSV delimiters are auto-detected.")]
        bulk: String,

        /// Output directory [default: deconv_results]
        #[arg(short, long, default_value = "deconv_results")]
        output_dir: String,

        /// Normalized dispersion floor for signature genes [default: 0.5]
        #[arg(long, default_value = "0.5",
            long_help = "Minimum bin-normalized log-dispersion a gene must exceed\n\
                across the signature's cell types to count as highly variable.\n\
                Lower values admit more genes.")]
        dispersion_floor: f64,

        /// Minimum expression fraction in a bulk sample [default: 1e-5]
        #[arg(long, default_value = "1e-5",
            long_help = "A gene enters a sample's list only if its expression\n\
                strictly exceeds this fraction of the sample's total.")]
        bulk_min: f64,

        /// Maximum expression fraction in a bulk sample [default: 0.01]
        #[arg(long, default_value = "0.01",
            long_help = "A gene enters a sample's list only if its expression\n\
                stays strictly below this fraction of the sample's total.\n\
                Keeps single dominant transcripts from driving the fit.")]
        bulk_max: f64,

        /// Annealing iterations per sample [default: 1000]
        #[arg(long, default_value = "1000")]
        maxiter: usize,

        /// Disable the Nelder-Mead local search
        #[arg(long,
            long_help = "Disable the Nelder-Mead refinement between annealing\n\
                steps. Faster, but fitted fractions are less precise.")]
        no_local_search: bool,

        /// Keep mitochondrial genes ("mt-" prefix)
        #[arg(long,
            long_help = "Keep genes whose identifier starts with \"mt-\"\n\
                (case-insensitive). They are excluded by default because\n\
                mitochondrial content varies with sample handling.")]
        keep_mito: bool,

        /// Random seed [default: 0]
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Assess fit stability under perturbed gene selection
    #[command(
        long_about = "Assess fit stability under perturbed gene selection\n\n\
            Reruns the deconvolution with bootstrapped or subsampled gene lists\n\
            and records every fitted fraction, so the spread across repeats\n\
            shows how much each fit depends on the exact gene selection.",
        after_long_help = "\
Examples:
  bulk_deconv repeat -s signature.csv -b bulk.csv -o stability.csv --repeats 20

  bulk_deconv repeat -s signature.csv -b bulk.csv -o stability.csv \\
    --mode subsample --subsample-fraction 0.8 --repeats 50"
    )]
    Repeat {
        /// Path to the signature matrix file
        #[arg(short, long)]
        signature: String,

        /// Path to the bulk expression matrix file
        #[arg(short, long)]
        bulk: String,

        /// Output file path [default: stability.csv]
        #[arg(short, long, default_value = "stability.csv")]
        output: String,

        /// Number of perturbed repeats [default: 10]
        #[arg(long, default_value = "10")]
        repeats: usize,

        /// Perturbation mode [default: bootstrap]
        #[arg(long, default_value = "bootstrap",
            long_help = "How gene lists are perturbed between repeats.\n\
                bootstrap: resample each list with replacement to its length\n\
                subsample: keep a random fraction of each list (see\n\
                           --subsample-fraction)")]
        mode: String,

        /// Fraction of each gene list kept in subsample mode [default: 0.5]
        #[arg(long, default_value = "0.5")]
        subsample_fraction: f64,

        /// Normalized dispersion floor for signature genes [default: 0.5]
        #[arg(long, default_value = "0.5")]
        dispersion_floor: f64,

        /// Minimum expression fraction in a bulk sample [default: 1e-5]
        #[arg(long, default_value = "1e-5")]
        bulk_min: f64,

        /// Maximum expression fraction in a bulk sample [default: 0.01]
        #[arg(long, default_value = "0.01")]
        bulk_max: f64,

        /// Annealing iterations per sample [default: 1000]
        #[arg(long, default_value = "1000")]
        maxiter: usize,

        /// Disable the Nelder-Mead local search
        #[arg(long)]
        no_local_search: bool,

        /// Keep mitochondrial genes ("mt-" prefix)
        #[arg(long)]
        keep_mito: bool,

        /// Random seed [default: 0]
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },
}
