//! bulk_deconv command-line interface

use std::path::Path;

use clap::Parser;
use log::{info, warn, LevelFilter};

use bulk_deconv::cli::{Cli, Commands};
use bulk_deconv::prelude::*;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run {
            signature,
            bulk,
            output_dir,
            dispersion_floor,
            bulk_min,
            bulk_max,
            maxiter,
            no_local_search,
            keep_mito,
            seed,
            threads,
        } => run_deconv(
            &signature,
            &bulk,
            &output_dir,
            GeneSelectionParams {
                dispersion_floor,
                min_fraction: bulk_min,
                max_fraction: bulk_max,
                exclude_mitochondrial: !keep_mito,
            },
            DeconvOptions {
                max_iterations: maxiter,
                enable_local_search: !no_local_search,
                seed,
            },
            threads,
        ),
        Commands::Repeat {
            signature,
            bulk,
            output,
            repeats,
            mode,
            subsample_fraction,
            dispersion_floor,
            bulk_min,
            bulk_max,
            maxiter,
            no_local_search,
            keep_mito,
            seed,
            threads,
        } => run_repeat(
            &signature,
            &bulk,
            &output,
            repeats,
            &mode,
            subsample_fraction,
            GeneSelectionParams {
                dispersion_floor,
                min_fraction: bulk_min,
                max_fraction: bulk_max,
                exclude_mitochondrial: !keep_mito,
            },
            DeconvOptions {
                max_iterations: maxiter,
                enable_local_search: !no_local_search,
                seed,
            },
            threads,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn configure_threads(threads: usize) {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
    }
}

fn load_matrices(
    signature_path: &str,
    bulk_path: &str,
) -> Result<(ExpressionMatrix, ExpressionMatrix)> {
    info!("Loading signature matrix from: {}", signature_path);
    let signature = read_expression_matrix(signature_path)?;
    info!(
        "  {} genes, {} cell types",
        signature.n_genes(),
        signature.n_columns()
    );

    info!("Loading bulk matrix from: {}", bulk_path);
    let bulk = read_expression_matrix(bulk_path)?;
    info!("  {} genes, {} samples", bulk.n_genes(), bulk.n_columns());

    Ok((signature, bulk))
}

fn run_deconv(
    signature_path: &str,
    bulk_path: &str,
    output_dir: &str,
    gene_params: GeneSelectionParams,
    options: DeconvOptions,
    threads: usize,
) -> Result<()> {
    configure_threads(threads);

    let (signature, bulk) = load_matrices(signature_path, bulk_path)?;

    info!("Selecting genes...");
    let gene_dict = make_gene_dictionary(&signature, &bulk, &gene_params)?;

    info!("Deconvolving...");
    let table = deconvolve(&signature, &bulk, &gene_dict, &options)?;

    std::fs::create_dir_all(output_dir)?;
    let mixture_path = Path::new(output_dir).join("mixture.csv");
    info!("Writing mixture table to: {}", mixture_path.display());
    write_mixture_table(&mixture_path, &table)?;

    for (i, sample) in table.sample_ids.iter().enumerate() {
        let weights = table.fractions.row(i).to_vec();
        if weights.iter().any(|w| !w.is_finite()) {
            warn!("Skipping gene-wise table for failed sample {}", sample);
            continue;
        }
        let genes = &gene_dict[sample];
        let observed = bulk.subset_column(sample, genes)?;
        let rows = gene_expression_comparison(&weights, &observed, &signature, genes)?;
        let path = Path::new(output_dir).join(format!("genewise_{}.csv", sample));
        write_gene_comparison(&path, &rows)?;
    }

    print_summary(&table);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_repeat(
    signature_path: &str,
    bulk_path: &str,
    output_path: &str,
    repeats: usize,
    mode: &str,
    subsample_fraction: f64,
    gene_params: GeneSelectionParams,
    options: DeconvOptions,
    threads: usize,
) -> Result<()> {
    configure_threads(threads);

    let mode = match mode {
        "bootstrap" => PerturbMode::Bootstrap,
        "subsample" => PerturbMode::Subsample {
            fraction: subsample_fraction,
        },
        other => {
            return Err(DeconvError::InvalidInput {
                reason: format!(
                    "Unknown perturbation mode '{}'. Use 'bootstrap' or 'subsample'.",
                    other
                ),
            });
        }
    };

    let (signature, bulk) = load_matrices(signature_path, bulk_path)?;

    info!("Selecting genes...");
    let gene_dict = make_gene_dictionary(&signature, &bulk, &gene_params)?;

    let records = repeat_deconvolution(&signature, &bulk, &gene_dict, &options, mode, repeats)?;

    info!("Writing stability table to: {}", output_path);
    write_stability_table(output_path, &records)?;
    Ok(())
}

fn print_summary(table: &MixtureTable) {
    println!();
    println!("Deconvolution summary");
    println!("=====================");
    for (i, sample) in table.sample_ids.iter().enumerate() {
        let rho = table.rho_spearman[i];
        if rho.is_nan() {
            println!("  {}: optimization failed", sample);
            continue;
        }
        let top = table
            .cell_types
            .iter()
            .zip(table.fractions.row(i))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(ct, f)| format!("{} ({:.1}%)", ct, f * 100.0))
            .unwrap_or_default();
        println!(
            "  {}: rho_spearman {:.4}, largest fraction {}",
            sample, rho, top
        );
    }
}
