//! Writing result tables to delimited text files

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::deconv::{GeneComparisonRow, MixtureTable};
use crate::error::Result;
use crate::stability::StabilityRecord;

/// Write the mixture table: one row per sample with its cell type
/// fractions and fit scores. NaN entries are written as empty fields.
pub fn write_mixture_table<P: AsRef<Path>>(path: P, table: &MixtureTable) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    write!(writer, "sample")?;
    for cell_type in &table.cell_types {
        write!(writer, ",{}", cell_type)?;
    }
    writeln!(writer, ",rho_spearman,rho_pearson")?;

    for (i, sample) in table.sample_ids.iter().enumerate() {
        write!(writer, "{}", sample)?;
        for k in 0..table.cell_types.len() {
            write!(writer, ",{}", field(table.fractions[[i, k]]))?;
        }
        writeln!(
            writer,
            ",{},{}",
            field(table.rho_spearman[i]),
            field(table.rho_pearson[i])
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one sample's gene-wise comparison table.
pub fn write_gene_comparison<P: AsRef<Path>>(path: P, rows: &[GeneComparisonRow]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(
        writer,
        "gene,observed_share,estimated_share,fold_change,log10_fold_change"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{}",
            row.gene,
            field(row.observed_share),
            field(row.estimated_share),
            field(row.fold_change),
            field(row.log10_fold_change)
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the long-form stability table, one record per line.
pub fn write_stability_table<P: AsRef<Path>>(
    path: P,
    records: &[StabilityRecord],
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(writer, "sample,cell_type,run,fraction")?;
    for record in records {
        writeln!(
            writer,
            "{},{},{},{}",
            record.sample,
            record.cell_type,
            record.run,
            field(record.fraction)
        )?;
    }

    writer.flush()?;
    Ok(())
}

fn field(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.6}", value)
    }
}
