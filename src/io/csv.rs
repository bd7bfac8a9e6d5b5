//! Delimited-text reading for expression matrices
//!
//! Expected layout: first column gene identifiers, first row column labels
//! (cell types or samples). The delimiter is sniffed from the header line
//! (tab, comma or semicolon). Gene identifiers are uppercased so signature
//! and bulk files match case-insensitively, and duplicate gene rows are
//! merged by summation before the matrix is built.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, warn};
use ndarray::Array2;

use crate::data::ExpressionMatrix;
use crate::error::{DeconvError, Result};

/// Strip surrounding quotes from a field
fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Pick the delimiter that splits the header into the most fields
fn sniff_delimiter(header: &str) -> char {
    ['\t', ',', ';']
        .into_iter()
        .max_by_key(|&d| header.matches(d).count())
        .unwrap_or('\t')
}

/// Read an expression matrix from a delimited text file.
///
/// Values must parse as non-negative finite numbers. Rows sharing a gene
/// identifier (after uppercasing) are summed into one row at the first
/// occurrence's position.
pub fn read_expression_matrix<P: AsRef<Path>>(path: P) -> Result<ExpressionMatrix> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header_line = lines.next().ok_or_else(|| DeconvError::EmptyData {
        reason: format!("Empty expression file: {}", path.as_ref().display()),
    })??;

    let delimiter = sniff_delimiter(&header_line);
    let header: Vec<&str> = header_line.split(delimiter).collect();
    if header.len() < 2 {
        return Err(DeconvError::InvalidExpressionMatrix {
            reason: "Header must name at least one data column".to_string(),
        });
    }
    let column_ids: Vec<String> = header[1..].iter().map(|s| strip_quotes(s)).collect();
    let n_columns = column_ids.len();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut gene_index: HashMap<String, usize> = HashMap::new();
    let mut n_merged = 0usize;

    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != n_columns + 1 {
            return Err(DeconvError::InvalidExpressionMatrix {
                reason: format!(
                    "Line {} has {} columns, expected {}",
                    line_no + 2,
                    fields.len(),
                    n_columns + 1
                ),
            });
        }

        let gene = strip_quotes(fields[0]).to_uppercase();
        let values: Result<Vec<f64>> = fields[1..]
            .iter()
            .map(|s| {
                let field = strip_quotes(s);
                field
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| DeconvError::InvalidExpressionMatrix {
                        reason: format!(
                            "Invalid expression value '{}' on line {}",
                            field,
                            line_no + 2
                        ),
                    })
            })
            .collect();
        let values = values?;

        match gene_index.get(&gene) {
            Some(&idx) => {
                // duplicate gene row: accumulate into the first occurrence
                for (acc, v) in rows[idx].iter_mut().zip(values) {
                    *acc += v;
                }
                n_merged += 1;
            }
            None => {
                gene_index.insert(gene.clone(), rows.len());
                gene_ids.push(gene);
                rows.push(values);
            }
        }
    }

    if gene_ids.is_empty() {
        return Err(DeconvError::EmptyData {
            reason: format!("No gene rows in {}", path.as_ref().display()),
        });
    }
    if n_merged > 0 {
        warn!(
            "Merged {} duplicate gene rows by summation in {}",
            n_merged,
            path.as_ref().display()
        );
    }
    debug!(
        "Read {} genes x {} columns from {}",
        gene_ids.len(),
        n_columns,
        path.as_ref().display()
    );

    let n_genes = gene_ids.len();
    let mut values = Array2::zeros((n_genes, n_columns));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            values[[i, j]] = v;
        }
    }

    ExpressionMatrix::new(values, gene_ids, column_ids)
}
