//! Labeled expression matrix shared by the signature and bulk data

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DeconvError, Result};

/// A labeled non-negative expression matrix.
///
/// Rows are genes, columns are either cell types (signature matrix) or bulk
/// samples (sample matrix). Gene identifiers must be unique: duplicate rows
/// are expected to have been merged by summation in the import layer, and
/// construction rejects un-merged duplicates rather than silently keeping
/// them.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Expression values (genes x columns)
    values: Array2<f64>,
    /// Gene identifiers, one per row
    gene_ids: Vec<String>,
    /// Column identifiers (cell types or sample names)
    column_ids: Vec<String>,
    /// Gene identifier -> row index
    gene_index: HashMap<String, usize>,
}

impl ExpressionMatrix {
    /// Create a new expression matrix from raw data
    pub fn new(
        values: Array2<f64>,
        gene_ids: Vec<String>,
        column_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_columns) = values.dim();

        if gene_ids.len() != n_genes {
            return Err(DeconvError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if column_ids.len() != n_columns {
            return Err(DeconvError::DimensionMismatch {
                expected: format!("{} column IDs", n_columns),
                got: format!("{} column IDs", column_ids.len()),
            });
        }

        if values.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DeconvError::InvalidExpressionMatrix {
                reason: "Expression values must be non-negative finite numbers".to_string(),
            });
        }

        let mut gene_index = HashMap::with_capacity(n_genes);
        for (i, id) in gene_ids.iter().enumerate() {
            if gene_index.insert(id.clone(), i).is_some() {
                return Err(DeconvError::InvalidExpressionMatrix {
                    reason: format!(
                        "Duplicate gene identifier '{}'; merge duplicates before building the matrix",
                        id
                    ),
                });
            }
        }

        Ok(Self {
            values,
            gene_ids,
            column_ids,
            gene_index,
        })
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    /// Get the number of columns
    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    /// Get the raw values as a view
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get column IDs
    pub fn column_ids(&self) -> &[String] {
        &self.column_ids
    }

    /// Get row index of a gene by identifier
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_index.get(gene_id).copied()
    }

    /// Get column index by identifier
    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.column_ids.iter().position(|id| id == column_id)
    }

    /// Get one column as a view, by label
    pub fn column(&self, column_id: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .column_index(column_id)
            .ok_or_else(|| DeconvError::InvalidExpressionMatrix {
                reason: format!("Column '{}' not found", column_id),
            })?;
        Ok(self.values.column(idx))
    }

    /// Get one row as a view, by gene identifier
    pub fn gene_row(&self, gene_id: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .gene_index(gene_id)
            .ok_or_else(|| DeconvError::InvalidExpressionMatrix {
                reason: format!("Gene '{}' not found", gene_id),
            })?;
        Ok(self.values.row(idx))
    }

    /// Per-column sums
    pub fn column_sums(&self) -> Array1<f64> {
        self.values.sum_axis(Axis(0))
    }

    /// Extract the rows for `gene_list` in list order as a dense matrix.
    ///
    /// The list may repeat a gene (bootstrap-perturbed lists do); the
    /// corresponding row is repeated in the output.
    pub fn subset_rows(&self, gene_list: &[String]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((gene_list.len(), self.n_columns()));
        for (i, gene) in gene_list.iter().enumerate() {
            let idx = self
                .gene_index(gene)
                .ok_or_else(|| DeconvError::InvalidExpressionMatrix {
                    reason: format!("Gene '{}' not found in matrix", gene),
                })?;
            out.row_mut(i).assign(&self.values.row(idx));
        }
        Ok(out)
    }

    /// Extract one column restricted to `gene_list`, in list order.
    pub fn subset_column(&self, column_id: &str, gene_list: &[String]) -> Result<Vec<f64>> {
        let col = self.column(column_id)?;
        gene_list
            .iter()
            .map(|gene| {
                self.gene_index(gene)
                    .map(|idx| col[idx])
                    .ok_or_else(|| DeconvError::InvalidExpressionMatrix {
                        reason: format!("Gene '{}' not found in matrix", gene),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matrix_creation() {
        let values = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let m = ExpressionMatrix::new(values, ids(&["G1", "G2"]), ids(&["a", "b", "c"])).unwrap();
        assert_eq!(m.n_genes(), 2);
        assert_eq!(m.n_columns(), 3);
        assert_eq!(m.gene_index("G2"), Some(1));
    }

    #[test]
    fn test_negative_values_rejected() {
        let values = array![[10.0, -5.0], [5.0, 15.0]];
        let result = ExpressionMatrix::new(values, ids(&["G1", "G2"]), ids(&["a", "b"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_gene_ids_rejected() {
        let values = array![[1.0], [2.0]];
        let result = ExpressionMatrix::new(values, ids(&["G1", "G1"]), ids(&["a"]));
        assert!(matches!(
            result,
            Err(DeconvError::InvalidExpressionMatrix { .. })
        ));
    }

    #[test]
    fn test_subset_rows_with_repeats() {
        let values = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let m = ExpressionMatrix::new(values, ids(&["G1", "G2", "G3"]), ids(&["a", "b"])).unwrap();

        let sub = m.subset_rows(&ids(&["G3", "G1", "G3"])).unwrap();
        assert_eq!(sub, array![[5.0, 6.0], [1.0, 2.0], [5.0, 6.0]]);
    }

    #[test]
    fn test_subset_column() {
        let values = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let m = ExpressionMatrix::new(values, ids(&["G1", "G2", "G3"]), ids(&["a", "b"])).unwrap();

        let sub = m.subset_column("b", &ids(&["G2", "G1"])).unwrap();
        assert_eq!(sub, vec![4.0, 2.0]);

        assert!(m.subset_column("b", &ids(&["NOPE"])).is_err());
        assert!(m.subset_column("z", &ids(&["G1"])).is_err());
    }
}
