//! Reading expression matrices and writing result tables

mod csv;
mod results;

pub use csv::read_expression_matrix;
pub use results::{write_gene_comparison, write_mixture_table, write_stability_table};
