//! Data structures for deconvolution

mod expression;

pub use expression::ExpressionMatrix;

use std::collections::BTreeMap;

/// Per-sample gene lists used for deconvolution.
///
/// A `BTreeMap` keeps the samples in alphabetical order, which is the order
/// the deconvolution driver processes them in. Lists may contain duplicate
/// gene identifiers after bootstrap perturbation.
pub type GeneDictionary = BTreeMap<String, Vec<String>>;
