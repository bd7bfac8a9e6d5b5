//! Correlation utilities shared across modules
//!
//! The objective function and the driver's fit-quality scores both reduce to
//! Pearson correlation; Spearman is Pearson on average-ranked data.

use crate::rank::rank;

/// Pearson product-moment correlation coefficient between `x` and `y`.
///
/// Returns NaN for vectors shorter than 2, mismatched lengths, or when
/// either vector has zero variance. The NaN (rather than a 0.0 fallback) is
/// deliberate: the optimizer relies on degenerate mixtures producing an
/// undefined distance, not a misleading finite one.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }

    let n = x.len() as f64;
    let mean_x: f64 = x.iter().sum::<f64>() / n;
    let mean_y: f64 = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    cov / denom
}

/// Spearman rank correlation coefficient between `x` and `y`.
///
/// Ranks both vectors with the average-rank convention, then computes
/// Pearson correlation on the ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    pearson(&rank(x), &rank(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pearson_perfect_positive() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![2.0, 4.0, 6.0, 8.0];
        assert_relative_eq!(pearson(&x, &y), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pearson_perfect_negative() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![3.0, 2.0, 1.0];
        assert_relative_eq!(pearson(&x, &y), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pearson_constant_is_nan() {
        let x = vec![1.0, 1.0, 1.0];
        let y = vec![1.0, 2.0, 3.0];
        assert!(pearson(&x, &y).is_nan());
    }

    #[test]
    fn test_spearman_monotone() {
        // monotone but nonlinear relation: Spearman 1, Pearson < 1
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![1.0, 8.0, 27.0, 64.0, 125.0];
        assert_relative_eq!(spearman(&x, &y), 1.0, epsilon = 1e-12);
        assert!(pearson(&x, &y) < 1.0);
    }

    #[test]
    fn test_spearman_with_ties() {
        let x = vec![1.0, 2.0, 2.0, 4.0];
        let y = vec![1.0, 3.0, 3.0, 5.0];
        assert_relative_eq!(spearman(&x, &y), 1.0, epsilon = 1e-12);
    }
}
