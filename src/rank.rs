//! Tie-aware rank transform
//!
//! Fractional ("average") ranking: ranks start at 1, and tied values all
//! receive the mean of the ranks they jointly span. The objective function
//! and the reported rank correlations both go through this transform, so the
//! mid-rank convention must be reproduced exactly.

use std::cmp::Ordering;

/// Assign average ranks 1..n to a numeric vector.
///
/// Tied elements receive the mean of the ranks they span, e.g.
/// `[5.0, 5.0, 1.0]` ranks to `[2.5, 2.5, 1.0]`. Pure and deterministic.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        // extend j over the run of values tied with values[order[i]]
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_distinct_values() {
        assert_eq!(rank(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
        assert_eq!(rank(&[10.0, 20.0, 30.0, 40.0]), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn rank_permutations_follow_magnitude() {
        // for distinct values, ranks are exactly the sort position + 1
        let perms: [[f64; 3]; 6] = [
            [1.0, 2.0, 3.0],
            [1.0, 3.0, 2.0],
            [2.0, 1.0, 3.0],
            [2.0, 3.0, 1.0],
            [3.0, 1.0, 2.0],
            [3.0, 2.0, 1.0],
        ];
        for perm in perms {
            let ranks = rank(&perm);
            for (i, &v) in perm.iter().enumerate() {
                let expected = perm.iter().filter(|&&w| w < v).count() as f64 + 1.0;
                assert_eq!(ranks[i], expected);
            }
        }
    }

    #[test]
    fn rank_with_ties() {
        assert_eq!(rank(&[5.0, 5.0, 1.0]), vec![2.5, 2.5, 1.0]);
        assert_eq!(rank(&[2.0, 2.0, 2.0]), vec![2.0, 2.0, 2.0]);
        assert_eq!(
            rank(&[1.0, 4.0, 4.0, 4.0, 9.0]),
            vec![1.0, 3.0, 3.0, 3.0, 5.0]
        );
    }

    #[test]
    fn rank_empty_and_single() {
        assert!(rank(&[]).is_empty());
        assert_eq!(rank(&[7.0]), vec![1.0]);
    }
}
