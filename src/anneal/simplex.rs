//! Bounded Nelder-Mead simplex minimizer
//!
//! Gradient-free local refinement used by the annealing optimizer to polish
//! its best point. Candidate points are clipped into the box bounds, so the
//! search never leaves the feasible domain. Non-finite objective values are
//! treated as +inf and never accepted.

/// Reflection, expansion, contraction and shrink coefficients.
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Relative perturbation used to build the initial simplex.
const NONZERO_DELTA: f64 = 0.05;
/// Absolute perturbation for coordinates that start at zero.
const ZERO_DELTA: f64 = 2.5e-4;

const F_TOL: f64 = 1e-10;
const X_TOL: f64 = 1e-10;

fn clip(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, &lo), &hi) in x.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(lo, hi);
    }
}

/// Minimize `f` over the box `[lower, upper]` starting from `x0`.
///
/// Returns the best point found and its value. `max_iter` bounds the number
/// of simplex iterations; the search also stops when both the function
/// values and the vertex coordinates of the simplex have collapsed.
pub fn nelder_mead<F>(
    mut f: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    max_iter: usize,
) -> (Vec<f64>, f64)
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut eval = |x: &[f64]| -> f64 {
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let mut start = x0.to_vec();
    clip(&mut start, lower, upper);

    // initial simplex: the start point plus one perturbed vertex per axis
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for i in 0..n {
        let mut v = start.clone();
        if v[i] != 0.0 {
            v[i] *= 1.0 + NONZERO_DELTA;
        } else {
            v[i] = ZERO_DELTA;
        }
        clip(&mut v, lower, upper);
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    for _ in 0..max_iter {
        // order vertices, best first
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let simplex_sorted: Vec<Vec<f64>> = order.iter().map(|&i| simplex[i].clone()).collect();
        let values_sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        simplex = simplex_sorted;
        values = values_sorted;

        let f_spread = (values[n] - values[0]).abs();
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if f_spread <= F_TOL && x_spread <= X_TOL {
            break;
        }

        // centroid of all vertices but the worst
        let mut centroid = vec![0.0; n];
        for v in &simplex[..n] {
            for (c, &x) in centroid.iter_mut().zip(v) {
                *c += x;
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f64;
        }

        let worst = simplex[n].clone();
        let f_worst = values[n];

        let mut reflected: Vec<f64> = centroid
            .iter()
            .zip(&worst)
            .map(|(&c, &w)| c + ALPHA * (c - w))
            .collect();
        clip(&mut reflected, lower, upper);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            // try to expand further along the promising direction
            let mut expanded: Vec<f64> = centroid
                .iter()
                .zip(&worst)
                .map(|(&c, &w)| c + GAMMA * (c - w))
                .collect();
            clip(&mut expanded, lower, upper);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        // contraction, outside or inside of the worst vertex
        let (mut contracted, reference): (Vec<f64>, f64) = if f_reflected < f_worst {
            (
                centroid
                    .iter()
                    .zip(&reflected)
                    .map(|(&c, &r)| c + RHO * (r - c))
                    .collect(),
                f_reflected,
            )
        } else {
            (
                centroid
                    .iter()
                    .zip(&worst)
                    .map(|(&c, &w)| c - RHO * (c - w))
                    .collect(),
                f_worst,
            )
        };
        clip(&mut contracted, lower, upper);
        let f_contracted = eval(&contracted);

        if f_contracted < reference {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // shrink everything towards the best vertex
        let best = simplex[0].clone();
        for i in 1..=n {
            for (x, &b) in simplex[i].iter_mut().zip(&best) {
                *x = b + SIGMA * (*x - b);
            }
            clip(&mut simplex[i], lower, upper);
            values[i] = eval(&simplex[i]);
        }
    }

    let mut best_idx = 0;
    for i in 1..=n {
        if values[i] < values[best_idx] {
            best_idx = i;
        }
    }
    (simplex[best_idx].clone(), values[best_idx])
}
