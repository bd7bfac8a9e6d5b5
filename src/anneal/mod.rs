//! Generalized simulated annealing over a box-bounded domain
//!
//! Classical simulated annealing with a distorted Cauchy-Lorentz visiting
//! distribution and a generalized Metropolis acceptance rule, coupled with
//! a Nelder-Mead local search ([`nelder_mead`]) around promising points.
//! The temperature follows a fast-decaying schedule and the whole chain
//! restarts from a fresh random point once it has cooled below a fraction
//! of the initial temperature.
//!
//! The caller supplies the random number generator, so a fixed seed gives a
//! fully reproducible trajectory. Objective values of NaN are treated as
//! +inf and can never be accepted.

mod simplex;

pub use simplex::nelder_mead;

use log::trace;
use rand::Rng;
use rand_distr::StandardNormal;
use statrs::function::gamma::ln_gamma;

use crate::error::{DeconvError, Result};

/// Visits beyond this magnitude are clipped back into a random tail.
const TAIL_LIMIT: f64 = 1e8;
/// Visits are nudged off the lower bound by at least this much.
const MIN_VISIT_BOUND: f64 = 1e-10;
/// Random reinitialization attempts before giving up on a degenerate
/// objective.
const MAX_REINIT_ATTEMPTS: usize = 1000;
/// Markov chain steps without improvement before the local search is forced.
const NOT_IMPROVED_LIMIT: usize = 1000;

/// Tuning parameters of the annealing run.
#[derive(Debug, Clone)]
pub struct AnnealParams {
    /// Maximum number of annealing iterations (temperature steps).
    pub max_iterations: usize,
    /// Run Nelder-Mead refinements during the search.
    pub enable_local_search: bool,
    /// Starting temperature of the schedule.
    pub initial_temp: f64,
    /// Fraction of the initial temperature below which the chain restarts.
    pub restart_temp_ratio: f64,
    /// Visiting distribution shape parameter, in (1, 3].
    pub visit: f64,
    /// Acceptance distribution parameter; more negative means stricter.
    pub accept: f64,
    /// Hard cap on objective function evaluations.
    pub max_fn_calls: usize,
}

impl Default for AnnealParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            enable_local_search: true,
            initial_temp: 5230.0,
            restart_temp_ratio: 2e-5,
            visit: 2.62,
            accept: -5.0,
            max_fn_calls: 10_000_000,
        }
    }
}

impl AnnealParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(DeconvError::InvalidInput {
                reason: "max_iterations must be at least 1".to_string(),
            });
        }
        if !(self.initial_temp > 0.0) {
            return Err(DeconvError::InvalidInput {
                reason: format!("initial_temp must be positive, got {}", self.initial_temp),
            });
        }
        if !(self.restart_temp_ratio > 0.0 && self.restart_temp_ratio < 1.0) {
            return Err(DeconvError::InvalidInput {
                reason: format!(
                    "restart_temp_ratio must lie in (0, 1), got {}",
                    self.restart_temp_ratio
                ),
            });
        }
        if !(self.visit > 1.0 && self.visit <= 3.0) {
            return Err(DeconvError::InvalidInput {
                reason: format!("visit parameter must lie in (1, 3], got {}", self.visit),
            });
        }
        if !(self.accept < 0.0) {
            return Err(DeconvError::InvalidInput {
                reason: format!("accept parameter must be negative, got {}", self.accept),
            });
        }
        Ok(())
    }
}

/// How an annealing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnealStatus {
    /// The function evaluation budget was consumed.
    Converged,
    /// The iteration budget was consumed.
    IterationLimitReached,
}

/// Outcome of one annealing run.
#[derive(Debug, Clone)]
pub struct AnnealResult {
    /// Best point found.
    pub x: Vec<f64>,
    /// Objective value at the best point.
    pub value: f64,
    pub status: AnnealStatus,
    /// Annealing iterations actually performed.
    pub iterations: usize,
    /// Objective evaluations actually performed.
    pub fn_calls: usize,
}

/// Minimize `objective` over the rectangle described by `bounds`.
///
/// Each entry of `bounds` is an inclusive `(lower, upper)` pair; both ends
/// must be finite with `lower < upper`. Fails with `OptimizationFailed`
/// when the objective never produces a finite value anywhere in the domain.
pub fn optimize<F, R>(
    objective: F,
    bounds: &[(f64, f64)],
    params: &AnnealParams,
    rng: &mut R,
) -> Result<AnnealResult>
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    params.validate()?;
    if bounds.is_empty() {
        return Err(DeconvError::InvalidInput {
            reason: "Search domain must have at least one dimension".to_string(),
        });
    }
    for &(lo, hi) in bounds {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(DeconvError::InvalidInput {
                reason: format!("Invalid bound pair ({}, {})", lo, hi),
            });
        }
    }

    let mut search = Search::new(&objective, bounds, params, rng)?;

    // schedule constant: t1 = 2^(visit-1) - 1
    let t1 = ((params.visit - 1.0) * std::f64::consts::LN_2).exp() - 1.0;
    let restart_temp = params.initial_temp * params.restart_temp_ratio;

    let mut iterations = 0;
    let mut status = AnnealStatus::IterationLimitReached;

    'outer: while iterations < params.max_iterations {
        let mut restarted = false;
        for step in 0..params.max_iterations {
            if iterations >= params.max_iterations {
                break 'outer;
            }
            let t2 = ((params.visit - 1.0) * ((step + 2) as f64).ln()).exp() - 1.0;
            let temperature = params.initial_temp * t1 / t2;
            if temperature < restart_temp {
                trace!("temperature below restart threshold, reannealing");
                search.reset()?;
                restarted = true;
                break;
            }
            if search.run_chain(step, temperature) {
                status = AnnealStatus::Converged;
                break 'outer;
            }
            if params.enable_local_search && search.chain_local_search() {
                status = AnnealStatus::Converged;
                break 'outer;
            }
            iterations += 1;
        }
        if !restarted {
            break;
        }
    }

    Ok(AnnealResult {
        x: search.xbest,
        value: search.ebest,
        status,
        iterations,
        fn_calls: search.fn_calls,
    })
}

/// Precomputed constants of the visiting distribution for a fixed shape
/// parameter; only `factor4` depends on the current temperature.
struct VisitingDistribution {
    visit: f64,
    factor4_p: f64,
    factor6: f64,
}

impl VisitingDistribution {
    fn new(visit: f64) -> Self {
        let factor2 = ((4.0 - visit) * (visit - 1.0).ln()).exp();
        let factor3 = ((2.0 - visit) * std::f64::consts::LN_2 / (visit - 1.0)).exp();
        let factor4_p = std::f64::consts::PI.sqrt() * factor2 / (factor3 * (3.0 - visit));
        let factor5 = 1.0 / (visit - 1.0) - 0.5;
        let d1 = 2.0 - factor5;
        let factor6 = std::f64::consts::PI * (1.0 - factor5)
            / (std::f64::consts::PI * (1.0 - factor5)).sin()
            / ln_gamma(d1).exp();
        Self {
            visit,
            factor4_p,
            factor6,
        }
    }

    /// One draw from the distorted Cauchy-Lorentz visiting distribution.
    fn visit_fn<R: Rng + ?Sized>(&self, temperature: f64, rng: &mut R) -> f64 {
        let factor1 = (temperature.ln() / (self.visit - 1.0)).exp();
        let factor4 = self.factor4_p * factor1;
        let sigmax =
            (-(self.visit - 1.0) * (self.factor6 / factor4).ln() / (3.0 - self.visit)).exp();

        let x: f64 = sigmax * rng.sample::<f64, _>(StandardNormal);
        let y: f64 = rng.sample(StandardNormal);
        let den = ((self.visit - 1.0) * y.abs().ln() / (3.0 - self.visit)).exp();
        x / den
    }
}

/// Mutable state of one annealing run.
struct Search<'a, F, R: ?Sized> {
    objective: &'a F,
    rng: &'a mut R,
    lower: Vec<f64>,
    range: Vec<f64>,
    dim: usize,
    visit: VisitingDistribution,
    accept: f64,
    /// Current Markov chain location and energy.
    xcur: Vec<f64>,
    ecur: f64,
    /// Best point over the whole run.
    xbest: Vec<f64>,
    ebest: f64,
    /// Trailing minimum used to seed the forced local search.
    xmin: Vec<f64>,
    emin: f64,
    not_improved: usize,
    not_improved_limit: usize,
    improved_in_chain: bool,
    temperature_step: f64,
    fn_calls: usize,
    max_fn_calls: usize,
    ls_max_iter: usize,
}

impl<'a, F, R> Search<'a, F, R>
where
    F: Fn(&[f64]) -> f64,
    R: Rng + ?Sized,
{
    fn new(
        objective: &'a F,
        bounds: &[(f64, f64)],
        params: &AnnealParams,
        rng: &'a mut R,
    ) -> Result<Self> {
        let dim = bounds.len();
        let lower: Vec<f64> = bounds.iter().map(|&(lo, _)| lo).collect();
        let range: Vec<f64> = bounds.iter().map(|&(lo, hi)| hi - lo).collect();
        let ls_max_iter = (6 * dim).clamp(100, 1000);

        let mut search = Self {
            objective,
            rng,
            lower,
            range,
            dim,
            visit: VisitingDistribution::new(params.visit),
            accept: params.accept,
            xcur: Vec::new(),
            ecur: f64::INFINITY,
            xbest: Vec::new(),
            ebest: f64::INFINITY,
            xmin: Vec::new(),
            emin: f64::INFINITY,
            not_improved: 0,
            not_improved_limit: NOT_IMPROVED_LIMIT,
            improved_in_chain: false,
            temperature_step: 1.0,
            fn_calls: 0,
            max_fn_calls: params.max_fn_calls,
            ls_max_iter,
        };
        search.reset()?;
        Ok(search)
    }

    /// Evaluate the objective, mapping NaN to +inf.
    fn energy(&mut self, x: &[f64]) -> f64 {
        self.fn_calls += 1;
        let e = (self.objective)(x);
        if e.is_nan() {
            f64::INFINITY
        } else {
            e
        }
    }

    /// Place the chain at a fresh uniform random point with a finite energy.
    /// The best point found so far is kept across resets.
    fn reset(&mut self) -> Result<()> {
        for _ in 0..MAX_REINIT_ATTEMPTS {
            let x: Vec<f64> = self
                .lower
                .iter()
                .zip(&self.range)
                .map(|(&lo, &r)| lo + self.rng.random::<f64>() * r)
                .collect();
            let e = self.energy(&x);
            if e.is_finite() {
                self.xcur = x.clone();
                self.ecur = e;
                if e < self.ebest {
                    self.ebest = e;
                    self.xbest = x.clone();
                }
                self.xmin = x;
                self.emin = e;
                return Ok(());
            }
        }
        Err(DeconvError::OptimizationFailed {
            reason: format!(
                "Objective produced no finite value in {} random initializations",
                MAX_REINIT_ATTEMPTS
            ),
        })
    }

    /// Fold a proposed coordinate back into `[lower, lower + range)`.
    fn wrap(value: f64, lower: f64, range: f64) -> f64 {
        let a = value - lower;
        let b = a % range + range;
        let mut wrapped = b % range + lower;
        if (wrapped - lower).abs() < MIN_VISIT_BOUND {
            wrapped += MIN_VISIT_BOUND;
        }
        wrapped
    }

    /// Propose the next trial point. Early in the chain (`step < dim`) every
    /// coordinate moves at once; later steps move one coordinate at a time.
    fn visiting(&mut self, x: &[f64], step: usize, temperature: f64) -> Vec<f64> {
        let dim = self.dim;
        let mut x_visit = x.to_vec();
        if step < dim {
            let visits: Vec<f64> = (0..dim)
                .map(|_| self.visit.visit_fn(temperature, self.rng))
                .collect();
            let upper_sample: f64 = self.rng.random();
            let lower_sample: f64 = self.rng.random();
            for i in 0..dim {
                let mut visit = visits[i];
                if visit > TAIL_LIMIT {
                    visit = TAIL_LIMIT * upper_sample;
                } else if visit < -TAIL_LIMIT {
                    visit = -TAIL_LIMIT * lower_sample;
                }
                x_visit[i] = Self::wrap(visit + x[i], self.lower[i], self.range[i]);
            }
        } else {
            let mut visit = self.visit.visit_fn(temperature, self.rng);
            if visit > TAIL_LIMIT {
                visit = TAIL_LIMIT * self.rng.random::<f64>();
            } else if visit < -TAIL_LIMIT {
                visit = -TAIL_LIMIT * self.rng.random::<f64>();
            }
            let index = step - dim;
            x_visit[index] = Self::wrap(visit + x[index], self.lower[index], self.range[index]);
        }
        x_visit
    }

    /// Run one Markov chain at the given temperature. Returns true once the
    /// evaluation budget is exhausted.
    fn run_chain(&mut self, step: usize, temperature: f64) -> bool {
        self.temperature_step = temperature / (step as f64 + 1.0);
        self.not_improved += 1;
        self.improved_in_chain = step == 0;

        for j in 0..2 * self.dim {
            let x_visit = self.visiting(&self.xcur.clone(), j, temperature);
            let e = self.energy(&x_visit);

            if e < self.ecur {
                self.ecur = e;
                self.xcur = x_visit;
                if e < self.ebest {
                    self.ebest = e;
                    self.xbest = self.xcur.clone();
                    self.improved_in_chain = true;
                    self.not_improved = 0;
                }
            } else {
                // generalized Metropolis acceptance
                let r: f64 = self.rng.random();
                let pqv_temp =
                    1.0 - (1.0 - self.accept) * (e - self.ecur) / self.temperature_step;
                let pqv = if pqv_temp <= 0.0 {
                    0.0
                } else {
                    (pqv_temp.ln() / (1.0 - self.accept)).exp()
                };
                if r <= pqv {
                    self.ecur = e;
                    self.xcur = x_visit;
                    self.xmin = self.xcur.clone();
                }
                if self.not_improved >= self.not_improved_limit
                    && (j == 0 || self.ecur < self.emin)
                {
                    self.emin = self.ecur;
                    self.xmin = self.xcur.clone();
                }
            }

            if self.fn_calls >= self.max_fn_calls {
                return true;
            }
        }
        false
    }

    /// Run `nelder_mead` from `start`, counting its evaluations against the
    /// budget.
    fn local_search(&mut self, start: &[f64]) -> (Vec<f64>, f64) {
        let objective = self.objective;
        let mut calls = 0usize;
        let f = |x: &[f64]| {
            calls += 1;
            objective(x)
        };
        let upper: Vec<f64> = self
            .lower
            .iter()
            .zip(&self.range)
            .map(|(&lo, &r)| lo + r)
            .collect();
        let (x, e) = nelder_mead(f, start, &self.lower, &upper, self.ls_max_iter);
        self.fn_calls += calls;
        (x, e)
    }

    /// Refine after a chain: polish a fresh improvement from the best point,
    /// and force a search from the trailing minimum when the chain has been
    /// stuck too long. Returns true once the evaluation budget is exhausted.
    fn chain_local_search(&mut self) -> bool {
        if self.improved_in_chain {
            let start = self.xbest.clone();
            let (x, e) = self.local_search(&start);
            if e < self.ebest {
                trace!("local search improved the best energy to {}", e);
                self.ebest = e;
                self.xbest = x.clone();
                self.ecur = e;
                self.xcur = x;
                self.not_improved = 0;
            }
        }
        if self.not_improved >= self.not_improved_limit {
            let start = self.xmin.clone();
            let (x, e) = self.local_search(&start);
            self.xmin = x.clone();
            self.emin = e;
            self.not_improved = 0;
            self.not_improved_limit = self.dim;
            if e < self.ebest {
                self.ebest = e;
                self.xbest = x.clone();
                self.ecur = e;
                self.xcur = x;
            }
        }
        self.fn_calls >= self.max_fn_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit_bounds(dim: usize) -> Vec<(f64, f64)> {
        vec![(0.0, 1.0); dim]
    }

    #[test]
    fn test_recovers_quadratic_minimum() {
        let f = |x: &[f64]| {
            (x[0] - 0.25).powi(2) + (x[1] - 0.6).powi(2) + (x[2] - 0.85).powi(2)
        };
        let params = AnnealParams {
            max_iterations: 200,
            ..AnnealParams::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let result = optimize(f, &unit_bounds(3), &params, &mut rng).unwrap();
        assert_relative_eq!(result.x[0], 0.25, epsilon = 1e-3);
        assert_relative_eq!(result.x[1], 0.6, epsilon = 1e-3);
        assert_relative_eq!(result.x[2], 0.85, epsilon = 1e-3);
        assert!(result.value < 1e-6);
        assert_eq!(result.status, AnnealStatus::IterationLimitReached);
        assert!(result.fn_calls > 0);
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let f = |x: &[f64]| x.iter().map(|v| (v - 0.4).powi(2)).sum::<f64>();
        let params = AnnealParams {
            max_iterations: 50,
            ..AnnealParams::default()
        };
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = optimize(&f, &unit_bounds(2), &params, &mut rng_a).unwrap();
        let b = optimize(&f, &unit_bounds(2), &params, &mut rng_b).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.value, b.value);
        assert_eq!(a.fn_calls, b.fn_calls);
    }

    #[test]
    fn test_result_stays_in_bounds() {
        // multimodal objective with the global minimum inside the box
        let f = |x: &[f64]| (10.0 * x[0]).sin() + (x[0] - 0.7).powi(2);
        let params = AnnealParams {
            max_iterations: 100,
            ..AnnealParams::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let result = optimize(f, &unit_bounds(1), &params, &mut rng).unwrap();
        assert!(result.x[0] >= 0.0 && result.x[0] <= 1.0);
        assert!(result.value.is_finite());
    }

    #[test]
    fn test_all_nan_objective_fails() {
        let f = |_: &[f64]| f64::NAN;
        let params = AnnealParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            optimize(f, &unit_bounds(2), &params, &mut rng),
            Err(DeconvError::OptimizationFailed { .. })
        ));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let f = |x: &[f64]| x[0];
        let params = AnnealParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(optimize(&f, &[], &params, &mut rng).is_err());
        assert!(optimize(&f, &[(1.0, 0.0)], &params, &mut rng).is_err());
        assert!(optimize(&f, &[(0.0, f64::INFINITY)], &params, &mut rng).is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = AnnealParams {
            visit: 3.5,
            ..AnnealParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = AnnealParams {
            restart_temp_ratio: 1.5,
            ..AnnealParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = AnnealParams {
            max_iterations: 0,
            ..AnnealParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_without_local_search_still_converges_roughly() {
        let f = |x: &[f64]| (x[0] - 0.5).powi(2);
        let params = AnnealParams {
            max_iterations: 500,
            enable_local_search: false,
            ..AnnealParams::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let result = optimize(f, &unit_bounds(1), &params, &mut rng).unwrap();
        assert!((result.x[0] - 0.5).abs() < 0.05);
    }
}
