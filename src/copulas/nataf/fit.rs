use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::brent::BrentOpt;
use argmin::solver::neldermead::NelderMead;
use ndarray::Array2;
use statrs::distribution::ContinuousCDF;
use tracing::debug;
use tracing::warn;

use super::NatafParams;
use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::mvn::standard_normal;
use crate::stats::mvn::GaussOrthant;
use crate::stats::sample::column_quantiles;
use crate::stats::sample::joint_exceedance;
use crate::stats::sample::pearson;
use crate::stats::sample::validate_sample;
use crate::traits::OrthantProbabilityExt;

const NOT_PD_PENALTY: f64 = 1e10;

/// Optimiser settings for [`CensoredGaussianFit`].
#[derive(Debug, Clone, Copy)]
pub struct NatafFitConfig {
  /// Points of the coarse `[0, 1]` grid that brackets the 2D optimum.
  pub grid_points: usize,
  /// Brent tolerance inside the bracket.
  pub brent_tolerance: f64,
  pub brent_max_iters: u64,
  /// Nelder-Mead iteration budget for three or more variables.
  pub max_iters: u64,
  /// Nelder-Mead simplex standard-deviation tolerance.
  pub sd_tolerance: f64,
  /// Initial simplex edge.
  pub simplex_step: f64,
}

impl Default for NatafFitConfig {
  fn default() -> Self {
    Self {
      grid_points: 21,
      brent_tolerance: 1e-8,
      brent_max_iters: 200,
      max_iters: 2000,
      sd_tolerance: 1e-12,
      simplex_step: 0.1,
    }
  }
}

/// Fitted copula plus optimiser diagnostics.
#[derive(Debug, Clone)]
pub struct NatafFit {
  pub params: NatafParams,
  /// Quantile level the exceedances were counted at.
  pub quantile: f64,
  /// Fraction of rows above every marginal quantile.
  pub empirical_exceedance: f64,
  /// Model orthant probability at the fitted correlation.
  pub model_exceedance: f64,
  /// `(empirical - model)^2` at the optimum.
  pub cost: f64,
  pub iterations: u64,
}

/// Tail-exceedance matching for a Gaussian copula.
///
/// The copula correlation is chosen so that the probability of all standard
/// normal coordinates exceeding `Φ⁻¹(q)` matches the empirical probability of
/// all variables exceeding their marginal `q`-quantiles.
pub struct CensoredGaussianFit<E: OrthantProbabilityExt = GaussOrthant> {
  evaluator: E,
  config: NatafFitConfig,
}

impl CensoredGaussianFit<GaussOrthant> {
  pub fn new() -> EvaResult<Self> {
    Ok(Self::with_evaluator(
      GaussOrthant::new()?,
      NatafFitConfig::default(),
    ))
  }
}

impl<E: OrthantProbabilityExt> CensoredGaussianFit<E> {
  pub fn with_evaluator(evaluator: E, config: NatafFitConfig) -> Self {
    Self { evaluator, config }
  }

  pub fn config(&self) -> &NatafFitConfig {
    &self.config
  }

  #[tracing::instrument(skip(self, sample), fields(rows = sample.nrows(), dim = sample.ncols()))]
  pub fn fit(&self, sample: &Array2<f64>, q: f64) -> EvaResult<NatafFit> {
    if !(q > 0.0 && q < 1.0) {
      return Err(EvaError::InvalidProbability {
        name: "q",
        value: q,
        reason: "quantile level must lie in (0, 1)",
      });
    }
    validate_sample(sample, 2)?;
    if q <= 0.5 {
      return Err(EvaError::degenerate(format!(
        "quantile level {q} gives a non-positive standard normal threshold"
      )));
    }

    let thresholds = column_quantiles(sample, q);
    let empirical = joint_exceedance(sample, &thresholds);
    if empirical == 0.0 {
      return Err(EvaError::degenerate(format!(
        "no row exceeds every marginal {q}-quantile"
      )));
    }
    let threshold = standard_normal()?.inverse_cdf(q);
    debug!(empirical, threshold, "counted joint exceedances");

    let objective = Exceedance {
      evaluator: &self.evaluator,
      lower: vec![threshold; sample.ncols()],
      target: empirical,
    };
    let (pairs, iterations) = if sample.ncols() == 2 {
      self.search_pair(&objective)?
    } else {
      let start = pearson(sample)?;
      self.search_matrix(&objective, &start)?
    };

    let params = NatafParams::from_pairs(sample.ncols(), &pairs)?;
    let model = self.evaluator.upper_orthant(&objective.lower, params.correlation())?;
    let fit = NatafFit {
      params,
      quantile: q,
      empirical_exceedance: empirical,
      model_exceedance: model,
      cost: (empirical - model).powi(2),
      iterations,
    };
    debug!(
      pairs = ?fit.params.pairs(),
      cost = fit.cost,
      iterations,
      "fitted censored gaussian copula"
    );
    Ok(fit)
  }

  fn search_pair(&self, objective: &Exceedance<'_, E>) -> EvaResult<(Vec<f64>, u64)> {
    let points = self.config.grid_points.max(3);
    let step = 1.0 / (points - 1) as f64;
    let mut best = (0usize, f64::INFINITY);
    for k in 0..points {
      let cost = objective.pair_cost(k as f64 * step)?;
      if cost < best.1 {
        best = (k, cost);
      }
    }
    let (k, grid_cost) = best;
    let grid_rho = k as f64 * step;
    let lo = k.saturating_sub(1) as f64 * step;
    let hi = ((k + 1).min(points - 1)) as f64 * step;

    let solver = BrentOpt::new(lo, hi)
      .set_tolerance(self.config.brent_tolerance, self.config.brent_tolerance);
    let res = Executor::new(PairCost(objective), solver)
      .configure(|state| state.max_iters(self.config.brent_max_iters))
      .run()?;
    let iterations = res.state().get_iter();
    let brent_cost = res.state().get_best_cost();
    let brent_rho = res.state.best_param.unwrap_or(grid_rho);

    if !matches!(
      res.state().get_termination_reason(),
      Some(TerminationReason::SolverConverged)
    ) {
      return Err(EvaError::FitDidNotConverge {
        iterations,
        cost: brent_cost,
        reason: format!(
          "Brent stopped with {:?}",
          res.state().get_termination_status()
        ),
      });
    }

    let on_bound = k == 0 || k == points - 1;
    if brent_cost > grid_cost {
      if on_bound {
        // the optimum sits on the box edge that the grid already hit
        return Ok((vec![grid_rho], iterations));
      }
      warn!(grid_cost, brent_cost, "refinement is worse than its bracket");
      return Err(EvaError::FitDidNotConverge {
        iterations,
        cost: brent_cost,
        reason: format!("refined cost exceeds the grid cost {grid_cost:e} at rho = {grid_rho}"),
      });
    }
    Ok((vec![brent_rho.clamp(0.0, 1.0)], iterations))
  }

  fn search_matrix(
    &self,
    objective: &Exceedance<'_, E>,
    start: &Array2<f64>,
  ) -> EvaResult<(Vec<f64>, u64)> {
    let dim = objective.lower.len();
    let x0 = (0..dim)
      .flat_map(|i| ((i + 1)..dim).map(move |j| (i, j)))
      .map(|(i, j)| start[[i, j]].clamp(0.01, 0.99))
      .collect::<Vec<f64>>();
    // evaluator failures (e.g. an unsupported dimension) keep their own variant here
    objective.matrix_cost(&x0)?;

    let step = self.config.simplex_step;
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.clone());
    for i in 0..x0.len() {
      let mut point = x0.clone();
      point[i] = if point[i] + step <= 1.0 {
        point[i] + step
      } else {
        point[i] - step
      };
      simplex.push(point);
    }

    let solver = NelderMead::new(simplex).with_sd_tolerance(self.config.sd_tolerance)?;
    let res = Executor::new(MatrixCost(objective), solver)
      .configure(|state| state.max_iters(self.config.max_iters))
      .run()?;
    let iterations = res.state().get_iter();
    let cost = res.state().get_best_cost();
    if matches!(
      res.state().get_termination_reason(),
      Some(TerminationReason::MaxItersReached)
    ) {
      return Err(EvaError::FitDidNotConverge {
        iterations,
        cost,
        reason: "Nelder-Mead exhausted its iteration budget".to_string(),
      });
    }
    let best = res.state.best_param.unwrap_or(x0);
    Ok((best.iter().map(|r| r.clamp(0.0, 1.0)).collect(), iterations))
  }
}

struct Exceedance<'a, E> {
  evaluator: &'a E,
  lower: Vec<f64>,
  target: f64,
}

impl<E: OrthantProbabilityExt> Exceedance<'_, E> {
  fn pair_cost(&self, rho: f64) -> EvaResult<f64> {
    let corr = NatafParams::bivariate(rho.clamp(0.0, 1.0))?;
    let model = self.evaluator.upper_orthant(&self.lower, corr.correlation())?;
    Ok((self.target - model).powi(2))
  }

  /// Relative squared error, with box and positive-definiteness penalties.
  fn matrix_cost(&self, pairs: &[f64]) -> EvaResult<f64> {
    let outside = pairs
      .iter()
      .map(|&r| (r - r.clamp(0.0, 1.0)).powi(2))
      .sum::<f64>();
    let projected = pairs.iter().map(|r| r.clamp(0.0, 1.0)).collect::<Vec<f64>>();
    let params = NatafParams::from_pairs(self.lower.len(), &projected)?;
    if !is_positive_definite(&params) {
      return Ok(NOT_PD_PENALTY + outside);
    }
    let model = self.evaluator.upper_orthant(&self.lower, params.correlation())?;
    Ok(((self.target - model) / self.target).powi(2) + outside)
  }
}

fn is_positive_definite(params: &NatafParams) -> bool {
  let d = params.dim();
  let corr = params.correlation();
  nalgebra::DMatrix::from_fn(d, d, |i, j| corr[[i, j]])
    .cholesky()
    .is_some()
}

struct PairCost<'a, 'b, E>(&'b Exceedance<'a, E>);

impl<E: OrthantProbabilityExt> CostFunction for PairCost<'_, '_, E> {
  type Param = f64;
  type Output = f64;

  fn cost(&self, rho: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.0.pair_cost(*rho)?)
  }
}

struct MatrixCost<'a, 'b, E>(&'b Exceedance<'a, E>);

impl<E: OrthantProbabilityExt> CostFunction for MatrixCost<'_, '_, E> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, pairs: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.0.matrix_cost(pairs)?)
  }
}

/// Fits a Gaussian copula to the joint exceedances of `sample` above its
/// marginal `q`-quantiles with the default evaluator and settings.
pub fn censgaussfit(sample: &Array2<f64>, q: f64) -> EvaResult<NatafFit> {
  CensoredGaussianFit::new()?.fit(sample, q)
}
