use nalgebra::DMatrix;
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::debug;

use super::NatafParams;
use crate::distributions::gpd::GeneralizedPareto;
use crate::distributions::gpd::GpdParams;
use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::mvn::standard_normal;

/// Floor for the default batch size.
const MIN_BATCH: usize = 4096;

/// Rejection-loop settings for [`NatafSimulator`].
///
/// Each batch accepts about `batch_size * P(all Z > Φ⁻¹(q))` rows, which is
/// `batch_size * (1 - q)^d` for independent coordinates. An explicit
/// `batch_size` has to keep `max_batches` times that above `nsim`.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
  /// Batches drawn before giving up.
  pub max_batches: usize,
  /// Gaussian vectors per batch, `max(nsim, 4096)` when `None`.
  pub batch_size: Option<usize>,
}

impl Default for SimulationConfig {
  fn default() -> Self {
    Self {
      max_batches: 10_000,
      batch_size: None,
    }
  }
}

/// Conditional sampler for the joint tail of a fitted Nataf model.
///
/// Gaussian vectors with the copula correlation are drawn in batches; those
/// exceeding `Φ⁻¹(q)` in every coordinate are mapped to physical units with
/// each variable's GPD, using the conditional level `(Φ(x) - q) / (1 - q)`.
#[derive(Debug, Clone)]
pub struct NatafSimulator {
  chol: DMatrix<f64>,
  marginals: Vec<GeneralizedPareto>,
  quantile: f64,
  threshold: f64,
  std_norm: Normal,
  config: SimulationConfig,
}

/// Accepted rows so far, row-major.
struct Accumulator {
  dim: usize,
  values: Vec<f64>,
}

impl Accumulator {
  fn len(&self) -> usize {
    self.values.len() / self.dim
  }

  fn finish(mut self, nsim: usize) -> EvaResult<Array2<f64>> {
    self.values.truncate(nsim * self.dim);
    Array2::from_shape_vec((nsim, self.dim), self.values)
      .map_err(|e| EvaError::degenerate(format!("simulated rows: {e}")))
  }
}

impl NatafSimulator {
  pub fn new(
    params: &NatafParams,
    q: f64,
    marginals: &[GpdParams],
    config: SimulationConfig,
  ) -> EvaResult<Self> {
    if !(q > 0.0 && q < 1.0) {
      return Err(EvaError::InvalidProbability {
        name: "q",
        value: q,
        reason: "quantile level must lie in (0, 1)",
      });
    }
    if marginals.len() != params.dim() {
      return Err(EvaError::InvalidDimension {
        dim: marginals.len(),
        reason: "need one set of GPD parameters per copula variable",
      });
    }
    let marginals = marginals
      .iter()
      .map(GpdParams::distribution)
      .collect::<EvaResult<Vec<_>>>()?;
    let std_norm = standard_normal()?;
    Ok(Self {
      chol: params.cholesky()?,
      marginals,
      quantile: q,
      threshold: std_norm.inverse_cdf(q),
      std_norm,
      config,
    })
  }

  /// Draws exactly `nsim` joint exceedances in physical units.
  #[tracing::instrument(skip(self, rng), fields(dim = self.marginals.len(), q = self.quantile))]
  pub fn simulate<R: Rng + ?Sized>(&self, nsim: usize, rng: &mut R) -> EvaResult<Array2<f64>> {
    if nsim == 0 {
      return Err(EvaError::InvalidSimulationCount { nsim });
    }
    let batch_size = self
      .config
      .batch_size
      .unwrap_or_else(|| nsim.max(MIN_BATCH))
      .max(1);
    let mut acc = Accumulator {
      dim: self.marginals.len(),
      values: Vec::with_capacity(nsim * self.marginals.len()),
    };
    for batch in 0..self.config.max_batches {
      acc = self.batch(acc, batch_size, rng)?;
      if acc.len() >= nsim {
        debug!(batches = batch + 1, accepted = acc.len(), "simulation finished");
        return acc.finish(nsim);
      }
    }
    Err(EvaError::SimulationBudgetExceeded {
      max_batches: self.config.max_batches,
      accepted: acc.len(),
      requested: nsim,
    })
  }

  fn batch<R: Rng + ?Sized>(
    &self,
    mut acc: Accumulator,
    size: usize,
    rng: &mut R,
  ) -> EvaResult<Accumulator> {
    let d = acc.dim;
    let mut z = vec![0.0; d];
    let mut x = vec![0.0; d];
    for _ in 0..size {
      for v in z.iter_mut() {
        *v = rng.sample(StandardNormal);
      }
      for i in 0..d {
        x[i] = (0..=i).map(|k| self.chol[(i, k)] * z[k]).sum();
      }
      if x.iter().any(|&xi| xi <= self.threshold) {
        continue;
      }
      for (xi, gpd) in x.iter().zip(&self.marginals) {
        // 1 - (Φ(x) - q) / (1 - q), kept away from zero in the far tail
        let sf = (self.std_norm.cdf(-xi) / (1.0 - self.quantile)).max(f64::MIN_POSITIVE);
        acc.values.push(gpd.inverse_survival(sf)?);
      }
    }
    Ok(acc)
  }
}

/// Simulates `nsim` joint exceedances of the fitted copula with default
/// batching.
pub fn run_simulation<R: Rng + ?Sized>(
  params: &NatafParams,
  q: f64,
  marginals: &[GpdParams],
  nsim: usize,
  rng: &mut R,
) -> EvaResult<Array2<f64>> {
  NatafSimulator::new(params, q, marginals, SimulationConfig::default())?.simulate(nsim, rng)
}
