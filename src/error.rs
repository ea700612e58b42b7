//! # Error
//!
//! $$
//! \text{operation}:\ \text{inputs}\to\text{value}\ \sqcup\ \text{EvaError}
//! $$
//!
//! Every public operation either succeeds completely or returns one of these
//! variants naming the offending parameter.

/// Crate-wide result alias.
pub type EvaResult<T> = Result<T, EvaError>;

/// Error type for all fallible operations in the crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaError {
  /// A probability or quantile level outside its admissible range.
  #[error("invalid probability `{name}` = {value}: {reason}")]
  InvalidProbability {
    /// Name of the offending parameter.
    name: &'static str,
    /// The rejected value.
    value: f64,
    /// What was expected.
    reason: &'static str,
  },

  /// Negative or non-finite GPD scale.
  #[error("invalid GPD scale {scale} (must be finite and >= 0)")]
  InvalidScale {
    /// The rejected scale.
    scale: f64,
  },

  /// Non-finite GPD shape.
  #[error("invalid GPD shape {shape} (must be a finite scalar)")]
  InvalidShape {
    /// The rejected shape.
    shape: f64,
  },

  /// Censoring fraction outside [0, 1).
  #[error("invalid censoring fraction lambda = {lambda} (must be in [0, 1))")]
  InvalidCensoring {
    /// The rejected censoring fraction.
    lambda: f64,
  },

  /// Oversampling factor below one, or a signal too short to resample.
  #[error("invalid oversampling factor {factor} for a signal of length {len}")]
  InvalidOversamplingFactor {
    /// The requested factor.
    factor: f64,
    /// Length of the periodic signal.
    len: usize,
  },

  /// The sample cannot support the requested fit or transform.
  #[error("degenerate sample: {reason}")]
  DegenerateSample {
    /// Description of the problem.
    reason: String,
  },

  /// Zero simulations requested.
  #[error("invalid simulation count {nsim} (must be > 0)")]
  InvalidSimulationCount {
    /// The requested count.
    nsim: usize,
  },

  /// Angular grid that cannot carry quadrant symmetry.
  #[error("invalid angular resolution ntheta = {ntheta}, npt = {npt}: {reason}")]
  InvalidAngularResolution {
    /// Base angular resolution.
    ntheta: usize,
    /// Requested output resolution.
    npt: usize,
    /// What was expected.
    reason: &'static str,
  },

  /// Unsupported number of variables.
  #[error("invalid dimension {dim}: {reason}")]
  InvalidDimension {
    /// Number of columns received.
    dim: usize,
    /// What was expected.
    reason: &'static str,
  },

  /// Not enough observations for the requested probability level.
  #[error("insufficient sample: rank {rank} is outside [1, {n}] for probability {probability}")]
  InsufficientSample {
    /// Number of observations.
    n: usize,
    /// Probability level.
    probability: f64,
    /// The fractional rank `n * p + 0.5`.
    rank: f64,
  },

  /// The rejection sampler ran out of batches.
  #[error(
    "simulation budget exceeded: {accepted} of {requested} rows after {max_batches} batches"
  )]
  SimulationBudgetExceeded {
    /// Configured batch budget.
    max_batches: usize,
    /// Rows accepted before giving up.
    accepted: usize,
    /// Rows requested.
    requested: usize,
  },

  /// The copula optimiser stopped without converging.
  #[error("fit did not converge after {iterations} iterations (cost {cost:e}): {reason}")]
  FitDidNotConverge {
    /// Iterations performed.
    iterations: u64,
    /// Best objective value reached.
    cost: f64,
    /// Why the result was rejected.
    reason: String,
  },

  /// A correlation matrix that is not a valid correlation matrix.
  #[error("invalid correlation: {reason}")]
  InvalidCorrelation {
    /// Description of the problem.
    reason: String,
  },

  /// A contour method that the requested dimension does not support.
  #[error("contour method `{method}` is not available in {dim}D")]
  UnsupportedMethod {
    /// Method name.
    method: &'static str,
    /// Sample dimension.
    dim: usize,
  },

  /// Failure reported by the optimisation backend.
  #[error("optimizer failure: {0}")]
  Optimizer(String),
}

impl EvaError {
  pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
    EvaError::DegenerateSample {
      reason: reason.into(),
    }
  }
}

impl From<argmin::core::Error> for EvaError {
  fn from(err: argmin::core::Error) -> Self {
    EvaError::Optimizer(err.to_string())
  }
}
