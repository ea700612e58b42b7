//! # Generalized Pareto
//!
//! $$
//! F(x)=\lambda+(1-\lambda)\left[1-\left(1+\xi\frac{x-\mu}{\sigma}\right)^{-1/\xi}\right],\quad x\ge\mu
//! $$
//!
//! Marginal model for threshold exceedances. `λ` is the left-censored mass
//! below the threshold location `μ` (zero for a plain GPD).
use ndarray::Array1;
use ndarray::Array2;

use crate::error::EvaError;
use crate::error::EvaResult;

/// Fitted marginal parameters: threshold location, scale and shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpdParams {
  /// Threshold location `μ`.
  pub threshold: f64,
  /// Scale `σ`.
  pub scale: f64,
  /// Shape `ξ`.
  pub shape: f64,
}

impl GpdParams {
  pub fn new(threshold: f64, scale: f64, shape: f64) -> Self {
    Self {
      threshold,
      scale,
      shape,
    }
  }

  /// Reads an `n x 3` table with one `(threshold, scale, shape)` row per variable.
  pub fn from_rows(table: &Array2<f64>) -> EvaResult<Vec<Self>> {
    if table.ncols() != 3 {
      return Err(EvaError::InvalidDimension {
        dim: table.ncols(),
        reason: "GPD parameter table needs the columns (threshold, scale, shape)",
      });
    }
    Ok(
      table
        .rows()
        .into_iter()
        .map(|row| Self::new(row[0], row[1], row[2]))
        .collect(),
    )
  }

  /// The uncensored distribution described by these parameters.
  pub fn distribution(&self) -> EvaResult<GeneralizedPareto> {
    GeneralizedPareto::new(self.threshold, self.scale, self.shape)
  }
}

/// Generalized Pareto distribution, optionally left-censored at its location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneralizedPareto {
  loc: f64,
  scale: f64,
  shape: f64,
  lambda: f64,
}

impl GeneralizedPareto {
  pub fn new(loc: f64, scale: f64, shape: f64) -> EvaResult<Self> {
    if !scale.is_finite() || scale < 0.0 {
      return Err(EvaError::InvalidScale { scale });
    }
    if !shape.is_finite() {
      return Err(EvaError::InvalidShape { shape });
    }
    if !loc.is_finite() {
      return Err(EvaError::degenerate(format!(
        "GPD location must be finite, got {loc}"
      )));
    }
    Ok(Self {
      loc,
      scale,
      shape,
      lambda: 0.0,
    })
  }

  /// Puts probability mass `lambda` below the location.
  pub fn with_censoring(mut self, lambda: f64) -> EvaResult<Self> {
    if !(0.0..1.0).contains(&lambda) {
      return Err(EvaError::InvalidCensoring { lambda });
    }
    self.lambda = lambda;
    Ok(self)
  }

  pub fn loc(&self) -> f64 {
    self.loc
  }

  pub fn scale(&self) -> f64 {
    self.scale
  }

  pub fn shape(&self) -> f64 {
    self.shape
  }

  pub fn censoring(&self) -> f64 {
    self.lambda
  }

  /// Value `x` such that `P(X <= x) = p`.
  pub fn quantile(&self, p: f64) -> EvaResult<f64> {
    if !(p > 0.0 && p < 1.0) {
      return Err(EvaError::InvalidProbability {
        name: "p",
        value: p,
        reason: "must lie in (0, 1)",
      });
    }
    if p < self.lambda {
      return Err(EvaError::InvalidProbability {
        name: "p",
        value: p,
        reason: "must not fall below the censoring fraction",
      });
    }
    Ok(self.upper_tail_quantile((1.0 - p) / (1.0 - self.lambda)))
  }

  /// Element-wise [`Self::quantile`]; fails on the first invalid probability.
  pub fn quantiles(&self, p: &Array1<f64>) -> EvaResult<Array1<f64>> {
    if let Some(&bad) = p.iter().find(|&&v| !(v > 0.0 && v < 1.0)) {
      return Err(EvaError::InvalidProbability {
        name: "p",
        value: bad,
        reason: "every element must lie in (0, 1)",
      });
    }
    let out = p
      .iter()
      .map(|&v| self.quantile(v))
      .collect::<EvaResult<Vec<f64>>>()?;
    Ok(Array1::from(out))
  }

  /// Value whose exceedance probability above the location is `sf`, i.e.
  /// `quantile(1 - sf)` for an uncensored distribution, without the
  /// cancellation of forming `1 - sf` when `sf` is tiny.
  pub fn inverse_survival(&self, sf: f64) -> EvaResult<f64> {
    if !(sf > 0.0 && sf < 1.0) {
      return Err(EvaError::InvalidProbability {
        name: "sf",
        value: sf,
        reason: "survival probability must lie in (0, 1)",
      });
    }
    Ok(self.upper_tail_quantile(sf))
  }

  /// `P(X <= x)`, including the censored mass.
  pub fn cdf(&self, x: f64) -> f64 {
    1.0 - self.survival(x)
  }

  /// `P(X > x)`, including the censored mass.
  pub fn survival(&self, x: f64) -> f64 {
    if x < self.loc {
      return 1.0;
    }
    if self.scale == 0.0 {
      return 0.0;
    }
    let z = (x - self.loc) / self.scale;
    let tail = if self.shape.abs() < f64::EPSILON {
      (-z).exp()
    } else {
      let base = 1.0 + self.shape * z;
      if base <= 0.0 {
        0.0
      } else {
        base.powf(-1.0 / self.shape)
      }
    };
    (1.0 - self.lambda) * tail
  }

  fn upper_tail_quantile(&self, q: f64) -> f64 {
    if self.shape.abs() < f64::EPSILON {
      self.loc - self.scale * q.ln()
    } else {
      self.loc + self.scale * (q.powf(-self.shape) - 1.0) / self.shape
    }
  }
}

/// Quantile of a (censored) generalized Pareto distribution.
///
/// Mirrors the classic `qgpd(p, loc, scale, shape, lambda)` signature.
pub fn qgpd(p: f64, loc: f64, scale: f64, shape: f64, lambda: f64) -> EvaResult<f64> {
  GeneralizedPareto::new(loc, scale, shape)?
    .with_censoring(lambda)?
    .quantile(p)
}
