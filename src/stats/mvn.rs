//! # Orthant probabilities
//!
//! $$
//! P(Z_1>h,Z_2>k)=\bar\Phi(h)\bar\Phi(k)+\frac1{2\pi}\int_0^{\arcsin\rho}\exp\left(-\frac{h^2+k^2-2hk\sin t}{2\cos^2 t}\right)dt
//! $$
//!
//! Gauss–Legendre evaluator for two and three dimensions. The trivariate case
//! conditions on one coordinate and integrates the bivariate term of the
//! other two against its density over `[h, max(h, 0) + 9]`.
use gauss_quad::GaussLegendre;
use ndarray::Array2;
use statrs::distribution::Continuous;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::error::EvaError;
use crate::error::EvaResult;
use crate::traits::OrthantProbabilityExt;

const PERFECT: f64 = 1.0 - 1e-10;
// standard normal density is below 1e-17 past this many units
const TAIL_WIDTH: f64 = 9.0;

/// Gauss–Legendre orthant-probability evaluator for `d <= 3`.
pub struct GaussOrthant {
  inner: GaussLegendre,
  outer: GaussLegendre,
  std_norm: Normal,
}

impl GaussOrthant {
  pub fn new() -> EvaResult<Self> {
    Self::with_degrees(20, 48)
  }

  /// `inner` nodes for the arcsine integral, `outer` nodes for the
  /// conditioning coordinate in 3D.
  pub fn with_degrees(inner: usize, outer: usize) -> EvaResult<Self> {
    let quadrature = |deg: usize| {
      GaussLegendre::new(deg).map_err(|_| EvaError::InvalidDimension {
        dim: deg,
        reason: "quadrature degree must be at least 2",
      })
    };
    Ok(Self {
      inner: quadrature(inner)?,
      outer: quadrature(outer)?,
      std_norm: standard_normal()?,
    })
  }

  fn sf(&self, x: f64) -> f64 {
    self.std_norm.cdf(-x)
  }

  /// `P(Z_1 > h, Z_2 > k)` with correlation `rho`.
  pub fn bivariate(&self, h: f64, k: f64, rho: f64) -> f64 {
    let rho = rho.clamp(-1.0, 1.0);
    let independent = self.sf(h) * self.sf(k);
    if rho == 0.0 {
      return independent;
    }
    let hk = h * k;
    let hs = h * h + k * k;
    let integral = self.inner.integrate(0.0, rho.asin(), |t: f64| {
      let (s, c) = t.sin_cos();
      (-(hs - 2.0 * hk * s) / (2.0 * c * c)).exp()
    });
    (independent + integral / (2.0 * std::f64::consts::PI)).clamp(0.0, 1.0)
  }

  /// `P(Z_1 > h_1, Z_2 > h_2, Z_3 > h_3)` for the correlation matrix `corr`.
  pub fn trivariate(&self, h: [f64; 3], corr: &Array2<f64>) -> f64 {
    // a perfectly correlated pair collapses to one coordinate
    for (i, j, k) in [(0, 1, 2), (0, 2, 1), (1, 2, 0)] {
      if corr[[i, j]] >= PERFECT {
        return self.bivariate(h[i].max(h[j]), h[k], corr[[i, k]]);
      }
    }

    let pivot = (0..3)
      .min_by(|&a, &b| {
        let worst = |c: usize| {
          (0..3)
            .filter(|&j| j != c)
            .map(|j| corr[[c, j]].abs())
            .fold(0.0, f64::max)
        };
        worst(a)
          .partial_cmp(&worst(b))
          .unwrap_or(std::cmp::Ordering::Equal)
      })
      .unwrap_or(0);
    let (a, b) = match pivot {
      0 => (1, 2),
      1 => (0, 2),
      _ => (0, 1),
    };
    let r_a = corr[[pivot, a]].clamp(-PERFECT, PERFECT);
    let r_b = corr[[pivot, b]].clamp(-PERFECT, PERFECT);
    let s_a = (1.0 - r_a * r_a).sqrt();
    let s_b = (1.0 - r_b * r_b).sqrt();
    let partial = ((corr[[a, b]] - r_a * r_b) / (s_a * s_b)).clamp(-1.0, 1.0);

    let lo = h[pivot];
    let hi = lo.max(0.0) + TAIL_WIDTH;
    let integral = self.outer.integrate(lo, hi, |x: f64| {
      let conditional = self.bivariate((h[a] - r_a * x) / s_a, (h[b] - r_b * x) / s_b, partial);
      self.std_norm.pdf(x) * conditional
    });
    integral.clamp(0.0, 1.0)
  }
}

impl OrthantProbabilityExt for GaussOrthant {
  fn upper_orthant(&self, lower: &[f64], corr: &Array2<f64>) -> EvaResult<f64> {
    check_correlation(corr, lower.len())?;
    match lower.len() {
      1 => Ok(self.sf(lower[0])),
      2 => Ok(self.bivariate(lower[0], lower[1], corr[[0, 1]])),
      3 => Ok(self.trivariate([lower[0], lower[1], lower[2]], corr)),
      d => Err(EvaError::InvalidDimension {
        dim: d,
        reason: "the Gauss-Legendre orthant evaluator supports 1 to 3 dimensions",
      }),
    }
  }
}

pub(crate) fn standard_normal() -> EvaResult<Normal> {
  Normal::new(0.0, 1.0).map_err(|e| EvaError::degenerate(format!("standard normal: {e}")))
}

/// Square, symmetric, unit diagonal, entries in `[-1, 1]`.
pub fn check_correlation(corr: &Array2<f64>, dim: usize) -> EvaResult<()> {
  if corr.nrows() != dim || corr.ncols() != dim {
    return Err(EvaError::InvalidCorrelation {
      reason: format!(
        "expected a {dim}x{dim} matrix, got {}x{}",
        corr.nrows(),
        corr.ncols()
      ),
    });
  }
  for i in 0..dim {
    if (corr[[i, i]] - 1.0).abs() > 1e-12 {
      return Err(EvaError::InvalidCorrelation {
        reason: format!("diagonal entry {i} is {}", corr[[i, i]]),
      });
    }
    for j in (i + 1)..dim {
      let r = corr[[i, j]];
      if !r.is_finite() || r.abs() > 1.0 {
        return Err(EvaError::InvalidCorrelation {
          reason: format!("entry ({i}, {j}) = {r} is outside [-1, 1]"),
        });
      }
      if (r - corr[[j, i]]).abs() > 1e-12 {
        return Err(EvaError::InvalidCorrelation {
          reason: format!("entries ({i}, {j}) and ({j}, {i}) differ"),
        });
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::f64::consts::PI;

  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn bivariate_zero_threshold_matches_sheppard() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    for rho in [-0.9f64, -0.3, 0.0, 0.25, 0.6, 0.95, 1.0] {
      let expected = 0.25 + rho.asin() / (2.0 * PI);
      assert_abs_diff_eq!(mvn.bivariate(0.0, 0.0, rho), expected, epsilon = 1e-12);
    }
    Ok(())
  }

  #[test]
  fn bivariate_limits() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    let h = 1.2815515655446004;
    assert_abs_diff_eq!(mvn.bivariate(h, h, 0.0), 0.01, epsilon = 1e-12);
    // comonotone: both exceed iff the first does
    assert_abs_diff_eq!(mvn.bivariate(h, h, 1.0), 0.1, epsilon = 1e-9);
    Ok(())
  }

  #[test]
  fn trivariate_zero_threshold_matches_closed_form() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    let corr = array![[1.0, 0.5, 0.3], [0.5, 1.0, 0.4], [0.3, 0.4, 1.0]];
    let expected = 0.125 + (0.5f64.asin() + 0.3f64.asin() + 0.4f64.asin()) / (4.0 * PI);
    assert_abs_diff_eq!(
      mvn.upper_orthant(&[0.0, 0.0, 0.0], &corr)?,
      expected,
      epsilon = 1e-8
    );
    Ok(())
  }

  #[test]
  fn trivariate_independent_is_product() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    let corr = Array2::<f64>::eye(3);
    let p = mvn.upper_orthant(&[1.0, 0.5, -0.2], &corr)?;
    let expected = mvn.sf(1.0) * mvn.sf(0.5) * mvn.sf(-0.2);
    assert_abs_diff_eq!(p, expected, epsilon = 1e-9);
    Ok(())
  }

  #[test]
  fn trivariate_perfect_pair_reduces_to_bivariate() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    let corr = array![[1.0, 1.0, 0.4], [1.0, 1.0, 0.4], [0.4, 0.4, 1.0]];
    let p = mvn.upper_orthant(&[1.0, 1.5, 0.5], &corr)?;
    assert_abs_diff_eq!(p, mvn.bivariate(1.5, 0.5, 0.4), epsilon = 1e-12);
    Ok(())
  }

  #[test]
  fn rejects_bad_matrices_and_dimensions() -> anyhow::Result<()> {
    let mvn = GaussOrthant::new()?;
    assert!(matches!(
      mvn.upper_orthant(&[0.0, 0.0], &array![[1.0, 1.5], [1.5, 1.0]]),
      Err(EvaError::InvalidCorrelation { .. })
    ));
    assert!(matches!(
      mvn.upper_orthant(&[0.0; 4], &Array2::<f64>::eye(4)),
      Err(EvaError::InvalidDimension { dim: 4, .. })
    ));
    Ok(())
  }
}
