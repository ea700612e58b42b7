//! # Nataf (Gaussian) copula
//!
//! $$
//! P\left(X_i>u_i\ \forall i\right)=P\left(Z_i>\Phi^{-1}(q)\ \forall i\right),\qquad Z\sim\mathcal N(0,R)
//! $$
//!
//! Censored Gaussian dependence model for joint threshold exceedances.
use nalgebra::DMatrix;
use ndarray::Array2;

use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::mvn::check_correlation;

mod fit;
mod simulation;

pub use fit::censgaussfit;
pub use fit::CensoredGaussianFit;
pub use fit::NatafFit;
pub use fit::NatafFitConfig;
pub use simulation::run_simulation;
pub use simulation::NatafSimulator;
pub use simulation::SimulationConfig;

// diagonal loading for a correlation matrix on the boundary of the PD cone
const JITTER: f64 = 1e-10;

/// Copula correlation matrix.
///
/// Pairs are ordered as the row-major upper triangle: `(0, 1), (0, 2), (1, 2)`
/// for three variables.
#[derive(Debug, Clone, PartialEq)]
pub struct NatafParams {
  corr: Array2<f64>,
}

impl NatafParams {
  pub fn new(corr: Array2<f64>) -> EvaResult<Self> {
    let dim = corr.nrows();
    if dim < 2 {
      return Err(EvaError::InvalidDimension {
        dim,
        reason: "a copula needs at least 2 variables",
      });
    }
    check_correlation(&corr, dim)?;
    Ok(Self { corr })
  }

  /// Two-variable copula with correlation `rho`.
  pub fn bivariate(rho: f64) -> EvaResult<Self> {
    Self::from_pairs(2, &[rho])
  }

  /// Builds the matrix from one value per pair.
  pub fn from_pairs(dim: usize, pairs: &[f64]) -> EvaResult<Self> {
    let expected = dim * dim.saturating_sub(1) / 2;
    if pairs.len() != expected {
      return Err(EvaError::InvalidCorrelation {
        reason: format!(
          "{dim} variables need {expected} pair correlations, got {}",
          pairs.len()
        ),
      });
    }
    let mut corr = Array2::<f64>::eye(dim);
    let mut values = pairs.iter();
    for i in 0..dim {
      for j in (i + 1)..dim {
        if let Some(&r) = values.next() {
          corr[[i, j]] = r;
          corr[[j, i]] = r;
        }
      }
    }
    Self::new(corr)
  }

  pub fn dim(&self) -> usize {
    self.corr.nrows()
  }

  pub fn correlation(&self) -> &Array2<f64> {
    &self.corr
  }

  /// Upper-triangle correlations in pair order.
  pub fn pairs(&self) -> Vec<f64> {
    let d = self.dim();
    (0..d)
      .flat_map(|i| ((i + 1)..d).map(move |j| (i, j)))
      .map(|(i, j)| self.corr[[i, j]])
      .collect()
  }

  /// Lower Cholesky factor; singular matrices are loaded with a tiny diagonal.
  pub(crate) fn cholesky(&self) -> EvaResult<DMatrix<f64>> {
    let d = self.dim();
    let corr = DMatrix::from_fn(d, d, |i, j| self.corr[[i, j]]);
    if let Some(chol) = corr.clone().cholesky() {
      return Ok(chol.l());
    }
    let loaded = corr + DMatrix::<f64>::identity(d, d) * JITTER;
    loaded
      .cholesky()
      .map(|chol| chol.l())
      .ok_or_else(|| EvaError::InvalidCorrelation {
        reason: "matrix is not positive semi-definite".to_string(),
      })
  }

  /// One row with a `rho_i_j` column per pair.
  pub fn to_table(&self) -> (Vec<String>, Array2<f64>) {
    let d = self.dim();
    let names = (0..d)
      .flat_map(|i| ((i + 1)..d).map(move |j| format!("rho_{i}_{j}")))
      .collect::<Vec<_>>();
    let pairs = self.pairs();
    let table = Array2::from_shape_fn((1, pairs.len()), |(_, k)| pairs[k]);
    (names, table)
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  #[test]
  fn pairs_follow_upper_triangle_order() -> anyhow::Result<()> {
    let params = NatafParams::from_pairs(3, &[0.1, 0.2, 0.3])?;
    assert_eq!(params.correlation()[[0, 2]], 0.2);
    assert_eq!(params.correlation()[[2, 1]], 0.3);
    assert_eq!(params.pairs(), vec![0.1, 0.2, 0.3]);

    let (names, table) = params.to_table();
    assert_eq!(names, vec!["rho_0_1", "rho_0_2", "rho_1_2"]);
    assert_eq!(table, array![[0.1, 0.2, 0.3]]);
    Ok(())
  }

  #[test]
  fn rejects_malformed_matrices() {
    assert!(NatafParams::from_pairs(3, &[0.1, 0.2]).is_err());
    assert!(NatafParams::bivariate(1.2).is_err());
    assert!(NatafParams::new(array![[1.0]]).is_err());
  }

  #[test]
  fn comonotone_pair_still_factorises() -> anyhow::Result<()> {
    let l = NatafParams::bivariate(1.0)?.cholesky()?;
    assert!((l[(1, 0)] - 1.0).abs() < 1e-4);
    assert!(NatafParams::from_pairs(3, &[0.9, -0.9, 0.9])?.cholesky().is_err());
    Ok(())
  }
}
