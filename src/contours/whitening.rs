//! # Whitening
//!
//! $$
//! w=L^{-1}\,\frac{x-\bar x}{s},\qquad LL^\top=\operatorname{cov}\left(\frac{x-\bar x}{s}\right)
//! $$
//!
use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::sample::column_means;
use crate::stats::sample::column_std;

// correlations this close to +-1 leave a numerically singular factor
const MIN_PIVOT: f64 = 1e-8;

/// Space the directional quantiles are computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Normalization {
  /// Raw coordinates.
  None,
  /// Zero mean, unit standard deviation per column.
  Marginal,
  /// Marginal scaling followed by decorrelation with the Cholesky factor.
  #[default]
  Whiten,
}

/// Affine map between sample coordinates and the normalised space.
#[derive(Debug, Clone)]
pub struct Standardizer {
  mean: Array1<f64>,
  scale: Array1<f64>,
  factor: Array2<f64>,
  inverse_factor: Array2<f64>,
}

impl Standardizer {
  pub fn fit(sample: &Array2<f64>, mode: Normalization) -> EvaResult<Self> {
    let d = sample.ncols();
    if mode == Normalization::None {
      return Ok(Self {
        mean: Array1::zeros(d),
        scale: Array1::ones(d),
        factor: Array2::eye(d),
        inverse_factor: Array2::eye(d),
      });
    }

    let mean = column_means(sample);
    let scale = column_std(sample, &mean);
    if let Some(col) = scale.iter().position(|&s| !(s > 0.0)) {
      return Err(EvaError::degenerate(format!("column {col} has zero variance")));
    }
    if mode == Normalization::Marginal {
      return Ok(Self {
        mean,
        scale,
        factor: Array2::eye(d),
        inverse_factor: Array2::eye(d),
      });
    }

    let standard = (sample - &mean) / &scale;
    let cov = standard.t().dot(&standard) / (sample.nrows() as f64 - 1.0);
    let cov = DMatrix::from_fn(d, d, |i, j| cov[[i, j]]);
    let l = cov
      .cholesky()
      .map(|chol| chol.l())
      .filter(|l| (0..d).all(|i| l[(i, i)] > MIN_PIVOT))
      .ok_or_else(|| EvaError::degenerate("covariance is not positive definite"))?;
    let l_inv = l
      .clone()
      .try_inverse()
      .ok_or_else(|| EvaError::degenerate("Cholesky factor is singular"))?;
    Ok(Self {
      mean,
      scale,
      factor: Array2::from_shape_fn((d, d), |(i, j)| l[(i, j)]),
      inverse_factor: Array2::from_shape_fn((d, d), |(i, j)| l_inv[(i, j)]),
    })
  }

  /// Sample rows to normalised rows.
  pub fn forward(&self, sample: &Array2<f64>) -> Array2<f64> {
    ((sample - &self.mean) / &self.scale).dot(&self.inverse_factor.t())
  }

  /// Normalised rows back to sample coordinates: `mean + scale * (L w)`.
  pub fn inverse(&self, points: &Array2<f64>) -> Array2<f64> {
    points.dot(&self.factor.t()) * &self.scale + &self.mean
  }

  /// Lower Cholesky factor (identity unless whitening).
  pub fn factor(&self) -> &Array2<f64> {
    &self.factor
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn sample() -> Array2<f64> {
    array![
      [1.0, 2.0, 0.5],
      [2.0, 2.5, 0.1],
      [3.0, 5.0, 0.7],
      [4.0, 4.5, 0.2],
      [6.0, 7.0, 0.9]
    ]
  }

  #[test]
  fn whitened_sample_has_identity_covariance() -> anyhow::Result<()> {
    let x = sample();
    let st = Standardizer::fit(&x, Normalization::Whiten)?;
    let w = st.forward(&x);
    let cov = w.t().dot(&w) / (x.nrows() as f64 - 1.0);
    for ((i, j), v) in cov.indexed_iter() {
      let expected = if i == j { 1.0 } else { 0.0 };
      assert_abs_diff_eq!(*v, expected, epsilon = 1e-12);
    }
    assert_eq!(st.factor()[[0, 1]], 0.0);
    Ok(())
  }

  #[test]
  fn inverse_undoes_forward() -> anyhow::Result<()> {
    let x = sample();
    for mode in [Normalization::None, Normalization::Marginal, Normalization::Whiten] {
      let st = Standardizer::fit(&x, mode)?;
      let back = st.inverse(&st.forward(&x));
      for (a, b) in back.iter().zip(x.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
      }
    }
    Ok(())
  }

  #[test]
  fn constant_or_collinear_columns_are_degenerate() {
    let constant = array![[1.0, 3.0], [2.0, 3.0], [4.0, 3.0]];
    assert!(matches!(
      Standardizer::fit(&constant, Normalization::Marginal),
      Err(EvaError::DegenerateSample { .. })
    ));
    assert!(Standardizer::fit(&constant, Normalization::None).is_ok());
    let collinear = array![[1.0, 2.0], [2.0, 4.0], [4.0, 8.0]];
    assert!(matches!(
      Standardizer::fit(&collinear, Normalization::Whiten),
      Err(EvaError::DegenerateSample { .. })
    ));
  }
}
