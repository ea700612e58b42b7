//! # Sample
//!
//! $$
//! \hat Q(q)=x_{(\lfloor h\rfloor)}+(h-\lfloor h\rfloor)\left(x_{(\lfloor h\rfloor+1)}-x_{(\lfloor h\rfloor)}\right),\quad h=(n-1)q
//! $$
//!
//! Column statistics shared by the copula fit and the contour estimator.
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::error::EvaError;
use crate::error::EvaResult;

/// Rejects empty, too narrow or non-finite samples.
pub fn validate_sample(sample: &Array2<f64>, min_cols: usize) -> EvaResult<()> {
  if sample.ncols() < min_cols {
    return Err(EvaError::degenerate(format!(
      "sample needs at least {min_cols} columns, got {}",
      sample.ncols()
    )));
  }
  if sample.nrows() < 2 {
    return Err(EvaError::degenerate(format!(
      "sample needs at least 2 rows, got {}",
      sample.nrows()
    )));
  }
  if let Some(((row, col), v)) = sample.indexed_iter().find(|(_, v)| !v.is_finite()) {
    return Err(EvaError::degenerate(format!(
      "non-finite value {v} at row {row}, column {col}"
    )));
  }
  Ok(())
}

pub(crate) fn sorted(values: ArrayView1<'_, f64>) -> Vec<f64> {
  let mut v = values.to_vec();
  v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
  v
}

/// Linearly interpolated quantile of sorted data (numpy's default rule).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
  let n = sorted.len();
  if n == 1 {
    return sorted[0];
  }
  let h = (n - 1) as f64 * q;
  let lo = h.floor() as usize;
  let hi = (lo + 1).min(n - 1);
  sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Per-column empirical `q`-quantiles.
pub fn column_quantiles(sample: &Array2<f64>, q: f64) -> Array1<f64> {
  sample
    .axis_iter(Axis(1))
    .map(|col| quantile_sorted(&sorted(col), q))
    .collect()
}

/// Fraction of rows strictly above `thresholds` in every column at once.
pub fn joint_exceedance(sample: &Array2<f64>, thresholds: &Array1<f64>) -> f64 {
  let hits = sample
    .rows()
    .into_iter()
    .filter(|row| row.iter().zip(thresholds.iter()).all(|(x, t)| x > t))
    .count();
  hits as f64 / sample.nrows() as f64
}

/// Column means.
pub fn column_means(sample: &Array2<f64>) -> Array1<f64> {
  sample.sum_axis(Axis(0)) / sample.nrows() as f64
}

/// Column standard deviations with `ddof = 1`.
pub fn column_std(sample: &Array2<f64>, means: &Array1<f64>) -> Array1<f64> {
  let n = sample.nrows() as f64;
  sample
    .axis_iter(Axis(1))
    .zip(means.iter())
    .map(|(col, &m)| (col.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt())
    .collect()
}

/// Pearson correlation matrix of the columns.
pub fn pearson(sample: &Array2<f64>) -> EvaResult<Array2<f64>> {
  let means = column_means(sample);
  let centered = sample - &means;
  let cov = centered.t().dot(&centered);
  let d = sample.ncols();
  let mut corr = Array2::<f64>::eye(d);
  for i in 0..d {
    for j in (i + 1)..d {
      let denom = (cov[[i, i]] * cov[[j, j]]).sqrt();
      if denom <= 0.0 {
        return Err(EvaError::degenerate(format!(
          "column {} or {} has zero variance",
          i, j
        )));
      }
      let r = (cov[[i, j]] / denom).clamp(-1.0, 1.0);
      corr[[i, j]] = r;
      corr[[j, i]] = r;
    }
  }
  Ok(corr)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn quantile_matches_linear_interpolation() {
    let data = [1.0, 2.0, 3.0, 4.0, 10.0];
    assert_relative_eq!(quantile_sorted(&data, 0.5), 3.0);
    assert_relative_eq!(quantile_sorted(&data, 0.9), 7.6, epsilon = 1e-12);
    assert_relative_eq!(quantile_sorted(&data, 1.0), 10.0);
    assert_relative_eq!(quantile_sorted(&data, 0.0), 1.0);
  }

  #[test]
  fn joint_exceedance_counts_rows_above_every_threshold() {
    let sample = array![[1.0, 1.0], [3.0, 0.0], [3.0, 3.0], [4.0, 5.0]];
    assert_relative_eq!(joint_exceedance(&sample, &array![2.0, 2.0]), 0.5);
  }

  #[test]
  fn pearson_of_linear_columns() -> anyhow::Result<()> {
    let sample = array![[1.0, 2.0, 3.0], [2.0, 4.0, 1.0], [3.0, 6.0, 2.0]];
    let corr = pearson(&sample)?;
    assert_relative_eq!(corr[[0, 1]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(corr[[0, 2]], corr[[2, 0]]);
    assert_relative_eq!(corr[[1, 1]], 1.0);
    Ok(())
  }

  #[test]
  fn std_uses_unbiased_denominator() {
    let sample = array![[1.0], [2.0], [3.0], [4.0]];
    let means = column_means(&sample);
    assert_relative_eq!(column_std(&sample, &means)[0], (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
  }

  #[test]
  fn validation_rejects_narrow_or_non_finite_samples() {
    assert!(validate_sample(&array![[1.0], [2.0]], 2).is_err());
    assert!(validate_sample(&array![[1.0, 2.0]], 2).is_err());
    assert!(validate_sample(&array![[1.0, f64::NAN], [1.0, 2.0]], 2).is_err());
    assert!(validate_sample(&array![[1.0, 0.0], [1.0, 2.0]], 2).is_ok());
  }
}
