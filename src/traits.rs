//! # Traits
//!
//! $$
//! \text{Trait contracts: }\mathcal{A}:\text{inputs}\to\text{probabilities/directions}
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;

use crate::contours::grid::RefinedGrid;
use crate::error::EvaResult;

/// Multivariate normal orthant probability.
///
/// Returns `P(Z_1 > lower_1, ..., Z_d > lower_d)` for `Z ~ N(0, corr)`; the
/// upper integration bound is `+inf` in every dimension.
pub trait OrthantProbabilityExt {
  fn upper_orthant(&self, lower: &[f64], corr: &Array2<f64>) -> EvaResult<f64>;
}

/// Direction set of a Huseby contour in a fixed dimension.
///
/// Implementors generate the base directions the sample is projected on, and
/// turn corrected directional values into the refined output grid.
pub trait DirectionGridExt {
  /// Dimension of the directions.
  fn dim(&self) -> usize;

  /// Base angular resolution.
  fn ntheta(&self) -> usize;

  /// Unit directions of the base grid, one per row.
  fn directions(&self) -> Array2<f64>;

  /// Angles of the base grid, one row per direction (`dim - 1` columns).
  fn angles(&self) -> Array2<f64>;

  /// Resamples values given on [`Self::directions`] to `npt` angular steps.
  fn refine(&self, values: &Array1<f64>, npt: usize) -> EvaResult<RefinedGrid>;
}
