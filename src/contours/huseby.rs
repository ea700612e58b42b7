//! # Huseby contours
//!
//! $$
//! C_p(u)=Y_{(\lfloor k\rfloor)}+\left(Y_{(\lceil k\rceil)}-Y_{(\lfloor k\rfloor)}\right)(k-\lfloor k\rfloor),\quad Y=u\cdot X,\ k=Np+\tfrac12
//! $$
//!
//! Directional-quantile contours: the sample is projected on a grid of
//! directions, the `p`-quantile of every projection defines a half-space, and
//! the contour is the boundary built from those half-spaces.
use std::f64::consts::PI;

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use tracing::debug;

use super::grid::Circle;
use super::grid::Sphere;
use super::whitening::Normalization;
use super::whitening::Standardizer;
use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::sample::sorted;
use crate::stats::sample::validate_sample;
use crate::traits::DirectionGridExt;

/// How directional quantiles are combined into contour points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContourMethod {
  /// Closest supporting line (2D) or plane (3D) in every direction.
  #[default]
  SupportingPlane,
  /// Intersections of consecutive half-plane boundaries (2D only).
  ConsecutiveIntersection,
  /// Limit of consecutive intersections, `C u + C' u⊥` (2D only).
  LimitingIntersection,
}

impl ContourMethod {
  pub fn name(&self) -> &'static str {
    match self {
      Self::SupportingPlane => "supporting-plane",
      Self::ConsecutiveIntersection => "consecutive-intersection",
      Self::LimitingIntersection => "limiting-intersection",
    }
  }
}

/// Contour estimator settings.
#[derive(ImplNew, Debug, Clone)]
pub struct Huseby {
  /// Probability levels, one contour each.
  pub probabilities: Vec<f64>,
  /// Directions per full turn, a positive multiple of 4.
  pub ntheta: usize,
  /// Output resolution, `ntheta` when `None`.
  pub npt: Option<usize>,
  pub normalization: Normalization,
  pub method: ContourMethod,
}

/// One closed contour in sample coordinates.
#[derive(Debug, Clone)]
pub struct Contour {
  pub probability: f64,
  /// One point per row, `dim` columns.
  pub points: Array2<f64>,
}

/// Contours for every requested level, evaluated on a shared angle grid.
#[derive(Debug, Clone)]
pub struct HusebyContours {
  pub contours: Vec<Contour>,
  /// `theta` (2D) or `theta, phi` (3D) per point, in radians.
  pub angles: Array2<f64>,
}

impl HusebyContours {
  /// Column names and values: the coordinates of every level side by side,
  /// followed by the angle column(s).
  pub fn to_table(&self) -> (Vec<String>, Array2<f64>) {
    let rows = self.angles.nrows();
    let mut names = Vec::new();
    let mut columns = Vec::new();
    for contour in &self.contours {
      for (c, axis) in ["x", "y", "z"].iter().take(contour.points.ncols()).enumerate() {
        names.push(format!("{axis}_{}", contour.probability));
        columns.push(contour.points.column(c));
      }
    }
    for (c, name) in ["theta", "phi"].iter().take(self.angles.ncols()).enumerate() {
      names.push(name.to_string());
      columns.push(self.angles.column(c));
    }
    let table = Array2::from_shape_fn((rows, columns.len()), |(i, c)| columns[c][i]);
    (names, table)
  }
}

impl Huseby {
  fn npt(&self) -> usize {
    self.npt.unwrap_or(self.ntheta)
  }

  fn check_probabilities(&self, n: usize) -> EvaResult<()> {
    if self.probabilities.is_empty() {
      return Err(EvaError::InvalidProbability {
        name: "probabilities",
        value: f64::NAN,
        reason: "at least one level is required",
      });
    }
    for &p in &self.probabilities {
      if !(p > 0.0 && p < 1.0) {
        return Err(EvaError::InvalidProbability {
          name: "probabilities",
          value: p,
          reason: "every level must lie in (0, 1)",
        });
      }
      let rank = n as f64 * p + 0.5;
      if rank < 1.0 || rank > n as f64 {
        return Err(EvaError::InsufficientSample {
          n,
          probability: p,
          rank,
        });
      }
    }
    Ok(())
  }

  /// Contours of `sample` (2 or 3 columns) at every probability level.
  #[tracing::instrument(
    skip(self, sample),
    fields(rows = sample.nrows(), dim = sample.ncols(), ntheta = self.ntheta)
  )]
  pub fn estimate(&self, sample: &Array2<f64>) -> EvaResult<HusebyContours> {
    let dim = sample.ncols();
    if dim != 2 && dim != 3 {
      return Err(EvaError::InvalidDimension {
        dim,
        reason: "contours are defined for 2 or 3 variables",
      });
    }
    validate_sample(sample, dim)?;
    if dim == 3 && self.method != ContourMethod::SupportingPlane {
      return Err(EvaError::UnsupportedMethod {
        method: self.method.name(),
        dim,
      });
    }
    self.check_probabilities(sample.nrows())?;

    let standardizer = Standardizer::fit(sample, self.normalization)?;
    let normalised = standardizer.forward(sample);
    let contours = if dim == 2 {
      self.on_grid(&Circle::new(self.ntheta)?, &normalised)?
    } else {
      self.on_grid(&Sphere::new(self.ntheta)?, &normalised)?
    };

    let angles = contours.angles;
    let contours = contours
      .levels
      .into_iter()
      .zip(&self.probabilities)
      .map(|(points, &probability)| Contour {
        probability,
        points: standardizer.inverse(&points),
      })
      .collect::<Vec<_>>();
    debug!(levels = contours.len(), points = angles.nrows(), "estimated contours");
    Ok(HusebyContours { contours, angles })
  }

  fn on_grid<G: DirectionGridExt>(
    &self,
    grid: &G,
    sample: &Array2<f64>,
  ) -> EvaResult<Normalised> {
    let npt = self.npt();
    let directions = grid.directions();
    let quantiles = directional_quantiles(sample, &directions, &self.probabilities);
    debug!(
      dim = grid.dim(),
      ntheta = grid.ntheta(),
      directions = directions.nrows(),
      npt,
      "projected sample on direction grid"
    );

    let mut levels = Vec::with_capacity(self.probabilities.len());
    let mut angles = grid.angles();
    for raw in quantiles.axis_iter(Axis(1)) {
      let (points, level_angles) = match self.method {
        ContourMethod::SupportingPlane => {
          let corrected = support_correction(&directions, raw);
          let refined = grid.refine(&corrected, npt)?;
          let points = &refined.directions * &refined.values.insert_axis(Axis(1));
          (points, refined.angles)
        }
        ContourMethod::ConsecutiveIntersection => {
          let refined = grid.refine(&raw.to_owned(), npt)?;
          consecutive_intersections(&refined.angles.column(0).to_owned(), &refined.values)
        }
        ContourMethod::LimitingIntersection => {
          let refined = grid.refine(&raw.to_owned(), npt)?;
          let theta = refined.angles.column(0).to_owned();
          (limiting_intersections(&theta, &refined.values), refined.angles)
        }
      };
      levels.push(points);
      angles = level_angles;
    }
    Ok(Normalised { levels, angles })
  }
}

/// Contour points before mapping back to sample coordinates.
struct Normalised {
  levels: Vec<Array2<f64>>,
  angles: Array2<f64>,
}

/// `ndir x nlevels` interpolated order statistics of the projections.
fn directional_quantiles(
  sample: &Array2<f64>,
  directions: &Array2<f64>,
  probabilities: &[f64],
) -> Array2<f64> {
  let n = sample.nrows();
  let mut out = Array2::<f64>::zeros((directions.nrows(), probabilities.len()));
  for (u, mut row) in directions.rows().into_iter().zip(out.rows_mut()) {
    let y = sorted(sample.dot(&u).view());
    for (value, &p) in row.iter_mut().zip(probabilities) {
      *value = rank_statistic(&y, n as f64 * p + 0.5);
    }
  }
  out
}

/// Value at the 1-based fractional rank `k` of sorted data.
fn rank_statistic(y: &[f64], k: f64) -> f64 {
  let lo = k.floor() as usize - 1;
  let hi = k.ceil() as usize - 1;
  y[lo] + (y[hi] - y[lo]) * (k - k.floor())
}

/// `C'_i = min_{j: u_i . u_j > 0} C_j / (u_i . u_j)`.
fn support_correction(directions: &Array2<f64>, values: ArrayView1<'_, f64>) -> Array1<f64> {
  directions
    .rows()
    .into_iter()
    .map(|ui| {
      directions
        .rows()
        .into_iter()
        .zip(values.iter())
        .filter_map(|(uj, &c)| {
          let cos = ui.dot(&uj);
          (cos > 0.0).then_some(c / cos)
        })
        .fold(f64::INFINITY, f64::min)
    })
    .collect()
}

fn consecutive_intersections(theta: &Array1<f64>, c: &Array1<f64>) -> (Array2<f64>, Array2<f64>) {
  let n = theta.len();
  let step = 2.0 * PI / n as f64;
  let det = step.sin();
  let mut points = Array2::<f64>::zeros((n, 2));
  let mut mid = Array2::<f64>::zeros((n, 1));
  for k in 0..n {
    let next = (k + 1) % n;
    let (s0, c0) = theta[k].sin_cos();
    let (s1, c1) = (theta[k] + step).sin_cos();
    points[[k, 0]] = (c[k] * s1 - c[next] * s0) / det;
    points[[k, 1]] = (c[next] * c0 - c[k] * c1) / det;
    mid[[k, 0]] = theta[k] + 0.5 * step;
  }
  (points, mid)
}

fn limiting_intersections(theta: &Array1<f64>, c: &Array1<f64>) -> Array2<f64> {
  let n = theta.len();
  let step = 2.0 * PI / n as f64;
  Array2::from_shape_fn((n, 2), |(k, axis)| {
    let slope = (c[(k + 1) % n] - c[(k + n - 1) % n]) / (2.0 * step);
    let (s, co) = theta[k].sin_cos();
    if axis == 0 {
      c[k] * co - slope * s
    } else {
      c[k] * s + slope * co
    }
  })
}

/// Whitened supporting-plane contours at `ntheta` directions.
pub fn huseby(
  sample: &Array2<f64>,
  probabilities: &[f64],
  ntheta: usize,
) -> EvaResult<HusebyContours> {
  Huseby::new(
    probabilities.to_vec(),
    ntheta,
    None,
    Normalization::default(),
    ContourMethod::default(),
  )
  .estimate(sample)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::Rng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;
  use statrs::distribution::ContinuousCDF;
  use statrs::distribution::Normal;

  use super::*;

  fn gaussian(n: usize, dim: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n, dim), || rng.sample(StandardNormal))
  }

  fn radii(points: &Array2<f64>) -> Vec<f64> {
    points.rows().into_iter().map(|p| p.dot(&p).sqrt()).collect()
  }

  #[test]
  fn isotropic_sample_gives_a_circle() -> anyhow::Result<()> {
    let sample = gaussian(50_000, 2, 1);
    let p = 0.95;
    let est = Huseby::new(vec![p], 40, None, Normalization::None, ContourMethod::default());
    let contours = est.estimate(&sample)?;
    let points = &contours.contours[0].points;
    assert_eq!(points.nrows(), 40);

    // first direction is the x axis: the raw order statistic bounds the corrected radius
    let x = sorted(sample.column(0));
    let order_stat = rank_statistic(&x, 50_000.0 * p + 0.5);
    assert!(points[[0, 0]] <= order_stat + 1e-12);

    let expected = Normal::new(0.0, 1.0)?.inverse_cdf(p);
    for r in radii(points) {
      assert!((r - expected).abs() < 0.05, "radius {r} vs {expected}");
    }
    Ok(())
  }

  #[test]
  fn whitened_contours_follow_affine_rescaling() -> anyhow::Result<()> {
    let sample = gaussian(5_000, 2, 2);
    let mut moved = sample.clone();
    moved.column_mut(0).mapv_inplace(|x| 3.0 * x + 10.0);
    moved.column_mut(1).mapv_inplace(|y| 0.5 * y - 2.0);

    let a = huseby(&sample, &[0.9, 0.99], 24)?;
    let b = huseby(&moved, &[0.9, 0.99], 24)?;
    for (ca, cb) in a.contours.iter().zip(&b.contours) {
      for (pa, pb) in ca.points.rows().into_iter().zip(cb.points.rows()) {
        assert_abs_diff_eq!(3.0 * pa[0] + 10.0, pb[0], epsilon = 1e-9);
        assert_abs_diff_eq!(0.5 * pa[1] - 2.0, pb[1], epsilon = 1e-9);
      }
    }
    Ok(())
  }

  #[test]
  fn marginal_contours_map_back_per_axis() -> anyhow::Result<()> {
    let mut sample = gaussian(5_000, 2, 12);
    sample.column_mut(0).mapv_inplace(|x| 4.0 * x - 1.0);
    sample.column_mut(1).mapv_inplace(|y| 0.25 * y + 6.0);
    let with = |mode| Huseby::new(vec![0.9], 24, Some(48), mode, ContourMethod::default());

    let marginal = with(Normalization::Marginal).estimate(&sample)?;
    let st = Standardizer::fit(&sample, Normalization::Marginal)?;
    let standard = with(Normalization::None).estimate(&st.forward(&sample))?;
    let back = st.inverse(&standard.contours[0].points);
    for (a, b) in marginal.contours[0].points.iter().zip(back.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }

    let mut moved = sample.clone();
    moved.column_mut(0).mapv_inplace(|x| 2.0 * x + 3.0);
    moved.column_mut(1).mapv_inplace(|y| 10.0 * y - 5.0);
    let rescaled = with(Normalization::Marginal).estimate(&moved)?;
    let pairs = marginal.contours[0].points.rows().into_iter();
    for (pa, pb) in pairs.zip(rescaled.contours[0].points.rows()) {
      assert_abs_diff_eq!(2.0 * pa[0] + 3.0, pb[0], epsilon = 1e-9);
      assert_abs_diff_eq!(10.0 * pa[1] - 5.0, pb[1], epsilon = 1e-9);
    }
    Ok(())
  }

  #[test]
  fn outer_levels_enclose_inner_ones() -> anyhow::Result<()> {
    let sample = gaussian(20_000, 2, 3);
    let contours = huseby(&sample, &[0.8, 0.99], 32)?;
    let inner = radii(&contours.contours[0].points);
    let outer = radii(&contours.contours[1].points);
    assert!(inner.iter().zip(&outer).all(|(i, o)| i < o));
    Ok(())
  }

  #[test]
  fn intersection_methods_agree_with_supporting_lines() -> anyhow::Result<()> {
    let sample = gaussian(50_000, 2, 4);
    let run = |method| {
      Huseby::new(vec![0.95], 64, Some(128), Normalization::None, method).estimate(&sample)
    };
    let support = run(ContourMethod::SupportingPlane)?;
    let limiting = run(ContourMethod::LimitingIntersection)?;
    let consecutive = run(ContourMethod::ConsecutiveIntersection)?;
    assert_eq!(consecutive.angles.nrows(), 128);
    assert_abs_diff_eq!(consecutive.angles[[0, 0]], PI / 128.0, epsilon = 1e-12);
    let expected = Normal::new(0.0, 1.0)?.inverse_cdf(0.95);
    for other in [&limiting, &consecutive] {
      for r in radii(&other.contours[0].points) {
        assert!((r - expected).abs() < 0.1, "radius {r}");
      }
    }
    assert_eq!(support.angles, limiting.angles);
    Ok(())
  }

  #[test]
  fn sphere_contours_have_the_hemisphere_layout() -> anyhow::Result<()> {
    let sample = gaussian(20_000, 3, 5);
    let est = Huseby::new(vec![0.9], 16, Some(24), Normalization::None, ContourMethod::default());
    let contours = est.estimate(&sample)?;
    assert_eq!(contours.angles.dim(), (24 * 13, 2));
    assert_eq!(contours.contours[0].points.ncols(), 3);
    let expected = Normal::new(0.0, 1.0)?.inverse_cdf(0.9);
    for r in radii(&contours.contours[0].points) {
      assert!((r - expected).abs() < 0.1, "radius {r}");
    }

    let (names, table) = contours.to_table();
    assert_eq!(names, vec!["x_0.9", "y_0.9", "z_0.9", "theta", "phi"]);
    assert_eq!(table.dim(), (24 * 13, 5));
    Ok(())
  }

  #[test]
  fn planar_table_layout() -> anyhow::Result<()> {
    let sample = gaussian(2_000, 2, 6);
    let contours = huseby(&sample, &[0.5, 0.9], 8)?;
    let (names, table) = contours.to_table();
    assert_eq!(names, vec!["x_0.5", "y_0.5", "x_0.9", "y_0.9", "theta"]);
    assert_eq!(table.dim(), (8, 5));
    assert_eq!(table[[3, 2]], contours.contours[1].points[[3, 0]]);
    Ok(())
  }

  #[test]
  fn rejects_invalid_requests() {
    let sample = gaussian(100, 2, 7);
    let with = |probs: Vec<f64>, ntheta, npt| {
      Huseby::new(probs, ntheta, npt, Normalization::Whiten, ContourMethod::default())
        .estimate(&sample)
    };
    assert!(matches!(
      with(vec![0.9], 10, None),
      Err(EvaError::InvalidAngularResolution { ntheta: 10, .. })
    ));
    assert!(matches!(
      with(vec![0.9], 8, Some(4)),
      Err(EvaError::InvalidAngularResolution { npt: 4, .. })
    ));
    assert!(matches!(
      with(vec![1.5], 8, None),
      Err(EvaError::InvalidProbability { .. })
    ));
    assert!(matches!(
      with(vec![0.999], 8, None),
      Err(EvaError::InsufficientSample { n: 100, .. })
    ));
    assert!(matches!(
      huseby(&gaussian(100, 4, 8), &[0.9], 8),
      Err(EvaError::InvalidDimension { dim: 4, .. })
    ));
    let method = Huseby::new(
      vec![0.9],
      8,
      None,
      Normalization::Whiten,
      ContourMethod::LimitingIntersection,
    );
    assert!(matches!(
      method.estimate(&gaussian(100, 3, 9)),
      Err(EvaError::UnsupportedMethod { dim: 3, .. })
    ));
  }
}
