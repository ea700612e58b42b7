//! # Direction grids
//!
//! $$
//! u(\theta,\varphi)=(\cos\theta\cos\varphi,\ \sin\varphi,\ \sin\theta\cos\varphi)=u(\theta+\pi,\ \pi-\varphi)
//! $$
//!
//! Circle and sphere direction sets for the contour estimator. The sphere is
//! parameterised as a `(θ, φ)` torus with `φ` over the full circle, so the
//! directional values are periodic in both angles and can be resampled with
//! the spectral oversampler. Only the `|φ| <= π/2` half is evaluated; the
//! rest of the torus follows from the reflection above.
use std::f64::consts::PI;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;

use crate::error::EvaError;
use crate::error::EvaResult;
use crate::stats::spectral::oversample;
use crate::stats::spectral::oversample_columns;
use crate::stats::spectral::oversample_rows;
use crate::traits::DirectionGridExt;

/// Directional values on an output grid.
#[derive(Debug, Clone)]
pub struct RefinedGrid {
  /// One value per direction.
  pub values: Array1<f64>,
  /// Unit directions, one per row.
  pub directions: Array2<f64>,
  /// `theta` (2D) or `theta, phi` (3D) per direction, in radians.
  pub angles: Array2<f64>,
}

fn check_ntheta(ntheta: usize) -> EvaResult<()> {
  if ntheta == 0 || ntheta % 4 != 0 {
    return Err(EvaError::InvalidAngularResolution {
      ntheta,
      npt: ntheta,
      reason: "ntheta must be a positive multiple of 4",
    });
  }
  Ok(())
}

fn check_npt(ntheta: usize, npt: usize, multiple: usize) -> EvaResult<()> {
  if npt < ntheta {
    return Err(EvaError::InvalidAngularResolution {
      ntheta,
      npt,
      reason: "npt must not be smaller than ntheta",
    });
  }
  if npt % multiple != 0 {
    return Err(EvaError::InvalidAngularResolution {
      ntheta,
      npt,
      reason: "npt must be a multiple of 4 on the sphere",
    });
  }
  Ok(())
}

fn resampled_len(ntheta: usize, npt: usize, got: usize) -> EvaResult<()> {
  if got != npt {
    return Err(EvaError::InvalidAngularResolution {
      ntheta,
      npt,
      reason: "npt / ntheta does not resample to npt steps",
    });
  }
  Ok(())
}

/// `ntheta` evenly spaced directions on the unit circle, starting at `θ = 0`.
#[derive(Debug, Clone, Copy)]
pub struct Circle {
  ntheta: usize,
}

impl Circle {
  pub fn new(ntheta: usize) -> EvaResult<Self> {
    check_ntheta(ntheta)?;
    Ok(Self { ntheta })
  }

  fn theta(&self) -> Array1<f64> {
    Array1::from_shape_fn(self.ntheta, |i| 2.0 * PI * i as f64 / self.ntheta as f64)
  }
}

fn circle_directions(theta: &Array1<f64>) -> Array2<f64> {
  Array2::from_shape_fn((theta.len(), 2), |(i, c)| {
    if c == 0 {
      theta[i].cos()
    } else {
      theta[i].sin()
    }
  })
}

impl DirectionGridExt for Circle {
  fn dim(&self) -> usize {
    2
  }

  fn ntheta(&self) -> usize {
    self.ntheta
  }

  fn directions(&self) -> Array2<f64> {
    circle_directions(&self.theta())
  }

  fn angles(&self) -> Array2<f64> {
    self.theta().insert_axis(Axis(1))
  }

  fn refine(&self, values: &Array1<f64>, npt: usize) -> EvaResult<RefinedGrid> {
    check_npt(self.ntheta, npt, 1)?;
    let resampled = oversample(values, npt as f64 / self.ntheta as f64)?;
    resampled_len(self.ntheta, npt, resampled.signal.len())?;
    let theta = resampled
      .instants
      .mapv(|t| 2.0 * PI * t / self.ntheta as f64);
    Ok(RefinedGrid {
      values: resampled.signal,
      directions: circle_directions(&theta),
      angles: theta.insert_axis(Axis(1)),
    })
  }
}

/// `(θ, φ)` direction grid on the unit sphere.
///
/// Longitudes `θ_i = 2πi/n`, latitudes `φ_k = 2πk/n` restricted to
/// `[-π/2, π/2]`, i.e. `n/2 + 1` latitude rows ordered from the south pole to
/// the north pole, longitude varying fastest.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
  ntheta: usize,
}

/// Torus columns in `[-π/2, π/2]`, south to north.
fn hemisphere(n: usize) -> Vec<usize> {
  (3 * n / 4..n).chain(0..=n / 4).collect()
}

fn latitude(k: usize, n: usize) -> f64 {
  let phi = 2.0 * PI * k as f64 / n as f64;
  if phi > PI {
    phi - 2.0 * PI
  } else {
    phi
  }
}

fn sphere_direction(theta: f64, phi: f64) -> [f64; 3] {
  [theta.cos() * phi.cos(), phi.sin(), theta.sin() * phi.cos()]
}

impl Sphere {
  pub fn new(ntheta: usize) -> EvaResult<Self> {
    check_ntheta(ntheta)?;
    Ok(Self { ntheta })
  }

  /// Fills the full `n x n` torus (rows `θ_i`, columns `φ_k`) from values on
  /// [`DirectionGridExt::directions`].
  ///
  /// Cells with `π/2 < φ_k < 3π/2` take the value of `(θ_i + π, π - φ_k)`,
  /// which is the same direction.
  pub fn torus(&self, values: &Array1<f64>) -> EvaResult<Array2<f64>> {
    let n = self.ntheta;
    let lats = hemisphere(n);
    if values.len() != n * lats.len() {
      return Err(EvaError::InvalidDimension {
        dim: values.len(),
        reason: "sphere values must cover ntheta * (ntheta / 2 + 1) directions",
      });
    }
    let mut torus = Array2::<f64>::zeros((n, n));
    for (row, &k) in lats.iter().enumerate() {
      for i in 0..n {
        torus[[i, k]] = values[row * n + i];
      }
    }
    for k in (n / 4 + 1)..(3 * n / 4) {
      let mirror = (n / 2 + n - k) % n;
      for i in 0..n {
        torus[[i, k]] = torus[[(i + n / 2) % n, mirror]];
      }
    }
    Ok(torus)
  }

  fn grid(&self, n: usize, lon: &Array1<f64>) -> (Array2<f64>, Array2<f64>) {
    let lats = hemisphere(n);
    let count = lats.len() * lon.len();
    let mut directions = Array2::<f64>::zeros((count, 3));
    let mut angles = Array2::<f64>::zeros((count, 2));
    for (row, &k) in lats.iter().enumerate() {
      let phi = latitude(k, n);
      for (i, &theta) in lon.iter().enumerate() {
        let idx = row * lon.len() + i;
        let u = sphere_direction(theta, phi);
        for c in 0..3 {
          directions[[idx, c]] = u[c];
        }
        angles[[idx, 0]] = theta;
        angles[[idx, 1]] = phi;
      }
    }
    (directions, angles)
  }

  fn longitudes(&self) -> Array1<f64> {
    Array1::from_shape_fn(self.ntheta, |i| 2.0 * PI * i as f64 / self.ntheta as f64)
  }
}

impl DirectionGridExt for Sphere {
  fn dim(&self) -> usize {
    3
  }

  fn ntheta(&self) -> usize {
    self.ntheta
  }

  fn directions(&self) -> Array2<f64> {
    self.grid(self.ntheta, &self.longitudes()).0
  }

  fn angles(&self) -> Array2<f64> {
    self.grid(self.ntheta, &self.longitudes()).1
  }

  fn refine(&self, values: &Array1<f64>, npt: usize) -> EvaResult<RefinedGrid> {
    check_npt(self.ntheta, npt, 4)?;
    let torus = self.torus(values)?;
    let factor = npt as f64 / self.ntheta as f64;
    let by_lon = oversample_columns(&torus, factor)?;
    let dense = oversample_rows(&by_lon.signal, factor)?.signal;
    resampled_len(self.ntheta, npt, dense.nrows())?;
    resampled_len(self.ntheta, npt, dense.ncols())?;

    let lon = by_lon
      .instants
      .mapv(|t| 2.0 * PI * t / self.ntheta as f64);
    let refined = hemisphere(npt)
      .into_iter()
      .flat_map(|k| (0..npt).map(move |i| (i, k)))
      .map(|(i, k)| dense[[i, k]])
      .collect::<Array1<f64>>();
    let (directions, angles) = self.grid(npt, &lon);
    Ok(RefinedGrid {
      values: refined,
      directions,
      angles,
    })
  }
}
