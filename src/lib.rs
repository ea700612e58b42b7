//! # eva-contours
//!
//! Multivariate extreme-value tools for metocean data: a censored Gaussian
//! (Nataf) dependence model for joint threshold exceedances, conditional
//! simulation of synthetic extremes with generalized Pareto marginals, and
//! directional-quantile (Huseby) environmental contours in 2D and 3D.
//!
//! ## Modules
//!
//! | Module            | Description                                                                 |
//! |-------------------|-----------------------------------------------------------------------------|
//! | [`copulas`]       | Nataf copula parameters, censored Gaussian fit and conditional simulation.  |
//! | [`contours`]      | Huseby contours, direction grids and sample whitening.                      |
//! | [`distributions`] | Generalized Pareto marginals and the `qgpd` quantile inverter.              |
//! | [`stats`]         | Orthant probabilities, column statistics and spectral oversampling.         |
//! | [`traits`]        | Seams for the orthant evaluator and direction grids.                        |
//! | [`error`]         | The crate error type.                                                       |
//!
//! ## Pipeline
//!
//! sample → [`copulas::nataf::censgaussfit`] → [`copulas::nataf::run_simulation`]
//! → [`contours::huseby`].
pub mod contours;
pub mod copulas;
pub mod distributions;
pub mod error;
pub mod stats;
pub mod traits;

pub use error::EvaError;
pub use error::EvaResult;

#[cfg(test)]
mod tests {
  use ndarray::Array2;
  use ndarray::ArrayView1;
  use rand::rngs::StdRng;
  use rand::Rng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;

  use crate::contours::ContourMethod;
  use crate::contours::Huseby;
  use crate::contours::Normalization;
  use crate::copulas::nataf::censgaussfit;
  use crate::copulas::nataf::run_simulation;
  use crate::distributions::gpd::GpdParams;
  use crate::stats::sample::column_means;

  fn orientation(a: ArrayView1<f64>, b: ArrayView1<f64>, c: ArrayView1<f64>) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
  }

  fn is_simple_polygon(points: &Array2<f64>) -> bool {
    let n = points.nrows();
    for i in 0..n {
      let (a, b) = (points.row(i), points.row((i + 1) % n));
      for j in (i + 2)..n {
        if i == 0 && j == n - 1 {
          continue;
        }
        let (c, d) = (points.row(j), points.row((j + 1) % n));
        let crosses_cd = orientation(a, b, c) * orientation(a, b, d) < 0.0;
        let crosses_ab = orientation(c, d, a) * orientation(c, d, b) < 0.0;
        if crosses_cd && crosses_ab {
          return false;
        }
      }
    }
    true
  }

  #[test]
  fn fit_simulate_and_contour() -> anyhow::Result<()> {
    let rho = 0.5;
    let mut rng = StdRng::seed_from_u64(2024);
    let mut sample = Array2::<f64>::zeros((1_000_000, 2));
    for mut row in sample.rows_mut() {
      let z1: f64 = rng.sample(StandardNormal);
      let z2: f64 = rng.sample(StandardNormal);
      row[0] = z1;
      row[1] = rho * z1 + (1.0 - rho * rho).sqrt() * z2;
    }

    let fit = censgaussfit(&sample, 0.9)?;
    assert!((fit.params.pairs()[0] - rho).abs() < 0.05);

    let marginals = [GpdParams::new(3.0, 0.5, -0.1), GpdParams::new(8.0, 0.8, -0.05)];
    let simulated = run_simulation(&fit.params, 0.9, &marginals, 10_000, &mut rng)?;
    assert_eq!(simulated.nrows(), 10_000);

    let contours = Huseby::new(
      vec![0.95],
      60,
      Some(120),
      Normalization::Whiten,
      ContourMethod::SupportingPlane,
    )
    .estimate(&simulated)?;
    let points = &contours.contours[0].points;
    assert_eq!(points.nrows(), 120);
    assert!(is_simple_polygon(points));

    let centroid = column_means(points);
    let mean = column_means(&simulated);
    let offset = (&centroid - &mean).mapv(|v| v * v).sum().sqrt();
    assert!(offset < 1.0, "centroid {centroid} vs sample mean {mean}");
    Ok(())
  }
}
