//! # Spectral oversampling
//!
//! $$
//! y(t)=\frac1N\sum_{k=-N/2}^{N/2} c_k\,\hat x_k\,e^{2\pi i k t/N},\qquad c_{\pm N/2}=\tfrac12
//! $$
//!
//! Band-limited resampling of periodic signals by zero padding in the
//! frequency domain. Matrices are processed column by column (or row by row).
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use ndrustfft::ndfft;
use ndrustfft::ndifft;
use ndrustfft::FftHandler;
use num_complex::Complex64;

use crate::error::EvaError;
use crate::error::EvaResult;

/// Resampled signal and its sample instants, in units of the original spacing.
#[derive(Debug, Clone)]
pub struct Oversampled<S> {
  pub signal: S,
  pub instants: Array1<f64>,
}

/// Length and integer FFT factor for an oversampling request.
struct Plan {
  n: usize,
  fft_factor: usize,
  out_len: usize,
}

impl Plan {
  fn new(n: usize, factor: f64) -> EvaResult<Self> {
    if n < 2 || !factor.is_finite() || factor < 1.0 {
      return Err(EvaError::InvalidOversamplingFactor { factor, len: n });
    }
    let fft_factor = factor.ceil() as usize;
    let out_len = if factor.fract() == 0.0 {
      n * fft_factor
    } else {
      (n as f64 * factor).round() as usize
    };
    Ok(Self {
      n,
      fft_factor,
      out_len,
    })
  }

  fn is_identity(&self) -> bool {
    self.out_len == self.n
  }

  fn instants(&self) -> Array1<f64> {
    Array1::from_shape_fn(self.out_len, |j| {
      j as f64 * self.n as f64 / self.out_len as f64
    })
  }
}

struct Resampler {
  plan: Plan,
  forward: FftHandler<f64>,
  inverse: FftHandler<f64>,
}

impl Resampler {
  fn new(plan: Plan) -> Self {
    let forward = FftHandler::new(plan.n);
    let inverse = FftHandler::new(plan.n * plan.fft_factor);
    Self {
      plan,
      forward,
      inverse,
    }
  }

  fn resample(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
    let dense = self.band_limited(x);
    if dense.len() == self.plan.out_len {
      dense
    } else {
      periodic_linear(&dense, &self.plan.instants(), self.plan.fft_factor)
    }
  }

  fn band_limited(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = self.plan.n;
    let m = n * self.plan.fft_factor;
    if m == n {
      return x.to_owned();
    }

    let input = x.mapv(|v| Complex64::new(v, 0.0));
    let mut spectrum = Array1::<Complex64>::zeros(n);
    ndfft(&input, &mut spectrum, &self.forward, 0);

    let half = n / 2;
    let mut padded = Array1::<Complex64>::zeros(m);
    let positive = if n % 2 == 0 { half } else { half + 1 };
    for k in 0..positive {
      padded[k] = spectrum[k];
    }
    if n % 2 == 0 {
      // the Nyquist bin is shared between +N/2 and -N/2
      padded[half] = spectrum[half] * 0.5;
    }
    for k in 1..=half {
      let mirrored = padded[k].conj();
      padded[m - k] = mirrored;
    }

    let mut out = Array1::<Complex64>::zeros(m);
    ndifft(&padded, &mut out, &self.inverse, 0);
    // ndifft divides by m; the interpolant is normalised by the original n
    let rescale = m as f64 / n as f64;
    out.mapv(|c| c.re * rescale)
  }
}

fn periodic_linear(dense: &Array1<f64>, instants: &Array1<f64>, step: usize) -> Array1<f64> {
  let len = dense.len();
  instants.mapv(|t| {
    let pos = t * step as f64;
    let i0 = pos.floor();
    let frac = pos - i0;
    let i0 = (i0 as usize) % len;
    let i1 = (i0 + 1) % len;
    dense[i0] * (1.0 - frac) + dense[i1] * frac
  })
}

/// Resamples one period of `signal` by `factor`.
///
/// Integer factors give `N * factor` exactly interpolated samples; fractional
/// factors give `round(N * factor)` samples, linearly interpolated between the
/// band-limited samples at `N * ceil(factor)`.
pub fn oversample(signal: &Array1<f64>, factor: f64) -> EvaResult<Oversampled<Array1<f64>>> {
  let plan = Plan::new(signal.len(), factor)?;
  if plan.is_identity() {
    return Ok(Oversampled {
      instants: plan.instants(),
      signal: signal.clone(),
    });
  }
  let instants = plan.instants();
  let resampler = Resampler::new(plan);
  Ok(Oversampled {
    signal: resampler.resample(signal.view()),
    instants,
  })
}

/// Resamples every column of `signal` (periodic along axis 0).
pub fn oversample_columns(
  signal: &Array2<f64>,
  factor: f64,
) -> EvaResult<Oversampled<Array2<f64>>> {
  let plan = Plan::new(signal.nrows(), factor)?;
  if plan.is_identity() {
    return Ok(Oversampled {
      instants: plan.instants(),
      signal: signal.clone(),
    });
  }
  let instants = plan.instants();
  let resampler = Resampler::new(plan);
  let mut out = Array2::<f64>::zeros((instants.len(), signal.ncols()));
  for (src, mut dst) in signal.axis_iter(Axis(1)).zip(out.axis_iter_mut(Axis(1))) {
    dst.assign(&resampler.resample(src));
  }
  Ok(Oversampled {
    signal: out,
    instants,
  })
}

/// Resamples every row of `signal` (periodic along axis 1).
pub fn oversample_rows(signal: &Array2<f64>, factor: f64) -> EvaResult<Oversampled<Array2<f64>>> {
  let by_columns = oversample_columns(&signal.t().to_owned(), factor)?;
  Ok(Oversampled {
    signal: by_columns.signal.reversed_axes(),
    instants: by_columns.instants,
  })
}
