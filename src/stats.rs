//! # Stats
//!
//! $$
//! P(Z>h),\quad \hat Q(q),\quad \hat x_k=\sum_{t}x_te^{-2\pi ikt/N}
//! $$
//!
pub mod mvn;
pub mod sample;
pub mod spectral;
