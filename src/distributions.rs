//! # Distributions
//!
//! $$
//! Q(p)=\mu+\frac{\sigma}{\xi}\left[(1-p)^{-\xi}-1\right]
//! $$
//!
pub mod gpd;
