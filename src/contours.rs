//! # Environmental contours
//!
//! $$
//! C(u)=\min_{v:\,u\cdot v>0}\frac{Q_p(v\cdot X)}{u\cdot v}
//! $$
//!
//! Directional-quantile (Huseby) contours in two and three dimensions.
pub mod grid;
pub mod huseby;
pub mod whitening;

pub use grid::Circle;
pub use grid::RefinedGrid;
pub use grid::Sphere;
pub use huseby::huseby;
pub use huseby::Contour;
pub use huseby::ContourMethod;
pub use huseby::Huseby;
pub use huseby::HusebyContours;
pub use whitening::Normalization;
pub use whitening::Standardizer;
