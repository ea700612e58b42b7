//! # Copulas
//!
//! $$
//! C_R(u_1,\dots,u_d)=\Phi_R\left(\Phi^{-1}(u_1),\dots,\Phi^{-1}(u_d)\right)
//! $$
//!
pub mod nataf;
