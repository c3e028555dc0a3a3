//! Numerical primitives used by the sector forecasts.
//!
//! Kept deliberately small and dependency-light: a least-squares line fit
//! with a significance test, a bounded 1-D minimizer, the Bass diffusion
//! adoption model, polynomial least squares and the multiplicative
//! reduction-attribution decomposition.

pub mod bass;
pub mod decompose;
pub mod optimize;
pub mod polyfit;
pub mod regression;
