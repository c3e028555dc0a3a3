//! Core mechanisms for the ghgcast emissions scenario engine.
//!
//! This crate carries no sector knowledge. It provides:
//! - [`series::YearSeries`]: the year-indexed forecast table every
//!   forecasting function produces and consumes
//! - [`variables`]: named, typed configuration values with per-session
//!   overrides
//! - [`datasets`]: the read contract for external statistical tables and a
//!   process-lifetime cache in front of it
//! - [`graph`]: the memoized computation graph that resolves declared
//!   dependencies and caches results keyed on their transitive inputs
//! - [`numerics`]: regression, Bass diffusion, polynomial fitting and the
//!   reduction-attribution decomposition

pub mod datasets;
pub mod errors;
pub mod graph;
pub mod numerics;
pub mod series;
pub mod variables;
