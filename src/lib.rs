//! Municipal greenhouse-gas emissions scenario engine.
//!
//! Blends historical statistical series with user-adjustable policy levers
//! (electrification rate, renovation pace, fuel mix) to project emissions per
//! sector out to a target year.
//!
//! The heavy lifting lives in two member crates, re-exported here:
//! - `core` (ghgcast-core): year-indexed series, the variable store, the
//!   dataset provider contract and the memoized computation graph plus
//!   numerical primitives.
//! - `sectors` (ghgcast-sectors): one forecast module per physical domain
//!   and the emissions aggregator that merges them into a single ledger.

pub use ghgcast_core as core;
pub use ghgcast_sectors as sectors;

pub use ghgcast_core::errors::{ScenarioError, ScenarioResult};
pub use ghgcast_core::graph::ScenarioSession;
pub use ghgcast_core::series::YearSeries;
pub use ghgcast_sectors::model::{build_graph, new_session};
