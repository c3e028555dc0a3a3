//! Sector forecast modules for the ghgcast scenario engine.
//!
//! One module per physical domain, each deriving a historical baseline from
//! statistical tables and projecting it forward under the session's policy
//! levers:
//!
//! - `population`: official population forecast plus a correction lever
//! - `buildings`: floor-area growth from per-capita construction rates
//! - `district_heating`: heat demand, production mix and unit emissions
//! - `electricity`: consumption, supply emission factor and net emissions
//! - `solar`: photovoltaic buildout on existing and new buildings
//! - `cars`: mileage, fleet electrification and transport emissions
//! - `geothermal`: district-heat substitution by ground-source heat pumps
//! - `emissions`: the aggregated ledger and reduction attribution
//!
//! [`model::build_graph`] wires every forecast into a single
//! [`ghgcast_core::graph::CalcGraph`].

pub mod buildings;
pub mod cars;
pub mod data;
pub mod district_heating;
pub mod electricity;
pub mod emissions;
pub mod geothermal;
pub mod model;
pub mod population;
pub mod sectors;
pub mod solar;
pub mod testing;
