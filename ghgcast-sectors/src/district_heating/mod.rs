//! District heating: consumption, production mix and unit emissions.
//!
//! The consumption side forecasts specific heat use (kWh per net floor-area
//! unit) for the existing stock and for new construction, and combines them
//! with the floor-area forecast into total heat demand. The production side
//! interpolates the fuel mix toward a user-configured target-year mix and
//! prices the resulting fuel use into a unit emission factor, which the rest
//! of the engine uses whenever district heat is displaced.

pub mod consumption;
pub mod production;

pub use consumption::{
    HEAT_CONSUMPTION_FORECAST, HEAT_USE_PER_AREA_EXISTING_BUILDINGS,
    HEAT_USE_PER_AREA_NEW_BUILDINGS,
};
pub use production::DISTRICT_HEATING_EMISSIONS;
