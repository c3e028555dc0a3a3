//! Wiring of the full scenario model.
//!
//! Registration is upstream-first: every forecast is registered after the
//! calcs it depends on, which lets the graph builder validate dependencies
//! eagerly and rules out cycles by construction.

use ghgcast_core::datasets::DatasetStore;
use ghgcast_core::graph::{CalcGraph, GraphBuilder, ScenarioSession};
use std::sync::Arc;

use crate::{buildings, cars, district_heating, electricity, emissions, geothermal, population, solar};

/// Build the computation graph holding every sector forecast.
pub fn build_graph() -> CalcGraph {
    let mut builder = GraphBuilder::new();
    population::register(&mut builder);
    buildings::register(&mut builder);
    district_heating::consumption::register(&mut builder);
    electricity::register_base(&mut builder);
    district_heating::production::register(&mut builder);
    solar::register(&mut builder);
    electricity::register_emissions(&mut builder);
    cars::register(&mut builder);
    geothermal::register(&mut builder);
    emissions::register(&mut builder);
    builder.build()
}

/// Create a scenario session over the full model graph.
pub fn new_session(store: Arc<dyn DatasetStore>) -> ScenarioSession {
    ScenarioSession::new(Arc::new(build_graph()), store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_builds_and_holds_every_forecast() {
        let graph = build_graph();
        for key in [
            population::ADJUSTED_POPULATION_FORECAST,
            buildings::BUILDING_FLOOR_AREA_FORECAST,
            district_heating::HEAT_CONSUMPTION_FORECAST,
            district_heating::DISTRICT_HEATING_EMISSIONS,
            electricity::ELECTRICITY_CONSUMPTION_EMISSIONS,
            solar::SOLAR_POWER_FORECAST,
            cars::CARS_EMISSIONS_FORECAST,
            geothermal::GEOTHERMAL_PRODUCTION_FORECAST,
            emissions::EMISSIONS_FORECAST,
            emissions::REDUCTION_ATTRIBUTION,
            emissions::REDUCTION_REQUIREMENT,
        ] {
            assert!(graph.contains(key), "graph lacks '{}'", key);
        }
    }

    #[test]
    fn ledger_depends_on_every_policy_lever_that_matters() {
        let graph = build_graph();
        let closure = graph.variable_closure(emissions::EMISSIONS_FORECAST);
        for variable in [
            "target_year",
            "population_forecast_correction",
            "cars_bev_percentage",
            "bio_emission_factor",
            "district_heating_target_production_ratios",
            "solar_power_existing_buildings_percentage",
            "geothermal_existing_building_renovation",
        ] {
            assert!(
                closure.contains(&variable),
                "ledger closure lacks '{}'",
                variable
            );
        }
    }
}
