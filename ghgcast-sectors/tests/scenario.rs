//! End-to-end scenario properties over the full model graph.
//!
//! These tests exercise the whole dependency graph against the fixture
//! datasets: cache soundness under variable changes, forecast-table shape,
//! and the cross-sector invariants that only hold when every module agrees
//! on units and seams.

use ghgcast_sectors::testing::sample_session;
use ghgcast_sectors::{cars, district_heating, electricity, emissions, geothermal, population, solar};
use std::collections::BTreeMap;
use std::sync::Arc;

fn ratios(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(name, share)| (name.to_string(), *share))
        .collect()
}

#[test]
fn every_forecast_runs_and_covers_the_horizon() {
    let session = sample_session();
    for key in [
        population::ADJUSTED_POPULATION_FORECAST,
        district_heating::HEAT_CONSUMPTION_FORECAST,
        district_heating::DISTRICT_HEATING_EMISSIONS,
        electricity::ELECTRICITY_CONSUMPTION_EMISSIONS,
        solar::SOLAR_POWER_FORECAST,
        cars::CARS_EMISSIONS_FORECAST,
        geothermal::GEOTHERMAL_PRODUCTION_FORECAST,
        emissions::EMISSIONS_FORECAST,
    ] {
        let series = session.run(key).unwrap_or_else(|e| panic!("{} failed: {}", key, e));
        assert_eq!(series.end_year(), 2035, "{} misses the target year", key);
        assert!(
            series.first_forecast_year().is_some(),
            "{} has no forecast rows",
            key
        );
    }
}

#[test]
fn repeated_top_level_runs_are_idempotent() {
    let session = sample_session();
    let first = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    let second = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    // Same allocation: the entire transitive computation was served from
    // the cache, bit-identical by construction
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn changing_a_transitive_lever_recomputes_the_ledger() {
    let mut session = sample_session();
    let baseline = session.run(emissions::EMISSIONS_FORECAST).unwrap();

    // The BEV share sits several layers below the ledger
    session.set_variable("cars_bev_percentage", 80.0).unwrap();
    let electrified = session.run(emissions::EMISSIONS_FORECAST).unwrap();

    assert!(!Arc::ptr_eq(&baseline, &electrified));
    let end = baseline.end_year();
    assert!(
        electrified.value("transportation", end) < baseline.value("transportation", end),
        "more EVs must mean less transport emissions"
    );
    // Sectors untouched by the lever keep their values
    assert_eq!(
        electrified.value("waste", end),
        baseline.value("waste", end)
    );
}

#[test]
fn changing_an_unrelated_variable_keeps_the_cache() {
    let mut session = sample_session();
    let baseline = session.run(emissions::EMISSIONS_FORECAST).unwrap();

    // The reduction-requirement levers are outside the ledger's closure
    session
        .set_variable("ghg_reductions_percentage_in_target_year", 60.0)
        .unwrap();
    let again = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    assert!(Arc::ptr_eq(&baseline, &again));
}

#[test]
fn broken_production_mix_fails_the_whole_ledger() {
    let mut session = sample_session();
    session
        .set_variable(
            "district_heating_target_production_ratios",
            ratios(&[
                ("heat_pumps", 29.0),
                ("biomass", 30.0),
                ("natural_gas", 30.0),
                ("coal", 10.0),
            ]),
        )
        .unwrap();
    // The ratio error surfaces through the aggregator, not as a partial
    // result
    let err = session.run(emissions::EMISSIONS_FORECAST).unwrap_err();
    assert!(err.to_string().contains("must sum to 100"));
}

#[test]
fn forecast_seams_are_consistent_across_sectors() {
    let session = sample_session();
    let ledger = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    let seam = ledger.last_historical_year().unwrap();
    assert_eq!(seam, 2018);

    for series_key in [
        district_heating::DISTRICT_HEATING_EMISSIONS,
        cars::CARS_EMISSIONS_FORECAST,
        electricity::ELECTRICITY_CONSUMPTION_EMISSIONS,
    ] {
        let series = session.run(series_key).unwrap();
        assert_eq!(
            series.last_historical_year(),
            Some(seam),
            "{} disagrees about the seam",
            series_key
        );
    }
}

#[test]
fn stronger_levers_push_the_ledger_down() {
    let mut session = sample_session();
    let baseline = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    let end = baseline.end_year();

    session.set_variable("cars_bev_percentage", 70.0).unwrap();
    session
        .set_variable("solar_power_existing_buildings_percentage", 80.0)
        .unwrap();
    session
        .set_variable("geothermal_existing_building_renovation", 3.0)
        .unwrap();
    session
        .set_variable("district_heating_existing_building_efficiency_change", -2.0)
        .unwrap();

    let ambitious = session.run(emissions::EMISSIONS_FORECAST).unwrap();
    assert!(
        ambitious.value(emissions::COL_TOTAL, end) < baseline.value(emissions::COL_TOTAL, end),
        "ambitious levers must reduce total emissions: {} vs {}",
        ambitious.value(emissions::COL_TOTAL, end),
        baseline.value(emissions::COL_TOTAL, end)
    );
}

#[test]
fn bev_target_below_current_share_is_a_clean_error() {
    let mut session = sample_session();
    // The fleet already has a 1 % EV share; diffusion cannot shrink it
    session.set_variable("cars_bev_percentage", 0.5).unwrap();
    let err = session.run(cars::CARS_EMISSIONS_FORECAST).unwrap_err();
    assert!(err.to_string().contains("did not converge"));
}

#[test]
fn requirement_and_attribution_nodes_complete() {
    let session = sample_session();
    let requirement = session.run(emissions::REDUCTION_REQUIREMENT).unwrap();
    assert!(requirement.value(emissions::COL_REQUIRED_EMISSIONS, 2035) > 0.0);

    let attribution = session.run(emissions::REDUCTION_ATTRIBUTION).unwrap();
    let end = attribution.end_year();
    let share = attribution.value("district_heat_activity_share", end)
        + attribution.value("district_heat_intensity_share", end);
    assert!((share - 1.0).abs() < 1e-9);
}
