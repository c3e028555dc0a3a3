//! District heat consumption.
//!
//! Two specific-heat-use factors are forecast independently — one for the
//! building stock that already exists, one for new construction, each
//! compounding a user-configured yearly efficiency change. Total demand is
//! the existing stock's area times its factor plus the cumulative new
//! stock's area times its factor, with the split anchored at the last
//! historical total: everything added after that point counts as new.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::series::{Year, YearSeries};
use std::collections::BTreeMap;

use crate::buildings::{total_floor_area, BUILDING_FLOOR_AREA_FORECAST};
use crate::data;

pub const HEAT_USE_PER_AREA_EXISTING_BUILDINGS: &str = "heat_use_per_area_existing_buildings";
pub const HEAT_USE_PER_AREA_NEW_BUILDINGS: &str = "heat_use_per_area_new_buildings";
pub const HEAT_CONSUMPTION_FORECAST: &str = "heat_consumption_forecast";

/// Specific heat use, kWh per net floor m2 per year.
pub const COL_HEAT_USE_PER_AREA: &str = "heat_use_per_net_area";
pub const COL_NET_AREA: &str = "net_area";
pub const COL_EXISTING_BUILDING_NET_AREA: &str = "existing_building_net_area";
pub const COL_NEW_BUILDING_NET_AREA: &str = "new_building_net_area";
pub const COL_BUILT_PER_YEAR: &str = "built_per_year";
pub const COL_EXISTING_BUILDING_HEAT_USE: &str = "existing_building_heat_use";
pub const COL_NEW_BUILDING_HEAT_USE: &str = "new_building_heat_use";
/// Total district heat demand, GWh.
pub const COL_TOTAL_HEAT_CONSUMPTION: &str = "total_heat_consumption";

/// Assumed specific heat use of today's new construction, kWh/m2/a.
const NEW_BUILDING_HEAT_USE: f64 = 95.0;
/// First year the new-construction assumption applies to.
const NEW_BUILDING_BASE_YEAR: Year = 2018;

/// Empirical downward correction on the existing stock's forecast heat use.
/// Measured consumption has run consistently below the area-times-factor
/// product, consistent with the warming trend and metering bias.
const EXISTING_HEAT_USE_CORRECTION: f64 = 0.95;

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: HEAT_USE_PER_AREA_EXISTING_BUILDINGS,
        variables: &[
            "municipality_name",
            "target_year",
            "district_heating_existing_building_efficiency_change",
        ],
        datasets: &[data::DISTRICT_HEAT_ENERGY_USE, data::BUILDING_STOCK],
        upstreams: &[],
        func: heat_use_per_area_existing_buildings,
    });
    builder.register(CalcNodeDef {
        key: HEAT_USE_PER_AREA_NEW_BUILDINGS,
        variables: &[
            "target_year",
            "district_heating_new_building_efficiency_change",
        ],
        datasets: &[],
        upstreams: &[],
        func: heat_use_per_area_new_buildings,
    });
    builder.register(CalcNodeDef {
        key: HEAT_CONSUMPTION_FORECAST,
        variables: &["municipality_name", "target_year"],
        datasets: &[data::DISTRICT_HEAT_ENERGY_USE],
        upstreams: &[
            BUILDING_FLOOR_AREA_FORECAST,
            HEAT_USE_PER_AREA_EXISTING_BUILDINGS,
            HEAT_USE_PER_AREA_NEW_BUILDINGS,
        ],
        func: heat_consumption_forecast,
    });
}

/// Historical consumption per total net area, weather-corrected, then
/// compounded with the configured efficiency change on forecast years.
///
/// With no efficiency change configured the factor holds the last measured
/// value constant.
fn heat_use_per_area_existing_buildings(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");
    let change_percent = ctx.var_f64("district_heating_existing_building_efficiency_change");

    let energy_use = ctx.dataset(data::DISTRICT_HEAT_ENERGY_USE)?;
    let energy_use = energy_use
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("energy_form", "district_heat");

    let raw = energy_use
        .filter_str_eq("quantity", "specific_consumption_raw")
        .year_value_map("year", "value");
    let corrected = energy_use
        .filter_str_eq("quantity", "specific_consumption_weather_corrected")
        .year_value_map("year", "value");
    let heat_use_gwh = energy_use
        .filter_str_eq("quantity", "consumption_total_gwh")
        .year_value_map("year", "value");

    let building_stock = ctx.dataset(data::BUILDING_STOCK)?;
    let net_area = building_stock
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("unit", "floor_area_m2")
        .filter_str_eq("building_use", crate::buildings::CAT_ALL_BUILDINGS)
        .year_value_map("year", "value");

    // kWh per m2, scaled by the weather correction ratio, over the years
    // every ingredient covers
    let mut factor: BTreeMap<Year, f64> = BTreeMap::new();
    for (&year, &gwh) in &heat_use_gwh {
        let (Some(&area), Some(&raw_specific), Some(&corrected_specific)) =
            (net_area.get(&year), raw.get(&year), corrected.get(&year))
        else {
            continue;
        };
        let weather_ratio = corrected_specific / raw_specific;
        factor.insert(year, gwh * 1e6 / area * weather_ratio);
    }
    if factor.is_empty() {
        return Err(ScenarioError::DataPrecondition(format!(
            "cannot derive specific heat use for municipality '{}'",
            municipality
        )));
    }

    let mut series = YearSeries::from_year_map(COL_HEAT_USE_PER_AREA, &factor);
    let last_historical = series.end_year();
    let last_value = series.value(COL_HEAT_USE_PER_AREA, last_historical);
    series.extend_to(target_year);

    let first_forecast = last_historical + 1;
    for year in first_forecast..=series.end_year() {
        let compounding =
            (1.0 + change_percent / 100.0).powi(year - first_forecast + 1);
        series.set(COL_HEAT_USE_PER_AREA, year, last_value * compounding);
    }
    Ok(series)
}

/// Specific heat use assumed for new construction, compounding from a fixed
/// present-day baseline.
fn heat_use_per_area_new_buildings(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let target_year = ctx.var_year("target_year");
    let change_percent = ctx.var_f64("district_heating_new_building_efficiency_change");

    let n_years = (target_year - NEW_BUILDING_BASE_YEAR + 1) as usize;
    let mut values = Vec::with_capacity(n_years);
    for year in NEW_BUILDING_BASE_YEAR..=target_year {
        let compounding =
            (1.0 + change_percent / 100.0).powi(year - NEW_BUILDING_BASE_YEAR + 1);
        values.push(NEW_BUILDING_HEAT_USE * compounding);
    }

    let mut series = YearSeries::new(NEW_BUILDING_BASE_YEAR, n_years);
    series.add_column(COL_HEAT_USE_PER_AREA, values);
    series.set_forecast_from(NEW_BUILDING_BASE_YEAR);
    Ok(series)
}

/// Total district heat demand: measured history continued by the
/// area-times-factor model, split between existing and new stock at the
/// last historical total.
fn heat_consumption_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");

    let area = ctx.upstream(BUILDING_FLOOR_AREA_FORECAST)?;
    let existing_factor = ctx.upstream(HEAT_USE_PER_AREA_EXISTING_BUILDINGS)?;
    let new_factor = ctx.upstream(HEAT_USE_PER_AREA_NEW_BUILDINGS)?;

    let energy_use = ctx.dataset(data::DISTRICT_HEAT_ENERGY_USE)?;
    let measured_gwh = energy_use
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("energy_form", "district_heat")
        .filter_str_eq("quantity", "consumption_total_gwh")
        .year_value_map("year", "value");

    let start_year = area.start_year();
    let end_year = area.end_year();
    let last_historical = area.last_historical_year().ok_or_else(|| {
        ScenarioError::DataPrecondition("floor-area forecast has no historical rows".to_string())
    })?;

    let n_years = (end_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    // Net area in thousand m2
    let net_area: Vec<f64> = (start_year..=end_year)
        .map(|year| total_floor_area(&area, year) / 1000.0)
        .collect();
    let last_measured_area = net_area[(last_historical - start_year) as usize];

    let mut new_area = vec![0.0; n_years];
    let mut built_per_year = vec![0.0; n_years];
    let mut new_heat_use = vec![0.0; n_years];
    let mut cumulative_new_heat = 0.0;
    for (i, year) in (start_year..=end_year).enumerate() {
        if year <= last_historical {
            continue;
        }
        new_area[i] = net_area[i] - last_measured_area;
        built_per_year[i] = new_area[i] - new_area[i - 1];
        // thousand m2 times kWh/m2 is MWh; scale to GWh
        cumulative_new_heat +=
            built_per_year[i] * new_factor.value(COL_HEAT_USE_PER_AREA, year) / 1000.0;
        new_heat_use[i] = cumulative_new_heat;
    }

    let mut existing_heat_use = Vec::with_capacity(n_years);
    for (i, year) in (start_year..=end_year).enumerate() {
        if year <= last_historical {
            existing_heat_use.push(measured_gwh.get(&year).copied().unwrap_or(f64::NAN));
        } else {
            let existing_area = net_area[i] - new_area[i];
            let modeled = existing_area
                * existing_factor.value(COL_HEAT_USE_PER_AREA, year)
                / 1000.0
                * EXISTING_HEAT_USE_CORRECTION;
            existing_heat_use.push(modeled);
        }
    }

    let total: Vec<f64> = existing_heat_use
        .iter()
        .zip(new_heat_use.iter())
        .map(|(existing, new)| existing + new)
        .collect();

    let existing_area: Vec<f64> = net_area
        .iter()
        .zip(new_area.iter())
        .map(|(net, new)| net - new)
        .collect();

    series.add_column(COL_NET_AREA, net_area);
    series.add_column(COL_NEW_BUILDING_NET_AREA, new_area);
    series.add_column(COL_EXISTING_BUILDING_NET_AREA, existing_area);
    series.add_column(COL_BUILT_PER_YEAR, built_per_year);
    series.add_column(COL_NEW_BUILDING_HEAT_USE, new_heat_use);
    series.add_column(COL_EXISTING_BUILDING_HEAT_USE, existing_heat_use);
    series.add_column(COL_TOTAL_HEAT_CONSUMPTION, total);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use approx::assert_relative_eq;

    #[test]
    fn existing_factor_holds_last_value_without_a_change_rate() {
        let session = sample_session();
        let series = session.run(HEAT_USE_PER_AREA_EXISTING_BUILDINGS).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let last_value = series.value(COL_HEAT_USE_PER_AREA, last_historical);
        for year in (last_historical + 1)..=series.end_year() {
            assert_relative_eq!(
                series.value(COL_HEAT_USE_PER_AREA, year),
                last_value,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn efficiency_change_compounds_yearly() {
        let mut session = sample_session();
        session
            .set_variable("district_heating_existing_building_efficiency_change", -2.0)
            .unwrap();
        let series = session.run(HEAT_USE_PER_AREA_EXISTING_BUILDINGS).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let last_value = series.value(COL_HEAT_USE_PER_AREA, last_historical);

        // First forecast year already carries one year of improvement
        assert_relative_eq!(
            series.value(COL_HEAT_USE_PER_AREA, last_historical + 1),
            last_value * 0.98,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            series.value(COL_HEAT_USE_PER_AREA, last_historical + 3),
            last_value * 0.98_f64.powi(3),
            epsilon = 1e-9
        );
    }

    #[test]
    fn new_building_factor_compounds_from_the_baseline() {
        let mut session = sample_session();
        session
            .set_variable("district_heating_new_building_efficiency_change", -1.0)
            .unwrap();
        let series = session.run(HEAT_USE_PER_AREA_NEW_BUILDINGS).unwrap();
        assert_relative_eq!(
            series.value(COL_HEAT_USE_PER_AREA, NEW_BUILDING_BASE_YEAR),
            NEW_BUILDING_HEAT_USE * 0.99,
            epsilon = 1e-9
        );
    }

    #[test]
    fn demand_splits_existing_and_new_stock() {
        let session = sample_session();
        let series = session.run(HEAT_CONSUMPTION_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();

        // History carries measured consumption, no new-stock contribution
        assert_eq!(series.value(COL_NEW_BUILDING_HEAT_USE, last_historical), 0.0);
        assert!(series.value(COL_TOTAL_HEAT_CONSUMPTION, last_historical) > 0.0);

        // Forecast years hold positive demand and a growing new stock
        let end = series.end_year();
        assert!(series.value(COL_NEW_BUILDING_NET_AREA, end) > 0.0);
        assert!(series.value(COL_TOTAL_HEAT_CONSUMPTION, end) > 0.0);
        assert_relative_eq!(
            series.value(COL_EXISTING_BUILDING_NET_AREA, end)
                + series.value(COL_NEW_BUILDING_NET_AREA, end),
            series.value(COL_NET_AREA, end),
            epsilon = 1e-9
        );
    }

    #[test]
    fn forecast_demand_is_continuous_at_the_seam() {
        let session = sample_session();
        let series = session.run(HEAT_CONSUMPTION_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let measured = series.value(COL_TOTAL_HEAT_CONSUMPTION, last_historical);
        let first_forecast = series.value(COL_TOTAL_HEAT_CONSUMPTION, last_historical + 1);
        // The modeled continuation stays within a few percent of the seam
        assert!((first_forecast - measured).abs() / measured < 0.10);
    }
}
