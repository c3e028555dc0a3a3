//! Geothermal heat production.
//!
//! Two substitution channels eat into district heat. Existing stock: every
//! year a configured percentage of the floor area still connected to
//! district heat converts to geothermal, an exponential decay of the
//! remaining connected area. New stock: a share of each year's net new
//! floor area installs geothermal from construction. Converted area heats
//! itself with the district-heating specific-use factors; the heat pumps
//! consume electricity at the configured COP, and the net emission effect
//! is grid emissions minus the avoided district heat purchase priced at the
//! prevailing district heat emission factor.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::numerics::polyfit::{polyfit, polyval};
use ghgcast_core::series::YearSeries;

use crate::buildings::{total_floor_area, BUILDING_FLOOR_AREA_FORECAST};
use crate::district_heating::consumption::{
    COL_HEAT_USE_PER_AREA, HEAT_USE_PER_AREA_EXISTING_BUILDINGS, HEAT_USE_PER_AREA_NEW_BUILDINGS,
};
use crate::district_heating::production::{
    COL_EMISSION_FACTOR as COL_DH_EMISSION_FACTOR, DISTRICT_HEATING_EMISSIONS,
};
use crate::electricity::{
    COL_EMISSION_FACTOR as COL_ELECTRICITY_EF, ELECTRICITY_EMISSION_FACTOR_FORECAST,
};

pub const GEOTHERMAL_PRODUCTION_FORECAST: &str = "geothermal_production_forecast";

/// Converted existing-stock floor area, m2.
pub const COL_AREA_EXISTING: &str = "geo_building_net_area_existing";
/// Geothermal-heated new-stock floor area, m2.
pub const COL_AREA_NEW: &str = "geo_building_net_area_new";
/// Heat produced, GWh.
pub const COL_ENERGY_EXISTING: &str = "geo_energy_existing";
pub const COL_ENERGY_NEW: &str = "geo_energy_new";
pub const COL_ENERGY_TOTAL: &str = "geo_energy_production";
/// Heat pump electricity consumption, GWh.
pub const COL_ELECTRICITY_USE: &str = "electricity_use";
/// Grid emissions from the heat pumps, kt.
pub const COL_EMISSIONS: &str = "emissions";
/// Avoided district heat emissions, kt.
pub const COL_EMISSION_REDUCTIONS: &str = "emission_reductions";
pub const COL_NET_EMISSIONS: &str = "net_emissions";
/// Cumulative borehole count.
pub const COL_BOREHOLES: &str = "boreholes";
pub const COL_BOREHOLES_PER_YEAR: &str = "boreholes_per_year";
/// Land area needed for the borehole field, km2.
pub const COL_BOREHOLE_AREA: &str = "borehole_area_needed";

/// Share of the building stock heated with district heat today.
const DISTRICT_HEAT_CONNECTED_SHARE: f64 = 0.85;

/// Boreholes are assumed to sit on a square grid with this spacing, m.
const BOREHOLE_GRID_SPACING_M: f64 = 25.0;

/// Yearly heat yield per borehole by depth: (depth m, kWh/a) calibration
/// pairs. The engine interpolates this table with a degree-5 polynomial
/// fit; the table values anchor every borehole-count and land-area
/// estimate, so they must not drift.
const BOREHOLE_YIELD_BY_DEPTH: &[(f64, f64)] = &[
    (100.0, 10_480.0),
    (150.0, 16_360.0),
    (200.0, 22_656.0),
    (250.0, 29_375.0),
    (300.0, 36_515.0),
    (350.0, 44_080.0),
    (400.0, 52_065.0),
    (450.0, 60_470.0),
    (500.0, 69_300.0),
];

const YIELD_FIT_DEGREE: usize = 5;

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: GEOTHERMAL_PRODUCTION_FORECAST,
        variables: &[
            "target_year",
            "geothermal_heat_pump_cop",
            "geothermal_existing_building_renovation",
            "geothermal_new_building_installation_share",
            "geothermal_borehole_depth",
        ],
        datasets: &[],
        upstreams: &[
            BUILDING_FLOOR_AREA_FORECAST,
            HEAT_USE_PER_AREA_EXISTING_BUILDINGS,
            HEAT_USE_PER_AREA_NEW_BUILDINGS,
            DISTRICT_HEATING_EMISSIONS,
            ELECTRICITY_EMISSION_FACTOR_FORECAST,
        ],
        func: geothermal_production_forecast,
    });
}

/// Yearly heat yield of one borehole at the given depth, kWh/a.
pub fn borehole_yearly_yield(depth_m: f64) -> f64 {
    let (depths, yields): (Vec<f64>, Vec<f64>) =
        BOREHOLE_YIELD_BY_DEPTH.iter().copied().unzip();
    assert!(
        depth_m >= depths[0] && depth_m <= depths[depths.len() - 1],
        "borehole depth {} m outside the calibrated range {}..{} m",
        depth_m,
        depths[0],
        depths[depths.len() - 1]
    );
    let coefficients = polyfit(&depths, &yields, YIELD_FIT_DEGREE);
    polyval(&coefficients, depth_m)
}

fn geothermal_production_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let target_year = ctx.var_year("target_year");
    let cop = ctx.var_f64("geothermal_heat_pump_cop");
    let renovation_percent = ctx.var_f64("geothermal_existing_building_renovation");
    let new_share_percent = ctx.var_f64("geothermal_new_building_installation_share");
    let borehole_depth = ctx.var_i64("geothermal_borehole_depth") as f64;

    let buildings = ctx.upstream(BUILDING_FLOOR_AREA_FORECAST)?;
    let existing_factor = ctx.upstream(HEAT_USE_PER_AREA_EXISTING_BUILDINGS)?;
    let new_factor = ctx.upstream(HEAT_USE_PER_AREA_NEW_BUILDINGS)?;
    let district_heating = ctx.upstream(DISTRICT_HEATING_EMISSIONS)?;
    let electricity_ef = ctx.upstream(ELECTRICITY_EMISSION_FACTOR_FORECAST)?;

    let last_historical = buildings.last_historical_year().ok_or_else(|| {
        ScenarioError::DataPrecondition("floor-area forecast has no historical rows".to_string())
    })?;

    // Seam row included with zeros so charts can anchor the dashed segment
    let start_year = last_historical;
    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    let district_heat_area = total_floor_area(&buildings, last_historical) * DISTRICT_HEAT_CONNECTED_SHARE;
    let yield_kwh = borehole_yearly_yield(borehole_depth);

    let mut area_existing = vec![0.0; n_years];
    let mut area_new = vec![0.0; n_years];
    let mut energy_existing = vec![0.0; n_years];
    let mut energy_new = vec![0.0; n_years];
    let mut energy_total = vec![0.0; n_years];
    let mut electricity_use = vec![0.0; n_years];
    let mut emissions = vec![0.0; n_years];
    let mut reductions = vec![0.0; n_years];
    let mut net_emissions = vec![0.0; n_years];
    let mut boreholes = vec![0.0; n_years];
    let mut borehole_area = vec![0.0; n_years];

    let mut remaining = district_heat_area;
    let mut cumulative_new_area = 0.0;
    let mut cumulative_new_energy_gwh = 0.0;

    for (i, year) in (start_year..=target_year).enumerate() {
        if year == start_year {
            continue;
        }
        // Existing stock: exponential decay of the remaining connected area
        remaining *= 1.0 - renovation_percent / 100.0;
        area_existing[i] = district_heat_area - remaining;
        energy_existing[i] =
            area_existing[i] * existing_factor.value(COL_HEAT_USE_PER_AREA, year) / 1e6;

        // New stock: a share of the year's construction is geothermal
        let built =
            total_floor_area(&buildings, year) - total_floor_area(&buildings, year - 1);
        let geo_built = built.max(0.0) * new_share_percent / 100.0;
        cumulative_new_area += geo_built;
        area_new[i] = cumulative_new_area;
        cumulative_new_energy_gwh +=
            geo_built * new_factor.value(COL_HEAT_USE_PER_AREA, year) / 1e6;
        energy_new[i] = cumulative_new_energy_gwh;

        energy_total[i] = energy_existing[i] + energy_new[i];
        electricity_use[i] = energy_total[i] / cop;

        // GWh times g/kWh is tonnes; scale to kt
        let grid_factor = electricity_ef
            .get(COL_ELECTRICITY_EF, year)
            .filter(|v| !v.is_nan())
            .unwrap_or(0.0);
        emissions[i] = electricity_use[i] * grid_factor / 1000.0;

        let dh_factor = district_heating
            .get(COL_DH_EMISSION_FACTOR, year)
            .filter(|v| !v.is_nan())
            .unwrap_or(0.0);
        reductions[i] = energy_total[i] * dh_factor / 1000.0;
        net_emissions[i] = emissions[i] - reductions[i];

        boreholes[i] = energy_total[i] * 1e6 / yield_kwh;
        borehole_area[i] = boreholes[i] * BOREHOLE_GRID_SPACING_M * BOREHOLE_GRID_SPACING_M / 1e6;
    }

    let mut boreholes_per_year = vec![0.0; n_years];
    for i in 1..n_years {
        boreholes_per_year[i] = boreholes[i] - boreholes[i - 1];
    }

    series.add_column(COL_AREA_EXISTING, area_existing);
    series.add_column(COL_AREA_NEW, area_new);
    series.add_column(COL_ENERGY_EXISTING, energy_existing);
    series.add_column(COL_ENERGY_NEW, energy_new);
    series.add_column(COL_ENERGY_TOTAL, energy_total);
    series.add_column(COL_ELECTRICITY_USE, electricity_use);
    series.add_column(COL_EMISSIONS, emissions);
    series.add_column(COL_EMISSION_REDUCTIONS, reductions);
    series.add_column(COL_NET_EMISSIONS, net_emissions);
    series.add_column(COL_BOREHOLES, boreholes);
    series.add_column(COL_BOREHOLES_PER_YEAR, boreholes_per_year);
    series.add_column(COL_BOREHOLE_AREA, borehole_area);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use approx::assert_relative_eq;

    #[test]
    fn yield_fit_passes_through_the_calibration_table() {
        for &(depth, expected) in BOREHOLE_YIELD_BY_DEPTH {
            let fitted = borehole_yearly_yield(depth);
            assert!(
                (fitted - expected).abs() / expected < 0.01,
                "yield at {} m drifted: {} vs {}",
                depth,
                fitted,
                expected
            );
        }
        // Deeper boreholes always yield more
        assert!(borehole_yearly_yield(480.0) > borehole_yearly_yield(220.0));
    }

    #[test]
    #[should_panic(expected = "outside the calibrated range")]
    fn out_of_range_depth_panics() {
        borehole_yearly_yield(750.0);
    }

    #[test]
    fn conversion_follows_the_renovation_rate() {
        let mut session = sample_session();
        session
            .set_variable("geothermal_existing_building_renovation", 2.0)
            .unwrap();
        let series = session.run(GEOTHERMAL_PRODUCTION_FORECAST).unwrap();
        let buildings = session.run(BUILDING_FLOOR_AREA_FORECAST).unwrap();

        let last_historical = series.last_historical_year().unwrap();
        let connected =
            total_floor_area(&buildings, last_historical) * DISTRICT_HEAT_CONNECTED_SHARE;
        // After one year exactly 2 % of the connected area has converted
        assert_relative_eq!(
            series.value(COL_AREA_EXISTING, last_historical + 1),
            connected * 0.02,
            epsilon = 1e-6
        );
        // Cumulative conversion keeps growing but never exceeds the stock
        let end = series.end_year();
        assert!(series.value(COL_AREA_EXISTING, end) > series.value(COL_AREA_EXISTING, end - 1));
        assert!(series.value(COL_AREA_EXISTING, end) < connected);
    }

    #[test]
    fn electricity_follows_the_cop() {
        let session = sample_session();
        let series = session.run(GEOTHERMAL_PRODUCTION_FORECAST).unwrap();
        let end = series.end_year();
        assert_relative_eq!(
            series.value(COL_ELECTRICITY_USE, end),
            series.value(COL_ENERGY_TOTAL, end) / 3.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn displacing_district_heat_reduces_net_emissions() {
        let session = sample_session();
        let series = session.run(GEOTHERMAL_PRODUCTION_FORECAST).unwrap();
        let end = series.end_year();
        // Geothermal electricity is cleaner than the district heat it
        // displaces, so the net effect is negative
        assert!(series.value(COL_NET_EMISSIONS, end) < 0.0);
        assert!(series.value(COL_EMISSION_REDUCTIONS, end) > 0.0);
    }

    #[test]
    fn borehole_field_grows_on_the_grid() {
        let session = sample_session();
        let series = session.run(GEOTHERMAL_PRODUCTION_FORECAST).unwrap();
        let end = series.end_year();
        let boreholes = series.value(COL_BOREHOLES, end);
        assert!(boreholes > 0.0);
        assert_relative_eq!(
            series.value(COL_BOREHOLE_AREA, end),
            boreholes * 625.0 / 1e6,
            epsilon = 1e-9
        );
        assert!(series.value(COL_BOREHOLES_PER_YEAR, end) > 0.0);
    }
}
