//! Solar power production.
//!
//! Two independent linear ramps. Existing buildings: the short measured
//! capacity series interpolates toward the municipality's technical rooftop
//! potential scaled by an adoption lever. New buildings: a share of each
//! year's net new floor area brings PV with it, accumulating year over
//! year. Yearly installation rates are split between the reporting
//! organization's stock and everyone else's, which is what turns the curve
//! into a concrete buildout obligation.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::series::{Year, YearSeries};
use indexmap::IndexMap;

use crate::buildings::BUILDING_FLOOR_AREA_FORECAST;
use crate::data;

pub const SOLAR_POWER_FORECAST: &str = "solar_power_forecast";

/// Installed capacity on existing buildings, MWp.
pub const COL_SOLAR_POWER_EXISTING: &str = "solar_power_existing";
/// Installed capacity accrued with new construction, MWp.
pub const COL_SOLAR_POWER_NEW: &str = "solar_power_new";
/// Total installed capacity, MWp.
pub const COL_SOLAR_POWER_ALL: &str = "solar_power_all";
/// Yearly energy production, GWh.
pub const COL_SOLAR_PRODUCTION_GWH: &str = "solar_production";
/// Capacity installed during the year, MWp.
pub const COL_INSTALLED_PER_YEAR: &str = "installed_per_year";
pub const COL_INSTALLED_PER_YEAR_ORG: &str = "installed_per_year_org";
pub const COL_INSTALLED_PER_YEAR_OTHERS: &str = "installed_per_year_others";

/// Measured installed capacity on existing buildings, MWp.
const MEASURED_CAPACITY_MWP: &[(Year, f64)] = &[
    (2012, 0.221),
    (2013, 0.296),
    (2014, 0.371),
    (2015, 0.851),
    (2016, 2.343),
    (2017, 3.724),
    (2018, 5.108),
];

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: SOLAR_POWER_FORECAST,
        variables: &[
            "municipality_name",
            "target_year",
            "solar_power_existing_buildings_percentage",
            "solar_power_new_buildings_percentage",
            "yearly_pv_energy_production_kwh_wp",
            "building_area_owned_by_org",
        ],
        datasets: &[data::SOLAR_POWER_POTENTIAL],
        upstreams: &[BUILDING_FLOOR_AREA_FORECAST],
        func: solar_power_forecast,
    });
}

/// Map a floor-area forecast category onto the nearest category present in
/// the potential data.
fn potential_category<'a>(
    category: &'a str,
    potentials: &IndexMap<String, (f64, f64)>,
) -> &'a str {
    if potentials.contains_key(category) {
        return category;
    }
    match category {
        // Row houses resemble detached houses in roof-to-floor-area terms
        "row_houses" => "detached_houses",
        _ => "other_buildings",
    }
}

fn solar_power_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");
    let existing_percentage = ctx.var_f64("solar_power_existing_buildings_percentage");
    let new_percentage = ctx.var_f64("solar_power_new_buildings_percentage");
    let kwh_per_wp = ctx.var_f64("yearly_pv_energy_production_kwh_wp");
    let org_share = ctx.var_f64("building_area_owned_by_org") / 100.0;

    let potential_table = ctx
        .dataset(data::SOLAR_POWER_POTENTIAL)?
        .filter_str_eq("municipality", &municipality);
    if potential_table.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no solar potential rows for municipality '{}'",
            municipality
        )));
    }

    // category -> (yearly energy kWh, kWh per floor m2)
    let mut potentials: IndexMap<String, (f64, f64)> = IndexMap::new();
    for i in 0..potential_table.n_rows() {
        let category = potential_table.strs("building_use")[i].clone();
        let energy = potential_table.floats("yearly_energy_kwh")[i];
        let area = potential_table.floats("floor_area_m2")[i];
        if area <= 0.0 {
            return Err(ScenarioError::DataPrecondition(format!(
                "solar potential category '{}' reports no floor area",
                category
            )));
        }
        potentials.insert(category, (energy, energy / area));
    }
    if !potentials.contains_key("other_buildings") {
        return Err(ScenarioError::DataPrecondition(
            "solar potential data lacks the 'other_buildings' fallback category".to_string(),
        ));
    }

    // Maximum technical potential in MWp, scaled by the adoption lever
    let total_energy: f64 = potentials.values().map(|(energy, _)| energy).sum();
    let max_potential_mwp = total_energy / kwh_per_wp / 1e6 * existing_percentage / 100.0;

    let start_year = MEASURED_CAPACITY_MWP[0].0;
    let last_historical = MEASURED_CAPACITY_MWP[MEASURED_CAPACITY_MWP.len() - 1].0;
    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    // Existing buildings: interpolate the measured series toward the
    // scaled potential at the target year
    let mut existing = vec![f64::NAN; n_years];
    for &(year, capacity) in MEASURED_CAPACITY_MWP {
        existing[(year - start_year) as usize] = capacity;
    }
    existing[n_years - 1] = max_potential_mwp;
    series.add_column(COL_SOLAR_POWER_EXISTING, existing);
    series.interpolate(COL_SOLAR_POWER_EXISTING);

    // New buildings: each year's net new floor area contributes capacity
    // through its category's yield density
    let buildings = ctx.upstream(BUILDING_FLOOR_AREA_FORECAST)?;
    let categories: Vec<String> = buildings.column_names().map(str::to_string).collect();
    let mut new_capacity = vec![0.0; n_years];
    let mut cumulative = 0.0;
    for year in (last_historical + 1)..=target_year {
        let mut added_mwp = 0.0;
        for category in &categories {
            let current = buildings.get(category, year).unwrap_or(f64::NAN);
            let previous = buildings.get(category, year - 1).unwrap_or(f64::NAN);
            if current.is_nan() || previous.is_nan() {
                continue;
            }
            let lookup = potential_category(category, &potentials);
            let (_, kwh_per_m2) = potentials
                .get(lookup)
                .or_else(|| potentials.get("other_buildings"))
                .unwrap();
            added_mwp += (current - previous) * kwh_per_m2 / kwh_per_wp / 1e6;
        }
        cumulative += added_mwp * new_percentage / 100.0;
        new_capacity[(year - start_year) as usize] = cumulative;
    }
    series.add_column(COL_SOLAR_POWER_NEW, new_capacity);

    let totals: Vec<f64> = series
        .column(COL_SOLAR_POWER_EXISTING)
        .iter()
        .zip(series.column(COL_SOLAR_POWER_NEW).iter())
        .map(|(existing, new)| existing + new)
        .collect();
    series.add_column(COL_SOLAR_POWER_ALL, totals);

    // Yearly production and installation rates
    let production: Vec<f64> = series
        .column(COL_SOLAR_POWER_ALL)
        .iter()
        .map(|mwp| mwp * kwh_per_wp)
        .collect();
    series.add_column(COL_SOLAR_PRODUCTION_GWH, production);

    let installed = series.diff(COL_SOLAR_POWER_ALL).to_vec();
    let org: Vec<f64> = installed.iter().map(|mwp| mwp * org_share).collect();
    let others: Vec<f64> = installed.iter().map(|mwp| mwp * (1.0 - org_share)).collect();
    series.add_column(COL_INSTALLED_PER_YEAR, installed);
    series.add_column(COL_INSTALLED_PER_YEAR_ORG, org);
    series.add_column(COL_INSTALLED_PER_YEAR_OTHERS, others);
    Ok(series)
}
