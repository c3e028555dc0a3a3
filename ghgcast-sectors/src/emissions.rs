//! The emissions ledger.
//!
//! Merges every sector forecast into one year-indexed table with a column
//! per leaf sector. Historical values come from the government emission
//! statistics reclassified into the sector taxonomy. Sectors without a
//! bottom-up model are pinned to two external interim targets and linearly
//! interpolated; sectors with one (district heat, consumer electricity,
//! transportation, geothermal) overwrite the interpolated placeholder with
//! their modeled values for every year after the seam.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::numerics::decompose::attribute_reduction;
use ghgcast_core::series::{Year, YearSeries};
use log::debug;
use std::collections::BTreeMap;

use crate::cars::{self, CARS_EMISSIONS_FORECAST};
use crate::data;
use crate::district_heating::production::{self as dh, DISTRICT_HEATING_EMISSIONS};
use crate::electricity::{self, ELECTRICITY_CONSUMPTION_EMISSIONS};
use crate::geothermal::{self, GEOTHERMAL_PRODUCTION_FORECAST};
use crate::sectors::{find_sector, leaf_sectors};

pub const EMISSIONS_FORECAST: &str = "emissions_forecast";
pub const REDUCTION_ATTRIBUTION: &str = "reduction_attribution";
pub const REDUCTION_REQUIREMENT: &str = "reduction_requirement";

/// Ledger total across all leaf sectors, kt CO2e.
pub const COL_TOTAL: &str = "total";
pub const COL_FORECAST_EMISSIONS: &str = "forecast_emissions";
/// Linear reduction path from the reference year to the required level.
pub const COL_REQUIRED_EMISSIONS: &str = "required_emissions";

/// Externally adopted interim emission targets per leaf sector, kt CO2e:
/// (sector key, 2030 level, 2035 level).
const INTERIM_TARGETS: &[(&str, f64, f64)] = &[
    ("district_heat", 754.6, 250.7),
    ("oil_heating", 16.2, 0.0),
    ("electricity_heating", 51.1, 29.7),
    ("geothermal_heating", 0.0, 0.0),
    ("electricity_consumption", 242.7, 151.0),
    ("transportation", 262.6, 229.7),
    ("industry", 3.2, 2.6),
    ("waste", 60.6, 50.6),
    ("agriculture", 0.6, 0.6),
];

const INTERIM_TARGET_YEARS: (Year, Year) = (2030, 2035);

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: EMISSIONS_FORECAST,
        variables: &["municipality_name", "target_year"],
        datasets: &[data::GHG_EMISSIONS],
        upstreams: &[
            DISTRICT_HEATING_EMISSIONS,
            ELECTRICITY_CONSUMPTION_EMISSIONS,
            CARS_EMISSIONS_FORECAST,
            GEOTHERMAL_PRODUCTION_FORECAST,
        ],
        func: emissions_forecast,
    });
    builder.register(CalcNodeDef {
        key: REDUCTION_ATTRIBUTION,
        variables: &[],
        datasets: &[],
        upstreams: &[
            DISTRICT_HEATING_EMISSIONS,
            ELECTRICITY_CONSUMPTION_EMISSIONS,
            CARS_EMISSIONS_FORECAST,
        ],
        func: reduction_attribution,
    });
    builder.register(CalcNodeDef {
        key: REDUCTION_REQUIREMENT,
        variables: &[
            "ghg_reductions_reference_year",
            "ghg_reductions_percentage_in_target_year",
            "target_year",
        ],
        datasets: &[],
        upstreams: &[EMISSIONS_FORECAST],
        func: reduction_requirement,
    });
}

fn emissions_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");

    let statistics = ctx
        .dataset(data::GHG_EMISSIONS)?
        .filter_str_eq("municipality", &municipality);
    if statistics.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no emission statistics for municipality '{}'",
            municipality
        )));
    }

    // Reclassify the statistics into the sector taxonomy: main sectors read
    // from sector1, heating subsectors from sector2
    let mut history: Vec<(&'static str, BTreeMap<Year, f64>)> = Vec::new();
    for leaf in leaf_sectors() {
        let (_, subsector) = find_sector(leaf.key).unwrap();
        let rows = if subsector.is_some() {
            statistics.filter_str_eq("sector2", leaf.key)
        } else {
            statistics.filter_str_eq("sector1", leaf.key)
        };
        let by_year = rows.year_value_map("year", "emissions");
        if by_year.is_empty() {
            return Err(ScenarioError::DataPrecondition(format!(
                "emission statistics lack sector '{}'",
                leaf.key
            )));
        }
        history.push((leaf.key, by_year));
    }

    // The ledger spans the years every sector reports
    let start_year = history
        .iter()
        .map(|(_, m)| *m.keys().next().unwrap())
        .max()
        .unwrap();
    let last_historical = history
        .iter()
        .map(|(_, m)| *m.keys().last().unwrap())
        .min()
        .unwrap();

    debug!(
        "emission ledger spans {}..={}, seam at {}",
        start_year, target_year, last_historical
    );
    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    for (key, by_year) in &history {
        let values: Vec<f64> = (start_year..=target_year)
            .map(|year| by_year.get(&year).copied().unwrap_or(f64::NAN))
            .collect();
        series.add_column(key, values);
    }

    // Pin the interim targets and interpolate toward them
    let (first_anchor, second_anchor) = INTERIM_TARGET_YEARS;
    for &(key, at_first, at_second) in INTERIM_TARGETS {
        for (anchor_year, level) in [(first_anchor, at_first), (second_anchor, at_second)] {
            if anchor_year > last_historical && anchor_year <= series.end_year() {
                series.set(key, anchor_year, level);
            }
        }
        series.interpolate(key);
    }

    // Bottom-up sector models overwrite the interpolated placeholder
    let district_heating = ctx.upstream(DISTRICT_HEATING_EMISSIONS)?;
    let electricity = ctx.upstream(ELECTRICITY_CONSUMPTION_EMISSIONS)?;
    let cars = ctx.upstream(CARS_EMISSIONS_FORECAST)?;
    let geothermal = ctx.upstream(GEOTHERMAL_PRODUCTION_FORECAST)?;
    let overwrites: [(&str, &YearSeries, &str); 4] = [
        ("district_heat", &district_heating, dh::COL_CONSUMPTION_EMISSIONS),
        (
            "electricity_consumption",
            &electricity,
            electricity::COL_NET_EMISSIONS,
        ),
        ("transportation", &cars, cars::COL_EMISSIONS),
        ("geothermal_heating", &geothermal, geothermal::COL_NET_EMISSIONS),
    ];
    for (key, model, column) in overwrites {
        for year in (last_historical + 1)..=series.end_year() {
            if let Some(value) = model.get(column, year).filter(|v| !v.is_nan()) {
                series.set(key, year, value);
            }
        }
    }

    let leaf_keys: Vec<&'static str> = leaf_sectors().iter().map(|s| s.key).collect();
    let totals: Vec<f64> = series
        .years()
        .map(|year| series.row_sum(&leaf_keys, year))
        .collect();
    series.add_column(COL_TOTAL, totals);
    Ok(series)
}

/// Decompose each modeled sector's emission drop between the seam and every
/// forecast year into its activity-caused and intensity-caused parts.
///
/// All reduction columns are expressed in kt CO2e; shares are fractions of
/// the sector's actual reduction and sum to one.
fn reduction_attribution(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let district_heating = ctx.upstream(DISTRICT_HEATING_EMISSIONS)?;
    let electricity = ctx.upstream(ELECTRICITY_CONSUMPTION_EMISSIONS)?;
    let cars = ctx.upstream(CARS_EMISSIONS_FORECAST)?;

    // (sector, series, activity column, intensity column, product-to-kt)
    let specs: [(&str, &YearSeries, &str, &str, f64); 3] = [
        (
            "district_heat",
            &district_heating,
            dh::COL_HEAT_DEMAND,
            dh::COL_EMISSION_FACTOR,
            // GWh times g/kWh is tonnes
            1e-3,
        ),
        (
            "electricity_consumption",
            &electricity,
            electricity::COL_NET_CONSUMPTION,
            electricity::COL_EMISSION_FACTOR,
            1e-3,
        ),
        (
            "transportation",
            &cars,
            cars::COL_MILEAGE,
            cars::COL_EMISSION_FACTOR,
            // km times g/km is grams
            1e-9,
        ),
    ];

    let start_year = specs
        .iter()
        .map(|(_, series, ..)| series.first_forecast_year().unwrap_or(series.end_year()))
        .min()
        .unwrap();
    let end_year = specs.iter().map(|(_, series, ..)| series.end_year()).max().unwrap();

    let n_years = (end_year - start_year + 1) as usize;
    let mut out = YearSeries::new(start_year, n_years);
    out.set_forecast_from(start_year);

    for (sector, series, activity_col, intensity_col, to_kt) in specs {
        let reference_year = series.last_historical_year().ok_or_else(|| {
            ScenarioError::DataPrecondition(format!(
                "sector '{}' has no historical rows to anchor the attribution",
                sector
            ))
        })?;
        let reference_activity = series.value(activity_col, reference_year);
        let reference_intensity = series.value(intensity_col, reference_year);

        let mut activity_share = vec![f64::NAN; n_years];
        let mut intensity_share = vec![f64::NAN; n_years];
        let mut activity_reduction = vec![f64::NAN; n_years];
        let mut intensity_reduction = vec![f64::NAN; n_years];
        let mut total_reduction = vec![f64::NAN; n_years];

        for year in (reference_year + 1)..=series.end_year() {
            let (Some(activity), Some(intensity)) = (
                series.get(activity_col, year).filter(|v| !v.is_nan()),
                series.get(intensity_col, year).filter(|v| !v.is_nan()),
            ) else {
                continue;
            };
            let attribution = attribute_reduction(
                reference_activity,
                reference_intensity,
                activity,
                intensity,
            );
            let i = (year - start_year) as usize;
            activity_share[i] = attribution.activity_share;
            intensity_share[i] = attribution.intensity_share;
            activity_reduction[i] = attribution.activity_reduction * to_kt;
            intensity_reduction[i] = attribution.intensity_reduction * to_kt;
            total_reduction[i] = attribution.total_reduction * to_kt;
        }

        out.add_column(&format!("{}_activity_share", sector), activity_share);
        out.add_column(&format!("{}_intensity_share", sector), intensity_share);
        out.add_column(&format!("{}_activity_reduction", sector), activity_reduction);
        out.add_column(
            &format!("{}_intensity_reduction", sector),
            intensity_reduction,
        );
        out.add_column(&format!("{}_total_reduction", sector), total_reduction);
    }
    Ok(out)
}

/// The reduction requirement: a linear path from the reference-year total
/// to the required target-year level, alongside the forecast total.
fn reduction_requirement(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let reference_year = ctx.var_year("ghg_reductions_reference_year");
    let reduction_percent = ctx.var_f64("ghg_reductions_percentage_in_target_year");
    let target_year = ctx.var_year("target_year");

    let forecast = ctx.upstream(EMISSIONS_FORECAST)?;
    let reference_total = forecast.get(COL_TOTAL, reference_year).ok_or_else(|| {
        ScenarioError::DataPrecondition(format!(
            "emission ledger does not cover the reference year {}",
            reference_year
        ))
    })?;
    let required_level = reference_total * (1.0 - reduction_percent / 100.0);

    let mut series = YearSeries::new(forecast.start_year(), forecast.n_years());
    series.set_forecast_from(forecast.first_forecast_year().unwrap_or(target_year));
    series.add_column(COL_FORECAST_EMISSIONS, forecast.column(COL_TOTAL).to_vec());

    let mut required = vec![f64::NAN; forecast.n_years()];
    let span = (target_year - reference_year) as f64;
    for year in reference_year..=target_year {
        let t = (year - reference_year) as f64 / span;
        required[(year - forecast.start_year()) as usize] =
            reference_total + (required_level - reference_total) * t;
    }
    series.add_column(COL_REQUIRED_EMISSIONS, required);
    Ok(series)
}
