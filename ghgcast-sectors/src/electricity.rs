//! Electricity consumption and supply emission factor.
//!
//! Consumption extrapolates the per-capita trend: the most recent decade of
//! log-transformed per-capita use is regressed linearly and the fitted slope
//! carried forward, which amounts to constant-percentage yearly growth. The
//! supply emission factor is not extrapolated at all: its trajectory is
//! pinned to two external calibration points reflecting national
//! decarbonization commitments, and linearly interpolated between history
//! and the anchors.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::numerics::regression::linregress;
use ghgcast_core::series::{find_consecutive_start, Year, YearSeries};

use crate::data;
use crate::population::{ADJUSTED_POPULATION_FORECAST, COL_POPULATION};
use crate::solar::{COL_SOLAR_PRODUCTION_GWH, SOLAR_POWER_FORECAST};

pub const ELECTRICITY_EMISSION_FACTOR_FORECAST: &str = "electricity_emission_factor_forecast";
pub const ELECTRICITY_CONSUMPTION_FORECAST: &str = "electricity_consumption_forecast";
pub const ELECTRICITY_CONSUMPTION_EMISSIONS: &str = "electricity_consumption_emissions";

/// Supply emission factor, g CO2e/kWh.
pub const COL_EMISSION_FACTOR: &str = "emission_factor";
/// Consumer electricity consumption, GWh.
pub const COL_CONSUMPTION: &str = "electricity_consumption";
/// Per-capita consumption, kWh.
pub const COL_CONSUMPTION_PER_CAPITA: &str = "electricity_consumption_per_capita";
pub const COL_SOLAR_PRODUCTION: &str = "solar_production";
pub const COL_NET_CONSUMPTION: &str = "net_consumption";
/// Gross consumption emissions, kt CO2e.
pub const COL_EMISSIONS: &str = "emissions";
pub const COL_SOLAR_EMISSION_REDUCTIONS: &str = "solar_emission_reductions";
pub const COL_NET_EMISSIONS: &str = "net_emissions";

/// External calibration anchors for the supply emission factor, g CO2e/kWh.
/// These reflect published national grid decarbonization commitments; the
/// factor is pinned through them instead of being freely extrapolated.
const EMISSION_FACTOR_ANCHORS: &[(Year, f64)] = &[(2030, 70.0), (2035, 45.0)];

/// Trailing window of historical years the per-capita trend is fitted on.
const TREND_WINDOW_YEARS: Year = 10;

pub fn register_base(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: ELECTRICITY_EMISSION_FACTOR_FORECAST,
        variables: &["municipality_name", "target_year"],
        datasets: &[data::GHG_EMISSIONS],
        upstreams: &[],
        func: electricity_emission_factor_forecast,
    });
    builder.register(CalcNodeDef {
        key: ELECTRICITY_CONSUMPTION_FORECAST,
        variables: &[
            "municipality_name",
            "target_year",
            "electricity_consumption_per_capita_adjustment",
        ],
        datasets: &[data::ELECTRICITY_CONSUMPTION],
        upstreams: &[ADJUSTED_POPULATION_FORECAST],
        func: electricity_consumption_forecast,
    });
}

pub fn register_emissions(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: ELECTRICITY_CONSUMPTION_EMISSIONS,
        variables: &[],
        datasets: &[],
        upstreams: &[
            ELECTRICITY_CONSUMPTION_FORECAST,
            ELECTRICITY_EMISSION_FACTOR_FORECAST,
            SOLAR_POWER_FORECAST,
        ],
        func: electricity_consumption_emissions,
    });
}

/// Historical per-unit emission factor extended by pinning the calibration
/// anchors and interpolating linearly.
fn electricity_emission_factor_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");

    let emissions = ctx.dataset(data::GHG_EMISSIONS)?;
    let table = emissions
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("sector1", "electricity_consumption");
    if table.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no electricity emission rows for municipality '{}'",
            municipality
        )));
    }

    // Mean factor per year across the reported rows; kt/GWh scales to g/kWh
    // by a factor of 1000
    let years = table.ints("year");
    let emissions_kt = table.floats("emissions");
    let energy_gwh = table.floats("energy_consumption");
    let mut sums: std::collections::BTreeMap<Year, (f64, usize)> = Default::default();
    for i in 0..table.n_rows() {
        if energy_gwh[i] <= 0.0 {
            return Err(ScenarioError::DataPrecondition(format!(
                "electricity row for year {} reports no energy consumption",
                years[i]
            )));
        }
        let factor = emissions_kt[i] / energy_gwh[i] * 1000.0;
        let entry = sums.entry(years[i] as Year).or_insert((0.0, 0));
        entry.0 += factor;
        entry.1 += 1;
    }
    let by_year: std::collections::BTreeMap<Year, f64> = sums
        .into_iter()
        .map(|(year, (sum, count))| (year, sum / count as f64))
        .collect();

    // Skip ahead to where the history becomes gap-free
    let all_years: Vec<Year> = by_year.keys().copied().collect();
    let start_year = find_consecutive_start(&all_years);
    let consecutive: std::collections::BTreeMap<Year, f64> = by_year
        .into_iter()
        .filter(|(year, _)| *year >= start_year)
        .collect();

    let mut series = YearSeries::from_year_map(COL_EMISSION_FACTOR, &consecutive);
    let last_historical = series.end_year();
    series.extend_to(target_year);

    for &(anchor_year, anchor_value) in EMISSION_FACTOR_ANCHORS {
        if anchor_year > last_historical && anchor_year <= series.end_year() {
            series.set(COL_EMISSION_FACTOR, anchor_year, anchor_value);
        }
    }
    series.interpolate(COL_EMISSION_FACTOR);
    Ok(series)
}

/// Log-linear per-capita trend times the population forecast, with the
/// user adjustment compounding onto forecast years only.
fn electricity_consumption_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");
    let adjustment = ctx.var_f64("electricity_consumption_per_capita_adjustment");

    let consumption = ctx.dataset(data::ELECTRICITY_CONSUMPTION)?;
    let consumption_gwh = consumption
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("sector", "consumer_electricity")
        .filter_str_eq("quantity", "total_gwh")
        .year_value_map("year", "value");
    if consumption_gwh.is_empty() {
        return Err(ScenarioError::DataPrecondition(format!(
            "no electricity consumption rows for municipality '{}'",
            municipality
        )));
    }

    let population = ctx.upstream(ADJUSTED_POPULATION_FORECAST)?;

    // Per-capita kWh over the overlapping historical years
    let mut per_capita: std::collections::BTreeMap<Year, f64> = Default::default();
    for (&year, &gwh) in &consumption_gwh {
        if let Some(residents) = population.get(COL_POPULATION, year) {
            per_capita.insert(year, gwh / residents * 1e6);
        }
    }
    let last_historical = *per_capita.keys().last().unwrap();

    // Fit the most recent decade in log space
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (&year, &value) in per_capita.range((last_historical - TREND_WINDOW_YEARS)..) {
        xs.push(year as f64);
        ys.push(value.ln());
    }
    let fit = linregress(&xs, &ys);

    let last_log = per_capita[&last_historical].ln();
    let adjustment_ratio = (100.0 + adjustment) / 100.0;
    let mut compounding = adjustment_ratio;
    for year in (last_historical + 1)..=target_year {
        let step = (year - last_historical) as f64;
        let projected = (last_log + fit.slope * step).exp() * compounding;
        compounding *= adjustment_ratio;
        per_capita.insert(year, projected);
    }

    let mut series = YearSeries::from_year_map(COL_CONSUMPTION_PER_CAPITA, &per_capita);
    series.set_forecast_from(last_historical + 1);

    let n_years = series.n_years();
    let mut population_column = Vec::with_capacity(n_years);
    let mut consumption_column = Vec::with_capacity(n_years);
    for year in series.years() {
        let residents = population.get(COL_POPULATION, year).unwrap_or(f64::NAN);
        population_column.push(residents);
        if year <= last_historical {
            consumption_column.push(consumption_gwh.get(&year).copied().unwrap_or(f64::NAN));
        } else {
            consumption_column
                .push(residents * series.value(COL_CONSUMPTION_PER_CAPITA, year) / 1e6);
        }
    }
    series.add_column(COL_POPULATION, population_column);
    series.add_column(COL_CONSUMPTION, consumption_column);
    Ok(series)
}

/// Net consumption emissions: gross consumption priced at the supply
/// factor, minus the reductions from local solar production.
fn electricity_consumption_emissions(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let consumption = ctx.upstream(ELECTRICITY_CONSUMPTION_FORECAST)?;
    let emission_factor = ctx.upstream(ELECTRICITY_EMISSION_FACTOR_FORECAST)?;
    let solar = ctx.upstream(SOLAR_POWER_FORECAST)?;

    let mut series = (*consumption).clone();
    let n_years = series.n_years();

    let mut factor_column = Vec::with_capacity(n_years);
    let mut solar_column = Vec::with_capacity(n_years);
    for year in series.years() {
        factor_column.push(
            emission_factor
                .get(COL_EMISSION_FACTOR, year)
                .unwrap_or(f64::NAN),
        );
        // Only forecast-side solar output offsets the ledger
        let production = solar
            .get(COL_SOLAR_PRODUCTION_GWH, year)
            .filter(|_| solar.contains_year(year) && solar.is_forecast(year))
            .unwrap_or(0.0);
        solar_column.push(if production.is_nan() { 0.0 } else { production });
    }
    series.add_column(COL_EMISSION_FACTOR, factor_column);
    series.add_column(COL_SOLAR_PRODUCTION, solar_column);

    let mut net_consumption = Vec::with_capacity(n_years);
    let mut emissions = Vec::with_capacity(n_years);
    let mut reductions = Vec::with_capacity(n_years);
    let mut net_emissions = Vec::with_capacity(n_years);
    for year in series.years() {
        let gross = series.value(COL_CONSUMPTION, year);
        let factor = series.value(COL_EMISSION_FACTOR, year);
        let solar_production = series.value(COL_SOLAR_PRODUCTION, year);

        net_consumption.push(gross - solar_production);
        // GWh times g/kWh is tonnes; scale to kt
        let gross_emissions = gross * factor / 1000.0;
        let solar_reduction = solar_production * factor / 1000.0;
        emissions.push(gross_emissions);
        reductions.push(solar_reduction);
        net_emissions.push(gross_emissions - solar_reduction);
    }
    series.add_column(COL_NET_CONSUMPTION, net_consumption);
    series.add_column(COL_EMISSIONS, emissions);
    series.add_column(COL_SOLAR_EMISSION_REDUCTIONS, reductions);
    series.add_column(COL_NET_EMISSIONS, net_emissions);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use approx::assert_relative_eq;

    #[test]
    fn emission_factor_passes_through_the_anchors() {
        let session = sample_session();
        let series = session.run(ELECTRICITY_EMISSION_FACTOR_FORECAST).unwrap();
        assert_relative_eq!(series.value(COL_EMISSION_FACTOR, 2030), 70.0);
        assert_relative_eq!(series.value(COL_EMISSION_FACTOR, 2035), 45.0);

        // Monotonic linear interpolation between the anchors
        let mid = series.value(COL_EMISSION_FACTOR, 2032);
        assert_relative_eq!(mid, 70.0 + (45.0 - 70.0) * 2.0 / 5.0, epsilon = 1e-9);
    }

    #[test]
    fn emission_factor_interpolates_from_the_seam() {
        let session = sample_session();
        let series = session.run(ELECTRICITY_EMISSION_FACTOR_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let seam_value = series.value(COL_EMISSION_FACTOR, last_historical);
        // The factor declines monotonically from the seam to the 2030 anchor
        let mut previous = seam_value;
        for year in (last_historical + 1)..=2030 {
            let value = series.value(COL_EMISSION_FACTOR, year);
            assert!(value <= previous, "factor rose in {}", year);
            previous = value;
        }
    }

    #[test]
    fn consumption_trend_continues_per_capita_history() {
        let session = sample_session();
        let series = session.run(ELECTRICITY_CONSUMPTION_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let end = series.end_year();
        assert_eq!(end, 2035);
        assert!(series.value(COL_CONSUMPTION, end) > 0.0);
        assert!(series.value(COL_CONSUMPTION_PER_CAPITA, last_historical) > 0.0);
    }

    #[test]
    fn per_capita_adjustment_compounds_on_forecast_years() {
        let mut session = sample_session();
        let baseline = session.run(ELECTRICITY_CONSUMPTION_FORECAST).unwrap();

        session
            .set_variable("electricity_consumption_per_capita_adjustment", 1.0)
            .unwrap();
        let adjusted = session.run(ELECTRICITY_CONSUMPTION_FORECAST).unwrap();

        let last_historical = baseline.last_historical_year().unwrap();
        // Historical rows unchanged
        assert_relative_eq!(
            adjusted.value(COL_CONSUMPTION_PER_CAPITA, last_historical),
            baseline.value(COL_CONSUMPTION_PER_CAPITA, last_historical),
            epsilon = 1e-9
        );
        // First forecast year scaled once, k-th year scaled k times
        for k in [1, 3] {
            let year = last_historical + k;
            assert_relative_eq!(
                adjusted.value(COL_CONSUMPTION_PER_CAPITA, year),
                baseline.value(COL_CONSUMPTION_PER_CAPITA, year) * 1.01_f64.powi(k),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn net_emissions_subtract_solar_reductions() {
        let session = sample_session();
        let series = session.run(ELECTRICITY_CONSUMPTION_EMISSIONS).unwrap();
        let end = series.end_year();
        assert_relative_eq!(
            series.value(COL_NET_EMISSIONS, end),
            series.value(COL_EMISSIONS, end) - series.value(COL_SOLAR_EMISSION_REDUCTIONS, end),
            epsilon = 1e-9
        );
        assert!(series.value(COL_SOLAR_PRODUCTION, end) > 0.0);
        assert!(
            series.value(COL_NET_CONSUMPTION, end) < series.value(COL_CONSUMPTION, end)
        );
    }
}
