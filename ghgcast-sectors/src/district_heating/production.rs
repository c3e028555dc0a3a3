//! District heat production and unit emissions.
//!
//! Starting from the operator's production statistics, the forecast
//! interpolates the network loss ratio and the heat-pump share toward the
//! configured target-year mix, apportions the remaining fuel energy across
//! fuel types, and prices everything into a unit emission factor (g/kWh).
//!
//! CHP plants burn one fuel stream for both heat and electricity; the share
//! of fuel attributable to heat follows the efficiency method with fixed
//! reference efficiencies for separate heat-only (0.90) and power-only
//! (0.39) production. Heat produced with heat pumps is priced through its
//! electricity consumption at the prevailing grid emission factor.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::numerics::regression::linregress;
use ghgcast_core::series::{Year, YearSeries};
use indexmap::IndexMap;
use is_close::is_close;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data;
use crate::district_heating::consumption::{
    COL_TOTAL_HEAT_CONSUMPTION, HEAT_CONSUMPTION_FORECAST,
};
use crate::electricity::{
    COL_EMISSION_FACTOR as COL_ELECTRICITY_EF, ELECTRICITY_EMISSION_FACTOR_FORECAST,
};

pub const DISTRICT_HEATING_EMISSIONS: &str = "district_heating_emissions";

pub const COL_HEAT_DEMAND: &str = "heat_demand";
pub const COL_HEAT_PUMP_PRODUCTION: &str = "heat_pump_production";
pub const COL_NETWORK_LOSSES: &str = "network_losses";
pub const COL_TOTAL_PRODUCTION: &str = "total_production";
pub const COL_PURCHASES: &str = "purchases";
pub const COL_FUEL_NET_PRODUCTION: &str = "fuel_net_production";
pub const COL_CHP_ELECTRICITY: &str = "chp_electricity_production";
pub const COL_HEAT_PUMP_ELECTRICITY: &str = "heat_pump_electricity";
/// Production emissions, kt CO2e.
pub const COL_EMISSIONS: &str = "emissions";
/// Unit emission factor of consumed district heat, g CO2e/kWh.
pub const COL_EMISSION_FACTOR: &str = "emission_factor";
/// Emissions attributed to district heat consumption, kt CO2e.
pub const COL_CONSUMPTION_EMISSIONS: &str = "consumption_emissions";

/// Prefix of the per-fuel energy columns (GWh).
pub const FUEL_COLUMN_PREFIX: &str = "fuel_";

/// Key of the heat-pump share in the target production ratios; every other
/// key names a fuel.
const HEAT_PUMP_RATIO_KEY: &str = "heat_pumps";
/// Reconciliation row name in the fuel statistics.
const FUEL_TOTAL_ROW: &str = "total";

/// CHP electricity output relative to fuel-based net heat production.
const CHP_ELECTRICITY_RATIO: f64 = 0.60;
/// Overall fuel-to-energy efficiency of the production fleet.
const TOTAL_FUEL_EFFICIENCY: f64 = 0.89;
/// Efficiency-method reference efficiency of separate heat-only production.
const HEAT_ONLY_REFERENCE_EFFICIENCY: f64 = 0.90;
/// Efficiency-method reference efficiency of separate power-only production.
const POWER_ONLY_REFERENCE_EFFICIENCY: f64 = 0.39;
const TJ_PER_GWH: f64 = 3.6;
/// Above this p-value a fitted trend is treated as noise and the forecast
/// converges to the historical mean instead.
const TREND_P_LIMIT: f64 = 0.05;

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: DISTRICT_HEATING_EMISSIONS,
        variables: &[
            "district_heating_operator",
            "district_heating_target_production_ratios",
            "target_year",
            "bio_emission_factor",
            "district_heating_heat_pump_cop",
        ],
        datasets: &[
            data::DISTRICT_HEATING_PRODUCTION,
            data::DISTRICT_HEATING_FUEL,
            data::FUEL_CLASSIFICATION,
        ],
        upstreams: &[HEAT_CONSUMPTION_FORECAST, ELECTRICITY_EMISSION_FACTOR_FORECAST],
        func: district_heating_emissions,
    });
}

/// A fuel appearing in the operator's statistics, joined with its
/// classification.
struct Fuel {
    name: String,
    emission_factor_t_per_tj: f64,
    is_bio: bool,
}

fn district_heating_emissions(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let operator = ctx.var_str("district_heating_operator");
    let target_ratios = ctx.var_map("district_heating_target_production_ratios");
    let target_year = ctx.var_year("target_year");
    let bio_emission_factor = ctx.var_f64("bio_emission_factor");
    let heat_pump_cop = ctx.var_f64("district_heating_heat_pump_cop");

    // Never silently renormalize a broken mix
    let ratio_sum: f64 = target_ratios.values().sum();
    if (ratio_sum - 100.0).abs() > 1e-9 {
        return Err(ScenarioError::ProductionRatioSum(ratio_sum));
    }

    let production_table = ctx
        .dataset(data::DISTRICT_HEATING_PRODUCTION)?
        .filter_str_eq("operator", &operator);
    if production_table.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no district heating production rows for operator '{}'",
            operator
        )));
    }
    let by_quantity = production_table.pivot_sum("year", "quantity", "value");
    let demand = by_quantity.get(COL_HEAT_DEMAND).ok_or_else(|| {
        ScenarioError::DataPrecondition("production statistics lack heat demand".to_string())
    })?;
    let start_year = *demand.keys().next().unwrap();
    let last_historical = *demand.keys().last().unwrap();

    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);
    for quantity in [
        COL_HEAT_DEMAND,
        COL_NETWORK_LOSSES,
        COL_TOTAL_PRODUCTION,
        COL_CHP_ELECTRICITY,
        COL_PURCHASES,
        COL_HEAT_PUMP_PRODUCTION,
    ] {
        let map = match by_quantity.get(quantity) {
            Some(map) => map,
            None if quantity == COL_HEAT_PUMP_PRODUCTION => {
                // Heat pumps only appear in recent statistics
                series.add_column(quantity, vec![0.0; n_years]);
                continue;
            }
            None => {
                return Err(ScenarioError::DataPrecondition(format!(
                    "production statistics lack quantity '{}'",
                    quantity
                )))
            }
        };
        let values: Vec<f64> = (start_year..=target_year)
            .map(|year| map.get(&year).copied().unwrap_or(f64::NAN))
            .collect();
        series.add_column(quantity, values);
    }
    // Years before the first heat pump installations read as missing
    for year in start_year..=last_historical {
        if series.value(COL_HEAT_PUMP_PRODUCTION, year).is_nan() {
            series.set(COL_HEAT_PUMP_PRODUCTION, year, 0.0);
        }
    }

    series.add_nan_column(COL_FUEL_NET_PRODUCTION);
    for year in start_year..=last_historical {
        let fuel_net = series.value(COL_TOTAL_PRODUCTION, year)
            - series.value(COL_PURCHASES, year)
            - series.value(COL_HEAT_PUMP_PRODUCTION, year);
        series.set(COL_FUEL_NET_PRODUCTION, year, fuel_net);
    }

    let consumption = ctx.upstream(HEAT_CONSUMPTION_FORECAST)?;
    let heat_pump_target_share =
        target_ratios.get(HEAT_PUMP_RATIO_KEY).copied().unwrap_or(0.0) / 100.0;
    extend_production_forecast(
        &mut series,
        last_historical,
        target_year,
        &consumption,
        heat_pump_target_share,
    )?;

    let fuel_table = ctx
        .dataset(data::DISTRICT_HEATING_FUEL)?
        .filter_str_eq("operator", &operator);
    let fuel_history = fuel_table.pivot_sum("year", "fuel", "value");
    let fuel_forecast = forecast_fuel_use(&fuel_table, &series, last_historical, target_year, &target_ratios)?;

    let fuels = classify_fuels(&fuel_table, &ctx.dataset(data::FUEL_CLASSIFICATION)?)?;
    for fuel in &fuels {
        let history = fuel_history.get(&fuel.name);
        let forecast = fuel_forecast.get(&fuel.name);
        let values: Vec<f64> = (start_year..=target_year)
            .map(|year| {
                history
                    .and_then(|m| m.get(&year).copied())
                    .or_else(|| forecast.and_then(|m| m.get(&year).copied()))
                    .unwrap_or(f64::NAN)
            })
            .collect();
        series.add_column(&format!("{}{}", FUEL_COLUMN_PREFIX, fuel.name), values);
    }

    let electricity_ef = ctx.upstream(ELECTRICITY_EMISSION_FACTOR_FORECAST)?;
    compute_unit_emissions(
        &mut series,
        &fuels,
        bio_emission_factor,
        heat_pump_cop,
        &electricity_ef,
    );
    Ok(series)
}

/// Forecast target for a historical trend: the fitted line's value at the
/// target year, unless the trend is statistically indistinguishable from
/// noise, in which case the series converges to its mean.
fn trend_target(years: &[f64], values: &[f64], target_year: Year) -> f64 {
    let fit = linregress(years, values);
    if fit.p_value > TREND_P_LIMIT {
        values.iter().sum::<f64>() / values.len() as f64
    } else {
        fit.predict(target_year as f64)
    }
}

/// Fill the forecast rows of the production columns by interpolating the
/// loss ratio and heat-pump share toward their targets and applying them to
/// the demand forecast.
fn extend_production_forecast(
    series: &mut YearSeries,
    last_historical: Year,
    target_year: Year,
    consumption: &YearSeries,
    heat_pump_target_share: f64,
) -> ScenarioResult<()> {
    let mut years = Vec::new();
    let mut loss_ratios = Vec::new();
    for year in series.start_year()..=last_historical {
        let demand = series.value(COL_HEAT_DEMAND, year);
        let losses = series.value(COL_NETWORK_LOSSES, year);
        if demand > 0.0 && !losses.is_nan() {
            years.push(year as f64);
            loss_ratios.push(losses / demand);
        }
    }
    if years.len() < 3 {
        return Err(ScenarioError::DataPrecondition(
            "too few loss-ratio observations to forecast the network".to_string(),
        ));
    }

    let last_loss_ratio = *loss_ratios.last().unwrap();
    let target_loss_ratio = trend_target(&years, &loss_ratios, target_year);
    let last_heat_pump_share = series.value(COL_HEAT_PUMP_PRODUCTION, last_historical)
        / series.value(COL_HEAT_DEMAND, last_historical);

    let span = (target_year - last_historical) as f64;
    for year in (last_historical + 1)..=target_year {
        let t = (year - last_historical) as f64 / span;
        let loss_ratio = last_loss_ratio + (target_loss_ratio - last_loss_ratio) * t;
        let heat_pump_share =
            last_heat_pump_share + (heat_pump_target_share - last_heat_pump_share) * t;

        let demand = consumption
            .get(COL_TOTAL_HEAT_CONSUMPTION, year)
            .ok_or_else(|| {
                ScenarioError::DataPrecondition(format!(
                    "heat consumption forecast does not cover year {}",
                    year
                ))
            })?;

        let heat_pumps = heat_pump_share * demand;
        let losses = loss_ratio * demand;
        let total = demand + losses;
        let fuel_net = total - heat_pumps;

        series.set(COL_HEAT_DEMAND, year, demand);
        series.set(COL_HEAT_PUMP_PRODUCTION, year, heat_pumps);
        series.set(COL_NETWORK_LOSSES, year, losses);
        series.set(COL_TOTAL_PRODUCTION, year, total);
        series.set(COL_PURCHASES, year, 0.0);
        series.set(COL_FUEL_NET_PRODUCTION, year, fuel_net);
        series.set(COL_CHP_ELECTRICITY, year, fuel_net * CHP_ELECTRICITY_RATIO);
    }
    Ok(())
}

/// Apportion the forecast fuel energy across fuel types by interpolating
/// each fuel's historical share toward its target share.
fn forecast_fuel_use(
    fuel_table: &ghgcast_core::datasets::DataTable,
    production: &YearSeries,
    last_historical: Year,
    target_year: Year,
    target_ratios: &BTreeMap<String, f64>,
) -> ScenarioResult<IndexMap<String, BTreeMap<Year, f64>>> {
    let last_rows = fuel_table.filter_int_eq("year", last_historical as i64);
    if last_rows.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "fuel statistics lack rows for year {}",
            last_historical
        )));
    }

    let mut last_use: IndexMap<String, f64> = IndexMap::new();
    let mut reported_total = None;
    for i in 0..last_rows.n_rows() {
        let fuel = &last_rows.strs("fuel")[i];
        let value = last_rows.floats("value")[i];
        if fuel == FUEL_TOTAL_ROW {
            reported_total = Some(value);
        } else {
            *last_use.entry(fuel.clone()).or_insert(0.0) += value;
        }
    }
    let reported_total = reported_total.ok_or_else(|| {
        ScenarioError::DataPrecondition("fuel statistics lack the total row".to_string())
    })?;
    let fuel_sum: f64 = last_use.values().sum();
    // The fuel rows must reconcile with the reported total
    if !is_close!(reported_total, fuel_sum, rel_tol = 1e-6) {
        return Err(ScenarioError::DataPrecondition(format!(
            "fuel use total {} does not reconcile with its component sum {}",
            reported_total, fuel_sum
        )));
    }

    let last_ratios: IndexMap<&str, f64> = last_use
        .iter()
        .map(|(fuel, value)| (fuel.as_str(), value / reported_total))
        .collect();

    // Normalize the configured targets over the fuels actually present;
    // the heat-pump entry is not a fuel
    let present_target_sum: f64 = target_ratios
        .iter()
        .filter(|(fuel, _)| last_ratios.contains_key(fuel.as_str()))
        .map(|(_, share)| share)
        .sum();
    let mut target_fuel_ratios: IndexMap<&str, f64> = IndexMap::new();
    for fuel in last_ratios.keys() {
        let share = if present_target_sum > 0.0 {
            target_ratios.get(*fuel).copied().unwrap_or(0.0) / present_target_sum
        } else {
            0.0
        };
        target_fuel_ratios.insert(fuel, share);
    }

    let span = (target_year - last_historical) as f64;
    let mut out: IndexMap<String, BTreeMap<Year, f64>> = IndexMap::new();
    for (fuel, &last_ratio) in &last_ratios {
        let target_ratio = target_fuel_ratios[fuel];
        let mut by_year = BTreeMap::new();
        for year in (last_historical + 1)..=target_year {
            let t = (year - last_historical) as f64 / span;
            let ratio = last_ratio + (target_ratio - last_ratio) * t;
            let fuel_energy_needed = (production.value(COL_FUEL_NET_PRODUCTION, year)
                + production.value(COL_CHP_ELECTRICITY, year))
                / TOTAL_FUEL_EFFICIENCY;
            by_year.insert(year, ratio * fuel_energy_needed);
        }
        out.insert(fuel.to_string(), by_year);
    }
    Ok(out)
}

/// Join the fuels in the statistics with the classification table.
fn classify_fuels(
    fuel_table: &ghgcast_core::datasets::DataTable,
    classification: &Arc<ghgcast_core::datasets::DataTable>,
) -> ScenarioResult<Vec<Fuel>> {
    let mut class_by_code: IndexMap<&str, (f64, bool)> = IndexMap::new();
    for i in 0..classification.n_rows() {
        class_by_code.insert(
            classification.strs("fuel_code")[i].as_str(),
            (
                classification.floats("co2e_emission_factor")[i],
                classification.bools("is_bio")[i],
            ),
        );
    }

    let mut fuels: Vec<Fuel> = Vec::new();
    for i in 0..fuel_table.n_rows() {
        let name = &fuel_table.strs("fuel")[i];
        if name == FUEL_TOTAL_ROW || fuels.iter().any(|f| &f.name == name) {
            continue;
        }
        let code = &fuel_table.strs("fuel_code")[i];
        let (emission_factor, is_bio) = class_by_code.get(code.as_str()).ok_or_else(|| {
            ScenarioError::DataPrecondition(format!(
                "fuel '{}' carries unclassified fuel code '{}'",
                name, code
            ))
        })?;
        fuels.push(Fuel {
            name: name.clone(),
            emission_factor_t_per_tj: *emission_factor,
            is_bio: *is_bio,
        });
    }
    Ok(fuels)
}

/// Price the fuel energy and heat-pump electricity into emissions and the
/// unit emission factor.
fn compute_unit_emissions(
    series: &mut YearSeries,
    fuels: &[Fuel],
    bio_emission_factor: f64,
    heat_pump_cop: f64,
    electricity_ef: &YearSeries,
) {
    let n_years = series.n_years();
    let mut heat_pump_electricity = vec![0.0; n_years];
    let mut emissions_kt = vec![f64::NAN; n_years];
    let mut emission_factor = vec![f64::NAN; n_years];
    let mut consumption_emissions = vec![f64::NAN; n_years];

    for (i, year) in series.years().enumerate() {
        // Fuel combustion, tonnes CO2e; the biomass factor carries the
        // biogenic accounting convention
        let mut emissions_t = 0.0;
        for fuel in fuels {
            let energy = series.value(&format!("{}{}", FUEL_COLUMN_PREFIX, fuel.name), year);
            if energy.is_nan() {
                continue;
            }
            let mut factor = fuel.emission_factor_t_per_tj;
            if fuel.is_bio {
                factor *= bio_emission_factor / 100.0;
            }
            emissions_t += energy * TJ_PER_GWH * factor;
        }

        let demand = series.value(COL_HEAT_DEMAND, year);
        let chp_electricity = series.value(COL_CHP_ELECTRICITY, year);

        // Efficiency method: fuel share attributable to heat in CHP
        let heat_alternate = demand / HEAT_ONLY_REFERENCE_EFFICIENCY;
        let power_alternate = chp_electricity / POWER_ONLY_REFERENCE_EFFICIENCY;
        let heat_share = heat_alternate / (heat_alternate + power_alternate);

        let heat_pumps = series.value(COL_HEAT_PUMP_PRODUCTION, year);
        let electricity_use = heat_pumps / heat_pump_cop;
        heat_pump_electricity[i] = electricity_use;

        // GWh times g/kWh is tonnes
        let grid_factor = electricity_ef
            .get(COL_ELECTRICITY_EF, year)
            .filter(|v| !v.is_nan())
            .unwrap_or(0.0);
        emissions_t += electricity_use * grid_factor;

        let factor = emissions_t * heat_share / demand;
        emission_factor[i] = factor;
        emissions_kt[i] = emissions_t / 1000.0;
        consumption_emissions[i] = demand * factor / 1000.0;
    }

    series.add_column(COL_HEAT_PUMP_ELECTRICITY, heat_pump_electricity);
    series.add_column(COL_EMISSIONS, emissions_kt);
    series.add_column(COL_EMISSION_FACTOR, emission_factor);
    series.add_column(COL_CONSUMPTION_EMISSIONS, consumption_emissions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn ratios(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(name, share)| (name.to_string(), *share))
            .collect()
    }

    #[test]
    fn forecast_covers_the_horizon_with_positive_factor() {
        let session = sample_session();
        let series = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();
        assert_eq!(series.end_year(), 2035);
        for year in series.first_forecast_year().unwrap()..=series.end_year() {
            assert!(series.value(COL_EMISSION_FACTOR, year) > 0.0);
            assert!(series.value(COL_CONSUMPTION_EMISSIONS, year) > 0.0);
        }
    }

    #[test]
    fn ratio_sum_must_be_exactly_100() {
        for broken_total in [99.0, 101.0] {
            let mut session = sample_session();
            session
                .set_variable(
                    "district_heating_target_production_ratios",
                    ratios(&[
                        ("heat_pumps", broken_total - 70.0),
                        ("biomass", 30.0),
                        ("natural_gas", 30.0),
                        ("coal", 10.0),
                    ]),
                )
                .unwrap();
            let err = session.run(DISTRICT_HEATING_EMISSIONS).unwrap_err();
            assert!(
                matches!(err, ScenarioError::ProductionRatioSum(sum) if (sum - broken_total).abs() < 1e-9),
                "expected ratio-sum failure for {}",
                broken_total
            );
        }
    }

    #[test]
    fn fuel_shares_interpolate_toward_the_targets() {
        let session = sample_session();
        let series = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();
        let target = series.end_year();

        // Coal was configured to shrink to 10/70 of the fuel mix while
        // biomass rises; check the direction of travel
        let coal_first = series.value("fuel_coal", series.first_forecast_year().unwrap());
        let coal_last = series.value("fuel_coal", target);
        let biomass_last = series.value("fuel_biomass", target);
        assert!(coal_last < coal_first);
        assert!(biomass_last > coal_last);
    }

    #[test]
    fn physical_biomass_accounting_raises_the_factor() {
        let mut session = sample_session();
        // Default accounting treats biogenic carbon as neutral
        let neutral = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();

        session.set_variable("bio_emission_factor", 100.0).unwrap();
        let physical = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();

        let target = neutral.end_year();
        assert!(
            physical.value(COL_EMISSION_FACTOR, target)
                > neutral.value(COL_EMISSION_FACTOR, target)
        );
    }

    #[test]
    fn heat_pump_share_reaches_its_target() {
        let session = sample_session();
        let series = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();
        let target = series.end_year();
        let share = series.value(COL_HEAT_PUMP_PRODUCTION, target)
            / series.value(COL_HEAT_DEMAND, target);
        assert_relative_eq!(share, 0.30, epsilon = 1e-9);
    }

    #[test]
    fn heat_pump_electricity_follows_the_cop() {
        let mut session = sample_session();
        session
            .set_variable("district_heating_heat_pump_cop", 2.0)
            .unwrap();
        let series = session.run(DISTRICT_HEATING_EMISSIONS).unwrap();
        let target = series.end_year();
        assert_relative_eq!(
            series.value(COL_HEAT_PUMP_ELECTRICITY, target),
            series.value(COL_HEAT_PUMP_PRODUCTION, target) / 2.0,
            epsilon = 1e-9
        );
    }
}
