//! Building floor-area forecast.
//!
//! New construction tracks population growth: the net new floor area built
//! per new resident, averaged over the most recent ten historical years per
//! building category, is carried forward and multiplied by the forecast
//! population increase. Population decline is clamped to zero growth;
//! demolition is not modeled, so floor area never shrinks.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::series::{Year, YearSeries};
use std::collections::BTreeMap;

use crate::data;
use crate::population::{ADJUSTED_POPULATION_FORECAST, COL_POPULATION};

pub const BUILDING_FLOOR_AREA_FORECAST: &str = "building_floor_area_forecast";

/// Number of trailing historical years the per-capita construction rate is
/// averaged over.
const RATE_WINDOW_YEARS: Year = 10;

pub const CAT_ALL_BUILDINGS: &str = "all_buildings";
pub const CAT_APARTMENT_BLOCKS_LOW_RISE: &str = "apartment_blocks_low_rise";
pub const CAT_APARTMENT_BLOCKS_HIGH_RISE: &str = "apartment_blocks_high_rise";
/// Combined output category replacing the low-rise/high-rise split.
pub const CAT_APARTMENT_BLOCKS: &str = "apartment_blocks";

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: BUILDING_FLOOR_AREA_FORECAST,
        variables: &["municipality_name", "target_year"],
        datasets: &[data::BUILDING_STOCK],
        upstreams: &[ADJUSTED_POPULATION_FORECAST],
        func: building_floor_area_forecast,
    });
}

fn building_floor_area_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");

    let dataset = ctx.dataset(data::BUILDING_STOCK)?;
    let table = dataset
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("unit", "floor_area_m2");
    let keep: Vec<bool> = table
        .strs("building_use")
        .iter()
        .map(|category| category != CAT_ALL_BUILDINGS)
        .collect();
    let table = table.filter(|i| keep[i]);

    let by_category = table.pivot_sum("year", "building_use", "value");
    if by_category.is_empty() {
        return Err(ScenarioError::DataPrecondition(format!(
            "no building stock rows for municipality '{}'",
            municipality
        )));
    }

    let start_year = by_category
        .values()
        .map(|m| *m.keys().next().unwrap())
        .min()
        .unwrap();
    let last_historical = by_category
        .values()
        .map(|m| *m.keys().last().unwrap())
        .max()
        .unwrap();

    let population = ctx.upstream(ADJUSTED_POPULATION_FORECAST)?;
    let mut population_growth: BTreeMap<Year, f64> = BTreeMap::new();
    for year in population.years().skip(1) {
        let growth =
            population.value(COL_POPULATION, year) - population.value(COL_POPULATION, year - 1);
        // Population decline never bulldozes buildings
        population_growth.insert(year, growth.max(0.0));
    }

    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    for (category, totals) in &by_category {
        let rate = per_capita_rate(category, totals, &population_growth, last_historical)?;

        let mut values = Vec::with_capacity(n_years);
        for year in start_year..=last_historical {
            let total = totals.get(&year).copied().ok_or_else(|| {
                ScenarioError::DataPrecondition(format!(
                    "building stock category '{}' is missing year {}",
                    category, year
                ))
            })?;
            values.push(total);
        }
        let mut cumulative = values[values.len() - 1];
        for year in (last_historical + 1)..=target_year {
            let growth = population_growth.get(&year).copied().unwrap_or(0.0);
            cumulative += rate * growth;
            values.push(cumulative);
        }
        series.add_column(category, values);
    }

    combine_apartment_blocks(&mut series)?;
    Ok(series)
}

/// Net new floor area per new resident, averaged over the most recent
/// historical years.
fn per_capita_rate(
    category: &str,
    totals: &BTreeMap<Year, f64>,
    population_growth: &BTreeMap<Year, f64>,
    last_historical: Year,
) -> ScenarioResult<f64> {
    let window_start = last_historical - RATE_WINDOW_YEARS;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&year, &total) in totals.range(window_start..) {
        let previous = match totals.get(&(year - 1)) {
            Some(v) => *v,
            None => continue,
        };
        let growth = match population_growth.get(&year) {
            // A year without population growth carries no per-capita signal
            Some(&g) if g > 0.0 => g,
            _ => continue,
        };
        sum += (total - previous) / growth;
        count += 1;
    }
    if count == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "cannot derive a construction rate for category '{}'",
            category
        )));
    }
    // Demolition is not modeled; a shrinking category contributes no new area
    Ok((sum / count as f64).max(0.0))
}

/// Low-rise and high-rise apartment blocks are reported separately but
/// forecast as one combined category.
fn combine_apartment_blocks(series: &mut YearSeries) -> ScenarioResult<()> {
    for category in [CAT_APARTMENT_BLOCKS_LOW_RISE, CAT_APARTMENT_BLOCKS_HIGH_RISE] {
        if !series.has_column(category) {
            return Err(ScenarioError::DataPrecondition(format!(
                "building stock is missing expected category '{}'",
                category
            )));
        }
    }
    let low = series.drop_column(CAT_APARTMENT_BLOCKS_LOW_RISE).unwrap();
    let high = series.drop_column(CAT_APARTMENT_BLOCKS_HIGH_RISE).unwrap();
    series.add_column(CAT_APARTMENT_BLOCKS, (&low + &high).to_vec());
    Ok(())
}

/// Row-wise total floor area over every category column.
pub fn total_floor_area(series: &YearSeries, year: Year) -> f64 {
    let columns: Vec<&str> = series.column_names().collect();
    series.row_sum(&columns, year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;

    #[test]
    fn apartment_categories_are_combined() {
        let session = sample_session();
        let series = session.run(BUILDING_FLOOR_AREA_FORECAST).unwrap();
        assert!(series.has_column(CAT_APARTMENT_BLOCKS));
        assert!(!series.has_column(CAT_APARTMENT_BLOCKS_LOW_RISE));
        assert!(!series.has_column(CAT_APARTMENT_BLOCKS_HIGH_RISE));
        assert!(!series.has_column(CAT_ALL_BUILDINGS));
    }

    #[test]
    fn forecast_reaches_the_target_year() {
        let session = sample_session();
        let series = session.run(BUILDING_FLOOR_AREA_FORECAST).unwrap();
        assert_eq!(series.end_year(), 2035);
        assert_eq!(series.last_historical_year(), Some(2018));
    }

    #[test]
    fn floor_area_never_decreases_in_the_forecast() {
        let mut session = sample_session();
        // Even under a population decline scenario
        session
            .set_variable("population_forecast_correction", -30.0)
            .unwrap();
        let series = session.run(BUILDING_FLOOR_AREA_FORECAST).unwrap();
        let first_forecast = series.first_forecast_year().unwrap();
        for name in series.column_names() {
            let column = series.column(name);
            for year in first_forecast..=series.end_year() {
                let i = (year - series.start_year()) as usize;
                assert!(
                    column[i] >= column[i - 1] - 1e-9,
                    "category '{}' shrank in {}",
                    name,
                    year
                );
            }
        }
    }

    #[test]
    fn forecast_growth_tracks_population_growth() {
        let session = sample_session();
        let buildings = session.run(BUILDING_FLOOR_AREA_FORECAST).unwrap();
        let last = buildings.last_historical_year().unwrap();
        let total_before = total_floor_area(&buildings, last);
        let total_after = total_floor_area(&buildings, buildings.end_year());
        assert!(total_after > total_before);
    }
}
