//! Population forecast.
//!
//! The municipality publishes an official population forecast every few
//! years. Historical rows run up to the publication year; later rows are
//! the published projection. A single lever,
//! `population_forecast_correction`, shifts the final forecast-year
//! population by a percentage, with intermediate years scaled by a smooth
//! geometric factor so the correction compounds instead of jumping in the
//! target year.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::series::{Year, YearSeries};

use crate::data;

pub const POPULATION_FORECAST: &str = "population_forecast";
pub const ADJUSTED_POPULATION_FORECAST: &str = "adjusted_population_forecast";

/// Output column: residents per year.
pub const COL_POPULATION: &str = "population";

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: POPULATION_FORECAST,
        variables: &["municipality_name", "population_forecast_vintage"],
        datasets: &[data::POPULATION_FORECAST],
        upstreams: &[],
        func: population_forecast,
    });
    builder.register(CalcNodeDef {
        key: ADJUSTED_POPULATION_FORECAST,
        variables: &["population_forecast_correction", "target_year"],
        datasets: &[],
        upstreams: &[POPULATION_FORECAST],
        func: adjusted_population_forecast,
    });
}

/// The published forecast, filtered to the configured municipality and
/// vintage. Rows up to the publication year are historical.
fn population_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let vintage = ctx.var_i64("population_forecast_vintage");

    let dataset = ctx.dataset(data::POPULATION_FORECAST)?;
    let table = dataset
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("age_group", "total")
        .filter_str_eq("sex", "both")
        .filter_str_eq("scenario", "baseline")
        .filter_int_eq("vintage", vintage);
    if table.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no population forecast rows for municipality '{}' vintage {}",
            municipality, vintage
        )));
    }

    let by_year = table.year_value_map("year", "population");
    let mut series = YearSeries::from_year_map(COL_POPULATION, &by_year);
    series.set_forecast_from(vintage as Year + 1);
    Ok(series)
}

/// Apply the correction lever on top of the published forecast.
///
/// With correction `c` over `n` forecast years, every forecast year `k`
/// (counting from the first) is scaled by `base^k` with
/// `base = (1 + c/100)^(1/n)`, so the final year lands exactly at
/// `1 + c/100` times the published number and historical rows stay
/// untouched.
fn adjusted_population_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let correction = ctx.var_f64("population_forecast_correction");
    let target_year = ctx.var_year("target_year");

    let published = ctx.upstream(POPULATION_FORECAST)?;
    let mut series = (*published).clone();
    if series.end_year() > target_year {
        series.truncate_after(target_year);
    }

    let first = series.first_forecast_year().ok_or_else(|| {
        ScenarioError::DataPrecondition(
            "population forecast holds no forecast rows within the target horizon".to_string(),
        )
    })?;
    let last = series.end_year();
    let n_years = last - first;

    if n_years == 0 {
        let value = series.value(COL_POPULATION, last);
        series.set(COL_POPULATION, last, value * (1.0 + correction / 100.0));
        return Ok(series);
    }

    let base = (1.0 + correction / 100.0).powf(1.0 / n_years as f64);
    for year in first..=last {
        let multiplier = base.powi(year - first);
        let value = series.value(COL_POPULATION, year);
        series.set(COL_POPULATION, year, value * multiplier);
    }
    Ok(series)
}
