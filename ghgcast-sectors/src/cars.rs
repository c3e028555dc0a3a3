//! Car traffic and its emissions.
//!
//! Mileage per resident is held on its historical level or steered toward a
//! target-year adjustment, then scaled by the population forecast. The
//! fleet's engine mix is the hard part: electric-vehicle share grows along
//! a Bass diffusion curve fitted to the configured target share, and every
//! share point the EVs gain is taken from gasoline and diesel engines
//! starting with the most polluting emission class: the oldest engines
//! retire first. Electric per-kilometre emissions are not a table lookup:
//! they are derived from the grid emission factor, so EVs get cleaner as
//! the grid does.

use ghgcast_core::errors::{ScenarioError, ScenarioResult};
use ghgcast_core::graph::{CalcContext, CalcNodeDef, GraphBuilder};
use ghgcast_core::numerics::bass::generate_diffusion;
use ghgcast_core::series::YearSeries;
use log::debug;

use crate::data;
use crate::electricity::{
    COL_EMISSION_FACTOR as COL_ELECTRICITY_EF, ELECTRICITY_EMISSION_FACTOR_FORECAST,
};
use crate::population::{ADJUSTED_POPULATION_FORECAST, COL_POPULATION};

pub const CARS_MILEAGE_FORECAST: &str = "cars_mileage_forecast";
pub const CARS_EMISSIONS_FORECAST: &str = "cars_emissions_forecast";

pub const COL_URBAN: &str = "urban";
pub const COL_HIGHWAYS: &str = "highways";
/// Total mileage, km/a.
pub const COL_MILEAGE: &str = "mileage";
pub const COL_URBAN_PER_RESIDENT: &str = "urban_per_resident";
pub const COL_HIGHWAYS_PER_RESIDENT: &str = "highways_per_resident";
pub const COL_MILEAGE_PER_RESIDENT: &str = "mileage_per_resident";
pub const COL_URBAN_EMISSIONS: &str = "urban_emissions";
pub const COL_HIGHWAYS_EMISSIONS: &str = "highways_emissions";
/// Total car emissions, kt CO2e.
pub const COL_EMISSIONS: &str = "emissions";
/// Fleet-average per-kilometre emissions, g CO2e/km.
pub const COL_EMISSION_FACTOR: &str = "emission_factor";
pub const COL_SHARE_GASOLINE: &str = "gasoline";
pub const COL_SHARE_DIESEL: &str = "diesel";
pub const COL_SHARE_ELECTRIC: &str = "electric";

const ENGINE_GASOLINE: &str = "gasoline";
const ENGINE_DIESEL: &str = "diesel";
const ENGINE_ELECTRIC: &str = "electric";
const ROAD_URBAN: &str = "urban";
const ROAD_HIGHWAYS: &str = "highways";

/// EURO emission classes from dirtiest to cleanest.
const EURO_CLASSES: [&str; 7] = [
    "EURO 0", "EURO 1", "EURO 2", "EURO 3", "EURO 4", "EURO 5", "EURO 6",
];

/// Electric vehicle energy use, kWh/km.
const EV_KWH_PER_KM_HIGHWAYS: f64 = 0.20;
const EV_KWH_PER_KM_URBAN: f64 = 0.17;

/// Bass diffusion calibration for EV adoption.
const BASS_INNOVATION: f64 = 0.03;
const BASS_IMITATION: f64 = 0.6;

/// Empirical downward correction on forecast-year car emissions, carried
/// from the calibration against measured inventories.
const FORECAST_EMISSIONS_CORRECTION: f64 = 0.97;

pub fn register(builder: &mut GraphBuilder) {
    builder.register(CalcNodeDef {
        key: CARS_MILEAGE_FORECAST,
        variables: &[
            "municipality_name",
            "target_year",
            "cars_mileage_per_resident_adjustment",
        ],
        datasets: &[data::CAR_EMISSIONS],
        upstreams: &[ADJUSTED_POPULATION_FORECAST],
        func: cars_mileage_forecast,
    });
    builder.register(CalcNodeDef {
        key: CARS_EMISSIONS_FORECAST,
        variables: &["municipality_name", "target_year", "cars_bev_percentage"],
        datasets: &[
            data::CAR_EMISSIONS,
            data::CAR_MILEAGE_SHARE_PER_ENGINE,
            data::CAR_UNIT_EMISSIONS,
        ],
        upstreams: &[CARS_MILEAGE_FORECAST, ELECTRICITY_EMISSION_FACTOR_FORECAST],
        func: cars_emissions_forecast,
    });
}

fn cars_mileage_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");
    let adjustment = ctx.var_f64("cars_mileage_per_resident_adjustment");

    let table = ctx
        .dataset(data::CAR_EMISSIONS)?
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("vehicle", "cars");
    if table.n_rows() == 0 {
        return Err(ScenarioError::DataPrecondition(format!(
            "no car traffic rows for municipality '{}'",
            municipality
        )));
    }
    let urban = table
        .filter_str_eq("road", ROAD_URBAN)
        .year_value_map("year", "mileage");
    let highways = table
        .filter_str_eq("road", ROAD_HIGHWAYS)
        .year_value_map("year", "mileage");

    let start_year = *urban.keys().next().unwrap();
    let last_historical = *urban.keys().last().unwrap();

    let population = ctx.upstream(ADJUSTED_POPULATION_FORECAST)?;

    let n_years = (target_year - start_year + 1) as usize;
    let mut series = YearSeries::new(start_year, n_years);
    series.set_forecast_from(last_historical + 1);

    let population_column: Vec<f64> = (start_year..=target_year)
        .map(|year| population.get(COL_POPULATION, year).unwrap_or(f64::NAN))
        .collect();
    series.add_column(COL_POPULATION, population_column);

    for (road, history) in [(COL_URBAN, &urban), (COL_HIGHWAYS, &highways)] {
        let mut mileage_column = vec![f64::NAN; n_years];
        let mut per_resident_column = vec![f64::NAN; n_years];
        for (&year, &km) in history {
            let i = (year - start_year) as usize;
            mileage_column[i] = km;
            per_resident_column[i] = km / series.value(COL_POPULATION, year);
        }

        // Steer per-resident mileage linearly toward the adjusted target
        let last_per_resident = per_resident_column[(last_historical - start_year) as usize];
        let target_per_resident = last_per_resident * (1.0 + adjustment / 100.0);
        let span = (target_year - last_historical) as f64;
        for year in (last_historical + 1)..=target_year {
            let t = (year - last_historical) as f64 / span;
            let per_resident = last_per_resident + (target_per_resident - last_per_resident) * t;
            let i = (year - start_year) as usize;
            per_resident_column[i] = per_resident;
            mileage_column[i] = per_resident * series.value(COL_POPULATION, year);
        }

        series.add_column(road, mileage_column);
        series.add_column(&format!("{}_per_resident", road), per_resident_column);
    }

    let totals: Vec<f64> = series
        .column(COL_URBAN)
        .iter()
        .zip(series.column(COL_HIGHWAYS).iter())
        .map(|(urban_km, highway_km)| urban_km + highway_km)
        .collect();
    series.add_column(COL_MILEAGE, totals);
    let per_resident_totals: Vec<f64> = series
        .column(COL_URBAN_PER_RESIDENT)
        .iter()
        .zip(series.column(COL_HIGHWAYS_PER_RESIDENT).iter())
        .map(|(urban_km, highway_km)| urban_km + highway_km)
        .collect();
    series.add_column(COL_MILEAGE_PER_RESIDENT, per_resident_totals);
    Ok(series)
}

/// Mileage shares per EURO class for one engine type.
#[derive(Debug, Clone, Copy, Default)]
struct ClassShares([f64; EURO_CLASSES.len()]);

impl ClassShares {
    fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// Per-kilometre unit emissions, g/km, per road and EURO class.
#[derive(Debug, Clone, Copy, Default)]
struct UnitEmissions {
    urban: [f64; EURO_CLASSES.len()],
    highways: [f64; EURO_CLASSES.len()],
}

fn class_index(euro_class: &str) -> ScenarioResult<usize> {
    EURO_CLASSES
        .iter()
        .position(|class| *class == euro_class)
        .ok_or_else(|| {
            ScenarioError::DataPrecondition(format!("unknown emission class '{}'", euro_class))
        })
}

fn load_engine_shares(
    table: &ghgcast_core::datasets::DataTable,
    engine: &str,
) -> ScenarioResult<ClassShares> {
    let filtered = table.filter_str_eq("engine", engine);
    let mut shares = ClassShares::default();
    for i in 0..filtered.n_rows() {
        let class = class_index(&filtered.strs("euro_class")[i])?;
        shares.0[class] += filtered.floats("share")[i];
    }
    Ok(shares)
}

fn load_unit_emissions(
    table: &ghgcast_core::datasets::DataTable,
    engine: &str,
) -> ScenarioResult<UnitEmissions> {
    let filtered = table.filter_str_eq("engine", engine);
    let mut sums = UnitEmissions::default();
    let mut counts = UnitEmissions::default();
    for i in 0..filtered.n_rows() {
        let class = class_index(&filtered.strs("euro_class")[i])?;
        let grams = filtered.floats("co2e")[i];
        match filtered.strs("road")[i].as_str() {
            ROAD_URBAN => {
                sums.urban[class] += grams;
                counts.urban[class] += 1.0;
            }
            ROAD_HIGHWAYS => {
                sums.highways[class] += grams;
                counts.highways[class] += 1.0;
            }
            other => {
                return Err(ScenarioError::DataPrecondition(format!(
                    "unknown road type '{}'",
                    other
                )))
            }
        }
    }
    let mut out = UnitEmissions::default();
    for class in 0..EURO_CLASSES.len() {
        out.urban[class] = if counts.urban[class] > 0.0 {
            sums.urban[class] / counts.urban[class]
        } else {
            0.0
        };
        out.highways[class] = if counts.highways[class] > 0.0 {
            sums.highways[class] / counts.highways[class]
        } else {
            0.0
        };
    }
    Ok(out)
}

/// Retire ICE share from the dirtiest class downward, clamped so no class
/// goes negative.
fn retire_share(shares: &mut ClassShares, mut amount: f64) {
    for class in 0..EURO_CLASSES.len() {
        if amount <= 0.0 {
            break;
        }
        let decrease = shares.0[class].min(amount);
        shares.0[class] -= decrease;
        amount -= decrease;
    }
}

fn cars_emissions_forecast(ctx: &CalcContext) -> ScenarioResult<YearSeries> {
    let municipality = ctx.var_str("municipality_name");
    let target_year = ctx.var_year("target_year");
    let bev_target = ctx.var_f64("cars_bev_percentage") / 100.0;

    let mileage = ctx.upstream(CARS_MILEAGE_FORECAST)?;
    let mut series = (*mileage).clone();
    let start_year = series.start_year();
    let last_historical = series.last_historical_year().ok_or_else(|| {
        ScenarioError::DataPrecondition("mileage forecast has no historical rows".to_string())
    })?;
    let n_years = series.n_years();

    // Measured emissions per road, kt
    let emissions_table = ctx
        .dataset(data::CAR_EMISSIONS)?
        .filter_str_eq("municipality", &municipality)
        .filter_str_eq("vehicle", "cars");
    let mut urban_emissions = vec![f64::NAN; n_years];
    let mut highway_emissions = vec![f64::NAN; n_years];
    for (road, column) in [
        (ROAD_URBAN, &mut urban_emissions),
        (ROAD_HIGHWAYS, &mut highway_emissions),
    ] {
        let by_year = emissions_table
            .filter_str_eq("road", road)
            .year_value_map("year", "co2e");
        for (&year, &tonnes) in &by_year {
            if year >= start_year && year <= last_historical {
                column[(year - start_year) as usize] = tonnes / 1000.0;
            }
        }
    }

    // Engine mix baseline
    let share_table = ctx
        .dataset(data::CAR_MILEAGE_SHARE_PER_ENGINE)?
        .filter_str_eq("vehicle", "cars");
    let mut gasoline = load_engine_shares(&share_table, ENGINE_GASOLINE)?;
    let mut diesel = load_engine_shares(&share_table, ENGINE_DIESEL)?;
    let electric_start = load_engine_shares(&share_table, ENGINE_ELECTRIC)?.total();
    if electric_start <= 0.0 {
        return Err(ScenarioError::DataPrecondition(
            "engine share data reports no electric vehicles to diffuse from".to_string(),
        ));
    }
    let diesel_ratio = diesel.total() / (diesel.total() + gasoline.total());

    // EV share follows a fitted Bass diffusion curve
    let n_forecast = (target_year - last_historical) as usize;
    debug!(
        "diffusing EV share {:.3} -> {:.3} over {} years",
        electric_start, bev_target, n_forecast
    );
    let bev_shares = generate_diffusion(
        n_forecast,
        electric_start,
        bev_target,
        BASS_INNOVATION,
        BASS_IMITATION,
    )?;

    let unit_table = ctx.dataset(data::CAR_UNIT_EMISSIONS)?;
    let gasoline_units = load_unit_emissions(&unit_table, ENGINE_GASOLINE)?;
    let diesel_units = load_unit_emissions(&unit_table, ENGINE_DIESEL)?;

    let electricity_ef = ctx.upstream(ELECTRICITY_EMISSION_FACTOR_FORECAST)?;

    let mut gasoline_column = vec![f64::NAN; n_years];
    let mut diesel_column = vec![f64::NAN; n_years];
    let mut electric_column = vec![f64::NAN; n_years];
    let seam = (last_historical - start_year) as usize;
    gasoline_column[seam] = gasoline.total();
    diesel_column[seam] = diesel.total();
    electric_column[seam] = electric_start;

    for step in 1..=n_forecast {
        let year = last_historical + step as i32;
        let i = (year - start_year) as usize;

        // Share the EVs gained this year, taken from the dirtiest classes
        let gained = bev_shares[step] - bev_shares[step - 1];
        retire_share(&mut diesel, gained * diesel_ratio);
        retire_share(&mut gasoline, gained * (1.0 - diesel_ratio));

        gasoline_column[i] = gasoline.total();
        diesel_column[i] = diesel.total();
        electric_column[i] = bev_shares[step];

        // Per-km EV emissions derive from the prevailing grid factor
        let grid_factor = electricity_ef
            .get(COL_ELECTRICITY_EF, year)
            .filter(|v| !v.is_nan())
            .unwrap_or(0.0);
        let ev_urban = grid_factor * EV_KWH_PER_KM_URBAN;
        let ev_highways = grid_factor * EV_KWH_PER_KM_HIGHWAYS;

        for (road, units, ev_unit, column) in [
            (
                COL_URBAN,
                (&gasoline_units.urban, &diesel_units.urban),
                ev_urban,
                &mut urban_emissions,
            ),
            (
                COL_HIGHWAYS,
                (&gasoline_units.highways, &diesel_units.highways),
                ev_highways,
                &mut highway_emissions,
            ),
        ] {
            let road_km = series.value(road, year);
            let mut grams_per_km = bev_shares[step] * ev_unit;
            for class in 0..EURO_CLASSES.len() {
                grams_per_km += gasoline.0[class] * units.0[class];
                grams_per_km += diesel.0[class] * units.1[class];
            }
            // km times g/km, scaled to kt
            column[i] = road_km * grams_per_km / 1e9;
        }
    }

    let mut total_emissions = Vec::with_capacity(n_years);
    let mut emission_factor = Vec::with_capacity(n_years);
    for (i, year) in (start_year..=target_year).enumerate() {
        let mut total = urban_emissions[i] + highway_emissions[i];
        if year > last_historical {
            total *= FORECAST_EMISSIONS_CORRECTION;
        }
        total_emissions.push(total);
        let km = series.value(COL_MILEAGE, year);
        emission_factor.push(total * 1e9 / km);
    }

    series.add_column(COL_URBAN_EMISSIONS, urban_emissions);
    series.add_column(COL_HIGHWAYS_EMISSIONS, highway_emissions);
    series.add_column(COL_EMISSIONS, total_emissions);
    series.add_column(COL_EMISSION_FACTOR, emission_factor);
    series.add_column(COL_SHARE_GASOLINE, gasoline_column);
    series.add_column(COL_SHARE_DIESEL, diesel_column);
    series.add_column(COL_SHARE_ELECTRIC, electric_column);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;
    use approx::assert_relative_eq;

    #[test]
    fn mileage_tracks_population_without_adjustment() {
        let session = sample_session();
        let series = session.run(CARS_MILEAGE_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let end = series.end_year();
        // Per-resident mileage stays on its historical level
        assert_relative_eq!(
            series.value(COL_URBAN_PER_RESIDENT, end),
            series.value(COL_URBAN_PER_RESIDENT, last_historical),
            epsilon = 1e-9
        );
        // Total mileage grows with the population
        assert!(series.value(COL_MILEAGE, end) > series.value(COL_MILEAGE, last_historical));
    }

    #[test]
    fn mileage_adjustment_lands_in_the_target_year() {
        let mut session = sample_session();
        session
            .set_variable("cars_mileage_per_resident_adjustment", -20.0)
            .unwrap();
        let series = session.run(CARS_MILEAGE_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let end = series.end_year();
        assert_relative_eq!(
            series.value(COL_HIGHWAYS_PER_RESIDENT, end),
            series.value(COL_HIGHWAYS_PER_RESIDENT, last_historical) * 0.8,
            epsilon = 1e-9
        );
    }

    #[test]
    fn fleet_shares_are_conserved() {
        let session = sample_session();
        let series = session.run(CARS_EMISSIONS_FORECAST).unwrap();
        let last_historical = series.last_historical_year().unwrap();
        let baseline = series.value(COL_SHARE_GASOLINE, last_historical)
            + series.value(COL_SHARE_DIESEL, last_historical)
            + series.value(COL_SHARE_ELECTRIC, last_historical);
        for year in (last_historical + 1)..=series.end_year() {
            let total = series.value(COL_SHARE_GASOLINE, year)
                + series.value(COL_SHARE_DIESEL, year)
                + series.value(COL_SHARE_ELECTRIC, year);
            assert_relative_eq!(total, baseline, epsilon = 1e-9);
        }
    }

    #[test]
    fn electric_share_reaches_its_target() {
        let mut session = sample_session();
        session.set_variable("cars_bev_percentage", 40.0).unwrap();
        let series = session.run(CARS_EMISSIONS_FORECAST).unwrap();
        let end = series.end_year();
        assert_relative_eq!(
            series.value(COL_SHARE_ELECTRIC, end),
            0.40,
            epsilon = 1e-3
        );
        // Adoption is monotonic
        let mut previous = 0.0;
        for year in series.first_forecast_year().unwrap()..=end {
            let share = series.value(COL_SHARE_ELECTRIC, year);
            assert!(share >= previous);
            previous = share;
        }
    }

    #[test]
    fn electrification_cuts_emissions() {
        let mut session = sample_session();
        session.set_variable("cars_bev_percentage", 5.0).unwrap();
        let low_ev = session.run(CARS_EMISSIONS_FORECAST).unwrap();

        session.set_variable("cars_bev_percentage", 80.0).unwrap();
        let high_ev = session.run(CARS_EMISSIONS_FORECAST).unwrap();

        let end = low_ev.end_year();
        assert!(high_ev.value(COL_EMISSIONS, end) < low_ev.value(COL_EMISSIONS, end));
    }

    #[test]
    fn dirtiest_classes_retire_first() {
        let mut shares = ClassShares([0.05, 0.10, 0.10, 0.10, 0.10, 0.10, 0.10]);
        retire_share(&mut shares, 0.12);
        assert_relative_eq!(shares.0[0], 0.0);
        assert_relative_eq!(shares.0[1], 0.03, epsilon = 1e-12);
        assert_relative_eq!(shares.0[2], 0.10);

        // Clamped: stripping more than exists empties every class
        retire_share(&mut shares, 10.0);
        assert_relative_eq!(shares.total(), 0.0);
    }
}
