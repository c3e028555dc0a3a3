//! Synthetic municipal datasets for tests and embedding.
//!
//! The fixtures mimic the shape and magnitudes of the real statistical
//! tables: smooth trends with plausible Helsinki-sized levels, deterministic
//! so forecasts are reproducible in tests.

use ghgcast_core::datasets::{Column, DataTable, MemoryDatasetStore};
use ghgcast_core::graph::ScenarioSession;
use ghgcast_core::series::Year;
use std::sync::Arc;

use crate::data;
use crate::model;

const MUNICIPALITY: &str = "Helsinki";
const OPERATOR: &str = "Helen";

/// Building categories: (name, floor area in 2005, yearly growth), m2.
const BUILDING_CATEGORIES: &[(&str, f64, f64)] = &[
    ("detached_houses", 4.0e6, 15_000.0),
    ("row_houses", 3.0e6, 10_000.0),
    ("apartment_blocks_low_rise", 8.0e6, 30_000.0),
    ("apartment_blocks_high_rise", 6.0e6, 25_000.0),
    ("office_buildings", 5.0e6, 10_000.0),
    ("commercial_buildings", 3.0e6, 8_000.0),
    ("public_buildings", 2.0e6, 5_000.0),
    ("industrial_buildings", 2.5e6, 4_000.0),
    ("other_buildings", 0.5e6, 2_000.0),
];

fn population_at(year: Year) -> f64 {
    if year <= 2018 {
        490_000.0 + 3_500.0 * (year - 1990) as f64
    } else {
        population_at(2018) + 4_200.0 * (year - 2018) as f64
    }
}

fn population_forecast() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut age_group = Vec::new();
    let mut sex = Vec::new();
    let mut vintage = Vec::new();
    let mut scenario = Vec::new();
    let mut population = Vec::new();
    for year in 1990..=2050 {
        for (name, factor) in [("baseline", 1.0), ("rapid_growth", 1.08)] {
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            age_group.push("total".to_string());
            sex.push("both".to_string());
            vintage.push(2018_i64);
            scenario.push(name.to_string());
            population.push(population_at(year) * factor);
        }
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("age_group", Column::Str(age_group))
        .with_column("sex", Column::Str(sex))
        .with_column("vintage", Column::Int(vintage))
        .with_column("scenario", Column::Str(scenario))
        .with_column("population", Column::Float(population))
}

fn building_stock() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut building_use = Vec::new();
    let mut unit = Vec::new();
    let mut value = Vec::new();
    for year in 2005..=2018 {
        let age = (year - 2005) as f64;
        let mut total = 0.0;
        for &(category, base, growth) in BUILDING_CATEGORIES {
            let area = base + growth * age;
            total += area;
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            building_use.push(category.to_string());
            unit.push("floor_area_m2".to_string());
            value.push(area);
        }
        municipality.push(MUNICIPALITY.to_string());
        years.push(year as i64);
        building_use.push("all_buildings".to_string());
        unit.push("floor_area_m2".to_string());
        value.push(total);
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("building_use", Column::Str(building_use))
        .with_column("unit", Column::Str(unit))
        .with_column("value", Column::Float(value))
}

fn district_heat_energy_use() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut energy_form = Vec::new();
    let mut quantity = Vec::new();
    let mut value = Vec::new();
    for year in 1995..=2018 {
        let age = (year - 1995) as f64;
        let consumption = 6_000.0 + 25.0 * age + if year % 2 == 0 { 15.0 } else { 0.0 };
        let raw_specific = 45.0 - 0.15 * age;
        for (name, amount) in [
            ("consumption_total_gwh", consumption),
            ("specific_consumption_raw", raw_specific),
            ("specific_consumption_weather_corrected", raw_specific * 0.97),
        ] {
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            energy_form.push("district_heat".to_string());
            quantity.push(name.to_string());
            value.push(amount);
        }
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("energy_form", Column::Str(energy_form))
        .with_column("quantity", Column::Str(quantity))
        .with_column("value", Column::Float(value))
}

fn district_heating_production() -> DataTable {
    let mut operator = Vec::new();
    let mut years = Vec::new();
    let mut quantity = Vec::new();
    let mut value = Vec::new();
    for year in 2000..=2018 {
        let age = (year - 2000) as f64;
        let demand = 6_100.0 + 20.0 * age;
        let losses = demand * (0.055 + 0.0012 * age);
        let purchases = 50.0;
        let heat_pumps = if year >= 2015 {
            100.0 + 80.0 * (year - 2015) as f64
        } else {
            0.0
        };
        let total = demand + losses;
        let fuel_net = total - purchases - heat_pumps;
        let mut rows = vec![
            ("heat_demand", demand),
            ("network_losses", losses),
            ("purchases", purchases),
            ("total_production", total),
            ("chp_electricity_production", fuel_net * 0.6),
        ];
        if year >= 2015 {
            rows.push(("heat_pump_production", heat_pumps));
        }
        for (name, amount) in rows {
            operator.push(OPERATOR.to_string());
            years.push(year as i64);
            quantity.push(name.to_string());
            value.push(amount);
        }
    }
    DataTable::new()
        .with_column("operator", Column::Str(operator))
        .with_column("year", Column::Int(years))
        .with_column("quantity", Column::Str(quantity))
        .with_column("value", Column::Float(value))
}

fn district_heating_fuel() -> DataTable {
    let mut operator = Vec::new();
    let mut years = Vec::new();
    let mut fuel = Vec::new();
    let mut fuel_code = Vec::new();
    let mut value = Vec::new();
    for year in 2000..=2018 {
        let age = (year - 2000) as f64;
        let fuels = [
            ("coal", "1212", 6_400.0 - 100.0 * age),
            ("natural_gas", "1311", 4_800.0 + 25.0 * age),
            ("biomass", "3128", 300.0 + 60.0 * age),
            ("light_fuel_oil", "1134", 150.0),
        ];
        let total: f64 = fuels.iter().map(|(_, _, amount)| amount).sum();
        for (name, code, amount) in fuels {
            operator.push(OPERATOR.to_string());
            years.push(year as i64);
            fuel.push(name.to_string());
            fuel_code.push(code.to_string());
            value.push(amount);
        }
        operator.push(OPERATOR.to_string());
        years.push(year as i64);
        fuel.push("total".to_string());
        fuel_code.push(String::new());
        value.push(total);
    }
    DataTable::new()
        .with_column("operator", Column::Str(operator))
        .with_column("year", Column::Int(years))
        .with_column("fuel", Column::Str(fuel))
        .with_column("fuel_code", Column::Str(fuel_code))
        .with_column("value", Column::Float(value))
}

fn fuel_classification() -> DataTable {
    let codes = ["1212", "1311", "3128", "1134"];
    let factors = [93.1, 55.3, 109.6, 74.1];
    let bio = [false, false, true, false];
    DataTable::new()
        .with_column(
            "fuel_code",
            Column::Str(codes.iter().map(|c| c.to_string()).collect()),
        )
        .with_column("co2e_emission_factor", Column::Float(factors.to_vec()))
        .with_column("is_bio", Column::Bool(bio.to_vec()))
}

fn electricity_consumption() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut sector = Vec::new();
    let mut quantity = Vec::new();
    let mut value = Vec::new();
    for year in 1990..=2018 {
        let age = (year - 1990) as f64;
        municipality.push(MUNICIPALITY.to_string());
        years.push(year as i64);
        sector.push("consumer_electricity".to_string());
        quantity.push("total_gwh".to_string());
        value.push(4_000.0 + 20.0 * age);
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("sector", Column::Str(sector))
        .with_column("quantity", Column::Str(quantity))
        .with_column("value", Column::Float(value))
}

fn ghg_emissions() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut sector1 = Vec::new();
    let mut sector2 = Vec::new();
    let mut emissions = Vec::new();
    let mut energy = Vec::new();
    for year in 1990..=2018 {
        let age = (year - 1990) as f64;
        let electricity_gwh = 4_000.0 + 20.0 * age;
        let electricity_factor = 350.0 - 6.0 * age;
        let rows: [(&str, &str, f64, f64); 9] = [
            ("building_heating", "district_heat", 1_900.0 - 8.0 * age, 0.0),
            ("building_heating", "oil_heating", 300.0 - 6.0 * age, 0.0),
            ("building_heating", "electricity_heating", 250.0 - 3.0 * age, 0.0),
            ("building_heating", "geothermal_heating", 0.0, 0.0),
            ("transportation", "", 700.0 - 4.0 * age, 0.0),
            (
                "electricity_consumption",
                "",
                electricity_factor * electricity_gwh / 1000.0,
                electricity_gwh,
            ),
            ("waste", "", 250.0 - 3.0 * age, 0.0),
            ("industry", "", 60.0 - 1.0 * age, 0.0),
            ("agriculture", "", 5.0 - 0.05 * age, 0.0),
        ];
        for (main, sub, kt, gwh) in rows {
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            sector1.push(main.to_string());
            sector2.push(sub.to_string());
            emissions.push(kt);
            energy.push(gwh);
        }
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("sector1", Column::Str(sector1))
        .with_column("sector2", Column::Str(sector2))
        .with_column("emissions", Column::Float(emissions))
        .with_column("energy_consumption", Column::Float(energy))
}

fn car_emissions() -> DataTable {
    let mut municipality = Vec::new();
    let mut years = Vec::new();
    let mut vehicle = Vec::new();
    let mut road = Vec::new();
    let mut mileage = Vec::new();
    let mut co2e = Vec::new();
    for year in 2008..=2018 {
        let age = (year - 2008) as f64;
        let residents = population_at(year);
        let cars: [(&str, f64, f64); 2] = [
            ("urban", 3_600.0 - 10.0 * age, 180.0 - 2.0 * age),
            ("highways", 2_600.0 - 5.0 * age, 150.0 - 1.5 * age),
        ];
        for (road_type, km_per_resident, grams_per_km) in cars {
            let km = km_per_resident * residents;
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            vehicle.push("cars".to_string());
            road.push(road_type.to_string());
            mileage.push(km);
            co2e.push(km * grams_per_km / 1e6);

            // Vans ride along to exercise the vehicle filter
            municipality.push(MUNICIPALITY.to_string());
            years.push(year as i64);
            vehicle.push("vans".to_string());
            road.push(road_type.to_string());
            mileage.push(km * 0.1);
            co2e.push(km * 0.1 * grams_per_km * 1.4 / 1e6);
        }
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("year", Column::Int(years))
        .with_column("vehicle", Column::Str(vehicle))
        .with_column("road", Column::Str(road))
        .with_column("mileage", Column::Float(mileage))
        .with_column("co2e", Column::Float(co2e))
}

fn car_mileage_share_per_engine() -> DataTable {
    let mut vehicle = Vec::new();
    let mut engine = Vec::new();
    let mut euro_class = Vec::new();
    let mut share = Vec::new();
    let gasoline = [0.02, 0.03, 0.05, 0.08, 0.10, 0.15, 0.22];
    let diesel = [0.01, 0.02, 0.03, 0.05, 0.07, 0.08, 0.08];
    for (name, shares) in [("gasoline", &gasoline), ("diesel", &diesel)] {
        for (class, &fraction) in shares.iter().enumerate() {
            vehicle.push("cars".to_string());
            engine.push(name.to_string());
            euro_class.push(format!("EURO {}", class));
            share.push(fraction);
        }
    }
    vehicle.push("cars".to_string());
    engine.push("electric".to_string());
    euro_class.push("EURO 6".to_string());
    share.push(0.01);
    DataTable::new()
        .with_column("vehicle", Column::Str(vehicle))
        .with_column("engine", Column::Str(engine))
        .with_column("euro_class", Column::Str(euro_class))
        .with_column("share", Column::Float(share))
}

fn car_unit_emissions() -> DataTable {
    let mut engine = Vec::new();
    let mut road = Vec::new();
    let mut euro_class = Vec::new();
    let mut co2e = Vec::new();
    let rows: [(&str, &str, [f64; 7]); 4] = [
        (
            "gasoline",
            "urban",
            [220.0, 210.0, 200.0, 190.0, 175.0, 160.0, 150.0],
        ),
        (
            "gasoline",
            "highways",
            [180.0, 172.0, 165.0, 158.0, 150.0, 142.0, 135.0],
        ),
        (
            "diesel",
            "urban",
            [240.0, 225.0, 210.0, 195.0, 180.0, 165.0, 155.0],
        ),
        (
            "diesel",
            "highways",
            [200.0, 190.0, 180.0, 170.0, 160.0, 150.0, 140.0],
        ),
    ];
    for (engine_name, road_type, grams) in rows {
        for (class, &value) in grams.iter().enumerate() {
            engine.push(engine_name.to_string());
            road.push(road_type.to_string());
            euro_class.push(format!("EURO {}", class));
            co2e.push(value);
        }
    }
    DataTable::new()
        .with_column("engine", Column::Str(engine))
        .with_column("road", Column::Str(road))
        .with_column("euro_class", Column::Str(euro_class))
        .with_column("co2e", Column::Float(co2e))
}

fn solar_power_potential() -> DataTable {
    let categories: [(&str, f64, f64); 7] = [
        ("detached_houses", 60.0e6, 4.2e6),
        ("apartment_blocks", 120.0e6, 14.5e6),
        ("office_buildings", 40.0e6, 5.2e6),
        ("commercial_buildings", 30.0e6, 3.1e6),
        ("public_buildings", 18.0e6, 2.1e6),
        ("industrial_buildings", 25.0e6, 2.6e6),
        ("other_buildings", 5.0e6, 0.55e6),
    ];
    let mut municipality = Vec::new();
    let mut building_use = Vec::new();
    let mut energy = Vec::new();
    let mut area = Vec::new();
    for (category, kwh, m2) in categories {
        municipality.push(MUNICIPALITY.to_string());
        building_use.push(category.to_string());
        energy.push(kwh);
        area.push(m2);
    }
    DataTable::new()
        .with_column("municipality", Column::Str(municipality))
        .with_column("building_use", Column::Str(building_use))
        .with_column("yearly_energy_kwh", Column::Float(energy))
        .with_column("floor_area_m2", Column::Float(area))
}

/// A dataset store loaded with every fixture table.
pub fn sample_store() -> MemoryDatasetStore {
    let mut store = MemoryDatasetStore::new();
    store.insert(data::POPULATION_FORECAST, population_forecast());
    store.insert(data::BUILDING_STOCK, building_stock());
    store.insert(data::DISTRICT_HEAT_ENERGY_USE, district_heat_energy_use());
    store.insert(data::DISTRICT_HEATING_PRODUCTION, district_heating_production());
    store.insert(data::DISTRICT_HEATING_FUEL, district_heating_fuel());
    store.insert(data::FUEL_CLASSIFICATION, fuel_classification());
    store.insert(data::ELECTRICITY_CONSUMPTION, electricity_consumption());
    store.insert(data::GHG_EMISSIONS, ghg_emissions());
    store.insert(data::CAR_EMISSIONS, car_emissions());
    store.insert(
        data::CAR_MILEAGE_SHARE_PER_ENGINE,
        car_mileage_share_per_engine(),
    );
    store.insert(data::CAR_UNIT_EMISSIONS, car_unit_emissions());
    store.insert(data::SOLAR_POWER_POTENTIAL, solar_power_potential());
    store
}

/// A scenario session over the full model graph and the fixture datasets.
pub fn sample_session() -> ScenarioSession {
    model::new_session(Arc::new(sample_store()))
}
