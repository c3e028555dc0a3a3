//! Dataset catalog keys and the column layout each consumer expects.
//!
//! The engine treats every dataset as an immutable long-format table.
//! Column conventions:
//! - `municipality`, `operator`: string filters
//! - `year`: integer calendar year
//! - `value` columns: f64 in the unit stated below

/// Official population forecast by municipality.
/// Columns: `municipality`, `year`, `age_group`, `sex`, `vintage` (int,
/// publication year), `scenario`, `population`.
pub const POPULATION_FORECAST: &str = "population_forecast";

/// Building stock floor area by use category.
/// Columns: `municipality`, `year`, `building_use`, `unit`
/// (`floor_area_m2`), `value` (m2). Contains an `all_buildings` total row
/// per year.
pub const BUILDING_STOCK: &str = "building_stock";

/// District heat consumption statistics.
/// Columns: `municipality`, `year`, `energy_form` (`district_heat`),
/// `quantity` (`consumption_total_gwh`, `specific_consumption_raw`,
/// `specific_consumption_weather_corrected`), `value`.
pub const DISTRICT_HEAT_ENERGY_USE: &str = "district_heat_energy_use";

/// District heat production by operator.
/// Columns: `operator`, `year`, `quantity` (`heat_demand`,
/// `heat_pump_production`, `network_losses`, `total_production`,
/// `chp_electricity_production`, `purchases`), `value` (GWh).
pub const DISTRICT_HEATING_PRODUCTION: &str = "district_heating_production";

/// Fuels used for district heat and CHP electricity production.
/// Columns: `operator`, `year`, `fuel`, `fuel_code` (statistical fuel
/// classification code, empty for the `total` reconciliation row),
/// `value` (GWh).
pub const DISTRICT_HEATING_FUEL: &str = "district_heating_fuel";

/// Statistical fuel classification.
/// Columns: `fuel_code`, `co2e_emission_factor` (t/TJ), `is_bio`.
pub const FUEL_CLASSIFICATION: &str = "fuel_classification";

/// Consumer electricity consumption.
/// Columns: `municipality`, `year`, `sector` (`consumer_electricity`),
/// `quantity` (`total_gwh`), `value`.
pub const ELECTRICITY_CONSUMPTION: &str = "electricity_consumption";

/// Greenhouse-gas emission statistics by sector.
/// Columns: `municipality`, `year`, `sector1`, `sector2` (empty when not
/// applicable), `emissions` (kt CO2e), `energy_consumption` (GWh, zero when
/// not applicable).
pub const GHG_EMISSIONS: &str = "ghg_emissions";

/// Road traffic performance and emissions by municipality.
/// Columns: `municipality`, `year`, `vehicle`, `road` (`urban`,
/// `highways`), `mileage` (km/a), `co2e` (t/a).
pub const CAR_EMISSIONS: &str = "car_emissions";

/// Mileage share per engine type and emission class.
/// Columns: `vehicle`, `engine` (`gasoline`, `diesel`, `electric`),
/// `euro_class` (`EURO 0`..`EURO 6`), `share` (fraction of total mileage).
pub const CAR_MILEAGE_SHARE_PER_ENGINE: &str = "car_mileage_share_per_engine";

/// Per-kilometre unit emissions by engine, road and emission class.
/// Columns: `engine`, `road`, `euro_class`, `co2e` (g/km). Electric
/// vehicles are absent: their unit emissions are derived from the grid
/// emission factor.
pub const CAR_UNIT_EMISSIONS: &str = "car_unit_emissions";

/// Rooftop photovoltaic potential by building use category.
/// Columns: `municipality`, `building_use`, `yearly_energy_kwh` (kWh/a of
/// producible energy), `floor_area_m2`.
pub const SOLAR_POWER_POTENTIAL: &str = "solar_power_potential";
