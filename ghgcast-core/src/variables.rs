//! Named configuration values with per-session overrides.
//!
//! Every policy lever the UI exposes is a variable: a name, a typed default
//! and an optional session override. Forecasting functions declare the
//! variable names they read; the computation graph resolves them through a
//! [`ScenarioVariables`] store and folds their values into cache keys.
//!
//! Unknown variable names are programming errors and panic; a wrong-typed
//! override is a configuration error and is rejected.

use crate::errors::{ScenarioError, ScenarioResult};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A typed variable value.
///
/// `Map` holds named percentage sets such as the district heating target
/// production mix. A `BTreeMap` keeps serialization order deterministic,
/// which the cache-key snapshot relies on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(BTreeMap<String, f64>),
}

impl VariableValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            VariableValue::Bool(_) => "bool",
            VariableValue::Int(_) => "int",
            VariableValue::Float(_) => "float",
            VariableValue::Str(_) => "str",
            VariableValue::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VariableValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VariableValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            VariableValue::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Bool(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Int(value)
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Float(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Str(value.to_string())
    }
}

impl From<BTreeMap<String, f64>> for VariableValue {
    fn from(value: BTreeMap<String, f64>) -> Self {
        VariableValue::Map(value)
    }
}

/// Definition of a variable: name, typed default and description.
#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: &'static str,
    pub default: VariableValue,
    pub description: &'static str,
}

impl VariableDef {
    fn new(
        name: &'static str,
        default: impl Into<VariableValue>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            default: default.into(),
            description,
        }
    }
}

fn ratio_map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(name, share)| (name.to_string(), *share))
        .collect()
}

fn defaults() -> Vec<VariableDef> {
    vec![
        VariableDef::new("target_year", 2035_i64, "Last year of every forecast"),
        VariableDef::new(
            "municipality_name",
            "Helsinki",
            "Municipality the statistical series are filtered to",
        ),
        VariableDef::new(
            "population_forecast_correction",
            0.0,
            "Percentage shift of the final forecast-year population",
        ),
        VariableDef::new(
            "population_forecast_vintage",
            2018_i64,
            "Publication year of the official population forecast to use",
        ),
        VariableDef::new(
            "bio_emission_factor",
            0.0,
            "Share of the physical biomass combustion factor counted as emissions \
             (0 = carbon-neutral accounting, 100 = full physical factor, up to 150)",
        ),
        VariableDef::new(
            "district_heating_operator",
            "Helen",
            "District heating operator the production statistics are filtered to",
        ),
        VariableDef::new(
            "district_heating_target_production_ratios",
            ratio_map(&[
                ("heat_pumps", 30.0),
                ("biomass", 30.0),
                ("natural_gas", 30.0),
                ("coal", 10.0),
            ]),
            "Target-year district heat production mix, percentages summing to 100",
        ),
        VariableDef::new(
            "district_heating_heat_pump_cop",
            4.0,
            "Coefficient of performance assumed for district heating heat pumps",
        ),
        VariableDef::new(
            "district_heating_existing_building_efficiency_change",
            0.0,
            "Yearly percentage change of specific heat use in the existing building stock",
        ),
        VariableDef::new(
            "district_heating_new_building_efficiency_change",
            0.0,
            "Yearly percentage change of specific heat use in new construction",
        ),
        VariableDef::new(
            "electricity_consumption_per_capita_adjustment",
            0.0,
            "Yearly percentage adjustment on forecast per-capita electricity consumption",
        ),
        VariableDef::new(
            "solar_power_existing_buildings_percentage",
            30.0,
            "Share of the technical PV potential of existing buildings installed by the target year",
        ),
        VariableDef::new(
            "solar_power_new_buildings_percentage",
            20.0,
            "Share of new construction that installs PV",
        ),
        VariableDef::new(
            "yearly_pv_energy_production_kwh_wp",
            0.9,
            "Yearly PV energy yield per installed peak capacity (kWh/Wp)",
        ),
        VariableDef::new(
            "cars_mileage_per_resident_adjustment",
            0.0,
            "Percentage change of per-resident mileage in the target year",
        ),
        VariableDef::new(
            "cars_bev_percentage",
            30.0,
            "Target share of electric vehicles in the mileage mix by the target year",
        ),
        VariableDef::new(
            "geothermal_heat_pump_cop",
            3.5,
            "Coefficient of performance assumed for geothermal heat pumps",
        ),
        VariableDef::new(
            "geothermal_existing_building_renovation",
            1.0,
            "Yearly percentage of remaining district-heated floor area converting to geothermal",
        ),
        VariableDef::new(
            "geothermal_new_building_installation_share",
            50.0,
            "Percentage of new floor area heated with geothermal from construction",
        ),
        VariableDef::new("geothermal_borehole_depth", 300_i64, "Borehole depth in meters"),
        VariableDef::new(
            "building_area_owned_by_org",
            25.0,
            "Share of the building stock owned by the reporting organization",
        ),
        VariableDef::new(
            "ghg_reductions_reference_year",
            1990_i64,
            "Reference year for the emission reduction requirement",
        ),
        VariableDef::new(
            "ghg_reductions_percentage_in_target_year",
            80.0,
            "Required total emission reduction in the target year, relative to the reference year",
        ),
    ]
}

/// Registered variable definitions, keyed by name.
pub static VARIABLE_DEFAULTS: LazyLock<IndexMap<&'static str, VariableDef>> =
    LazyLock::new(|| defaults().into_iter().map(|def| (def.name, def)).collect());

/// Look up a variable definition by name.
pub fn variable_default(name: &str) -> Option<&'static VariableDef> {
    VARIABLE_DEFAULTS.get(name)
}

pub fn is_registered(name: &str) -> bool {
    VARIABLE_DEFAULTS.contains_key(name)
}

/// Session-scoped variable overrides on top of the registered defaults.
///
/// One store exists per scenario session; concurrent sessions must not share
/// one (isolation is the caller's responsibility, per the request model).
#[derive(Debug, Clone, Default)]
pub struct ScenarioVariables {
    overrides: IndexMap<String, VariableValue>,
}

impl ScenarioVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a variable: the session override if present, else the default.
    ///
    /// Panics on an unknown name; declaring an unregistered variable is a
    /// programming error caught at graph registration time.
    pub fn get(&self, name: &str) -> VariableValue {
        if let Some(value) = self.overrides.get(name) {
            return value.clone();
        }
        variable_default(name)
            .unwrap_or_else(|| panic!("unknown variable '{}'", name))
            .default
            .clone()
    }

    /// Override a variable for this session.
    ///
    /// The value's type must match the default's type. Setting a value equal
    /// to the default clears the override instead of persisting a no-op.
    pub fn set(&mut self, name: &str, value: impl Into<VariableValue>) -> ScenarioResult<()> {
        let value = value.into();
        let def = variable_default(name)
            .ok_or_else(|| ScenarioError::UnknownVariable(name.to_string()))?;
        if value.type_name() != def.default.type_name() {
            return Err(ScenarioError::VariableTypeMismatch {
                name: name.to_string(),
                expected: def.default.type_name(),
                got: value.type_name(),
            });
        }
        if value == def.default {
            self.overrides.shift_remove(name);
        } else {
            self.overrides.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolution() {
        let vars = ScenarioVariables::new();
        assert_eq!(vars.get("target_year"), VariableValue::Int(2035));
        assert_eq!(
            vars.get("municipality_name"),
            VariableValue::Str("Helsinki".to_string())
        );
    }

    #[test]
    fn override_shadows_default() {
        let mut vars = ScenarioVariables::new();
        vars.set("population_forecast_correction", 5.0).unwrap();
        assert_eq!(
            vars.get("population_forecast_correction"),
            VariableValue::Float(5.0)
        );
        assert!(vars.has_override("population_forecast_correction"));
    }

    #[test]
    fn setting_default_clears_override() {
        let mut vars = ScenarioVariables::new();
        vars.set("population_forecast_correction", 5.0).unwrap();
        vars.set("population_forecast_correction", 0.0).unwrap();
        assert!(!vars.has_override("population_forecast_correction"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut vars = ScenarioVariables::new();
        let err = vars.set("target_year", 2040.0).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::VariableTypeMismatch { .. }
        ));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let mut vars = ScenarioVariables::new();
        let err = vars.set("no_such_variable", 1.0).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownVariable(_)));
    }

    #[test]
    #[should_panic(expected = "unknown variable")]
    fn unknown_get_panics() {
        ScenarioVariables::new().get("no_such_variable");
    }

    #[test]
    fn production_ratio_default_sums_to_100() {
        let vars = ScenarioVariables::new();
        let ratios = vars.get("district_heating_target_production_ratios");
        let sum: f64 = ratios.as_map().unwrap().values().sum();
        assert_eq!(sum, 100.0);
    }
}
