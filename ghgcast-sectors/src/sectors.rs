//! The emission sector taxonomy.
//!
//! A two-level hierarchy: main sectors, with building heating split into
//! heat-source subsectors. Leaf keys are globally unique; a sector without
//! subsectors is itself a leaf for aggregation purposes. Each sector carries
//! a display name and a chart color.

use serde::Serialize;

/// A sector or subsector definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectorDef {
    /// Globally unique key, used as a ledger column name.
    pub key: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub subsectors: &'static [SectorDef],
}

/// Heat-source subsectors of building heating.
pub const HEATING_SUBSECTORS: &[SectorDef] = &[
    SectorDef {
        key: "district_heat",
        name: "District heat",
        color: "#fd4f00",
        subsectors: &[],
    },
    SectorDef {
        key: "oil_heating",
        name: "Oil heating",
        color: "#bd2719",
        subsectors: &[],
    },
    SectorDef {
        key: "electricity_heating",
        name: "Electric heating",
        color: "#0072c6",
        subsectors: &[],
    },
    SectorDef {
        key: "geothermal_heating",
        name: "Geothermal heating",
        color: "#009246",
        subsectors: &[],
    },
];

/// The main sector taxonomy.
pub const SECTORS: &[SectorDef] = &[
    SectorDef {
        key: "building_heating",
        name: "Building heating",
        color: "#fd4f00",
        subsectors: HEATING_SUBSECTORS,
    },
    SectorDef {
        key: "transportation",
        name: "Transportation",
        color: "#00d7a7",
        subsectors: &[],
    },
    SectorDef {
        key: "electricity_consumption",
        name: "Consumer electricity",
        color: "#9fc9eb",
        subsectors: &[],
    },
    SectorDef {
        key: "waste",
        name: "Waste treatment",
        color: "#ffe977",
        subsectors: &[],
    },
    SectorDef {
        key: "industry",
        name: "Industry and machinery",
        color: "#f5a3c7",
        subsectors: &[],
    },
    SectorDef {
        key: "agriculture",
        name: "Agriculture",
        color: "#ffc61e",
        subsectors: &[],
    },
];

/// All leaf sectors in taxonomy order.
///
/// A main sector with subsectors is represented by its leaves; one without
/// any is a leaf itself.
pub fn leaf_sectors() -> Vec<&'static SectorDef> {
    let mut leaves = Vec::new();
    for sector in SECTORS {
        if sector.subsectors.is_empty() {
            leaves.push(sector);
        } else {
            leaves.extend(sector.subsectors.iter());
        }
    }
    leaves
}

/// Find a sector by key, returning `(main, subsector)`.
pub fn find_sector(key: &str) -> Option<(&'static SectorDef, Option<&'static SectorDef>)> {
    for sector in SECTORS {
        if sector.key == key {
            return Some((sector, None));
        }
        for subsector in sector.subsectors {
            if subsector.key == key {
                return Some((sector, Some(subsector)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn leaf_keys_are_unique() {
        let leaves = leaf_sectors();
        let keys: HashSet<&str> = leaves.iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), leaves.len());
        assert_eq!(leaves.len(), 9);
    }

    #[test]
    fn taxonomy_serializes_for_the_ui_layer() {
        let json = serde_json::to_value(SECTORS).unwrap();
        let first = &json[0];
        assert_eq!(first["key"], "building_heating");
        assert_eq!(first["subsectors"][0]["key"], "district_heat");
        assert!(first["color"].as_str().unwrap().starts_with('#'));
    }

    #[test]
    fn subsector_lookup_returns_parent() {
        let (main, sub) = find_sector("district_heat").unwrap();
        assert_eq!(main.key, "building_heating");
        assert_eq!(sub.unwrap().name, "District heat");

        let (main, sub) = find_sector("waste").unwrap();
        assert_eq!(main.key, "waste");
        assert!(sub.is_none());

        assert!(find_sector("nonexistent").is_none());
    }
}
