//! The recycling facility record as delivered by the `/locations` REST
//! endpoint. Field names follow the wire's camelCase.
//!
//! Facilities are caller-owned input: the clustering engine reads and
//! groups them but never mutates the canonical records. `distance_km`
//! is only ever populated on working copies produced by the filter
//! pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,

    // Location info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    // Contact / operation details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    // Classification
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub facility_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,

    /// Which materials the facility accepts, keyed by material name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_materials: Option<BTreeMap<String, bool>>,

    /// Distance from the user in km. Derived, never on canonical records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Facility {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// Whether the facility accepts the named material.
    pub fn accepts(&self, material: &str) -> bool {
        self.accepted_materials
            .as_ref()
            .and_then(|m| m.get(material))
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_wire_shape() {
        let json = r#"{
            "id": 7,
            "name": "Sandton Recycling Depot",
            "latitude": -26.1,
            "longitude": 28.05,
            "municipality": "Johannesburg",
            "city": "Sandton",
            "type": "drop-off",
            "acceptedMaterials": {"glass": true, "paper": false}
        }"#;

        let facility: Facility = serde_json::from_str(json).unwrap();
        assert_eq!(facility.id, 7);
        assert_eq!(facility.facility_type.as_deref(), Some("drop-off"));
        assert!(facility.accepts("glass"));
        assert!(!facility.accepts("paper"));
        assert!(!facility.accepts("e-waste"));
        assert_eq!(facility.distance_km, None);
    }

    #[test]
    fn position_matches_coordinates() {
        let facility: Facility = serde_json::from_str(
            r#"{"id": 1, "name": "x", "latitude": -26.0, "longitude": 27.9}"#,
        )
        .unwrap();
        assert_eq!(facility.position(), LatLng::new(-26.0, 27.9));
    }
}
