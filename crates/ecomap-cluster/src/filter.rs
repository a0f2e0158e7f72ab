//! Facility filtering.
//!
//! Applies user-selected criteria to the raw facility list before it is
//! handed to the engine: facility type, accepted materials, and a
//! radius around the user's location. Filtering never mutates the
//! source list; it returns working copies, with `distance_km` attached
//! when a user location is known.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ecomap_types::{haversine_distance_m, Facility, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending distance from the user location; facilities without a
    /// computable distance sort last. Falls back to name order when no
    /// user location is set.
    #[default]
    Nearest,
    Name,
}

/// Criteria applied by [`FacilityFilters::apply`]. Empty criteria pass
/// everything through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacilityFilters {
    /// Keep facilities whose type matches any of these (case
    /// insensitive). Empty means no type filtering.
    pub types: Vec<String>,
    /// Keep facilities accepting ALL of these materials.
    pub materials: Vec<String>,
    pub user_location: Option<LatLng>,
    /// Radius around `user_location`, in kilometres. Ignored without a
    /// user location.
    pub radius_km: Option<f64>,
    pub sort_by: SortOrder,
}

impl FacilityFilters {
    /// Filter and sort `facilities` per the criteria. Distances are
    /// computed once and attached to the returned copies.
    pub fn apply(&self, facilities: &[Facility]) -> Vec<Facility> {
        let mut kept: Vec<Facility> = facilities
            .iter()
            .filter(|f| self.matches_type(f) && self.matches_materials(f))
            .cloned()
            .collect();

        if let Some(user) = self.user_location {
            for facility in &mut kept {
                let metres = haversine_distance_m(user, facility.position());
                facility.distance_km = Some(metres / 1000.0);
            }
            if let Some(radius_km) = self.radius_km {
                kept.retain(|f| matches!(f.distance_km, Some(d) if d <= radius_km));
            }
        }

        match self.sort_by {
            SortOrder::Nearest if self.user_location.is_some() => {
                kept.sort_by(|a, b| {
                    let da = a.distance_km.unwrap_or(f64::INFINITY);
                    let db = b.distance_km.unwrap_or(f64::INFINITY);
                    da.total_cmp(&db)
                });
            }
            _ => kept.sort_by(|a, b| a.name.cmp(&b.name)),
        }

        debug!(kept = kept.len(), total = facilities.len(), "filters applied");
        kept
    }

    fn matches_type(&self, facility: &Facility) -> bool {
        if self.types.is_empty() {
            return true;
        }
        let Some(facility_type) = facility.facility_type.as_deref() else {
            return false;
        };
        self.types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(facility_type))
    }

    fn matches_materials(&self, facility: &Facility) -> bool {
        self.materials.iter().all(|m| facility.accepts(m))
    }
}
