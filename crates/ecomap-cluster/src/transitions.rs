//! The zoom-to-level state machine.
//!
//! Raw viewport zoom values are translated into hierarchy transitions
//! through a single pure planning function. Every call site goes
//! through this one gate; a `None` plan means "no band crossed" and
//! must leave all state untouched - idempotence under repeated zoom
//! values is a correctness requirement, not an optimization.

use std::collections::BTreeMap;

use ecomap_types::{ClusterLevel, LatLng, ViewState};

use crate::cluster::{nearest_cluster, RegionCluster};

/// At or below this zoom the map shows municipality clusters.
pub const ZOOM_MUNICIPALITY: f64 = 9.0;
/// Between `ZOOM_MUNICIPALITY` (exclusive) and this (inclusive) the map
/// shows city clusters for the selected municipality.
pub const ZOOM_CITY: f64 = 11.0;
/// Strictly above this zoom the map shows individual facilities.
pub const ZOOM_FACILITY: f64 = 13.0;

/// Facility markers are drawn only inside this inclusive band; outside
/// it they are withheld to avoid marker-count blowup, while the back
/// affordance stays visible.
pub const FACILITY_DISPLAY_MIN: f64 = 11.0;
pub const FACILITY_DISPLAY_MAX: f64 = 14.0;

pub fn facility_markers_visible(zoom: f64) -> bool {
    (FACILITY_DISPLAY_MIN..=FACILITY_DISPLAY_MAX).contains(&zoom)
}

/// A planned level transition. `ToCity` covers both the facility→city
/// step-back (city already selected) and the municipality→city descent
/// (city inferred from the viewport center).
#[derive(Debug, Clone, PartialEq)]
pub enum ZoomTransition {
    ToProvince,
    ToMunicipality { municipality: String },
    ToCity { city: String },
    ToFacilityLevel,
}

/// Decide whether `zoom` crosses a threshold band from the current view
/// state, and into what.
///
/// `center` is the viewport center used for nearest-centroid inference;
/// `have_facilities` reports whether the engine holds cached data.
pub fn plan_zoom_transition(
    zoom: f64,
    view: &ViewState,
    municipality_clusters: &BTreeMap<String, RegionCluster>,
    city_clusters: &BTreeMap<String, RegionCluster>,
    center: Option<LatLng>,
    have_facilities: bool,
) -> Option<ZoomTransition> {
    if zoom <= ZOOM_MUNICIPALITY {
        // Low zoom always means province view, whatever was selected.
        if view.level != ClusterLevel::Province {
            return Some(ZoomTransition::ToProvince);
        }
        return None;
    }

    if zoom <= ZOOM_CITY {
        match view.level {
            ClusterLevel::Facility => {
                // Step back to the already-selected city.
                if view.municipality.is_some() {
                    if let Some(city) = &view.city {
                        return Some(ZoomTransition::ToCity { city: city.clone() });
                    }
                }
            }
            ClusterLevel::Province if have_facilities => {
                // No explicit click to tell us where the user is going;
                // infer the municipality nearest the viewport center.
                let center = center?;
                let nearest = nearest_cluster(municipality_clusters, center)?;
                return Some(ZoomTransition::ToMunicipality {
                    municipality: nearest.name.clone(),
                });
            }
            _ => {}
        }
        return None;
    }

    if zoom > ZOOM_FACILITY {
        if view.municipality.is_none() || !have_facilities {
            return None;
        }
        match view.level {
            ClusterLevel::City if view.city.is_some() => {
                return Some(ZoomTransition::ToFacilityLevel);
            }
            ClusterLevel::Municipality => {
                let center = center?;
                let nearest = nearest_cluster(city_clusters, center)?;
                return Some(ZoomTransition::ToCity {
                    city: nearest.name.clone(),
                });
            }
            _ => {}
        }
    }

    // 11 < zoom <= 13: the city band; nothing to do.
    None
}
