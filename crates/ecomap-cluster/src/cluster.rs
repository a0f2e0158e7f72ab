//! Region cluster construction.
//!
//! Clusters are derived and ephemeral: rebuilt from scratch on every
//! pass over the facility cache, never mutated incrementally, and carry
//! no identity across passes. Facilities missing the grouping field are
//! silently skipped - that is policy, not an error.

use std::collections::BTreeMap;

use ecomap_types::{haversine_distance_m, Facility, LatLng, LatLngBounds};

/// A grouping of facilities sharing a municipality or city name.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCluster {
    pub name: String,
    pub count: usize,
    pub facilities: Vec<Facility>,
    pub bounds: LatLngBounds,
    pub center: LatLng,
}

impl RegionCluster {
    fn seed(name: &str, facility: &Facility) -> Self {
        let position = facility.position();
        Self {
            name: name.to_string(),
            count: 1,
            facilities: vec![facility.clone()],
            bounds: LatLngBounds::from_point(position),
            center: position,
        }
    }

    fn absorb(&mut self, facility: &Facility) {
        self.count += 1;
        self.facilities.push(facility.clone());
        self.bounds.extend(facility.position());
        self.center = self.bounds.center();
    }
}

/// Partition facilities by municipality. Facilities without a
/// municipality are excluded.
pub fn cluster_by_municipality(facilities: &[Facility]) -> BTreeMap<String, RegionCluster> {
    let mut clusters: BTreeMap<String, RegionCluster> = BTreeMap::new();
    for facility in facilities {
        let Some(municipality) = facility.municipality.as_deref() else {
            continue;
        };
        match clusters.get_mut(municipality) {
            Some(cluster) => cluster.absorb(facility),
            None => {
                clusters.insert(
                    municipality.to_string(),
                    RegionCluster::seed(municipality, facility),
                );
            }
        }
    }
    clusters
}

/// Partition the selected municipality's facilities by city.
/// Facilities outside the municipality or without a city are excluded.
pub fn cluster_by_city(
    facilities: &[Facility],
    municipality: &str,
) -> BTreeMap<String, RegionCluster> {
    let mut clusters: BTreeMap<String, RegionCluster> = BTreeMap::new();
    for facility in facilities {
        if facility.municipality.as_deref() != Some(municipality) {
            continue;
        }
        let Some(city) = facility.city.as_deref() else {
            continue;
        };
        match clusters.get_mut(city) {
            Some(cluster) => cluster.absorb(facility),
            None => {
                clusters.insert(city.to_string(), RegionCluster::seed(city, facility));
            }
        }
    }
    clusters
}

/// The cluster whose centroid is closest to `point`. Equal distances
/// resolve to the alphabetically first name (BTreeMap iteration order).
pub fn nearest_cluster<'a>(
    clusters: &'a BTreeMap<String, RegionCluster>,
    point: LatLng,
) -> Option<&'a RegionCluster> {
    let mut best: Option<(&RegionCluster, f64)> = None;
    for cluster in clusters.values() {
        let distance = haversine_distance_m(point, cluster.center);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((cluster, distance)),
        }
    }
    best.map(|(cluster, _)| cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn facility(id: i64, municipality: &str, city: &str, lat: f64, lng: f64) -> Facility {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Facility {id}"),
            "latitude": lat,
            "longitude": lng,
            "municipality": municipality,
            "city": city,
        }))
        .unwrap()
    }

    fn gauteng_fixture() -> Vec<Facility> {
        vec![
            facility(1, "Johannesburg", "Sandton", -26.1, 28.0),
            facility(2, "Johannesburg", "Randburg", -26.0, 27.9),
            facility(3, "Pretoria", "Centurion", -25.8, 28.1),
        ]
    }

    #[test]
    fn partitions_by_municipality() {
        let clusters = cluster_by_municipality(&gauteng_fixture());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters["Johannesburg"].count, 2);
        assert_eq!(clusters["Pretoria"].count, 1);
    }

    #[test]
    fn municipality_cluster_grows_bounds_and_recenters() {
        let clusters = cluster_by_municipality(&gauteng_fixture());
        let jhb = &clusters["Johannesburg"];

        assert_eq!(jhb.bounds.south, -26.1);
        assert_eq!(jhb.bounds.north, -26.0);
        assert!((jhb.center.lat - -26.05).abs() < 1e-9);
        assert!((jhb.center.lng - 27.95).abs() < 1e-9);
    }

    #[test]
    fn city_clustering_is_scoped_to_the_municipality() {
        let clusters = cluster_by_city(&gauteng_fixture(), "Johannesburg");

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters["Sandton"].count, 1);
        assert_eq!(clusters["Randburg"].count, 1);
        assert!(!clusters.contains_key("Centurion"));
    }

    #[test]
    fn facilities_without_grouping_field_are_skipped() {
        let mut facilities = gauteng_fixture();
        facilities.push(
            serde_json::from_value(serde_json::json!({
                "id": 4,
                "name": "Unmapped depot",
                "latitude": -26.2,
                "longitude": 28.2,
            }))
            .unwrap(),
        );

        let clusters = cluster_by_municipality(&facilities);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn nearest_cluster_picks_minimum_distance() {
        let clusters = cluster_by_municipality(&gauteng_fixture());

        let near_pretoria = LatLng::new(-25.79, 28.11);
        let nearest = nearest_cluster(&clusters, near_pretoria).unwrap();
        assert_eq!(nearest.name, "Pretoria");
    }

    #[test]
    fn nearest_cluster_ties_resolve_alphabetically() {
        let facilities = vec![
            facility(1, "Alpha", "A", -26.0, 27.75),
            facility(2, "Beta", "B", -26.0, 28.25),
        ];
        let clusters = cluster_by_municipality(&facilities);

        // Equidistant from both centroids: the offsets are exactly
        // representable in f64, so the haversine distances are
        // bitwise-equal and the tie is genuine.
        let midpoint = LatLng::new(-26.0, 28.0);
        let nearest = nearest_cluster(&clusters, midpoint).unwrap();
        assert_eq!(nearest.name, "Alpha");
    }

    #[test]
    fn nearest_cluster_of_empty_map_is_none() {
        let clusters = BTreeMap::new();
        assert!(nearest_cluster(&clusters, LatLng::new(0.0, 0.0)).is_none());
    }
}
