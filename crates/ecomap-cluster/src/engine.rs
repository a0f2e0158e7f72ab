//! The clustering engine.
//!
//! Owns the facility cache, a mirror of the current view state, the
//! live marker handles, both derived cluster maps, and the bounded
//! navigation history. All mutation is single-threaded and synchronous;
//! shared ownership (`Rc<RefCell<..>>`) exists only so viewport zoom
//! callbacks and the context-store subscription can reach the engine.
//!
//! Re-entrancy invariant: the engine updates its mirrored view state
//! BEFORE writing to the context store, and flags the write so its own
//! subscription skips the resulting broadcast. External store writes
//! flow through the subscription's change detection and trigger exactly
//! one recluster. Both guards are required for correctness - the store
//! broadcasts synchronously, so an unguarded subscriber that wrote back
//! to the store would loop forever.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use ecomap_types::{ClusterLevel, Facility, GeographicContext, ViewState};

use crate::cluster::{cluster_by_city, cluster_by_municipality, RegionCluster};
use crate::history::{HistoryEntry, NavigationHistory};
use crate::store::{GeographicContextStore, SubscriptionId};
use crate::transitions::{facility_markers_visible, plan_zoom_transition, ZoomTransition};
use crate::viewport::{MarkerFactory, MarkerHandle, MarkerKind, MarkerSpec, Viewport};

/// Padding applied when fitting the viewport to a clicked cluster.
const CLUSTER_FIT_PADDING_PX: u32 = 50;

type StateListener = dyn Fn(&ViewState);

struct EngineState {
    viewport: Option<Rc<dyn Viewport>>,
    marker_factory: Option<Rc<dyn MarkerFactory>>,
    on_facility_select: Option<Rc<dyn Fn(&Facility)>>,
    cache: Vec<Facility>,
    view: ViewState,
    municipality_clusters: BTreeMap<String, RegionCluster>,
    city_clusters: BTreeMap<String, RegionCluster>,
    markers: Vec<Box<dyn MarkerHandle>>,
    history: NavigationHistory,
}

impl EngineState {
    fn new() -> Self {
        Self {
            viewport: None,
            marker_factory: None,
            on_facility_select: None,
            cache: Vec::new(),
            view: ViewState::default(),
            municipality_clusters: BTreeMap::new(),
            city_clusters: BTreeMap::new(),
            markers: Vec::new(),
            history: NavigationHistory::new(),
        }
    }

    fn clear_markers(&mut self) {
        for marker in &mut self.markers {
            marker.detach();
        }
        self.markers.clear();
    }

    /// Snapshot {view, zoom, bounds} before a level transition.
    fn push_history_snapshot(&mut self) {
        let zoom = self.viewport.as_ref().and_then(|v| v.zoom());
        let bounds = self.viewport.as_ref().and_then(|v| v.bounds());
        self.history
            .push(HistoryEntry::from_view(&self.view, zoom, bounds));
    }

    fn apply_transition(&mut self, plan: &ZoomTransition) {
        match plan {
            ZoomTransition::ToProvince => {
                self.view.level = ClusterLevel::Province;
                self.view.municipality = None;
                self.view.city = None;
            }
            ZoomTransition::ToMunicipality { municipality } => {
                self.view.level = ClusterLevel::Municipality;
                self.view.municipality = Some(municipality.clone());
                self.view.city = None;
            }
            ZoomTransition::ToCity { city } => {
                self.view.level = ClusterLevel::City;
                self.view.city = Some(city.clone());
            }
            ZoomTransition::ToFacilityLevel => {
                self.view.level = ClusterLevel::Facility;
            }
        }
    }

    /// Mirror an externally-updated context into the view state.
    /// Returns whether anything rendering-relevant changed - the guard
    /// that keeps context broadcasts from re-clustering redundantly.
    fn sync_from_context(&mut self, context: &GeographicContext) -> bool {
        let view = &mut self.view;
        match context.level {
            ClusterLevel::Province => {
                let changed = view.level != ClusterLevel::Province;
                view.level = ClusterLevel::Province;
                view.municipality = None;
                view.city = None;
                changed
            }
            ClusterLevel::Municipality => {
                let changed = view.level != ClusterLevel::Municipality
                    || view.municipality != context.municipality_name;
                view.level = ClusterLevel::Municipality;
                view.municipality = context.municipality_name.clone();
                view.city = None;
                changed
            }
            ClusterLevel::City => {
                let changed =
                    view.level != ClusterLevel::City || view.city != context.city_name;
                view.level = ClusterLevel::City;
                view.municipality = context.municipality_name.clone();
                view.city = context.city_name.clone();
                changed
            }
            ClusterLevel::Facility => {
                // Facility level keeps the city context.
                let changed = view.level != ClusterLevel::Facility;
                view.level = ClusterLevel::Facility;
                view.municipality = context.municipality_name.clone();
                view.city = context.city_name.clone();
                changed
            }
        }
    }
}

struct EngineShared {
    state: RefCell<EngineState>,
    state_listeners: RefCell<Vec<(SubscriptionId, Rc<StateListener>)>>,
    next_listener_id: Cell<u64>,
    /// Set while the engine writes to the context store, so its own
    /// subscription treats the broadcast as already handled.
    self_update: Cell<bool>,
}

/// Turns the cached facility list plus the current geographic context
/// into rendered map markers, and translates raw viewport zoom changes
/// into context-level transitions.
pub struct ClusteringEngine {
    store: Rc<GeographicContextStore>,
    shared: Rc<EngineShared>,
    store_subscription: SubscriptionId,
}

impl ClusteringEngine {
    /// Create an engine bound to `store`. Rendering starts once
    /// [`initialize`](Self::initialize) supplies the drawing surfaces.
    pub fn new(store: Rc<GeographicContextStore>) -> Self {
        let shared = Rc::new(EngineShared {
            state: RefCell::new(EngineState::new()),
            state_listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(0),
            self_update: Cell::new(false),
        });

        let weak = Rc::downgrade(&shared);
        let store_subscription = store.subscribe(move |context| {
            let Some(shared) = weak.upgrade() else { return };
            if shared.self_update.get() {
                return;
            }
            let changed = {
                let mut state = shared.state.borrow_mut();
                if state.viewport.is_none() || state.cache.is_empty() {
                    return;
                }
                state.sync_from_context(context)
            };
            if changed {
                apply_clustering(&shared);
            }
        });

        Self {
            store,
            shared,
            store_subscription,
        }
    }

    /// Bind the engine to a viewport and marker factory, reset to
    /// province level, and register the zoom listener.
    pub fn initialize(
        &self,
        viewport: Rc<dyn Viewport>,
        marker_factory: Rc<dyn MarkerFactory>,
        on_facility_select: impl Fn(&Facility) + 'static,
    ) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.viewport = Some(Rc::clone(&viewport));
            state.marker_factory = Some(marker_factory);
            state.on_facility_select = Some(Rc::new(on_facility_select));
            state.view = ViewState::default();
        }
        self.write_store(|store| store.go_to_province(None));

        let weak = Rc::downgrade(&self.shared);
        let store = Rc::clone(&self.store);
        viewport.on_zoom_changed(Box::new(move |zoom| {
            if let Some(shared) = weak.upgrade() {
                handle_zoom(&shared, &store, zoom);
            }
        }));
    }

    /// Replace the facility cache and recompute the cluster view.
    pub fn set_facilities(&self, facilities: Vec<Facility>) {
        debug!(count = facilities.len(), "facility cache replaced");
        self.shared.state.borrow_mut().cache = facilities;
        apply_clustering(&self.shared);
    }

    /// Recompute clusters and markers from the cached facilities and
    /// the current view state. Idempotent: repeated calls with no state
    /// change render an identical marker set.
    pub fn recluster(&self) {
        apply_clustering(&self.shared);
    }

    /// Feed a viewport zoom value through the transition gate. Returns
    /// whether a level transition occurred, so the caller can decide
    /// whether to re-fit the viewport. No-band-crossed calls are no-ops.
    pub fn handle_zoom_change(&self, zoom: f64) -> bool {
        handle_zoom(&self.shared, &self.store, zoom)
    }

    /// Route a marker click from the embedding UI.
    pub fn handle_marker_click(&self, kind: MarkerKind) {
        match kind {
            MarkerKind::MunicipalityCluster { name } => self.drill_into_municipality(&name),
            MarkerKind::CityCluster { name } => self.drill_into_city(&name),
            MarkerKind::Facility { id } => self.select_facility(id),
        }
    }

    /// Return to the previous state. The internal history stack is
    /// authoritative - it remembers exact viewport zoom/bounds, which
    /// the context store does not. Only with an exhausted stack does
    /// this fall back to the store's hierarchical walk.
    pub fn go_back(&self) -> bool {
        let entry = self.shared.state.borrow_mut().history.pop();
        let Some(entry) = entry else {
            return self.store.go_back();
        };

        debug!(level = %entry.level, "restoring history entry");
        {
            let mut state = self.shared.state.borrow_mut();
            state.view.level = entry.level;
            state.view.municipality = entry.municipality.clone();
            state.view.city = entry.city.clone();
        }
        self.write_store(|store| match entry.level {
            ClusterLevel::Province => store.go_to_province(None),
            ClusterLevel::Municipality => {
                if let Some(municipality) = &entry.municipality {
                    store.go_to_municipality(municipality);
                }
            }
            ClusterLevel::City | ClusterLevel::Facility => {
                if let Some(city) = &entry.city {
                    store.go_to_city(city);
                }
            }
        });
        apply_clustering(&self.shared);

        let viewport = self.shared.state.borrow().viewport.clone();
        if let Some(viewport) = viewport {
            if let Some(bounds) = entry.bounds {
                viewport.fit_bounds(&bounds, 0);
            } else if let Some(zoom) = entry.zoom {
                viewport.set_zoom(zoom);
            }
        }
        emit_state(&self.shared);
        true
    }

    /// Clear markers, cluster maps and history, and return to province
    /// level in both the engine and the context store.
    pub fn reset(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.clear_markers();
            state.municipality_clusters.clear();
            state.city_clusters.clear();
            state.history.clear();
            state.view = ViewState::default();
            if let Some(viewport) = &state.viewport {
                viewport.set_back_control(false);
            }
        }
        self.write_store(|store| store.go_to_province(None));
    }

    /// Snapshot of the current view state.
    pub fn view_state(&self) -> ViewState {
        self.shared.state.borrow().view.clone()
    }

    pub fn has_history(&self) -> bool {
        !self.shared.state.borrow().history.is_empty()
    }

    /// Register a listener fired after every engine-initiated level
    /// transition, for UI panels summarizing the current view.
    pub fn on_state_changed(&self, listener: impl Fn(&ViewState) + 'static) -> SubscriptionId {
        let id = SubscriptionId::new(self.shared.next_listener_id.get());
        self.shared.next_listener_id.set(self.shared.next_listener_id.get() + 1);
        self.shared
            .state_listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn remove_state_listener(&self, id: SubscriptionId) {
        self.shared
            .state_listeners
            .borrow_mut()
            .retain(|(lid, _)| *lid != id);
    }

    fn drill_into_municipality(&self, name: &str) {
        let bounds = {
            let state = self.shared.state.borrow();
            state.municipality_clusters.get(name).map(|c| c.bounds)
        };
        let Some(bounds) = bounds else { return };

        {
            let mut state = self.shared.state.borrow_mut();
            state.push_history_snapshot();
            state.view.level = ClusterLevel::Municipality;
            state.view.municipality = Some(name.to_string());
            state.view.city = None;
        }
        if let Some(viewport) = self.viewport() {
            viewport.fit_bounds(&bounds, CLUSTER_FIT_PADDING_PX);
        }
        self.write_store(|store| store.go_to_municipality(name));
        apply_clustering(&self.shared);
        emit_state(&self.shared);
    }

    fn drill_into_city(&self, name: &str) {
        let bounds = {
            let state = self.shared.state.borrow();
            state.city_clusters.get(name).map(|c| c.bounds)
        };
        let Some(bounds) = bounds else { return };

        {
            let mut state = self.shared.state.borrow_mut();
            state.push_history_snapshot();
            state.view.level = ClusterLevel::City;
            state.view.city = Some(name.to_string());
        }
        if let Some(viewport) = self.viewport() {
            viewport.fit_bounds(&bounds, CLUSTER_FIT_PADDING_PX);
        }
        self.write_store(|store| store.go_to_city(name));
        apply_clustering(&self.shared);
        emit_state(&self.shared);
    }

    fn select_facility(&self, id: i64) {
        let (facility, callback) = {
            let state = self.shared.state.borrow();
            (
                state.cache.iter().find(|f| f.id == id).cloned(),
                state.on_facility_select.clone(),
            )
        };
        let Some(facility) = facility else { return };

        if let Some(callback) = callback {
            callback(&facility);
        }
        {
            let mut state = self.shared.state.borrow_mut();
            state.push_history_snapshot();
            state.view.level = ClusterLevel::Facility;
        }
        self.write_store(|store| store.go_to_facility(id));
        emit_state(&self.shared);
    }

    fn viewport(&self) -> Option<Rc<dyn Viewport>> {
        self.shared.state.borrow().viewport.clone()
    }

    fn write_store(&self, f: impl FnOnce(&GeographicContextStore)) {
        write_store(&self.shared, &self.store, f);
    }
}

impl Drop for ClusteringEngine {
    fn drop(&mut self) {
        self.store.unsubscribe(self.store_subscription);
    }
}

/// Run a context-store write with the engine's subscription muted.
/// The mirror must already reflect the write.
fn write_store(
    shared: &EngineShared,
    store: &GeographicContextStore,
    f: impl FnOnce(&GeographicContextStore),
) {
    shared.self_update.set(true);
    f(store);
    shared.self_update.set(false);
}

fn handle_zoom(shared: &Rc<EngineShared>, store: &GeographicContextStore, zoom: f64) -> bool {
    let plan = {
        let state = shared.state.borrow();
        if state.viewport.is_none() {
            return false;
        }
        let center = state.viewport.as_ref().and_then(|v| v.center());
        plan_zoom_transition(
            zoom,
            &state.view,
            &state.municipality_clusters,
            &state.city_clusters,
            center,
            !state.cache.is_empty(),
        )
    };
    let Some(plan) = plan else { return false };
    debug!(zoom, ?plan, "zoom crossed a threshold band");

    {
        let mut state = shared.state.borrow_mut();
        state.push_history_snapshot();
        state.apply_transition(&plan);
    }
    write_store(shared, store, |store| match &plan {
        ZoomTransition::ToProvince => store.go_to_province(None),
        ZoomTransition::ToMunicipality { municipality } => store.go_to_municipality(municipality),
        ZoomTransition::ToCity { city } => store.go_to_city(city),
        ZoomTransition::ToFacilityLevel => {
            // No facility is selected by zooming; the store stays at
            // city level with the current selection while the engine
            // renders individual facilities.
            let city = shared.state.borrow().view.city.clone();
            if let Some(city) = city {
                store.go_to_city(&city);
            }
        }
    });
    apply_clustering(shared);
    emit_state(shared);
    true
}

/// Rebuild the applicable cluster partition and replace the rendered
/// markers. Dispatches on the mirrored level; no-ops without a bound
/// viewport and marker factory.
fn apply_clustering(shared: &EngineShared) {
    let mut guard = shared.state.borrow_mut();
    let state = &mut *guard;
    state.clear_markers();

    let Some(viewport) = state.viewport.clone() else { return };
    let Some(factory) = state.marker_factory.clone() else { return };
    viewport.set_back_control(false);

    match state.view.level {
        ClusterLevel::Province => {
            state.municipality_clusters = cluster_by_municipality(&state.cache);
            debug!(
                clusters = state.municipality_clusters.len(),
                "rendering municipality clusters"
            );
            for cluster in state.municipality_clusters.values() {
                state.markers.push(factory.create(cluster_spec(
                    cluster,
                    MarkerKind::MunicipalityCluster {
                        name: cluster.name.clone(),
                    },
                )));
            }
        }
        ClusterLevel::Municipality => {
            let Some(municipality) = state.view.municipality.clone() else { return };
            state.city_clusters = cluster_by_city(&state.cache, &municipality);
            debug!(
                clusters = state.city_clusters.len(),
                municipality, "rendering city clusters"
            );
            for cluster in state.city_clusters.values() {
                state.markers.push(factory.create(cluster_spec(
                    cluster,
                    MarkerKind::CityCluster {
                        name: cluster.name.clone(),
                    },
                )));
            }
            viewport.set_back_control(true);
        }
        ClusterLevel::City | ClusterLevel::Facility => {
            let (Some(municipality), Some(city)) =
                (state.view.municipality.clone(), state.view.city.clone())
            else {
                return;
            };
            viewport.set_back_control(true);

            let visible = viewport.zoom().map(facility_markers_visible);
            if visible != Some(true) {
                debug!("facility markers withheld outside the display band");
                return;
            }
            for facility in state.cache.iter().filter(|f| {
                f.municipality.as_deref() == Some(municipality.as_str())
                    && f.city.as_deref() == Some(city.as_str())
            }) {
                state.markers.push(factory.create(MarkerSpec {
                    position: facility.position(),
                    title: facility.name.clone(),
                    kind: MarkerKind::Facility { id: facility.id },
                    count: 1,
                }));
            }
        }
    }
}

fn cluster_spec(cluster: &RegionCluster, kind: MarkerKind) -> MarkerSpec {
    MarkerSpec {
        position: cluster.center,
        title: format!("{} ({} facilities)", cluster.name, cluster.count),
        kind,
        count: cluster.count,
    }
}

fn emit_state(shared: &EngineShared) {
    let view = shared.state.borrow().view.clone();
    let listeners: Vec<Rc<StateListener>> = shared
        .state_listeners
        .borrow()
        .iter()
        .map(|(_, l)| Rc::clone(l))
        .collect();
    for listener in listeners {
        listener(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::{MemoryMarkerFactory, MemoryViewport};
    use ecomap_types::LatLng;
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

    fn fixture() -> Vec<Facility> {
        vec![
            facility(1, "Johannesburg", "Sandton", -26.1, 28.0),
            facility(2, "Johannesburg", "Randburg", -26.0, 27.9),
            facility(3, "Pretoria", "Centurion", -25.8, 28.1),
        ]
    }

    struct Harness {
        store: Rc<GeographicContextStore>,
        engine: ClusteringEngine,
        viewport: Rc<MemoryViewport>,
        markers: MemoryMarkerFactory,
    }

    fn harness() -> Harness {
        let store = Rc::new(GeographicContextStore::new());
        let engine = ClusteringEngine::new(Rc::clone(&store));
        let viewport = MemoryViewport::new();
        viewport.set_center(LatLng::new(-26.05, 27.95));
        let markers = MemoryMarkerFactory::new();
        engine.initialize(
            Rc::clone(&viewport) as Rc<dyn Viewport>,
            Rc::new(markers.clone()),
            |_| {},
        );
        Harness {
            store,
            engine,
            viewport,
            markers,
        }
    }

    #[test]
    fn province_level_renders_one_marker_per_municipality() {
        let h = harness();
        h.engine.set_facilities(fixture());

        let specs = h.markers.attached_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(
            specs[0].kind,
            MarkerKind::MunicipalityCluster {
                name: "Johannesburg".to_string()
            }
        );
        assert_eq!(specs[0].count, 2);
        assert_eq!(
            specs[1].kind,
            MarkerKind::MunicipalityCluster {
                name: "Pretoria".to_string()
            }
        );
        assert_eq!(specs[1].count, 1);
    }

    #[test]
    fn recluster_is_idempotent() {
        let h = harness();
        h.engine.set_facilities(fixture());

        let first = h.markers.attached_specs();
        h.engine.recluster();
        let second = h.markers.attached_specs();
        assert_eq!(first, second);
    }

    #[test]
    fn municipality_click_drills_down_to_city_clusters() {
        let h = harness();
        h.engine.set_facilities(fixture());

        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });

        let view = h.engine.view_state();
        assert_eq!(view.level, ClusterLevel::Municipality);
        assert_eq!(view.municipality.as_deref(), Some("Johannesburg"));

        let specs = h.markers.attached_specs();
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| matches!(
            &s.kind,
            MarkerKind::CityCluster { name } if name == "Randburg" || name == "Sandton"
        )));

        // Viewport was fitted to the cluster bounds with 50px padding.
        let (_, padding) = h.viewport.last_fit().unwrap();
        assert_eq!(padding, 50);
        // The store learned of the move.
        assert_eq!(
            h.store.current().municipality_name.as_deref(),
            Some("Johannesburg")
        );
        assert!(h.viewport.back_control_visible());
    }

    #[test]
    fn facility_markers_withheld_outside_display_band() {
        let h = harness();
        h.engine.set_facilities(fixture());
        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });

        // Click into Sandton while zoomed far in (past the band).
        h.viewport.set_zoom(15.0);
        h.engine.handle_marker_click(MarkerKind::CityCluster {
            name: "Sandton".to_string(),
        });

        assert_eq!(h.engine.view_state().level, ClusterLevel::City);
        assert_eq!(h.markers.attached_specs().len(), 0);
        assert!(h.viewport.back_control_visible());

        // Back inside the band, the facility renders.
        h.viewport.set_zoom(12.0);
        h.engine.recluster();
        let specs = h.markers.attached_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, MarkerKind::Facility { id: 1 });
    }

    #[test]
    fn repeated_zoom_in_one_band_is_a_no_op() {
        let h = harness();
        h.engine.set_facilities(fixture());
        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });

        assert!(h.engine.handle_zoom_change(8.0));
        assert_eq!(h.engine.view_state().level, ClusterLevel::Province);
        assert!(!h.engine.handle_zoom_change(8.0));
        assert!(!h.engine.handle_zoom_change(8.0));
    }

    #[test]
    fn zoom_round_trip_counts_two_transitions() {
        let h = harness();
        h.engine.set_facilities(fixture());
        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });
        assert!(h.engine.handle_zoom_change(8.0));

        // Province -> Municipality (inferred from center) -> Province.
        assert!(h.engine.handle_zoom_change(10.0));
        assert_eq!(h.engine.view_state().level, ClusterLevel::Municipality);
        assert!(h.engine.handle_zoom_change(8.0));
        assert_eq!(h.engine.view_state().level, ClusterLevel::Province);
    }

    #[test]
    fn external_store_update_reclusters_once() {
        let h = harness();
        h.engine.set_facilities(fixture());

        let created_before = h.markers.total_created();
        h.store.go_to_municipality("Johannesburg");

        let view = h.engine.view_state();
        assert_eq!(view.level, ClusterLevel::Municipality);
        assert_eq!(view.municipality.as_deref(), Some("Johannesburg"));
        // Two city cluster markers, created in a single pass.
        assert_eq!(h.markers.total_created() - created_before, 2);

        // Re-broadcasting the same context must not re-render.
        let created = h.markers.total_created();
        h.store.go_to_municipality("Johannesburg");
        assert_eq!(h.markers.total_created(), created);
    }

    #[test]
    fn facility_click_fires_callback_and_updates_context() {
        let store = Rc::new(GeographicContextStore::new());
        let engine = ClusteringEngine::new(Rc::clone(&store));
        let viewport = MemoryViewport::new();
        let markers = MemoryMarkerFactory::new();
        let selected: Rc<RefCell<Option<i64>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&selected);
        engine.initialize(
            Rc::clone(&viewport) as Rc<dyn Viewport>,
            Rc::new(markers.clone()),
            move |facility| *sink.borrow_mut() = Some(facility.id),
        );
        engine.set_facilities(fixture());

        engine.handle_marker_click(MarkerKind::Facility { id: 3 });

        assert_eq!(*selected.borrow(), Some(3));
        assert_eq!(store.current().level, ClusterLevel::Facility);
        assert_eq!(store.current().facility_id, Some(3));
        assert_eq!(engine.view_state().level, ClusterLevel::Facility);
    }

    #[test]
    fn go_back_from_facility_click_returns_to_city() {
        let h = harness();
        h.engine.set_facilities(fixture());
        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });
        h.viewport.set_zoom(12.0);
        h.engine.handle_marker_click(MarkerKind::CityCluster {
            name: "Sandton".to_string(),
        });
        h.engine.handle_marker_click(MarkerKind::Facility { id: 1 });
        assert_eq!(h.engine.view_state().level, ClusterLevel::Facility);

        // The facility click snapshotted the city view, so the unwind
        // must land there, not skip to the municipality.
        assert!(h.engine.go_back());
        let view = h.engine.view_state();
        assert_eq!(view.level, ClusterLevel::City);
        assert_eq!(view.city.as_deref(), Some("Sandton"));
        assert_eq!(view.municipality.as_deref(), Some("Johannesburg"));
        assert_eq!(h.store.current().city_name.as_deref(), Some("Sandton"));
    }

    #[test]
    fn reset_returns_to_province_and_clears_history() {
        let h = harness();
        h.engine.set_facilities(fixture());
        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Johannesburg".to_string(),
        });
        assert!(h.engine.has_history());

        h.engine.reset();

        assert_eq!(h.engine.view_state(), ViewState::default());
        assert!(!h.engine.has_history());
        assert_eq!(h.markers.attached_specs().len(), 0);
        assert_eq!(h.store.current().level, ClusterLevel::Province);
        assert!(!h.viewport.back_control_visible());
    }

    #[test]
    fn state_changed_fires_on_transitions() {
        let h = harness();
        h.engine.set_facilities(fixture());
        let seen: Rc<RefCell<Vec<ViewState>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        h.engine.on_state_changed(move |view| sink.borrow_mut().push(view.clone()));

        h.engine.handle_marker_click(MarkerKind::MunicipalityCluster {
            name: "Pretoria".to_string(),
        });

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].level, ClusterLevel::Municipality);
        assert_eq!(seen.borrow()[0].municipality.as_deref(), Some("Pretoria"));
    }
}
