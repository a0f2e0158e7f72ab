//! Viewport and marker abstractions.
//!
//! The engine must not depend on a concrete mapping SDK, so its two
//! drawing surfaces are narrow capability traits. Any SDK exposing
//! zoom/center/bounds plus a marker primitive is pluggable.
//!
//! `MemoryViewport` and `MemoryMarkerFactory` are simple in-memory
//! implementations for testing and headless usage.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use ecomap_types::{LatLng, LatLngBounds};

/// The map surface the engine renders onto.
///
/// Readers return `None` while the surface has no view yet (e.g. tiles
/// not loaded); affected engine operations degrade to no-ops.
pub trait Viewport {
    fn zoom(&self) -> Option<f64>;
    fn center(&self) -> Option<LatLng>;
    fn bounds(&self) -> Option<LatLngBounds>;
    fn set_zoom(&self, zoom: f64);
    fn fit_bounds(&self, bounds: &LatLngBounds, padding_px: u32);
    /// Show or hide the "back" affordance on the map chrome.
    fn set_back_control(&self, visible: bool);
    /// Register a listener for zoom changes. Listeners are invoked
    /// synchronously from the surface's event loop.
    fn on_zoom_changed(&self, listener: Box<dyn Fn(f64)>);
}

/// Identifies what a marker represents, so the embedding UI can route
/// clicks back to [`ClusteringEngine::handle_marker_click`].
///
/// [`ClusteringEngine::handle_marker_click`]: crate::engine::ClusteringEngine::handle_marker_click
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkerKind {
    MunicipalityCluster { name: String },
    CityCluster { name: String },
    Facility { id: i64 },
}

/// Everything the engine knows about a marker it wants drawn. Visual
/// styling is the factory's concern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub title: String,
    pub kind: MarkerKind,
    /// Member count for cluster markers, 1 for facility markers.
    pub count: usize,
}

/// Handle to a drawn marker. Dropping the handle without calling
/// `detach` leaves the marker on the surface; the engine always
/// detaches before dropping.
pub trait MarkerHandle {
    fn detach(&mut self);
}

pub trait MarkerFactory {
    fn create(&self, spec: MarkerSpec) -> Box<dyn MarkerHandle>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryViewportState {
    zoom: Option<f64>,
    center: Option<LatLng>,
    bounds: Option<LatLngBounds>,
    back_control: bool,
    fit_calls: Vec<(LatLngBounds, u32)>,
    set_zoom_calls: Vec<f64>,
}

/// Recording viewport for tests and headless callers.
///
/// `set_zoom`/`fit_bounds` record the request without firing the zoom
/// listener; tests drive zoom events explicitly through `emit_zoom`,
/// mirroring how a real surface delivers `zoom_changed` asynchronously
/// from programmatic moves.
#[derive(Default)]
pub struct MemoryViewport {
    state: RefCell<MemoryViewportState>,
    zoom_listeners: RefCell<Vec<Box<dyn Fn(f64)>>>,
}

impl MemoryViewport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn set_center(&self, center: LatLng) {
        self.state.borrow_mut().center = Some(center);
    }

    pub fn set_bounds(&self, bounds: LatLngBounds) {
        self.state.borrow_mut().bounds = Some(bounds);
    }

    /// Set the zoom and notify listeners, as a user gesture would.
    pub fn emit_zoom(&self, zoom: f64) {
        self.state.borrow_mut().zoom = Some(zoom);
        let listeners = self.zoom_listeners.borrow();
        for listener in listeners.iter() {
            listener(zoom);
        }
    }

    pub fn back_control_visible(&self) -> bool {
        self.state.borrow().back_control
    }

    pub fn last_fit(&self) -> Option<(LatLngBounds, u32)> {
        self.state.borrow().fit_calls.last().copied()
    }

    pub fn last_set_zoom(&self) -> Option<f64> {
        self.state.borrow().set_zoom_calls.last().copied()
    }
}

impl Viewport for MemoryViewport {
    fn zoom(&self) -> Option<f64> {
        self.state.borrow().zoom
    }

    fn center(&self) -> Option<LatLng> {
        self.state.borrow().center
    }

    fn bounds(&self) -> Option<LatLngBounds> {
        self.state.borrow().bounds
    }

    fn set_zoom(&self, zoom: f64) {
        let mut state = self.state.borrow_mut();
        state.zoom = Some(zoom);
        state.set_zoom_calls.push(zoom);
    }

    fn fit_bounds(&self, bounds: &LatLngBounds, padding_px: u32) {
        let mut state = self.state.borrow_mut();
        state.bounds = Some(*bounds);
        state.center = Some(bounds.center());
        state.fit_calls.push((*bounds, padding_px));
    }

    fn set_back_control(&self, visible: bool) {
        self.state.borrow_mut().back_control = visible;
    }

    fn on_zoom_changed(&self, listener: Box<dyn Fn(f64)>) {
        self.zoom_listeners.borrow_mut().push(listener);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub spec: MarkerSpec,
    pub attached: bool,
}

/// Recording marker factory. Created markers stay in the record list
/// with `attached: false` after detach, so tests can assert on both
/// live and historical markers.
#[derive(Clone, Default)]
pub struct MemoryMarkerFactory {
    records: Rc<RefCell<Vec<MarkerRecord>>>,
}

impl MemoryMarkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specs of all currently attached markers, in creation order.
    pub fn attached_specs(&self) -> Vec<MarkerSpec> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.attached)
            .map(|r| r.spec.clone())
            .collect()
    }

    pub fn total_created(&self) -> usize {
        self.records.borrow().len()
    }
}

struct MemoryMarker {
    index: usize,
    records: Rc<RefCell<Vec<MarkerRecord>>>,
}

impl MarkerHandle for MemoryMarker {
    fn detach(&mut self) {
        self.records.borrow_mut()[self.index].attached = false;
    }
}

impl MarkerFactory for MemoryMarkerFactory {
    fn create(&self, spec: MarkerSpec) -> Box<dyn MarkerHandle> {
        let mut records = self.records.borrow_mut();
        let index = records.len();
        records.push(MarkerRecord {
            spec,
            attached: true,
        });
        Box::new(MemoryMarker {
            index,
            records: Rc::clone(&self.records),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn emit_zoom_reaches_listeners() {
        let viewport = MemoryViewport::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        viewport.on_zoom_changed(Box::new(move |zoom| sink.borrow_mut().push(zoom)));

        viewport.emit_zoom(10.0);
        viewport.emit_zoom(12.0);

        assert_eq!(*seen.borrow(), vec![10.0, 12.0]);
        assert_eq!(viewport.zoom(), Some(12.0));
    }

    #[test]
    fn detached_markers_leave_the_attached_set() {
        let factory = MemoryMarkerFactory::new();
        let spec = MarkerSpec {
            position: LatLng::new(-26.1, 28.0),
            title: "Sandton".to_string(),
            kind: MarkerKind::CityCluster {
                name: "Sandton".to_string(),
            },
            count: 3,
        };

        let mut handle = factory.create(spec.clone());
        assert_eq!(factory.attached_specs(), vec![spec]);

        handle.detach();
        assert_eq!(factory.attached_specs(), Vec::new());
        assert_eq!(factory.total_created(), 1);
    }
}
