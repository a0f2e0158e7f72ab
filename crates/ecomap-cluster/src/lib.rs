//! Hierarchical geographic clustering and navigation for the EcoMap
//! facility locator.
//!
//! Two cooperating components form the core:
//!
//! - [`GeographicContextStore`] - the single observable source of truth
//!   for "where the user currently is" in the province → municipality →
//!   city → facility hierarchy.
//! - [`ClusteringEngine`] - partitions the cached facility set into
//!   region clusters at the current level, renders markers through an
//!   injected [`MarkerFactory`], translates viewport zoom changes into
//!   level transitions, and keeps a bounded history for `go_back`.
//!
//! Everything is single-threaded and event-driven: context broadcasts
//! are delivered synchronously in registration order, so a clustering
//! recompute triggered by a context change completes before the call
//! that issued the change returns.

pub mod cluster;
pub mod engine;
pub mod filter;
pub mod history;
pub mod store;
pub mod transitions;
pub mod viewport;

pub use cluster::{cluster_by_city, cluster_by_municipality, nearest_cluster, RegionCluster};
pub use engine::ClusteringEngine;
pub use filter::{FacilityFilters, SortOrder};
pub use history::{HistoryEntry, NavigationHistory, HISTORY_CAPACITY};
pub use store::{ContextError, GeographicContextStore, SubscriptionId};
pub use transitions::{
    facility_markers_visible, plan_zoom_transition, ZoomTransition, ZOOM_CITY, ZOOM_FACILITY,
    ZOOM_MUNICIPALITY,
};
pub use viewport::{
    MarkerFactory, MarkerHandle, MarkerKind, MarkerSpec, MemoryMarkerFactory, MemoryViewport,
    Viewport,
};
