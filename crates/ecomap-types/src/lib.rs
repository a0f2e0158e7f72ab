//! Shared data contracts for EcoMap.
//!
//! These are DATA CONTRACTS only - no rendering, no I/O, no map SDK.
//! Everything here crosses a boundary (REST payloads, the clustering
//! engine, UI panels) and is therefore derive-heavy: `Serialize`,
//! `Deserialize`, `Clone`, `Debug` on every type.

pub mod context;
pub mod facility;
pub mod geo;

pub use context::{ClusterLevel, ContextUpdate, GeographicContext, ViewState};
pub use facility::Facility;
pub use geo::{haversine_distance_m, LatLng, LatLngBounds};
