//! Bounded navigation history.
//!
//! A snapshot of {level, selections, viewport zoom/bounds} is pushed
//! before every level transition. The stack holds at most
//! [`HISTORY_CAPACITY`] entries; pushing beyond that evicts the oldest,
//! which simply becomes unreachable.

use std::collections::VecDeque;

use ecomap_types::{ClusterLevel, LatLngBounds, ViewState};

pub const HISTORY_CAPACITY: usize = 10;

/// Shadow copy of view state plus the exact viewport detail the
/// context store does not track.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub level: ClusterLevel,
    pub municipality: Option<String>,
    pub city: Option<String>,
    pub zoom: Option<f64>,
    pub bounds: Option<LatLngBounds>,
}

impl HistoryEntry {
    pub fn from_view(view: &ViewState, zoom: Option<f64>, bounds: Option<LatLngBounds>) -> Self {
        Self {
            level: view.level,
            municipality: view.municipality.clone(),
            city: view.city.clone(),
            zoom,
            bounds,
        }
    }
}

#[derive(Debug, Default)]
pub struct NavigationHistory {
    entries: VecDeque<HistoryEntry>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
