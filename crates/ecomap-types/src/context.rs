//! Navigation context types for the province → municipality → city →
//! facility hierarchy.
//!
//! Exactly one `GeographicContext` exists process-wide; it lives in the
//! context store and is broadcast to subscribers, never copied into
//! divergent per-component state. Fields below the current level are
//! always cleared on a level-bearing transition.

use serde::{Deserialize, Serialize};

/// Rank in the geographic hierarchy, shallowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLevel {
    #[default]
    Province,
    Municipality,
    City,
    Facility,
}

impl ClusterLevel {
    /// The level one step up the hierarchy (zoom out).
    pub fn parent(&self) -> Option<ClusterLevel> {
        match self {
            ClusterLevel::Province => None,
            ClusterLevel::Municipality => Some(ClusterLevel::Province),
            ClusterLevel::City => Some(ClusterLevel::Municipality),
            ClusterLevel::Facility => Some(ClusterLevel::City),
        }
    }

    /// The level one step down the hierarchy (zoom in).
    pub fn child(&self) -> Option<ClusterLevel> {
        match self {
            ClusterLevel::Province => Some(ClusterLevel::Municipality),
            ClusterLevel::Municipality => Some(ClusterLevel::City),
            ClusterLevel::City => Some(ClusterLevel::Facility),
            ClusterLevel::Facility => None,
        }
    }
}

impl std::fmt::Display for ClusterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClusterLevel::Province => "province",
            ClusterLevel::Municipality => "municipality",
            ClusterLevel::City => "city",
            ClusterLevel::Facility => "facility",
        };
        f.write_str(name)
    }
}

/// Default province when none is named.
pub const DEFAULT_PROVINCE: &str = "Gauteng";

/// Where the user currently is in the geographic hierarchy.
///
/// Name fields are populated only for levels at or below their rank;
/// `facility_id` only at `Facility` level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographicContext {
    pub level: ClusterLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<i64>,
}

impl Default for GeographicContext {
    fn default() -> Self {
        Self {
            level: ClusterLevel::Province,
            province_name: Some(DEFAULT_PROVINCE.to_string()),
            municipality_name: None,
            city_name: None,
            facility_id: None,
        }
    }
}

impl GeographicContext {
    /// Clear every field ranked strictly below `level`.
    pub fn clear_below(&mut self, level: ClusterLevel) {
        if level < ClusterLevel::Municipality {
            self.municipality_name = None;
        }
        if level < ClusterLevel::City {
            self.city_name = None;
        }
        if level < ClusterLevel::Facility {
            self.facility_id = None;
        }
    }
}

/// A partial context change. Fields left `None` are untouched; if
/// `level` is omitted the merge is field-wise only and no clearing
/// happens (context-preserving updates, e.g. setting `facility_id`
/// while already at facility level).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub level: Option<ClusterLevel>,
    pub province_name: Option<String>,
    pub municipality_name: Option<String>,
    pub city_name: Option<String>,
    pub facility_id: Option<i64>,
}

impl ContextUpdate {
    pub fn level(level: ClusterLevel) -> Self {
        Self {
            level: Some(level),
            ..Self::default()
        }
    }

    /// Merge this update onto `context`, applying the clearing
    /// invariant when a level is supplied.
    pub fn apply_to(&self, context: &GeographicContext) -> GeographicContext {
        let mut next = context.clone();
        if let Some(level) = self.level {
            next.level = level;
        }
        if let Some(name) = &self.province_name {
            next.province_name = Some(name.clone());
        }
        if let Some(name) = &self.municipality_name {
            next.municipality_name = Some(name.clone());
        }
        if let Some(name) = &self.city_name {
            next.city_name = Some(name.clone());
        }
        if let Some(id) = self.facility_id {
            next.facility_id = Some(id);
        }
        if let Some(level) = self.level {
            next.clear_below(level);
        }
        next
    }
}

/// The clustering engine's view of the context: level plus the two
/// selections that drive rendering. Also the `state_changed` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub level: ClusterLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}
