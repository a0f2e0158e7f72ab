//! The observable geographic context store.
//!
//! Single authoritative holder of the current [`GeographicContext`].
//! Changes are broadcast synchronously to subscribers in registration
//! order; an `update` call returns only after every subscriber ran.
//! The store is constructed explicitly and shared via `Rc` so each test
//! gets a fresh instance - never a module-level global.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use ecomap_types::{ClusterLevel, ContextUpdate, GeographicContext};

/// Rejections for level-bearing updates whose merged context lacks the
/// field the level requires. Level-free merges are never validated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    #[error("municipality level requires a municipality name")]
    MissingMunicipality,

    #[error("city level requires a city name")]
    MissingCity,

    #[error("facility level requires a facility id")]
    MissingFacilityId,
}

/// Identifies a registered listener for `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

type Listener = dyn Fn(&GeographicContext);

pub struct GeographicContextStore {
    context: RefCell<GeographicContext>,
    listeners: RefCell<Vec<(SubscriptionId, Rc<Listener>)>>,
    next_id: Cell<u64>,
}

impl Default for GeographicContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GeographicContextStore {
    /// Starts at province level with the default province.
    pub fn new() -> Self {
        Self {
            context: RefCell::new(GeographicContext::default()),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Synchronous snapshot of the current context.
    pub fn current(&self) -> GeographicContext {
        self.context.borrow().clone()
    }

    /// Register a listener. Replay-latest: the listener is invoked with
    /// the current context before this call returns, then on every
    /// subsequent change.
    pub fn subscribe(&self, listener: impl Fn(&GeographicContext) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let listener: Rc<Listener> = Rc::new(listener);
        self.listeners
            .borrow_mut()
            .push((id, Rc::clone(&listener)));

        let current = self.current();
        listener(&current);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    /// Merge `update` onto the current context. When a level is
    /// supplied, fields below it are cleared and the merged result is
    /// validated; inconsistent updates are rejected without mutating or
    /// broadcasting anything.
    pub fn update(&self, update: ContextUpdate) -> Result<(), ContextError> {
        let merged = update.apply_to(&self.context.borrow());
        match update.level {
            Some(ClusterLevel::Municipality) if merged.municipality_name.is_none() => {
                return Err(ContextError::MissingMunicipality);
            }
            Some(ClusterLevel::City) if merged.city_name.is_none() => {
                return Err(ContextError::MissingCity);
            }
            Some(ClusterLevel::Facility) if merged.facility_id.is_none() => {
                return Err(ContextError::MissingFacilityId);
            }
            _ => {}
        }
        self.commit(merged);
        Ok(())
    }

    pub fn go_to_province(&self, province_name: Option<&str>) {
        let mut next = GeographicContext::default();
        if let Some(name) = province_name {
            next.province_name = Some(name.to_string());
        }
        // Province carries nothing below it; keep nothing from before.
        self.commit(next);
    }

    pub fn go_to_municipality(&self, municipality_name: &str) {
        let update = ContextUpdate {
            level: Some(ClusterLevel::Municipality),
            municipality_name: Some(municipality_name.to_string()),
            ..ContextUpdate::default()
        };
        let merged = update.apply_to(&self.context.borrow());
        self.commit(merged);
    }

    pub fn go_to_city(&self, city_name: &str) {
        let update = ContextUpdate {
            level: Some(ClusterLevel::City),
            city_name: Some(city_name.to_string()),
            ..ContextUpdate::default()
        };
        let merged = update.apply_to(&self.context.borrow());
        self.commit(merged);
    }

    pub fn go_to_facility(&self, facility_id: i64) {
        let update = ContextUpdate {
            level: Some(ClusterLevel::Facility),
            facility_id: Some(facility_id),
            ..ContextUpdate::default()
        };
        let merged = update.apply_to(&self.context.borrow());
        self.commit(merged);
    }

    /// Step one level up the hierarchy using the names the context
    /// still carries. Returns `false` at province level - the terminal
    /// state.
    pub fn go_back(&self) -> bool {
        let current = self.current();
        match current.level {
            ClusterLevel::Facility => {
                if let Some(city) = current.city_name {
                    self.go_to_city(&city);
                    return true;
                }
                false
            }
            ClusterLevel::City => {
                if let Some(municipality) = current.municipality_name {
                    self.go_to_municipality(&municipality);
                    return true;
                }
                false
            }
            ClusterLevel::Municipality => {
                self.go_to_province(None);
                true
            }
            ClusterLevel::Province => false,
        }
    }

    fn commit(&self, next: GeographicContext) {
        debug!(level = %next.level, "context updated");
        *self.context.borrow_mut() = next.clone();
        // Snapshot so a listener may subscribe or update re-entrantly
        // without aliasing the listener vector.
        let listeners: Vec<Rc<Listener>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(&next);
        }
    }
}
