// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Ordered observer registry for lifecycle events.
//!
//! Observers are notified synchronously, in registration order, from a
//! snapshot of the registry taken at dispatch time. An observer that
//! registers or unregisters during a dispatch therefore takes effect from the
//! next event onwards.
//!
//! ```text
//! ObserverList<E>
//!   register(obs)   ──► ObserverId(1)
//!   register(obs)   ──► ObserverId(2)
//!   notify(&event)  ──► obs#1 → obs#2
//!   unregister(1)   ──► true
//!   unregister(1)   ──► false   (idempotent)
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sequence::IdSequence;

// =============================================================================
// Observer
// =============================================================================

/// A receiver of events of type `E`.
pub trait Observer<E>: Send + Sync {
    /// Returns the observer name for logging.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handles an event. Must not block.
    fn notify(&self, event: &E);

    /// Called when the observer is registered.
    fn on_register(&self) {}

    /// Called when the observer is unregistered.
    fn on_unregister(&self) {}
}

impl<E, F> Observer<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn notify(&self, event: &E) {
        self(event)
    }
}

/// Handle returned by [`ObserverList::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

// =============================================================================
// ObserverList
// =============================================================================

/// Registry delivering events to observers in registration order.
pub struct ObserverList<E> {
    observers: RwLock<Vec<(ObserverId, Arc<dyn Observer<E>>)>>,
    ids: IdSequence,
}

impl<E> ObserverList<E> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            ids: IdSequence::new(),
        }
    }

    /// Registers an observer and returns its handle.
    pub fn register(&self, observer: Arc<dyn Observer<E>>) -> ObserverId {
        let id = ObserverId(self.ids.next());
        observer.on_register();
        tracing::debug!(observer = observer.name(), id = %id, "Observer registered");
        self.observers.write().push((id, observer));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = {
            let mut observers = self.observers.write();
            observers
                .iter()
                .position(|(oid, _)| *oid == id)
                .map(|index| observers.remove(index).1)
        };

        match removed {
            Some(observer) => {
                observer.on_unregister();
                tracing::debug!(observer = observer.name(), id = %id, "Observer unregistered");
                true
            }
            None => false,
        }
    }

    /// Delivers an event to every observer.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<_> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            observer.notify(event);
        }
    }

    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns `true` if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl<E> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ObserverList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers = self.observers.read();
        let names: Vec<_> = observers.iter().map(|(_, o)| o.name()).collect();
        f.debug_struct("ObserverList")
            .field("observers", &names)
            .finish()
    }
}

// =============================================================================
// EventCollector
// =============================================================================

/// An observer that keeps the most recent events in memory (useful for testing).
#[derive(Debug)]
pub struct EventCollector<E> {
    events: RwLock<Vec<E>>,
    max_events: usize,
}

impl<E: Clone> EventCollector<E> {
    /// Creates a collector retaining at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    /// Returns collected events.
    pub fn events(&self) -> Vec<E> {
        self.events.read().clone()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the number of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events collected.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl<E: Clone + Send + Sync> Observer<E> for EventCollector<E> {
    fn name(&self) -> &str {
        "event_collector"
    }

    fn notify(&self, event: &E) {
        let mut events = self.events.write();
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event.clone());
    }
}

// =============================================================================
// Tests
// =============================================================================
