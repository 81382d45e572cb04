//! Narrow interfaces to the systems the world drives but does not own.
//!
//! The network layer ([`Transport`]), the scripting runtime
//! ([`EventSink`]), and the game-record database ([`RecordSource`]) are
//! injected into [`WorldState`](crate::WorldState) at construction. Null
//! implementations are provided for headless runs, and recording
//! implementations for tests.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use worldsync_types::{BaseId, Inventory, RefId};

use crate::clock::{Clock, SystemClock};
use crate::object_ref::BaseType;

/// Visibility-scoped network dispatch.
pub trait Transport: Send {
    /// `listener`'s client starts receiving updates about `emitter`.
    fn subscribe(&mut self, emitter: RefId, listener: RefId);

    /// `listener`'s client stops receiving updates about `emitter`.
    fn unsubscribe(&mut self, emitter: RefId, listener: RefId);

    /// Deliver a changed property of `emitter` to `listener`.
    fn send_property(&mut self, listener: RefId, emitter: RefId, name: &str, value: &Value);

    /// Deliver the full inventory of `actor` to its own client.
    fn send_inventory(&mut self, actor: RefId, inventory: &Inventory);
}

/// Notifications delivered to the scripting runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEvent {
    /// The reference is first observed by a registered actor.
    Init,
    /// The reference's cell became loaded for an observer.
    CellLoad,
    /// The reference's 3D became loaded for an observer.
    Load,
    /// The reference was activated.
    Activate {
        /// Who activated it.
        caster: RefId,
    },
    /// Something entered the reference's trigger volume.
    TriggerEnter {
        /// The entering reference.
        other: RefId,
    },
    /// Something left the reference's trigger volume.
    TriggerLeave {
        /// The leaving reference.
        other: RefId,
    },
    /// Something moved while inside the reference's trigger volume.
    Trigger {
        /// The moving reference.
        other: RefId,
    },
}

/// Receiver of script notifications.
pub trait EventSink: Send {
    /// Deliver `event` to the scripts attached to `target`.
    fn send_event(&mut self, target: RefId, event: ScriptEvent);
}

/// A reference that activates `child` when it is itself activated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationParent {
    /// The parent reference.
    pub parent: RefId,
    /// Seconds between the parent's activation and the child's.
    pub delay_secs: f32,
}

/// Read access to the static game records.
pub trait RecordSource: Send {
    /// Record type of a base form.
    fn base_type(&self, base_id: BaseId) -> BaseType;

    /// Default contents of a container base form.
    fn base_container(&self, base_id: BaseId) -> Inventory;

    /// Items granted when a reference of this base is harvested or picked
    /// up.
    fn harvest_result(&self, base_id: BaseId) -> Inventory;

    /// References that activate `child` when they are activated.
    fn activation_parents(&self, child: RefId) -> Vec<ActivationParent>;
}

/// The full set of collaborators a [`WorldState`](crate::WorldState) runs
/// against.
pub struct Collaborators {
    /// Time source.
    pub clock: Box<dyn Clock>,
    /// Network dispatch.
    pub transport: Box<dyn Transport>,
    /// Script notifications.
    pub events: Box<dyn EventSink>,
    /// Game records.
    pub records: Box<dyn RecordSource>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            clock: Box::new(SystemClock),
            transport: Box::new(NullTransport),
            events: Box::new(NullEventSink),
            records: Box::new(NullRecordSource),
        }
    }
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Null implementations
// ---------------------------------------------------------------------------

/// Transport that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn subscribe(&mut self, _emitter: RefId, _listener: RefId) {}
    fn unsubscribe(&mut self, _emitter: RefId, _listener: RefId) {}
    fn send_property(&mut self, _listener: RefId, _emitter: RefId, _name: &str, _value: &Value) {}
    fn send_inventory(&mut self, _actor: RefId, _inventory: &Inventory) {}
}

/// Event sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send_event(&mut self, _target: RefId, _event: ScriptEvent) {}
}

/// Record source with no records: unknown base types, empty containers,
/// nothing to harvest, no activation parents.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecordSource;

impl RecordSource for NullRecordSource {
    fn base_type(&self, _base_id: BaseId) -> BaseType {
        BaseType::Other(String::new())
    }

    fn base_container(&self, _base_id: BaseId) -> Inventory {
        Inventory::new()
    }

    fn harvest_result(&self, _base_id: BaseId) -> Inventory {
        Inventory::new()
    }

    fn activation_parents(&self, _child: RefId) -> Vec<ActivationParent> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Recording implementations
// ---------------------------------------------------------------------------

/// One call observed by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// [`Transport::subscribe`].
    Subscribe {
        /// The emitter.
        emitter: RefId,
        /// The listener.
        listener: RefId,
    },
    /// [`Transport::unsubscribe`].
    Unsubscribe {
        /// The emitter.
        emitter: RefId,
        /// The listener.
        listener: RefId,
    },
    /// [`Transport::send_property`].
    Property {
        /// The receiving listener.
        listener: RefId,
        /// The emitter whose property changed.
        emitter: RefId,
        /// Property name.
        name: String,
        /// New value.
        value: Value,
    },
    /// [`Transport::send_inventory`].
    Inventory {
        /// The actor.
        actor: RefId,
        /// Its inventory at the time of the call.
        inventory: Inventory,
    },
}

/// Transport that keeps a log of every call. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl RecordingTransport {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every call recorded so far.
    pub fn take(&self) -> Vec<TransportCall> {
        core::mem::take(&mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of subscribe and unsubscribe calls recorded so far.
    pub fn subscription_churn(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    TransportCall::Subscribe { .. } | TransportCall::Unsubscribe { .. }
                )
            })
            .count()
    }

    fn push(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Transport for RecordingTransport {
    fn subscribe(&mut self, emitter: RefId, listener: RefId) {
        self.push(TransportCall::Subscribe { emitter, listener });
    }

    fn unsubscribe(&mut self, emitter: RefId, listener: RefId) {
        self.push(TransportCall::Unsubscribe { emitter, listener });
    }

    fn send_property(&mut self, listener: RefId, emitter: RefId, name: &str, value: &Value) {
        self.push(TransportCall::Property {
            listener,
            emitter,
            name: name.to_owned(),
            value: value.clone(),
        });
    }

    fn send_inventory(&mut self, actor: RefId, inventory: &Inventory) {
        self.push(TransportCall::Inventory {
            actor,
            inventory: inventory.clone(),
        });
    }
}

/// Event sink that keeps a log of `(target, event)` pairs. Clones share the
/// log.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<(RefId, ScriptEvent)>>>,
}

impl RecordingEventSink {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every event recorded so far.
    pub fn take(&self) -> Vec<(RefId, ScriptEvent)> {
        core::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingEventSink {
    fn send_event(&mut self, target: RefId, event: ScriptEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target, event));
    }
}
