//! Event listener registry for the in-memory document.
//!
//! Listeners are keyed by [`ListenerId`] and attached to one node and one
//! event name. Dispatch calls every listener registered for the pair, in
//! registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::NodeId;
use crate::value::Value;

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ListenerId(pub usize);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global counter for generating unique listener IDs.
static NEXT_LISTENER_ID: AtomicUsize = AtomicUsize::new(0);

pub fn next_listener_id() -> ListenerId {
    ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::SeqCst))
}

/// An event delivered to a listener.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    /// Payload supplied by whoever dispatched the event.
    pub detail: Value,
}

/// Type alias for listener callbacks.
pub type Listener = Rc<dyn Fn(&Event)>;

struct Registration {
    node: NodeId,
    event: String,
    listener: Listener,
}

/// Registry that maps listener IDs to callbacks.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: BTreeMap<ListenerId, Registration>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, node: NodeId, event: &str, listener: Listener) -> ListenerId {
        let id = next_listener_id();
        self.listeners.insert(
            id,
            Registration {
                node,
                event: event.to_owned(),
                listener,
            },
        );
        id
    }

    /// Unregister `id`, handing the callback back so the caller can drop it
    /// once the registry is no longer borrowed.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<Listener> {
        self.listeners.remove(&id).map(|r| r.listener)
    }

    /// Unregister every listener attached to one of `nodes`.
    pub(crate) fn remove_nodes(&mut self, nodes: &[NodeId]) -> Vec<Listener> {
        let ids: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, r)| nodes.contains(&r.node))
            .map(|(&id, _)| id)
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Listeners for `node`/`event`, ordered by registration.
    pub(crate) fn matching(&self, node: NodeId, event: &str) -> Vec<Listener> {
        self.listeners
            .values()
            .filter(|r| r.node == node && r.event == event)
            .map(|r| Rc::clone(&r.listener))
            .collect()
    }

    pub(crate) fn count_for(&self, node: NodeId) -> usize {
        self.listeners.values().filter(|r| r.node == node).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}
