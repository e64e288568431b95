//! Engine-scoped notifications.
//!
//! Each engine owns one emitter; listeners are injected by whoever owns the
//! engine, so there is no process-wide bus.

use serde::Serialize;

use crate::processors::clustering::ClusterId;

/// Something observers of an engine may react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// A pass completed and replaced the cluster list.
    ClustersRefreshed {
        pass: u64,
        cluster_count: usize,
        feature_count: usize,
        max_cluster_size: usize,
    },
    /// A pass failed; the previous clusters are still current.
    RefreshFailed { message: String },
    /// A cluster was picked, e.g. by a click in the view layer.
    ClusterSelected { id: ClusterId, feature_count: usize },
}

/// Handle returned by [`EventEmitter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&ClusterEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&ClusterEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener in subscription order.
    pub fn emit(&self, event: &ClusterEvent) {
        log::trace!("event {:?}", event);
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
