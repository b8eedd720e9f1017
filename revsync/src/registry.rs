//! Factory & Registry: the one place that actually constructs a
//! [`Replicator`] and keeps a weak, non-owning census of the live ones.

use crate::config::ReplicatorConfiguration;
use crate::replicator::Replicator;
use crate::transport::TransportFactory;
use std::sync::{Arc, Mutex, Weak};

/// Builds [`Replicator`]s against a single [`TransportFactory`] and tracks
/// which ones are still alive, without holding a strong reference to any of
/// them — a registry entry never keeps a finished (or abandoned) replicator
/// alive on its own.
pub struct Registry {
    transport_factory: Arc<dyn TransportFactory>,
    live: Mutex<Vec<Weak<Replicator>>>,
}

impl Registry {
    pub fn new(transport_factory: Arc<dyn TransportFactory>) -> Self {
        Registry {
            transport_factory,
            live: Mutex::new(Vec::new()),
        }
    }

    /// Construct a new controller for `config` and record it in the
    /// registry's weak census. The caller may drop the returned handle
    /// immediately; the controller's own self-retention is what
    /// actually keeps it running.
    pub fn create_replicator(&self, config: ReplicatorConfiguration) -> Arc<Replicator> {
        let replicator = Replicator::new(config, Arc::clone(&self.transport_factory));
        let mut live = self.live.lock().expect("registry mutex poisoned");
        live.push(Arc::downgrade(&replicator));
        replicator
    }

    /// The replicators that are still alive, pruning dead entries as a side
    /// effect so the census doesn't grow without bound.
    pub fn live_replicators(&self) -> Vec<Arc<Replicator>> {
        let mut live = self.live.lock().expect("registry mutex poisoned");
        let mut alive = Vec::with_capacity(live.len());
        live.retain(|weak| {
            if let Some(strong) = weak.upgrade() {
                alive.push(strong);
                true
            } else {
                false
            }
        });
        alive
    }
}
