//!
//! # Watch predicates
//!
//! Decide whether a cluster notification is relevant and what it means for
//! the registry. Create and delete notifications are judged on the object
//! alone. Updates only fire on a transition in or out of the watched scope,
//! or on a change the registry cares about.
//!
mod endpointslice;
mod namespace;
mod service;

use std::collections::HashSet;

use parking_lot::Mutex;

pub use self::endpointslice::{
    EndpointSlicePredicate, SERVICE_NAME_LABEL, SliceObservation, count_pods_enabled,
    parent_service,
};
pub use self::namespace::NamespacePredicate;
pub use self::service::{ServicePredicate, service_qualifies};

#[cfg(test)]
pub(crate) use self::service::fixture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// Identities currently in the watched scope.
/// Update predicates read the previous decision from here, so an entry only
/// lives while its object is watched.
#[derive(Debug, Default)]
pub struct WatchCache {
    watched: Mutex<HashSet<String>>,
}

impl WatchCache {
    pub fn record(&self, key: impl Into<String>, watched: bool) {
        let key = key.into();
        let mut lock = self.watched.lock();
        if watched {
            lock.insert(key);
        } else {
            lock.remove(&key);
        }
    }

    pub fn is_watched(&self, key: &str) -> bool {
        self.watched.lock().contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.watched.lock().is_empty()
    }

    /// drop every key under `prefix`
    pub fn forget_prefix(&self, prefix: &str) {
        self.watched.lock().retain(|key| !key.starts_with(prefix));
    }
}

/// `namespace/name` identity of namespaced objects
pub(crate) fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
