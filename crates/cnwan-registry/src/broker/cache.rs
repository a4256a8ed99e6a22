use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::{Namespace, Service};

struct Entry<T> {
    value: T,
    fetched: Instant,
}

/// Recently fetched namespace and service records.
/// Entries older than the ttl are never returned.
pub(crate) struct LookupCache {
    ttl: Duration,
    namespaces: HashMap<String, Entry<Namespace>>,
    services: HashMap<(String, String), Entry<Service>>,
}

impl LookupCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            namespaces: HashMap::new(),
            services: HashMap::new(),
        }
    }

    fn fresh<T: Clone>(&self, entry: Option<&Entry<T>>) -> Option<T> {
        entry
            .filter(|entry| entry.fetched.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub(crate) fn ns(&self, name: &str) -> Option<Namespace> {
        self.fresh(self.namespaces.get(name))
    }

    pub(crate) fn put_ns(&mut self, ns: Namespace) {
        self.namespaces.insert(
            ns.name.clone(),
            Entry {
                value: ns,
                fetched: Instant::now(),
            },
        );
    }

    /// drops the namespace and every service cached under it
    pub(crate) fn invalidate_ns(&mut self, name: &str) {
        self.namespaces.remove(name);
        self.services.retain(|(ns_name, _), _| ns_name != name);
    }

    pub(crate) fn serv(&self, ns_name: &str, name: &str) -> Option<Service> {
        self.fresh(
            self.services
                .get(&(ns_name.to_owned(), name.to_owned())),
        )
    }

    pub(crate) fn put_serv(&mut self, serv: Service) {
        self.services.insert(
            (serv.ns_name.clone(), serv.name.clone()),
            Entry {
                value: serv,
                fetched: Instant::now(),
            },
        );
    }

    pub(crate) fn invalidate_serv(&mut self, ns_name: &str, name: &str) {
        self.services
            .remove(&(ns_name.to_owned(), name.to_owned()));
    }
}
