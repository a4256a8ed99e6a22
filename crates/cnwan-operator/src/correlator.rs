use std::collections::HashMap;

use parking_lot::RwLock;

pub type SliceCounts = HashMap<String, usize>;

/// Ready address count of each service, split by endpoint slice.
/// Lets service reconciliation know how many pods back a service without
/// listing slices from the cluster.
#[derive(Debug, Default)]
pub struct EndpointCounter {
    counts: RwLock<HashMap<String, SliceCounts>>,
}

fn full_name(ns: &str, service: &str) -> String {
    format!("{ns}/{service}")
}

impl EndpointCounter {
    pub fn put(&self, ns: &str, service: &str, slice: &str, count: usize) {
        self.counts
            .write()
            .entry(full_name(ns, service))
            .or_default()
            .insert(slice.to_owned(), count);
    }

    /// total across every slice of the service
    pub fn get(&self, ns: &str, service: &str) -> usize {
        self.counts
            .read()
            .get(&full_name(ns, service))
            .map(|slices| slices.values().sum())
            .unwrap_or_default()
    }

    pub fn get_all(&self, ns: &str, service: &str) -> SliceCounts {
        self.counts
            .read()
            .get(&full_name(ns, service))
            .cloned()
            .unwrap_or_default()
    }

    /// replace every slice count of the service, an empty map forgets it
    pub fn reset(&self, ns: &str, service: &str, counts: SliceCounts) {
        let mut write = self.counts.write();
        if counts.is_empty() {
            write.remove(&full_name(ns, service));
        } else {
            write.insert(full_name(ns, service), counts);
        }
    }

    /// drop the counts of every service of the namespace
    pub fn forget_namespace(&self, ns: &str) {
        let prefix = full_name(ns, "");
        self.counts
            .write()
            .retain(|service, _| !service.starts_with(&prefix));
    }
}
