use k8s_openapi::api::core::v1::Namespace;
use tracing::{debug, trace};

use crate::filter::filter_annotations;
use crate::policy::NamespacePolicy;

use super::{Action, WatchCache};

#[derive(Debug)]
pub struct NamespacePredicate {
    policy: NamespacePolicy,
    annotations: Vec<String>,
    cache: WatchCache,
}

impl NamespacePredicate {
    pub fn new(policy: NamespacePolicy, annotations: Vec<String>) -> Self {
        Self {
            policy,
            annotations,
            cache: WatchCache::default(),
        }
    }

    pub fn should_watch(&self, ns: &Namespace) -> bool {
        self.policy.should_watch(ns.metadata.labels.as_ref())
    }

    pub fn cache(&self) -> &WatchCache {
        &self.cache
    }

    pub fn on_create(&self, ns: &Namespace) -> Option<Action> {
        let name = ns.metadata.name.as_deref()?;
        let watched = self.should_watch(ns);
        self.cache.record(name, watched);
        if !watched {
            trace!(ns = name, "namespace not watched");
            return None;
        }
        Some(Action::Create)
    }

    /// Fires when the namespace enters or leaves the watched scope, or when a
    /// watched namespace changes its allowed annotations.
    pub fn on_update(&self, old: &Namespace, new: &Namespace) -> Option<Action> {
        let name = new.metadata.name.as_deref()?;
        let was_watched = self.cache.is_watched(name);
        let is_watched = self.should_watch(new);

        if was_watched != is_watched {
            debug!(ns = name, is_watched, "namespace watch scope changed");
            self.cache.record(name, is_watched);
            return Some(if is_watched {
                Action::Create
            } else {
                Action::Delete
            });
        }

        if is_watched && self.metadata_changed(old, new) {
            return Some(Action::Update);
        }

        None
    }

    pub fn on_delete(&self, ns: &Namespace) -> Option<Action> {
        let name = ns.metadata.name.as_deref()?;
        self.cache.record(name, false);
        if !self.should_watch(ns) {
            return None;
        }
        Some(Action::Delete)
    }

    fn metadata_changed(&self, old: &Namespace, new: &Namespace) -> bool {
        let filtered = |ns: &Namespace| {
            ns.metadata
                .annotations
                .as_ref()
                .map(|annotations| filter_annotations(annotations, &self.annotations))
                .unwrap_or_default()
        };
        filtered(old) != filtered(new)
    }
}
