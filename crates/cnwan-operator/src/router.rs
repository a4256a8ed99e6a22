//!
//! # Cluster event router
//!
//! Receives watch notifications for namespaces, services and endpoint slices,
//! runs them through the predicates and sends the relevant ones to the
//! namespace workers as [`Event`]s.
//!
//! The router keeps the last seen version of every object. That gives the
//! predicates the old object on updates, and lets services and slices be
//! resolved to their namespace and parent service without querying the
//! cluster.
//!
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::Sender;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, trace};

use crate::correlator::SliceCounts;
use crate::event::{Event, WatchedService};
use crate::policy::NamespacePolicy;
use crate::predicate::{
    Action, EndpointSlicePredicate, NamespacePredicate, ServicePredicate, count_pods_enabled,
    object_key, parent_service,
};

/// Watch notification for one object
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    /// the object was created or modified, or listed on a watch (re)start
    Applied(K),
    Deleted(K),
}

pub struct EventRouter {
    namespaces: NamespacePredicate,
    services: ServicePredicate,
    slices: EndpointSlicePredicate,
    ns_objects: HashMap<String, Arc<Namespace>>,
    svc_objects: HashMap<String, Arc<Service>>,
    slice_objects: HashMap<String, Arc<EndpointSlice>>,
    sender: Sender<Event>,
}

impl EventRouter {
    pub fn new(policy: NamespacePolicy, annotations: Vec<String>, sender: Sender<Event>) -> Self {
        Self {
            namespaces: NamespacePredicate::new(policy.clone(), annotations.clone()),
            services: ServicePredicate::new(policy, annotations),
            slices: EndpointSlicePredicate,
            ns_objects: HashMap::new(),
            svc_objects: HashMap::new(),
            slice_objects: HashMap::new(),
            sender,
        }
    }

    pub async fn on_namespace(&mut self, event: WatchEvent<Namespace>) -> Result<()> {
        let (action, ns) = match event {
            WatchEvent::Applied(ns) => {
                let Some(name) = ns.metadata.name.clone() else {
                    return Ok(());
                };
                let ns = Arc::new(ns);
                let action = match self.ns_objects.insert(name, ns.clone()) {
                    None => self.namespaces.on_create(&ns),
                    Some(old) => self.namespaces.on_update(&old, &ns),
                };
                (action, ns)
            }
            WatchEvent::Deleted(ns) => {
                if let Some(name) = ns.metadata.name.as_deref() {
                    self.ns_objects.remove(name);
                }
                let action = self.namespaces.on_delete(&ns);
                (action, Arc::new(ns))
            }
        };

        let Some(action) = action else {
            trace!(ns = ?ns.metadata.name, "namespace event ignored");
            return Ok(());
        };
        let Some(name) = ns.metadata.name.as_deref() else {
            return Ok(());
        };

        let services = match action {
            Action::Delete => {
                self.services.forget_namespace(name);
                vec![]
            }
            Action::Create | Action::Update => {
                let services = self.watched_services(&ns, name);
                for watched in &services {
                    self.services.adopt(&watched.service);
                }
                services
            }
        };
        debug!(ns = name, ?action, services = services.len(), "routing namespace event");
        self.send(Event::Namespace {
            action,
            namespace: ns,
            services,
        })
        .await
    }

    pub async fn on_service(&mut self, event: WatchEvent<Service>) -> Result<()> {
        let (action, svc) = match event {
            WatchEvent::Applied(svc) => {
                let Some(key) = meta_key(&svc.metadata) else {
                    return Ok(());
                };
                let svc = Arc::new(svc);
                let ns = self.namespace_of(&svc);
                let action = match self.svc_objects.insert(key, svc.clone()) {
                    None => self.services.on_create(ns.as_deref(), &svc),
                    Some(old) => self.services.on_update(ns.as_deref(), &old, &svc),
                };
                (action, svc)
            }
            WatchEvent::Deleted(svc) => {
                if let Some(key) = meta_key(&svc.metadata) {
                    self.svc_objects.remove(&key);
                }
                let svc = Arc::new(svc);
                let ns = self.namespace_of(&svc);
                (self.services.on_delete(ns.as_deref(), &svc), svc)
            }
        };

        let Some(action) = action else {
            trace!(svc = ?svc.metadata.name, "service event ignored");
            return Ok(());
        };
        let slices = match action {
            Action::Delete => SliceCounts::new(),
            Action::Create | Action::Update => self.slice_counts(&svc),
        };
        debug!(svc = ?svc.metadata.name, ?action, slices = slices.len(), "routing service event");
        self.send(Event::Service {
            action,
            namespace: self.namespace_of(&svc),
            service: svc,
            slices,
        })
        .await
    }

    pub async fn on_endpoint_slice(&mut self, event: WatchEvent<EndpointSlice>) -> Result<()> {
        let (observation, slice) = match event {
            WatchEvent::Applied(slice) => {
                let Some(key) = meta_key(&slice.metadata) else {
                    return Ok(());
                };
                let slice = Arc::new(slice);
                let (ns, svc) = self.parents_of(&slice);
                let observation = match self.slice_objects.insert(key, slice.clone()) {
                    None => self.slices.on_create(
                        &self.services,
                        ns.as_deref(),
                        svc.as_deref(),
                        &slice,
                    ),
                    Some(old) => self.slices.on_update(
                        &self.services,
                        ns.as_deref(),
                        svc.as_deref(),
                        &old,
                        &slice,
                    ),
                };
                (observation, slice)
            }
            WatchEvent::Deleted(slice) => {
                if let Some(key) = meta_key(&slice.metadata) {
                    self.slice_objects.remove(&key);
                }
                let (ns, svc) = self.parents_of(&slice);
                let observation =
                    self.slices
                        .on_delete(&self.services, ns.as_deref(), svc.as_deref(), &slice);
                (observation, Arc::new(slice))
            }
        };

        let Some(observation) = observation else {
            trace!(slice = ?slice.metadata.name, "endpoint slice event ignored");
            return Ok(());
        };
        let (namespace, service) = self.parents_of(&slice);
        let Some(service) = service else {
            return Ok(());
        };
        debug!(
            ns = %observation.namespace,
            svc = %observation.service,
            ready = observation.ready,
            "routing endpoint slice event"
        );
        self.send(Event::EndpointSlice {
            observation,
            namespace,
            service,
        })
        .await
    }

    /// services of the namespace that should be registered once it is watched
    fn watched_services(&self, ns: &Namespace, name: &str) -> Vec<WatchedService> {
        let mut services: Vec<WatchedService> = self
            .svc_objects
            .values()
            .filter(|svc| svc.metadata.namespace.as_deref() == Some(name))
            .filter(|svc| self.services.should_watch(Some(ns), svc))
            .map(|svc| WatchedService {
                service: svc.clone(),
                slices: self.slice_counts(svc),
            })
            .collect();
        services.sort_by(|a, b| a.service.metadata.name.cmp(&b.service.metadata.name));
        services
    }

    /// ready counts of the known slices of a pod counting service
    fn slice_counts(&self, svc: &Service) -> SliceCounts {
        if !count_pods_enabled(svc) {
            return SliceCounts::new();
        }
        let (Some(ns), Some(name)) = (
            svc.metadata.namespace.as_deref(),
            svc.metadata.name.as_deref(),
        ) else {
            return SliceCounts::new();
        };
        self.slices
            .ready_counts(ns, name, self.slice_objects.values().map(Arc::as_ref))
    }

    fn namespace_of(&self, svc: &Service) -> Option<Arc<Namespace>> {
        svc.metadata
            .namespace
            .as_deref()
            .and_then(|name| self.ns_objects.get(name))
            .cloned()
    }

    fn parents_of(&self, slice: &EndpointSlice) -> (Option<Arc<Namespace>>, Option<Arc<Service>>) {
        let Some(ns_name) = slice.metadata.namespace.as_deref() else {
            return (None, None);
        };
        let svc = parent_service(slice)
            .and_then(|name| self.svc_objects.get(&object_key(ns_name, name)))
            .cloned();
        (self.ns_objects.get(ns_name).cloned(), svc)
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.sender
            .send(event)
            .await
            .context("event channel closed")
    }
}

fn meta_key(metadata: &ObjectMeta) -> Option<String> {
    Some(object_key(
        metadata.namespace.as_deref()?,
        metadata.name.as_deref()?,
    ))
}
