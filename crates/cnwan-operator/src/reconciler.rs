//!
//! # Reconciler
//!
//! Turns the events of one namespace into registry broker calls.
//!
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Service};
use tracing::{debug, error, info, instrument, warn};

use cnwan_registry::{Broker, BrokerConfig, RegistryError, SharedRegistry};

use crate::correlator::{EndpointCounter, SliceCounts};
use crate::event::Event;
use crate::extract::extract_data;
use crate::predicate::{Action, count_pods_enabled};
use crate::worker::{EventProcessor, ProcessorFactory};
use crate::{OperatorError, Result};

pub struct Reconciler {
    broker: Broker,
    counter: Arc<EndpointCounter>,
    annotations: Vec<String>,
}

impl Reconciler {
    pub fn new(broker: Broker, counter: Arc<EndpointCounter>, annotations: Vec<String>) -> Self {
        Self {
            broker,
            counter,
            annotations,
        }
    }

    /// Register the service, its namespace and its endpoints.
    ///
    /// A service that counts pods and has no ready pod keeps no endpoint.
    #[instrument(skip_all, fields(ns = ?ns.metadata.name, serv = ?svc.metadata.name))]
    pub async fn upsert_service(&self, ns: &Namespace, svc: &Service) -> Result<()> {
        let snapshot = extract_data(Some(ns), Some(svc), &self.annotations)?;
        let ns_name = snapshot.namespace.name.clone();
        let serv_name = snapshot.service.name.clone();

        let mut endpoints = snapshot.endpoints;
        if count_pods_enabled(svc) && self.counter.get(&ns_name, &serv_name) == 0 {
            debug!("no ready pod behind the service, clearing endpoints");
            endpoints.clear();
        }

        self.broker.manage_ns(&snapshot.namespace).await?;
        self.broker.manage_serv(&snapshot.service).await?;
        let failures = self
            .broker
            .manage_serv_endps(&ns_name, &serv_name, &endpoints)
            .await?;
        for (endp, err) in &failures {
            warn!(endp = %endp, "endpoint not reconciled: {err}");
        }
        debug!(
            endpoints = endpoints.len(),
            failures = failures.len(),
            "service reconciled"
        );
        Ok(())
    }

    /// Remove the service with its endpoints, then its namespace if nothing
    /// else lives there.
    #[instrument(skip(self))]
    pub async fn delete_service(&self, ns_name: &str, serv_name: &str) -> Result<()> {
        self.counter.reset(ns_name, serv_name, SliceCounts::new());
        self.broker.remove_serv(ns_name, serv_name, true).await?;

        match self.broker.remove_ns(ns_name, false).await {
            Ok(()) => Ok(()),
            Err(err @ RegistryError::NsNotEmpty) => {
                debug!("namespace still in use: {err}");
                Ok(())
            }
            Err(err) if err.is_ownership_conflict() => {
                debug!("namespace left in place: {err}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Register a service that entered the scope or changed, taking the ready
    /// counts of its slices as carried by the event.
    pub async fn sync_service(
        &self,
        ns: &Namespace,
        svc: &Service,
        slices: SliceCounts,
    ) -> Result<()> {
        if count_pods_enabled(svc) {
            if let (Some(ns_name), Some(serv_name)) = (
                svc.metadata.namespace.as_deref(),
                svc.metadata.name.as_deref(),
            ) {
                self.counter.reset(ns_name, serv_name, slices);
            }
        }
        self.upsert_service(ns, svc).await
    }

    #[instrument(skip(self))]
    pub async fn remove_namespace(&self, ns_name: &str) -> Result<()> {
        self.counter.forget_namespace(ns_name);
        self.broker.remove_ns(ns_name, true).await?;
        info!("namespace removed from registry");
        Ok(())
    }

    async fn handle(&self, event: Event) -> Result<()> {
        match event {
            Event::Namespace {
                action: Action::Delete,
                namespace,
                ..
            } => {
                let name = namespace
                    .metadata
                    .name
                    .as_deref()
                    .ok_or(OperatorError::MissingName("namespace"))?;
                self.remove_namespace(name).await
            }
            Event::Namespace {
                namespace,
                services,
                ..
            } => {
                for watched in services {
                    let svc = watched.service;
                    if let Err(err) = self.sync_service(&namespace, &svc, watched.slices).await {
                        error!(serv = ?svc.metadata.name, "unable to reconcile service: {err}");
                    }
                }
                Ok(())
            }
            Event::Service {
                action: Action::Delete,
                service,
                ..
            } => {
                let ns_name = service
                    .metadata
                    .namespace
                    .as_deref()
                    .ok_or(OperatorError::MissingName("namespace"))?;
                let serv_name = service
                    .metadata
                    .name
                    .as_deref()
                    .ok_or(OperatorError::MissingName("service"))?;
                self.delete_service(ns_name, serv_name).await
            }
            Event::Service {
                namespace,
                service,
                slices,
                ..
            } => {
                let namespace = namespace.ok_or(OperatorError::NamespaceNotProvided)?;
                self.sync_service(&namespace, &service, slices).await
            }
            Event::EndpointSlice {
                observation,
                namespace,
                service,
            } => {
                self.counter.put(
                    &observation.namespace,
                    &observation.service,
                    &observation.slice,
                    observation.ready,
                );
                let namespace = namespace.ok_or(OperatorError::NamespaceNotProvided)?;
                self.upsert_service(&namespace, &service).await
            }
        }
    }
}

#[async_trait]
impl EventProcessor for Reconciler {
    async fn process(&self, event: Event) {
        let kind = event.kind();
        let ns = event.namespace_name().map(str::to_owned);
        if let Err(err) = self.handle(event).await {
            error!(kind, ns = ?ns, "reconciliation failed: {err}");
        }
    }
}

/// Builds a reconciler with its own broker for every namespace worker.
/// Workers share the registry and the endpoint counter.
pub struct ReconcilerFactory {
    registry: SharedRegistry,
    config: BrokerConfig,
    counter: Arc<EndpointCounter>,
    annotations: Vec<String>,
}

impl ReconcilerFactory {
    pub fn new(
        registry: SharedRegistry,
        config: BrokerConfig,
        counter: Arc<EndpointCounter>,
        annotations: Vec<String>,
    ) -> Self {
        Self {
            registry,
            config,
            counter,
            annotations,
        }
    }
}

impl ProcessorFactory for ReconcilerFactory {
    fn create(&self, namespace: &str) -> anyhow::Result<Arc<dyn EventProcessor>> {
        debug!(ns = namespace, "creating reconciler");
        let broker = Broker::builder()
            .registry(self.registry.clone())
            .config(self.config.clone())
            .build()?;
        Ok(Arc::new(Reconciler::new(
            broker,
            self.counter.clone(),
            self.annotations.clone(),
        )))
    }
}
