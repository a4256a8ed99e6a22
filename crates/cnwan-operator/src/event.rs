use std::sync::Arc;

use k8s_openapi::api::core::v1::{Namespace, Service};

use crate::correlator::SliceCounts;
use crate::predicate::{Action, SliceObservation};

/// Work item routed to the worker of a namespace.
/// Every event carries the snapshots the reconciler needs.
#[derive(Debug, Clone)]
pub enum Event {
    Namespace {
        action: Action,
        namespace: Arc<Namespace>,
        /// watched services of the namespace when it enters the scope
        services: Vec<WatchedService>,
    },
    Service {
        action: Action,
        namespace: Option<Arc<Namespace>>,
        service: Arc<Service>,
        /// ready count of every slice of a pod counting service
        slices: SliceCounts,
    },
    EndpointSlice {
        observation: SliceObservation,
        namespace: Option<Arc<Namespace>>,
        service: Arc<Service>,
    },
}

/// A service entering the registry along with the ready counts of its
/// endpoint slices as last seen by the router
#[derive(Debug, Clone)]
pub struct WatchedService {
    pub service: Arc<Service>,
    pub slices: SliceCounts,
}

impl Event {
    pub fn namespace_name(&self) -> Option<&str> {
        match self {
            Self::Namespace { namespace, .. } => namespace.metadata.name.as_deref(),
            Self::Service { service, .. } => service.metadata.namespace.as_deref(),
            Self::EndpointSlice { observation, .. } => Some(observation.namespace.as_str()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Namespace { .. } => "namespace",
            Self::Service { .. } => "service",
            Self::EndpointSlice { .. } => "endpointslice",
        }
    }
}
