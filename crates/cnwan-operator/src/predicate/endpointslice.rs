use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use tracing::trace;

use crate::config::{COUNT_PODS_ENABLED, COUNT_PODS_LABEL};
use crate::correlator::SliceCounts;

use super::ServicePredicate;

/// Label linking a slice to the service it backs
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

const IPV4: &str = "IPv4";

/// Ready address count of one slice, carried to the reconciler with the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceObservation {
    pub namespace: String,
    pub service: String,
    pub slice: String,
    pub ready: usize,
}

/// the service opted into pod counting
pub fn count_pods_enabled(svc: &Service) -> bool {
    svc.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(COUNT_PODS_LABEL))
        .is_some_and(|value| {
            COUNT_PODS_ENABLED
                .iter()
                .any(|enabled| value.eq_ignore_ascii_case(enabled))
        })
}

pub fn parent_service(slice: &EndpointSlice) -> Option<&str> {
    slice
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(SERVICE_NAME_LABEL))
        .map(String::as_str)
}

/// addresses of every endpoint not explicitly marked as not ready
fn ready_count(slice: &EndpointSlice) -> usize {
    slice
        .endpoints
        .iter()
        .filter(|endpoint| {
            endpoint
                .conditions
                .as_ref()
                .and_then(|conditions| conditions.ready)
                != Some(false)
        })
        .map(|endpoint| endpoint.addresses.len())
        .sum()
}

#[derive(Debug)]
pub struct EndpointSlicePredicate;

impl EndpointSlicePredicate {
    fn observe(
        &self,
        services: &ServicePredicate,
        ns: Option<&Namespace>,
        svc: Option<&Service>,
        slice: &EndpointSlice,
        ready: usize,
    ) -> Option<SliceObservation> {
        let slice_name = slice.metadata.name.as_deref()?;
        let namespace = slice.metadata.namespace.as_deref()?;
        let Some(svc) = svc else {
            trace!(slice = slice_name, "parent service unknown");
            return None;
        };
        let service = svc.metadata.name.as_deref()?;

        if parent_service(slice) != Some(service)
            || slice.address_type != IPV4
            || !count_pods_enabled(svc)
            || !services.should_watch(ns, svc)
        {
            return None;
        }

        Some(SliceObservation {
            namespace: namespace.to_owned(),
            service: service.to_owned(),
            slice: slice_name.to_owned(),
            ready,
        })
    }

    pub fn on_create(
        &self,
        services: &ServicePredicate,
        ns: Option<&Namespace>,
        svc: Option<&Service>,
        slice: &EndpointSlice,
    ) -> Option<SliceObservation> {
        self.observe(services, ns, svc, slice, ready_count(slice))
    }

    /// fires only when the ready count changed
    pub fn on_update(
        &self,
        services: &ServicePredicate,
        ns: Option<&Namespace>,
        svc: Option<&Service>,
        old: &EndpointSlice,
        new: &EndpointSlice,
    ) -> Option<SliceObservation> {
        let ready = ready_count(new);
        if ready == ready_count(old) {
            return None;
        }
        self.observe(services, ns, svc, new, ready)
    }

    /// Ready count of every known IPv4 slice backing the service, including
    /// slices that changed while the service was not watched.
    pub fn ready_counts<'a>(
        &self,
        ns: &str,
        service: &str,
        slices: impl IntoIterator<Item = &'a EndpointSlice>,
    ) -> SliceCounts {
        slices
            .into_iter()
            .filter(|slice| {
                slice.metadata.namespace.as_deref() == Some(ns)
                    && parent_service(slice) == Some(service)
                    && slice.address_type == IPV4
            })
            .filter_map(|slice| Some((slice.metadata.name.clone()?, ready_count(slice))))
            .collect()
    }

    /// a deleted slice contributes no address
    pub fn on_delete(
        &self,
        services: &ServicePredicate,
        ns: Option<&Namespace>,
        svc: Option<&Service>,
        slice: &EndpointSlice,
    ) -> Option<SliceObservation> {
        self.observe(services, ns, svc, slice, 0)
    }
}
