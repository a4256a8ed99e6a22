//!
//! Conversion of cluster objects into registry records.
//!
use k8s_openapi::api::core::v1::{Namespace, Service};
use sha2::{Digest, Sha256};

use cnwan_registry::{Endpoint, Metadata};

use crate::filter::filter_annotations;
use crate::{OperatorError, Result};

const ENDPOINT_HASH_LEN: usize = 10;

/// Registry view of one service and its namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub namespace: cnwan_registry::Namespace,
    pub service: cnwan_registry::Service,
    pub endpoints: Vec<Endpoint>,
}

/// Build the registry records for a service.
///
/// Endpoints are every address of the service (external IPs, then load
/// balancer ingresses) paired with every declared port. Endpoint names are
/// derived from address and port only.
pub fn extract_data(
    ns: Option<&Namespace>,
    svc: Option<&Service>,
    allowed: &[String],
) -> Result<Snapshot> {
    let ns = ns.ok_or(OperatorError::NamespaceNotProvided)?;
    let svc = svc.ok_or(OperatorError::ServiceNotProvided)?;
    let ns_name = ns
        .metadata
        .name
        .as_deref()
        .ok_or(OperatorError::MissingName("namespace"))?;
    let svc_name = svc
        .metadata
        .name
        .as_deref()
        .ok_or(OperatorError::MissingName("service"))?;

    let ns_metadata = filtered(ns.metadata.annotations.as_ref(), allowed);
    let svc_metadata = filtered(svc.metadata.annotations.as_ref(), allowed);

    let ports: Vec<i32> = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().map(|port| port.port).collect())
        .unwrap_or_default();

    let endpoints = addresses(svc)
        .iter()
        .flat_map(|address| {
            ports.iter().map(move |port| {
                Endpoint::new(ns_name, svc_name, endpoint_name(svc_name, address, *port))
                    .with_address(address.clone(), *port)
            })
        })
        .map(|endp| endp.with_metadata(svc_metadata.clone()))
        .collect();

    Ok(Snapshot {
        namespace: cnwan_registry::Namespace::new(ns_name).with_metadata(ns_metadata),
        service: cnwan_registry::Service::new(ns_name, svc_name).with_metadata(svc_metadata),
        endpoints,
    })
}

/// `<service>-<first 10 hex chars of sha256("address:port")>`
pub fn endpoint_name(svc_name: &str, address: &str, port: i32) -> String {
    let digest = Sha256::digest(format!("{address}:{port}").as_bytes());
    let hash = hex::encode(digest);
    format!("{svc_name}-{}", &hash[..ENDPOINT_HASH_LEN])
}

fn filtered(
    annotations: Option<&std::collections::BTreeMap<String, String>>,
    allowed: &[String],
) -> Metadata {
    annotations
        .map(|annotations| filter_annotations(annotations, allowed))
        .unwrap_or_default()
}

/// external IPs and ingress addresses, ingress hostnames when no IP is set
fn addresses(svc: &Service) -> Vec<String> {
    let external = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.external_ips.clone())
        .unwrap_or_default();

    let ingress = svc
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|ingress| ingress.ip.clone().or_else(|| ingress.hostname.clone()));

    let mut addresses: Vec<String> = vec![];
    for address in external.into_iter().chain(ingress) {
        if !address.is_empty() && !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    addresses
}
