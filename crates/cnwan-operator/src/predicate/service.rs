use k8s_openapi::api::core::v1::{LoadBalancerIngress, Namespace, Service};
use tracing::{debug, trace};

use crate::filter::filter_annotations;
use crate::policy::NamespacePolicy;

use super::{Action, WatchCache, object_key};

const LOAD_BALANCER: &str = "LoadBalancer";

/// A service is only ever watched if it is a load balancer with an ingress
/// and at least one allowed annotation, regardless of its namespace.
pub fn service_qualifies(svc: &Service, annotations: &[String]) -> bool {
    let is_load_balancer = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some(LOAD_BALANCER);

    is_load_balancer
        && !ingress(svc).is_empty()
        && !filtered_annotations(svc, annotations).is_empty()
}

fn ingress(svc: &Service) -> &[LoadBalancerIngress] {
    svc.status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default()
}

fn filtered_annotations(
    svc: &Service,
    annotations: &[String],
) -> std::collections::BTreeMap<String, String> {
    svc.metadata
        .annotations
        .as_ref()
        .map(|source| filter_annotations(source, annotations))
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct ServicePredicate {
    policy: NamespacePolicy,
    annotations: Vec<String>,
    cache: WatchCache,
}

impl ServicePredicate {
    pub fn new(policy: NamespacePolicy, annotations: Vec<String>) -> Self {
        Self {
            policy,
            annotations,
            cache: WatchCache::default(),
        }
    }

    pub fn cache(&self) -> &WatchCache {
        &self.cache
    }

    /// the service qualifies and its namespace is in the watched scope
    pub fn should_watch(&self, ns: Option<&Namespace>, svc: &Service) -> bool {
        let Some(ns) = ns else {
            trace!(svc = ?svc.metadata.name, "namespace unknown, service not watched");
            return false;
        };
        self.policy.should_watch(ns.metadata.labels.as_ref())
            && service_qualifies(svc, &self.annotations)
    }

    pub fn on_create(&self, ns: Option<&Namespace>, svc: &Service) -> Option<Action> {
        let key = key(svc)?;
        let watched = self.should_watch(ns, svc);
        self.cache.record(key, watched);
        watched.then_some(Action::Create)
    }

    pub fn on_update(&self, ns: Option<&Namespace>, old: &Service, new: &Service) -> Option<Action> {
        let key = key(new)?;
        let was_watched = self.cache.is_watched(&key);
        let is_watched = self.should_watch(ns, new);

        if was_watched != is_watched {
            debug!(svc = %key, is_watched, "service watch scope changed");
            self.cache.record(key, is_watched);
            return Some(if is_watched {
                Action::Create
            } else {
                Action::Delete
            });
        }

        if is_watched && self.relevant_change(old, new) {
            return Some(Action::Update);
        }

        None
    }

    pub fn on_delete(&self, ns: Option<&Namespace>, svc: &Service) -> Option<Action> {
        let key = key(svc)?;
        self.cache.record(key, false);
        self.should_watch(ns, svc).then_some(Action::Delete)
    }

    /// the namespace of the service entered the watched scope
    pub fn adopt(&self, svc: &Service) {
        if let Some(key) = key(svc) {
            self.cache.record(key, true);
        }
    }

    /// a namespace left the watched scope, its services are no longer tracked
    pub fn forget_namespace(&self, ns_name: &str) {
        self.cache.forget_prefix(&format!("{ns_name}/"));
    }

    fn relevant_change(&self, old: &Service, new: &Service) -> bool {
        filtered_annotations(old, &self.annotations) != filtered_annotations(new, &self.annotations)
            || ingress(old) != ingress(new)
            || old.spec.as_ref().map(|spec| (&spec.ports, &spec.external_ips))
                != new.spec.as_ref().map(|spec| (&spec.ports, &spec.external_ips))
    }
}

fn key(svc: &Service) -> Option<String> {
    Some(object_key(
        svc.metadata.namespace.as_deref()?,
        svc.metadata.name.as_deref()?,
    ))
}

#[cfg(test)]
pub(crate) mod fixture {
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, Namespace, Service, ServicePort, ServiceSpec,
        ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub fn namespace(name: &str, labels: &[&str]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(
                    labels
                        .iter()
                        .map(|l| (l.to_string(), "yes".to_owned()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn load_balancer(ns: &str, name: &str, ip: &str, annotations: &[(&str, &str)]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(ns.to_owned()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_owned()),
                ports: Some(vec![ServicePort {
                    port: 80,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some(ip.to_owned()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ALLOWED_LABEL;
    use crate::policy::ListPolicy;

    use super::fixture::{load_balancer, namespace};
    use super::*;

    fn predicate() -> ServicePredicate {
        ServicePredicate::new(
            NamespacePolicy::new(ListPolicy::AllowList),
            vec!["cnwan.io/*".to_owned()],
        )
    }

    #[test]
    fn test_service_qualification() {
        let allowed = vec!["cnwan.io/*".to_owned()];
        let svc = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "x")]);
        assert!(service_qualifies(&svc, &allowed));

        let mut cluster_ip = svc.clone();
        if let Some(spec) = cluster_ip.spec.as_mut() {
            spec.type_ = Some("ClusterIP".to_owned());
        }
        assert!(!service_qualifies(&cluster_ip, &allowed));

        let mut pending = svc.clone();
        pending.status = None;
        assert!(!service_qualifies(&pending, &allowed));

        let unannotated = load_balancer("prod", "api", "1.2.3.4", &[("other.io/x", "y")]);
        assert!(!service_qualifies(&unannotated, &allowed));
    }

    #[test]
    fn test_namespace_scope_applies() {
        let predicate = predicate();
        let svc = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "x")]);

        assert_eq!(predicate.on_create(None, &svc), None);
        assert_eq!(predicate.on_create(Some(&namespace("prod", &[])), &svc), None);
        assert!(predicate.cache().is_empty());
        assert_eq!(
            predicate.on_create(Some(&namespace("prod", &[ALLOWED_LABEL])), &svc),
            Some(Action::Create)
        );
        assert!(predicate.cache().is_watched("prod/api"));
    }

    #[test]
    fn test_update_transitions_and_relevant_changes() {
        let predicate = predicate();
        let ns = namespace("prod", &[ALLOWED_LABEL]);
        let svc = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "x")]);
        assert_eq!(predicate.on_create(Some(&ns), &svc), Some(Action::Create));

        // nothing relevant changed
        let mut relabelled = svc.clone();
        relabelled.metadata.labels = Some([("app".to_owned(), "api".to_owned())].into());
        assert_eq!(predicate.on_update(Some(&ns), &svc, &relabelled), None);

        let moved = load_balancer("prod", "api", "5.6.7.8", &[("cnwan.io/profile", "x")]);
        assert_eq!(predicate.on_update(Some(&ns), &svc, &moved), Some(Action::Update));

        let reprofiled = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "y")]);
        assert_eq!(
            predicate.on_update(Some(&ns), &svc, &reprofiled),
            Some(Action::Update)
        );

        let unannotated = load_balancer("prod", "api", "1.2.3.4", &[]);
        assert_eq!(
            predicate.on_update(Some(&ns), &svc, &unannotated),
            Some(Action::Delete)
        );
        assert!(predicate.cache().is_empty());
        assert_eq!(
            predicate.on_update(Some(&ns), &unannotated, &svc),
            Some(Action::Create)
        );
    }

    #[test]
    fn test_adopted_and_forgotten_services() {
        let predicate = predicate();
        let ns = namespace("prod", &[ALLOWED_LABEL]);
        let svc = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "x")]);
        let moved = load_balancer("prod", "api", "5.6.7.8", &[("cnwan.io/profile", "x")]);

        // registered with its namespace, later changes are updates
        predicate.adopt(&svc);
        assert_eq!(predicate.on_update(Some(&ns), &svc, &moved), Some(Action::Update));

        predicate.forget_namespace("prod");
        assert!(predicate.cache().is_empty());
        assert_eq!(predicate.on_update(Some(&ns), &svc, &moved), Some(Action::Create));
    }

    #[test]
    fn test_delete() {
        let predicate = predicate();
        let ns = namespace("prod", &[ALLOWED_LABEL]);
        let svc = load_balancer("prod", "api", "1.2.3.4", &[("cnwan.io/profile", "x")]);

        predicate.on_create(Some(&ns), &svc);
        assert_eq!(predicate.on_delete(Some(&ns), &svc), Some(Action::Delete));
        assert!(predicate.cache().is_empty());
        assert_eq!(predicate.on_delete(Some(&namespace("prod", &[])), &svc), None);
    }
}
