use tracing::{debug, info, instrument, trace, warn};

use crate::model::Service;
use crate::{ChildFailure, RegistryError, Result};

use super::Broker;
use super::cache::LookupCache;

impl Broker {
    /// Make sure the service exists under its namespace with the desired metadata.
    ///
    /// The parent namespace must already be in the registry.
    #[instrument(skip(self, desired), fields(ns = %desired.ns_name, serv = %desired.name))]
    pub async fn manage_serv(&self, desired: &Service) -> Result<Service> {
        desired.validate()?;
        let mut desired = desired.clone();
        self.ownership.stamp(&mut desired.metadata);

        let mut cache = self.cache.lock().await;
        self.fetch_ns(&mut cache, &desired.ns_name).await?;

        let current = match self
            .fetch_serv(&mut cache, &desired.ns_name, &desired.name)
            .await
        {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                debug!("service not in registry, creating");
                let created = self
                    .write_deadline("create service", self.registry.create_serv(desired))
                    .await?;
                info!("service created");
                cache.put_serv(created.clone());
                return Ok(created);
            }
            Err(err) => return Err(err),
        };

        if !self.ownership.is_owned(&current.metadata) {
            debug!("service not owned by the operator, skipping");
            return Ok(current);
        }

        if self
            .ownership
            .same_metadata(&current.metadata, &desired.metadata)
        {
            trace!("service up to date");
            return Ok(current);
        }

        cache.invalidate_serv(&desired.ns_name, &desired.name);
        let updated = self
            .write_deadline("update service", self.registry.update_serv(desired))
            .await?;
        info!("service updated");
        Ok(updated)
    }

    /// Delete a service owned by the operator.
    ///
    /// With `force_not_empty` the owned endpoints are removed first. Any foreign
    /// endpoint keeps the service alive and fails with [`RegistryError::ServNotOwnedEndps`].
    #[instrument(skip(self))]
    pub async fn remove_serv(&self, ns_name: &str, name: &str, force_not_empty: bool) -> Result<()> {
        if ns_name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }
        if name.is_empty() {
            return Err(RegistryError::ServNameNotProvided);
        }

        let mut cache = self.cache.lock().await;
        self.remove_serv_locked(&mut cache, ns_name, name, force_not_empty)
            .await
    }

    /// body of [`Broker::remove_serv`], shared with the namespace cascade
    pub(super) async fn remove_serv_locked(
        &self,
        cache: &mut LookupCache,
        ns_name: &str,
        name: &str,
        force_not_empty: bool,
    ) -> Result<()> {
        let current = match self.fetch_serv(cache, ns_name, name).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                debug!(serv = name, "service not in registry, nothing to delete");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !self.ownership.is_owned(&current.metadata) {
            return Err(RegistryError::ServNotOwnedByOp);
        }

        let endpoints = self
            .list_deadline("list endpoints", self.registry.list_endp(ns_name, name))
            .await?;

        if !endpoints.is_empty() {
            if !force_not_empty {
                return Err(RegistryError::ServNotEmpty);
            }

            let (owned, foreign): (Vec<_>, Vec<_>) = endpoints
                .into_iter()
                .partition(|endp| self.ownership.is_owned(&endp.metadata));

            let mut failures = vec![];
            for endp in owned {
                match self
                    .write_deadline(
                        "delete endpoint",
                        self.registry.delete_endp(ns_name, name, &endp.name),
                    )
                    .await
                {
                    Ok(()) => debug!(endp = %endp.name, "owned endpoint deleted"),
                    Err(err) => {
                        warn!(endp = %endp.name, %err, "unable to delete owned endpoint");
                        failures.push(ChildFailure::new(endp.name, err));
                    }
                }
            }

            if !foreign.is_empty() {
                debug!(count = foreign.len(), "service holds foreign endpoints");
                return Err(RegistryError::ServNotOwnedEndps);
            }

            if !failures.is_empty() {
                return Err(RegistryError::ChildDeletion {
                    parent: format!("{ns_name}/{name}"),
                    failures,
                });
            }
        }

        cache.invalidate_serv(ns_name, name);
        self.write_deadline("delete service", self.registry.delete_serv(ns_name, name))
            .await?;
        info!(serv = name, "service deleted");
        Ok(())
    }

    async fn fetch_serv(
        &self,
        cache: &mut LookupCache,
        ns_name: &str,
        name: &str,
    ) -> Result<Service> {
        if let Some(serv) = cache.serv(ns_name, name) {
            trace!(ns = ns_name, serv = name, "service served from cache");
            return Ok(serv);
        }

        let serv = self
            .get_deadline("get service", self.registry.get_serv(ns_name, name))
            .await?;
        cache.put_serv(serv.clone());
        Ok(serv)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::backend::memory::{MemoryRegistry, RegistryCall};
    use crate::model::{Endpoint, Metadata, Namespace, Service};
    use crate::{Broker, RegistryError};

    fn owned() -> Metadata {
        [("owner".to_owned(), "cnwan-operator".to_owned())]
            .into_iter()
            .collect()
    }

    fn broker(registry: &Arc<MemoryRegistry>) -> Broker {
        Broker::builder()
            .registry(registry.clone())
            .build()
            .expect("broker")
    }

    async fn seeded() -> Arc<MemoryRegistry> {
        let registry = MemoryRegistry::new_shared();
        registry
            .seed_ns(Namespace::new("prod").with_metadata(owned()))
            .await
            .expect("seeded");
        registry
    }

    #[fluvio_future::test]
    async fn test_manage_serv_requires_namespace() {
        let registry = MemoryRegistry::new_shared();
        let err = broker(&registry)
            .manage_serv(&Service::new("prod", "api"))
            .await
            .expect_err("no namespace");
        assert!(err.is_not_found());
        assert_eq!(registry.count_calls(RegistryCall::is_write).await, 0);
    }

    #[fluvio_future::test]
    async fn test_manage_serv_validates_names() {
        let registry = seeded().await;
        let err = broker(&registry)
            .manage_serv(&Service::new("prod", ""))
            .await
            .expect_err("no name");
        assert!(matches!(err, RegistryError::ServNameNotProvided));
        assert!(registry.calls().await.is_empty());
    }

    #[fluvio_future::test]
    async fn test_manage_serv_create_update_noop() {
        let registry = seeded().await;
        let broker = broker(&registry);
        let mut desired = Service::new("prod", "api");
        desired
            .metadata
            .insert("cnwan.io/traffic-profile".to_owned(), "standard".to_owned());

        broker.manage_serv(&desired).await.expect("created");
        broker.manage_serv(&desired).await.expect("noop");
        assert_eq!(registry.count_calls(RegistryCall::is_update).await, 0);

        desired
            .metadata
            .insert("cnwan.io/traffic-profile".to_owned(), "video".to_owned());
        let updated = broker.manage_serv(&desired).await.expect("updated");

        assert_eq!(
            updated.metadata.get("cnwan.io/traffic-profile").map(String::as_str),
            Some("video")
        );
        assert_eq!(registry.count_calls(RegistryCall::is_create).await, 1);
        assert_eq!(registry.count_calls(RegistryCall::is_update).await, 1);
    }

    #[fluvio_future::test]
    async fn test_foreign_service_is_protected() {
        let registry = seeded().await;
        let foreign = Service::new("prod", "api");
        registry.seed_serv(foreign.clone()).await.expect("seeded");
        let broker = broker(&registry);

        let current = broker
            .manage_serv(&Service::new("prod", "api"))
            .await
            .expect("managed");
        assert_eq!(current, foreign);

        let err = broker
            .remove_serv("prod", "api", true)
            .await
            .expect_err("foreign");
        assert!(matches!(err, RegistryError::ServNotOwnedByOp));
        assert_eq!(registry.count_calls(RegistryCall::is_write).await, 0);
    }

    #[fluvio_future::test]
    async fn test_remove_serv_with_endpoints() {
        let registry = seeded().await;
        registry
            .seed_serv(Service::new("prod", "api").with_metadata(owned()))
            .await
            .expect("seeded");
        registry
            .seed_endp(
                Endpoint::new("prod", "api", "api-1")
                    .with_address("10.0.0.1", 80)
                    .with_metadata(owned()),
            )
            .await
            .expect("seeded");
        let broker = broker(&registry);

        let err = broker
            .remove_serv("prod", "api", false)
            .await
            .expect_err("not empty");
        assert!(matches!(err, RegistryError::ServNotEmpty));

        broker
            .remove_serv("prod", "api", true)
            .await
            .expect("forced");
        let calls = registry.calls().await;
        assert!(calls.contains(&RegistryCall::DeleteEndp(
            "prod".to_owned(),
            "api".to_owned(),
            "api-1".to_owned()
        )));
        assert!(calls.contains(&RegistryCall::DeleteServ("prod".to_owned(), "api".to_owned())));
        assert!(registry.service("prod", "api").await.is_none());
    }

    #[fluvio_future::test]
    async fn test_forced_remove_keeps_service_with_foreign_endpoint() {
        let registry = seeded().await;
        registry
            .seed_serv(Service::new("prod", "api").with_metadata(owned()))
            .await
            .expect("seeded");
        registry
            .seed_endp(Endpoint::new("prod", "api", "mine").with_metadata(owned()))
            .await
            .expect("seeded");
        registry
            .seed_endp(Endpoint::new("prod", "api", "theirs"))
            .await
            .expect("seeded");

        let err = broker(&registry)
            .remove_serv("prod", "api", true)
            .await
            .expect_err("foreign endpoint");

        assert!(matches!(err, RegistryError::ServNotOwnedEndps));
        assert!(registry.service("prod", "api").await.is_some());
        assert_eq!(registry.count_calls(RegistryCall::is_delete).await, 1);
    }
}
