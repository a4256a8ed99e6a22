use tracing::{debug, info, instrument, trace, warn};

use crate::model::Namespace;
use crate::{ChildFailure, RegistryError, Result};

use super::Broker;
use super::cache::LookupCache;

impl Broker {
    /// Make sure the namespace exists in the registry with the desired metadata.
    ///
    /// Returns the record as it is in the registry after the call. A namespace
    /// owned by someone else is returned as fetched and never modified.
    #[instrument(skip(self, desired), fields(ns = %desired.name))]
    pub async fn manage_ns(&self, desired: &Namespace) -> Result<Namespace> {
        desired.validate()?;
        let mut desired = desired.clone();
        self.ownership.stamp(&mut desired.metadata);

        let mut cache = self.cache.lock().await;
        let current = match self.fetch_ns(&mut cache, &desired.name).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                debug!("namespace not in registry, creating");
                let created = self
                    .write_deadline("create namespace", self.registry.create_ns(desired))
                    .await?;
                info!("namespace created");
                cache.put_ns(created.clone());
                return Ok(created);
            }
            Err(err) => return Err(err),
        };

        if !self.ownership.is_owned(&current.metadata) {
            debug!("namespace not owned by the operator, skipping");
            return Ok(current);
        }

        if self
            .ownership
            .same_metadata(&current.metadata, &desired.metadata)
        {
            trace!("namespace up to date");
            return Ok(current);
        }

        cache.invalidate_ns(&desired.name);
        let updated = self
            .write_deadline("update namespace", self.registry.update_ns(desired))
            .await?;
        info!("namespace updated");
        Ok(updated)
    }

    /// Delete a namespace owned by the operator.
    ///
    /// With `force_not_empty` the owned services are removed first. Any foreign
    /// service keeps the namespace alive and fails with [`RegistryError::NsNotOwnedServs`].
    #[instrument(skip(self))]
    pub async fn remove_ns(&self, name: &str, force_not_empty: bool) -> Result<()> {
        if name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }

        let mut cache = self.cache.lock().await;
        let current = match self.fetch_ns(&mut cache, name).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                debug!("namespace not in registry, nothing to delete");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !self.ownership.is_owned(&current.metadata) {
            return Err(RegistryError::NsNotOwnedByOp);
        }

        let services = self
            .list_deadline("list services", self.registry.list_serv(name))
            .await?;

        if !services.is_empty() {
            if !force_not_empty {
                return Err(RegistryError::NsNotEmpty);
            }

            let (owned, foreign): (Vec<_>, Vec<_>) = services
                .into_iter()
                .partition(|serv| self.ownership.is_owned(&serv.metadata));

            let mut failures = vec![];
            for serv in owned {
                match self.remove_serv_locked(&mut cache, name, &serv.name, true).await {
                    Ok(()) => debug!(serv = %serv.name, "owned service deleted"),
                    Err(err) => {
                        warn!(serv = %serv.name, %err, "unable to delete owned service");
                        failures.push(ChildFailure::new(serv.name, err));
                    }
                }
            }

            if !foreign.is_empty() {
                debug!(count = foreign.len(), "namespace holds foreign services");
                return Err(RegistryError::NsNotOwnedServs);
            }

            if !failures.is_empty() {
                return Err(RegistryError::ChildDeletion {
                    parent: name.to_owned(),
                    failures,
                });
            }
        }

        cache.invalidate_ns(name);
        self.write_deadline("delete namespace", self.registry.delete_ns(name))
            .await?;
        info!("namespace deleted");
        Ok(())
    }

    pub(super) async fn fetch_ns(&self, cache: &mut LookupCache, name: &str) -> Result<Namespace> {
        if let Some(ns) = cache.ns(name) {
            trace!(ns = name, "namespace served from cache");
            return Ok(ns);
        }

        let ns = self
            .get_deadline("get namespace", self.registry.get_ns(name))
            .await?;
        cache.put_ns(ns.clone());
        Ok(ns)
    }
}
