use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, instrument, warn};

use crate::model::Endpoint;
use crate::{RegistryError, Result};

use super::Broker;

/// Per endpoint failures of a batch, keyed by endpoint name
pub type EndpointErrors = HashMap<String, RegistryError>;

impl Broker {
    /// Converge the endpoints of a service to `desired`.
    ///
    /// Only validation and listing failures abort the call. Every other failure
    /// is reported per endpoint so one bad endpoint never blocks the batch.
    /// An empty `desired` removes every endpoint owned by the operator.
    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    pub async fn manage_serv_endps(
        &self,
        ns_name: &str,
        serv_name: &str,
        desired: &[Endpoint],
    ) -> Result<EndpointErrors> {
        if ns_name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }
        if serv_name.is_empty() {
            return Err(RegistryError::ServNameNotProvided);
        }

        let mut working: BTreeMap<String, Endpoint> = BTreeMap::new();
        for endp in desired {
            if endp.name.is_empty() {
                return Err(RegistryError::EndpNameNotProvided);
            }
            let mut endp = endp.clone();
            endp.ns_name = ns_name.to_owned();
            endp.serv_name = serv_name.to_owned();
            self.ownership.stamp(&mut endp.metadata);
            working.insert(endp.name.clone(), endp);
        }

        let _guard = self.cache.lock().await;
        let current = self
            .list_deadline(
                "list endpoints",
                self.registry.list_endp(ns_name, serv_name),
            )
            .await?;

        let mut errors = EndpointErrors::new();

        for endp in current {
            if !self.ownership.is_owned(&endp.metadata) {
                debug!(endp = %endp.name, "endpoint not owned by the operator, skipping");
                working.remove(&endp.name);
                errors.insert(endp.name, RegistryError::EndpNotOwnedByOp);
                continue;
            }

            let Some(wanted) = working.remove(&endp.name) else {
                match self
                    .write_deadline(
                        "delete endpoint",
                        self.registry.delete_endp(ns_name, serv_name, &endp.name),
                    )
                    .await
                {
                    Ok(()) => info!(endp = %endp.name, "endpoint deleted"),
                    Err(err) => {
                        warn!(endp = %endp.name, %err, "unable to delete endpoint");
                        errors.insert(endp.name, err);
                    }
                }
                continue;
            };

            if wanted.address == endp.address
                && wanted.port == endp.port
                && self.ownership.same_metadata(&wanted.metadata, &endp.metadata)
            {
                continue;
            }

            let name = wanted.name.clone();
            match self
                .write_deadline("update endpoint", self.registry.update_endp(wanted))
                .await
            {
                Ok(_) => info!(endp = %name, "endpoint updated"),
                Err(err) => {
                    warn!(endp = %name, %err, "unable to update endpoint");
                    errors.insert(name, err);
                }
            }
        }

        for (name, endp) in working {
            match self
                .write_deadline("create endpoint", self.registry.create_endp(endp))
                .await
            {
                Ok(_) => info!(endp = %name, "endpoint created"),
                Err(err) => {
                    warn!(endp = %name, %err, "unable to create endpoint");
                    errors.insert(name, err);
                }
            }
        }

        Ok(errors)
    }
}
