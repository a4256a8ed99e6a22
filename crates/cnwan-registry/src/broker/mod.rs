//!
//! # Registry Broker
//!
//! Decides when a namespace, service or endpoint record must be created,
//! updated or deleted in the service registry. Every mutation is gated by
//! the ownership pair stamped in the record metadata.
//!
mod cache;
mod endpoint;
mod namespace;
mod service;

use std::future::Future;
use std::time::Duration;

use async_lock::Mutex;
use tracing::trace;

use crate::model::Metadata;
use crate::registry::SharedRegistry;
use crate::{RegistryError, Result};

use self::cache::LookupCache;

pub use self::endpoint::EndpointErrors;

pub const DEFAULT_OWNER_KEY: &str = "owner";
pub const DEFAULT_OWNER_VALUE: &str = "cnwan-operator";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Reserved metadata pair identifying records managed by this operator,
/// plus extra metadata stamped on every managed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    key: String,
    value: String,
    persistent: Metadata,
}

impl Default for Ownership {
    fn default() -> Self {
        Self::new(DEFAULT_OWNER_KEY, DEFAULT_OWNER_VALUE)
    }
}

impl Ownership {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            persistent: Metadata::new(),
        }
    }

    pub fn with_persistent(mut self, persistent: Metadata) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// add persistent metadata and the ownership pair; the pair always wins
    pub fn stamp(&self, metadata: &mut Metadata) {
        for (key, value) in &self.persistent {
            metadata.insert(key.clone(), value.clone());
        }
        metadata.insert(self.key.clone(), self.value.clone());
    }

    pub fn is_owned(&self, metadata: &Metadata) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }

    /// compare two metadata maps ignoring the ownership pair
    pub fn same_metadata(&self, left: &Metadata, right: &Metadata) -> bool {
        let strip = |metadata: &Metadata| {
            metadata
                .iter()
                .filter(|(key, _)| **key != self.key)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Metadata>()
        };
        strip(left) == strip(right)
    }
}

/// Deadlines applied to every registry call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub get: Duration,
    pub list: Duration,
    pub write: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            get: Duration::from_secs(10),
            list: Duration::from_secs(30),
            write: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub owner_key: String,
    pub owner_value: String,
    pub persistent_metadata: Metadata,
    pub timeouts: OperationTimeouts,
    pub cache_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            owner_key: DEFAULT_OWNER_KEY.to_owned(),
            owner_value: DEFAULT_OWNER_VALUE.to_owned(),
            persistent_metadata: Metadata::new(),
            timeouts: OperationTimeouts::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl BrokerConfig {
    fn ownership(&self) -> Ownership {
        Ownership::new(self.owner_key.clone(), self.owner_value.clone())
            .with_persistent(self.persistent_metadata.clone())
    }
}

#[derive(Default)]
pub struct BrokerBuilder {
    registry: Option<SharedRegistry>,
    config: BrokerConfig,
}

impl BrokerBuilder {
    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Broker> {
        let registry = self.registry.ok_or(RegistryError::ServRegNotProvided)?;
        Ok(Broker {
            registry,
            ownership: self.config.ownership(),
            timeouts: self.config.timeouts,
            cache: Mutex::new(LookupCache::new(self.config.cache_ttl)),
        })
    }
}

/// Ownership aware front of a [`ServiceRegistry`](crate::ServiceRegistry).
///
/// Each public operation holds the cache lock for its whole body, which makes
/// the call atomic with respect to the broker's own cache.
pub struct Broker {
    registry: SharedRegistry,
    ownership: Ownership,
    timeouts: OperationTimeouts,
    cache: Mutex<LookupCache>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("ownership", &self.ownership)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    async fn get_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_deadline(operation, self.timeouts.get, fut).await
    }

    async fn list_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_deadline(operation, self.timeouts.list, fut).await
    }

    async fn write_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_deadline(operation, self.timeouts.write, fut).await
    }
}

/// race a registry call against a timer
async fn with_deadline<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        res = fut => res,
        _ = fluvio_future::timer::sleep(timeout) => {
            trace!(operation, ?timeout, "registry call expired");
            Err(RegistryError::Timeout { operation, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::backend::memory::MemoryRegistry;
    use crate::model::{Metadata, Namespace};
    use crate::RegistryError;

    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_stamp_and_compare() {
        let ownership = Ownership::default()
            .with_persistent(metadata(&[("cnwan.io/platform", "gke")]));
        let mut desired = metadata(&[("team", "payments")]);
        ownership.stamp(&mut desired);

        assert!(ownership.is_owned(&desired));
        assert_eq!(desired.get("cnwan.io/platform").map(String::as_str), Some("gke"));
        assert!(!ownership.is_owned(&metadata(&[("owner", "someone-else")])));

        let current = metadata(&[("team", "payments"), ("cnwan.io/platform", "gke")]);
        assert!(ownership.same_metadata(&desired, &current));
        assert!(!ownership.same_metadata(&desired, &metadata(&[("team", "payments")])));
    }

    #[test]
    fn test_builder_requires_registry() {
        let err = Broker::builder().build().expect_err("no registry");
        assert!(matches!(err, RegistryError::ServRegNotProvided));
    }

    #[fluvio_future::test]
    async fn test_registry_call_deadline() {
        let registry = MemoryRegistry::new_shared();
        registry.with_latency(Duration::from_millis(200));
        let broker = Broker::builder()
            .registry(registry)
            .config(BrokerConfig {
                timeouts: OperationTimeouts {
                    get: Duration::from_millis(20),
                    list: Duration::from_millis(20),
                    write: Duration::from_millis(20),
                },
                ..Default::default()
            })
            .build()
            .expect("broker");

        let err = broker
            .manage_ns(&Namespace::new("prod"))
            .await
            .expect_err("should time out");
        assert!(matches!(err, RegistryError::Timeout { operation: "get namespace", .. }));
        assert!(err.is_retryable());
    }
}
