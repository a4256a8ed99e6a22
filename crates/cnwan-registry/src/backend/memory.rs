//!
//! Volatile registry kept in memory.
//!
//! Every call goes to a call log, so callers can assert which registry
//! operations were issued. Failures can be injected per call.
//!
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_lock::{Mutex, RwLock};
use async_trait::async_trait;
use tracing::trace;

use crate::model::{Endpoint, Namespace, Service};
use crate::registry::ServiceRegistry;
use crate::{RegistryError, Result};

/// One call received by the [`MemoryRegistry`], with the names it targeted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryCall {
    GetNs(String),
    ListNs,
    CreateNs(String),
    UpdateNs(String),
    DeleteNs(String),
    GetServ(String, String),
    ListServ(String),
    CreateServ(String, String),
    UpdateServ(String, String),
    DeleteServ(String, String),
    GetEndp(String, String, String),
    ListEndp(String, String),
    CreateEndp(String, String, String),
    UpdateEndp(String, String, String),
    DeleteEndp(String, String, String),
}

impl RegistryCall {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreateNs(_) | Self::CreateServ(..) | Self::CreateEndp(..)
        )
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Self::UpdateNs(_) | Self::UpdateServ(..) | Self::UpdateEndp(..)
        )
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteNs(_) | Self::DeleteServ(..) | Self::DeleteEndp(..)
        )
    }

    pub fn is_write(&self) -> bool {
        self.is_create() || self.is_update() || self.is_delete()
    }
}

#[derive(Debug)]
struct NsEntry {
    ns: Namespace,
    services: BTreeMap<String, ServEntry>,
}

#[derive(Debug)]
struct ServEntry {
    serv: Service,
    endpoints: BTreeMap<String, Endpoint>,
}

#[derive(Debug, Default)]
struct Tree {
    namespaces: BTreeMap<String, NsEntry>,
}

impl Tree {
    fn ns(&self, name: &str) -> Result<&NsEntry> {
        self.namespaces.get(name).ok_or(RegistryError::NotFound)
    }

    fn ns_mut(&mut self, name: &str) -> Result<&mut NsEntry> {
        self.namespaces.get_mut(name).ok_or(RegistryError::NotFound)
    }

    fn serv(&self, ns_name: &str, name: &str) -> Result<&ServEntry> {
        self.ns(ns_name)?
            .services
            .get(name)
            .ok_or(RegistryError::NotFound)
    }

    fn serv_mut(&mut self, ns_name: &str, name: &str) -> Result<&mut ServEntry> {
        self.ns_mut(ns_name)?
            .services
            .get_mut(name)
            .ok_or(RegistryError::NotFound)
    }

    fn create_ns(&mut self, ns: Namespace) -> Result<Namespace> {
        ns.validate()?;
        if self.namespaces.contains_key(&ns.name) {
            return Err(RegistryError::AlreadyExists);
        }
        self.namespaces.insert(
            ns.name.clone(),
            NsEntry {
                ns: ns.clone(),
                services: BTreeMap::new(),
            },
        );
        Ok(ns)
    }

    fn update_ns(&mut self, ns: Namespace) -> Result<Namespace> {
        ns.validate()?;
        self.ns_mut(&ns.name)?.ns = ns.clone();
        Ok(ns)
    }

    fn delete_ns(&mut self, name: &str) -> Result<()> {
        if !self.ns(name)?.services.is_empty() {
            return Err(RegistryError::NsNotEmpty);
        }
        self.namespaces.remove(name);
        Ok(())
    }

    fn create_serv(&mut self, serv: Service) -> Result<Service> {
        serv.validate()?;
        let parent = self.ns_mut(&serv.ns_name)?;
        if parent.services.contains_key(&serv.name) {
            return Err(RegistryError::AlreadyExists);
        }
        parent.services.insert(
            serv.name.clone(),
            ServEntry {
                serv: serv.clone(),
                endpoints: BTreeMap::new(),
            },
        );
        Ok(serv)
    }

    fn update_serv(&mut self, serv: Service) -> Result<Service> {
        serv.validate()?;
        self.serv_mut(&serv.ns_name, &serv.name)?.serv = serv.clone();
        Ok(serv)
    }

    fn delete_serv(&mut self, ns_name: &str, name: &str) -> Result<()> {
        if !self.serv(ns_name, name)?.endpoints.is_empty() {
            return Err(RegistryError::ServNotEmpty);
        }
        self.ns_mut(ns_name)?.services.remove(name);
        Ok(())
    }

    fn create_endp(&mut self, endp: Endpoint) -> Result<Endpoint> {
        endp.validate()?;
        let parent = self.serv_mut(&endp.ns_name, &endp.serv_name)?;
        if parent.endpoints.contains_key(&endp.name) {
            return Err(RegistryError::AlreadyExists);
        }
        parent.endpoints.insert(endp.name.clone(), endp.clone());
        Ok(endp)
    }

    fn update_endp(&mut self, endp: Endpoint) -> Result<Endpoint> {
        endp.validate()?;
        let current = self
            .serv_mut(&endp.ns_name, &endp.serv_name)?
            .endpoints
            .get_mut(&endp.name)
            .ok_or(RegistryError::NotFound)?;
        *current = endp.clone();
        Ok(endp)
    }

    fn delete_endp(&mut self, ns_name: &str, serv_name: &str, name: &str) -> Result<()> {
        self.serv_mut(ns_name, serv_name)?
            .endpoints
            .remove(name)
            .map(|_| ())
            .ok_or(RegistryError::NotFound)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    tree: RwLock<Tree>,
    calls: Mutex<Vec<RegistryCall>>,
    failures: Mutex<HashMap<RegistryCall, String>>,
    latency_ms: AtomicU64,
}

impl MemoryRegistry {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// delay every call, useful to exercise deadlines
    pub fn with_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// make every subsequent `call` fail with a backend error
    pub async fn fail_on(&self, call: RegistryCall, message: impl Into<String>) {
        self.failures.lock().await.insert(call, message.into());
    }

    pub async fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn count_calls(&self, filter: impl Fn(&RegistryCall) -> bool) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| filter(call))
            .count()
    }

    /// insert a record as an external actor would, bypassing the call log
    pub async fn seed_ns(&self, ns: Namespace) -> Result<()> {
        self.tree.write().await.create_ns(ns).map(|_| ())
    }

    pub async fn seed_serv(&self, serv: Service) -> Result<()> {
        self.tree.write().await.create_serv(serv).map(|_| ())
    }

    pub async fn seed_endp(&self, endp: Endpoint) -> Result<()> {
        self.tree.write().await.create_endp(endp).map(|_| ())
    }

    pub async fn namespace(&self, name: &str) -> Option<Namespace> {
        self.tree
            .read()
            .await
            .ns(name)
            .ok()
            .map(|entry| entry.ns.clone())
    }

    pub async fn service(&self, ns_name: &str, name: &str) -> Option<Service> {
        self.tree
            .read()
            .await
            .serv(ns_name, name)
            .ok()
            .map(|entry| entry.serv.clone())
    }

    pub async fn endpoint(&self, ns_name: &str, serv_name: &str, name: &str) -> Option<Endpoint> {
        self.tree
            .read()
            .await
            .serv(ns_name, serv_name)
            .ok()
            .and_then(|entry| entry.endpoints.get(name).cloned())
    }

    /// endpoints of a service sorted by name, empty when the service is missing
    pub async fn endpoints(&self, ns_name: &str, serv_name: &str) -> Vec<Endpoint> {
        self.tree
            .read()
            .await
            .serv(ns_name, serv_name)
            .map(|entry| entry.endpoints.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn record(&self, call: RegistryCall) -> Result<()> {
        trace!(?call, "registry call");
        let failure = self.failures.lock().await.get(&call).cloned();
        self.calls.lock().await.push(call);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            fluvio_future::timer::sleep(Duration::from_millis(latency)).await;
        }

        match failure {
            Some(message) => Err(RegistryError::Backend(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn get_ns(&self, name: &str) -> Result<Namespace> {
        self.record(RegistryCall::GetNs(name.to_owned())).await?;
        self.tree.read().await.ns(name).map(|entry| entry.ns.clone())
    }

    async fn list_ns(&self) -> Result<Vec<Namespace>> {
        self.record(RegistryCall::ListNs).await?;
        Ok(self
            .tree
            .read()
            .await
            .namespaces
            .values()
            .map(|entry| entry.ns.clone())
            .collect())
    }

    async fn create_ns(&self, ns: Namespace) -> Result<Namespace> {
        self.record(RegistryCall::CreateNs(ns.name.clone())).await?;
        self.tree.write().await.create_ns(ns)
    }

    async fn update_ns(&self, ns: Namespace) -> Result<Namespace> {
        self.record(RegistryCall::UpdateNs(ns.name.clone())).await?;
        self.tree.write().await.update_ns(ns)
    }

    async fn delete_ns(&self, name: &str) -> Result<()> {
        self.record(RegistryCall::DeleteNs(name.to_owned())).await?;
        self.tree.write().await.delete_ns(name)
    }

    async fn get_serv(&self, ns_name: &str, name: &str) -> Result<Service> {
        self.record(RegistryCall::GetServ(ns_name.to_owned(), name.to_owned()))
            .await?;
        self.tree
            .read()
            .await
            .serv(ns_name, name)
            .map(|entry| entry.serv.clone())
    }

    async fn list_serv(&self, ns_name: &str) -> Result<Vec<Service>> {
        self.record(RegistryCall::ListServ(ns_name.to_owned())).await?;
        Ok(self
            .tree
            .read()
            .await
            .ns(ns_name)?
            .services
            .values()
            .map(|entry| entry.serv.clone())
            .collect())
    }

    async fn create_serv(&self, serv: Service) -> Result<Service> {
        self.record(RegistryCall::CreateServ(
            serv.ns_name.clone(),
            serv.name.clone(),
        ))
        .await?;
        self.tree.write().await.create_serv(serv)
    }

    async fn update_serv(&self, serv: Service) -> Result<Service> {
        self.record(RegistryCall::UpdateServ(
            serv.ns_name.clone(),
            serv.name.clone(),
        ))
        .await?;
        self.tree.write().await.update_serv(serv)
    }

    async fn delete_serv(&self, ns_name: &str, name: &str) -> Result<()> {
        self.record(RegistryCall::DeleteServ(ns_name.to_owned(), name.to_owned()))
            .await?;
        self.tree.write().await.delete_serv(ns_name, name)
    }

    async fn get_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<Endpoint> {
        self.record(RegistryCall::GetEndp(
            ns_name.to_owned(),
            serv_name.to_owned(),
            name.to_owned(),
        ))
        .await?;
        self.tree
            .read()
            .await
            .serv(ns_name, serv_name)?
            .endpoints
            .get(name)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn list_endp(&self, ns_name: &str, serv_name: &str) -> Result<Vec<Endpoint>> {
        self.record(RegistryCall::ListEndp(
            ns_name.to_owned(),
            serv_name.to_owned(),
        ))
        .await?;
        Ok(self
            .tree
            .read()
            .await
            .serv(ns_name, serv_name)?
            .endpoints
            .values()
            .cloned()
            .collect())
    }

    async fn create_endp(&self, endp: Endpoint) -> Result<Endpoint> {
        self.record(RegistryCall::CreateEndp(
            endp.ns_name.clone(),
            endp.serv_name.clone(),
            endp.name.clone(),
        ))
        .await?;
        self.tree.write().await.create_endp(endp)
    }

    async fn update_endp(&self, endp: Endpoint) -> Result<Endpoint> {
        self.record(RegistryCall::UpdateEndp(
            endp.ns_name.clone(),
            endp.serv_name.clone(),
            endp.name.clone(),
        ))
        .await?;
        self.tree.write().await.update_endp(endp)
    }

    async fn delete_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<()> {
        self.record(RegistryCall::DeleteEndp(
            ns_name.to_owned(),
            serv_name.to_owned(),
            name.to_owned(),
        ))
        .await?;
        self.tree.write().await.delete_endp(ns_name, serv_name, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[fluvio_future::test]
    async fn test_hierarchy_rules() {
        let registry = MemoryRegistry::default();

        let err = registry
            .create_serv(Service::new("prod", "api"))
            .await
            .expect_err("no parent");
        assert!(err.is_not_found());

        registry
            .create_ns(Namespace::new("prod"))
            .await
            .expect("created");
        let err = registry
            .create_ns(Namespace::new("prod"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::AlreadyExists));

        registry
            .create_serv(Service::new("prod", "api"))
            .await
            .expect("created");
        registry
            .create_endp(Endpoint::new("prod", "api", "api-1").with_address("10.0.0.1", 80))
            .await
            .expect("created");

        let err = registry.delete_ns("prod").await.expect_err("not empty");
        assert!(matches!(err, RegistryError::NsNotEmpty));
        let err = registry
            .delete_serv("prod", "api")
            .await
            .expect_err("not empty");
        assert!(matches!(err, RegistryError::ServNotEmpty));

        registry
            .delete_endp("prod", "api", "api-1")
            .await
            .expect("deleted");
        registry.delete_serv("prod", "api").await.expect("deleted");
        registry.delete_ns("prod").await.expect("deleted");

        assert!(registry.list_ns().await.expect("listed").is_empty());
        assert_eq!(registry.count_calls(RegistryCall::is_write).await, 10);
    }

    #[fluvio_future::test]
    async fn test_injected_failure_is_logged() {
        let registry = MemoryRegistry::default();
        registry.fail_on(RegistryCall::ListNs, "unavailable").await;

        let err = registry.list_ns().await.expect_err("injected");

        assert!(matches!(err, RegistryError::Backend(ref msg) if msg == "unavailable"));
        assert_eq!(registry.calls().await, vec![RegistryCall::ListNs]);
        registry.clear_calls().await;
        assert!(registry.calls().await.is_empty());
    }

    #[fluvio_future::test]
    async fn test_seed_bypasses_call_log() {
        let registry = MemoryRegistry::default();
        registry
            .seed_ns(Namespace::new("prod"))
            .await
            .expect("seeded");

        assert_eq!(registry.namespace("prod").await, Some(Namespace::new("prod")));
        assert!(registry.calls().await.is_empty());
    }
}
