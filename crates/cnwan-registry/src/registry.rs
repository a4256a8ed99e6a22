use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::model::{Endpoint, Namespace, Service};

pub type SharedRegistry = Arc<dyn ServiceRegistry>;

/// Capability every service registry backend provides to the broker.
///
/// Backends must report missing records with [`RegistryError::NotFound`] and
/// duplicate creations with [`RegistryError::AlreadyExists`].
///
/// [`RegistryError::NotFound`]: crate::RegistryError::NotFound
/// [`RegistryError::AlreadyExists`]: crate::RegistryError::AlreadyExists
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn get_ns(&self, name: &str) -> Result<Namespace>;

    async fn list_ns(&self) -> Result<Vec<Namespace>>;

    async fn create_ns(&self, ns: Namespace) -> Result<Namespace>;

    async fn update_ns(&self, ns: Namespace) -> Result<Namespace>;

    async fn delete_ns(&self, name: &str) -> Result<()>;

    async fn get_serv(&self, ns_name: &str, name: &str) -> Result<Service>;

    async fn list_serv(&self, ns_name: &str) -> Result<Vec<Service>>;

    async fn create_serv(&self, serv: Service) -> Result<Service>;

    async fn update_serv(&self, serv: Service) -> Result<Service>;

    async fn delete_serv(&self, ns_name: &str, name: &str) -> Result<()>;

    async fn get_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<Endpoint>;

    async fn list_endp(&self, ns_name: &str, serv_name: &str) -> Result<Vec<Endpoint>>;

    async fn create_endp(&self, endp: Endpoint) -> Result<Endpoint>;

    async fn update_endp(&self, endp: Endpoint) -> Result<Endpoint>;

    async fn delete_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<()>;
}
