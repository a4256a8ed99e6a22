//!
//! # Service Registry Broker
//!
//! Mirrors namespaces, services and endpoints observed in a cluster into an
//! external service registry. Records created here carry an ownership pair in
//! their metadata; records without it are never updated or deleted.
//!
pub mod backend;
pub mod broker;
pub mod model;
pub mod registry;

mod error;

pub use error::{ChildFailure, RegistryError, Result};
pub use model::{Endpoint, Metadata, Namespace, Service};
pub use registry::{ServiceRegistry, SharedRegistry};
pub use broker::{
    Broker, BrokerBuilder, BrokerConfig, EndpointErrors, OperationTimeouts, Ownership,
};
