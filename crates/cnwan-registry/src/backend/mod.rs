//! Reference [`ServiceRegistry`](crate::ServiceRegistry) implementations
pub mod local;
pub mod memory;

pub use local::LocalRegistry;
pub use memory::{MemoryRegistry, RegistryCall};
