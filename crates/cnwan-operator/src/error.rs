use cnwan_registry::RegistryError;

use crate::config::ConfigError;

pub type Result<T, E = OperatorError> = core::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum OperatorError {
    #[error("namespace not provided")]
    NamespaceNotProvided,
    #[error("service not provided")]
    ServiceNotProvided,
    #[error("{0} has no name")]
    MissingName(&'static str),
    #[error("settings error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}
