use std::fmt;
use std::io::Error as IoError;
use std::time::Duration;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

/// Conditions every registry backend maps its native errors onto
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("resource not found")]
    NotFound,
    #[error("resource already exists")]
    AlreadyExists,

    #[error("namespace name not provided")]
    NsNameNotProvided,
    #[error("service name not provided")]
    ServNameNotProvided,
    #[error("endpoint name not provided")]
    EndpNameNotProvided,
    #[error("namespace not provided")]
    NsNotProvided,
    #[error("service not provided")]
    ServNotProvided,
    #[error("endpoint not provided")]
    EndpNotProvided,
    #[error("service registry not provided")]
    ServRegNotProvided,

    #[error("namespace is not owned by the operator")]
    NsNotOwnedByOp,
    #[error("service is not owned by the operator")]
    ServNotOwnedByOp,
    #[error("endpoint is not owned by the operator")]
    EndpNotOwnedByOp,
    #[error("namespace contains services not owned by the operator")]
    NsNotOwnedServs,
    #[error("service contains endpoints not owned by the operator")]
    ServNotOwnedEndps,

    #[error("namespace is not empty")]
    NsNotEmpty,
    #[error("service is not empty")]
    ServNotEmpty,

    #[error("failed to delete {} child record(s) of {parent}", .failures.len())]
    ChildDeletion {
        parent: String,
        failures: Vec<ChildFailure>,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("IO error: {0}")]
    Io(#[from] IoError),
    #[error("Yaml serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// business rule violation caused by records owned by someone else
    pub fn is_ownership_conflict(&self) -> bool {
        matches!(
            self,
            Self::NsNotOwnedByOp
                | Self::ServNotOwnedByOp
                | Self::EndpNotOwnedByOp
                | Self::NsNotOwnedServs
                | Self::ServNotOwnedEndps
        )
    }

    /// transient failures that a later reconciliation may resolve
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Io(_) | Self::Backend(_) | Self::ChildDeletion { .. }
        )
    }
}

/// A child record that could not be removed during a cascading delete
#[derive(Debug)]
pub struct ChildFailure {
    pub name: String,
    pub error: Box<RegistryError>,
}

impl ChildFailure {
    pub fn new(name: impl Into<String>, error: RegistryError) -> Self {
        Self {
            name: name.into(),
            error: Box::new(error),
        }
    }
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}
