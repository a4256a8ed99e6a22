//!
//! # Registry records
//!
//! Registry neutral representation of namespaces, services and endpoints.
//! Records reference their parent by name only.
//!
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{RegistryError, Result};

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub ns_name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Service {
    pub fn new(ns_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ns_name: ns_name.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ns_name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }
        if self.name.is_empty() {
            return Err(RegistryError::ServNameNotProvided);
        }
        Ok(())
    }
}

/// One reachable address and port backing a service.
/// The name is derived from address and port, so it is stable across observations.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub serv_name: String,
    pub ns_name: String,
    pub address: String,
    pub port: i32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Endpoint {
    pub fn new(
        ns_name: impl Into<String>,
        serv_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            serv_name: serv_name.into(),
            ns_name: ns_name.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>, port: i32) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ns_name.is_empty() {
            return Err(RegistryError::NsNameNotProvided);
        }
        if self.serv_name.is_empty() {
            return Err(RegistryError::ServNameNotProvided);
        }
        if self.name.is_empty() {
            return Err(RegistryError::EndpNameNotProvided);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names() {
        assert!(matches!(
            Namespace::default().validate(),
            Err(RegistryError::NsNameNotProvided)
        ));
        assert!(matches!(
            Service::new("", "api").validate(),
            Err(RegistryError::NsNameNotProvided)
        ));
        assert!(matches!(
            Service::new("prod", "").validate(),
            Err(RegistryError::ServNameNotProvided)
        ));
        assert!(matches!(
            Endpoint::new("prod", "api", "").validate(),
            Err(RegistryError::EndpNameNotProvided)
        ));
        assert!(Endpoint::new("prod", "api", "api-0a1b2c3d4e").validate().is_ok());
    }

    #[test]
    fn test_endpoint_serde_field_names() {
        let endpoint = Endpoint::new("prod", "api", "api-0a1b2c3d4e").with_address("10.0.0.1", 80);
        let yaml = serde_yaml::to_string(&endpoint).expect("serialized");
        assert_eq!(
            yaml,
            r#"name: api-0a1b2c3d4e
servName: api
nsName: prod
address: 10.0.0.1
port: 80
metadata: {}
"#
        );
    }
}
