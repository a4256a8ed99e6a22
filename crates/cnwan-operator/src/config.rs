//!
//! # Operator settings
//!
//! Loaded from a YAML file, every section is optional:
//!
//! ```yaml
//! namespace:
//!   listPolicy: allowlist
//! service:
//!   annotations:
//!     - cnwan.io/*
//! cloudMetadata:
//!   platform: gke
//! registry:
//!   timeouts:
//!     get: 10s
//!   cacheTtl: 10s
//! workers:
//!   queueCapacity: 25
//!   maxIdle: 5m
//! ```
//!
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cnwan_registry::{BrokerConfig, Metadata, OperationTimeouts};

use crate::policy::{ListPolicy, NamespacePolicy};
use crate::worker::WorkerConfig;

pub const ALLOWED_LABEL: &str = "operator.cnwan.io/allowed";
pub const BLOCKED_LABEL: &str = "operator.cnwan.io/blocked";
pub const COUNT_PODS_LABEL: &str = "operator.cnwan.io/count-pods";
pub const COUNT_PODS_ENABLED: [&str; 3] = ["yes", "true", "enabled"];

pub const PLATFORM_KEY: &str = "cnwan.io/platform";
pub const NETWORK_KEY: &str = "cnwan.io/network";
pub const SUBNETWORK_KEY: &str = "cnwan.io/sub-network";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unable to read settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings format: {0}")]
    SettingsFormat(#[from] serde_yaml::Error),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub namespace: NamespaceSettings,
    pub service: ServiceSettings,
    pub cloud_metadata: CloudMetadata,
    pub registry: RegistrySettings,
    pub workers: WorkerSettings,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceSettings {
    pub list_policy: Option<ListPolicy>,
    /// used when no list policy is set
    pub watch_by_default: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    pub annotations: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudMetadata {
    pub platform: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    pub timeouts: TimeoutSettings,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            timeouts: TimeoutSettings::default(),
            cache_ttl: BrokerConfig::default().cache_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    #[serde(with = "humantime_serde")]
    pub get: Duration,
    #[serde(with = "humantime_serde")]
    pub list: Duration,
    #[serde(with = "humantime_serde")]
    pub write: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let timeouts = OperationTimeouts::default();
        Self {
            get: timeouts.get,
            list: timeouts.list,
            write: timeouts.write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    pub queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub max_idle: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let config = WorkerConfig::default();
        Self {
            queue_capacity: config.queue_capacity,
            max_idle: config.max_idle,
            sweep_interval: config.sweep_interval,
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.annotations.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "no service annotations allowed, nothing would be watched".to_owned(),
            ));
        }
        if self.workers.queue_capacity == 0 {
            return Err(ConfigError::InvalidSettings(
                "worker queue capacity must be greater than zero".to_owned(),
            ));
        }

        let durations = [
            ("registry get timeout", self.registry.timeouts.get),
            ("registry list timeout", self.registry.timeouts.list),
            ("registry write timeout", self.registry.timeouts.write),
            ("worker max idle", self.workers.max_idle),
            ("worker sweep interval", self.workers.sweep_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::InvalidSettings(format!("{name} must not be zero")));
        }

        Ok(())
    }

    pub fn list_policy(&self) -> ListPolicy {
        match (self.namespace.list_policy, self.namespace.watch_by_default) {
            (Some(policy), _) => policy,
            (None, true) => ListPolicy::BlockList,
            (None, false) => ListPolicy::AllowList,
        }
    }

    pub fn namespace_policy(&self) -> NamespacePolicy {
        NamespacePolicy::new(self.list_policy())
    }

    /// cloud metadata stamped on every managed record
    pub fn persistent_metadata(&self) -> Metadata {
        let cloud = &self.cloud_metadata;
        [
            (PLATFORM_KEY, &cloud.platform),
            (NETWORK_KEY, &cloud.network),
            (SUBNETWORK_KEY, &cloud.subnetwork),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_owned(), v.clone())))
        .collect()
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            persistent_metadata: self.persistent_metadata(),
            timeouts: OperationTimeouts {
                get: self.registry.timeouts.get,
                list: self.registry.timeouts.list,
                write: self.registry.timeouts.write,
            },
            cache_ttl: self.registry.cache_ttl,
            ..Default::default()
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_capacity: self.workers.queue_capacity,
            max_idle: self.workers.max_idle,
            sweep_interval: self.workers.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_full_settings() {
        let settings = Settings::from_yaml(
            r#"
namespace:
  listPolicy: blocklist
service:
  annotations:
    - cnwan.io/*
    - "*/traffic-profile"
cloudMetadata:
  platform: gke
  subnetwork: default
registry:
  timeouts:
    get: 5s
    list: 1m
  cacheTtl: 500ms
workers:
  queueCapacity: 10
  maxIdle: 2m
"#,
        )
        .expect("parsed");

        assert_eq!(settings.list_policy(), ListPolicy::BlockList);
        assert_eq!(settings.service.annotations.len(), 2);

        let broker = settings.broker_config();
        assert_eq!(broker.owner_key, "owner");
        assert_eq!(broker.owner_value, "cnwan-operator");
        assert_eq!(broker.timeouts.get, Duration::from_secs(5));
        assert_eq!(broker.timeouts.list, Duration::from_secs(60));
        assert_eq!(broker.timeouts.write, Duration::from_secs(15));
        assert_eq!(broker.cache_ttl, Duration::from_millis(500));
        assert_eq!(
            broker.persistent_metadata,
            [
                (PLATFORM_KEY.to_owned(), "gke".to_owned()),
                (SUBNETWORK_KEY.to_owned(), "default".to_owned()),
            ]
            .into_iter()
            .collect()
        );

        let workers = settings.worker_config();
        assert_eq!(workers.queue_capacity, 10);
        assert_eq!(workers.max_idle, Duration::from_secs(120));
        assert_eq!(workers.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_watch_by_default_selects_policy() {
        let settings = Settings::from_yaml(
            r#"
namespace:
  watchByDefault: true
service:
  annotations: ["*/*"]
"#,
        )
        .expect("parsed");
        assert_eq!(settings.list_policy(), ListPolicy::BlockList);

        let settings = Settings::from_yaml("service:\n  annotations: [\"*/*\"]\n").expect("parsed");
        assert_eq!(settings.list_policy(), ListPolicy::AllowList);
    }

    #[test]
    fn test_invalid_settings() {
        let err = Settings::from_yaml("namespace:\n  listPolicy: blocklist\n").expect_err("no annotations");
        assert!(matches!(err, ConfigError::InvalidSettings(_)));

        let err = Settings::from_yaml(
            "service:\n  annotations: [\"*/*\"]\nworkers:\n  queueCapacity: 0\n",
        )
        .expect_err("zero capacity");
        assert!(matches!(err, ConfigError::InvalidSettings(_)));

        let err = Settings::from_yaml(
            "service:\n  annotations: [\"*/*\"]\nregistry:\n  timeouts:\n    write: 0s\n",
        )
        .expect_err("zero timeout");
        assert!(err.to_string().contains("registry write timeout"));

        let err = Settings::from_yaml("namespace:\n  listPolicy: everything\n").expect_err("bad policy");
        assert!(matches!(err, ConfigError::SettingsFormat(_)));
    }

    #[test]
    fn test_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "service:\n  annotations:\n    - cnwan.io/*").expect("written");

        let settings = Settings::from_file(file.path()).expect("loaded");
        assert_eq!(settings.service.annotations, vec!["cnwan.io/*".to_owned()]);

        let err = Settings::from_file("/does/not/exist.yaml").expect_err("missing");
        assert!(matches!(err, ConfigError::SettingsIo { .. }));
    }
}
