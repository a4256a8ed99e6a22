//!
//! Registry persisted on the local file system.
//!
//! The hierarchy is emulated with directories:
//! `<root>/<ns>/record.yaml`, `<root>/<ns>/<serv>/record.yaml` and
//! `<root>/<ns>/<serv>/<endp>.yaml`.
//!
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

use async_lock::RwLock;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Endpoint, Namespace, Service};
use crate::registry::ServiceRegistry;
use crate::{RegistryError, Result};

const RECORD_FILE: &str = "record.yaml";
const RECORD_NAME: &str = "record";

#[derive(Debug)]
pub struct LocalRegistry {
    path: PathBuf,
    lock: RwLock<()>,
}

impl LocalRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn ns_dir(&self, ns_name: &str) -> PathBuf {
        self.path.join(ns_name)
    }

    fn serv_dir(&self, ns_name: &str, name: &str) -> PathBuf {
        self.ns_dir(ns_name).join(name)
    }

    fn endp_file(&self, ns_name: &str, serv_name: &str, name: &str) -> PathBuf {
        self.serv_dir(ns_name, serv_name)
            .join(format!("{name}.yaml"))
    }

    /// records of every sub directory of `dir` holding a record file
    fn list_dirs<R: DeserializeOwned>(dir: &Path) -> Result<Vec<R>> {
        let mut records = vec![];
        for entry in std::fs::read_dir(dir)? {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path().join(RECORD_FILE);
            if !path.is_file() {
                continue;
            }
            match load::<R>(&path) {
                Ok((_, record)) => records.push(record),
                Err(err) => warn!("skipped record file {}: {err}", path.display()),
            }
        }
        Ok(records)
    }

    fn endpoint_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in std::fs::read_dir(dir)? {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if path.is_file()
                && path.extension().eq(&Some(OsStr::new("yaml")))
                && path.file_name() != Some(OsStr::new(RECORD_FILE))
            {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl ServiceRegistry for LocalRegistry {
    async fn get_ns(&self, name: &str) -> Result<Namespace> {
        check_name(name)?;
        let _guard = self.lock.read().await;
        load(&self.ns_dir(name).join(RECORD_FILE)).map(|(_, ns)| ns)
    }

    async fn list_ns(&self) -> Result<Vec<Namespace>> {
        let _guard = self.lock.read().await;
        if !self.path.is_dir() {
            return Ok(vec![]);
        }
        let mut namespaces: Vec<Namespace> = Self::list_dirs(&self.path)?;
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    async fn create_ns(&self, ns: Namespace) -> Result<Namespace> {
        ns.validate()?;
        check_name(&ns.name)?;
        let _guard = self.lock.write().await;
        let dir = self.ns_dir(&ns.name);
        create(&dir.join(RECORD_FILE), &dir, &ns)?;
        debug!(ns = %ns.name, "namespace stored");
        Ok(ns)
    }

    async fn update_ns(&self, ns: Namespace) -> Result<Namespace> {
        ns.validate()?;
        check_name(&ns.name)?;
        let _guard = self.lock.write().await;
        update(&self.ns_dir(&ns.name).join(RECORD_FILE), &ns)?;
        Ok(ns)
    }

    async fn delete_ns(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let _guard = self.lock.write().await;
        let dir = self.ns_dir(name);
        if !dir.join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        if !Self::list_dirs::<Service>(&dir)?.is_empty() {
            return Err(RegistryError::NsNotEmpty);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(ns = name, "namespace removed");
        Ok(())
    }

    async fn get_serv(&self, ns_name: &str, name: &str) -> Result<Service> {
        check_name(ns_name)?;
        check_name(name)?;
        let _guard = self.lock.read().await;
        load(&self.serv_dir(ns_name, name).join(RECORD_FILE)).map(|(_, serv)| serv)
    }

    async fn list_serv(&self, ns_name: &str) -> Result<Vec<Service>> {
        check_name(ns_name)?;
        let _guard = self.lock.read().await;
        let dir = self.ns_dir(ns_name);
        if !dir.join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        let mut services: Vec<Service> = Self::list_dirs(&dir)?;
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn create_serv(&self, serv: Service) -> Result<Service> {
        serv.validate()?;
        check_name(&serv.ns_name)?;
        check_name(&serv.name)?;
        let _guard = self.lock.write().await;
        if !self.ns_dir(&serv.ns_name).join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        let dir = self.serv_dir(&serv.ns_name, &serv.name);
        create(&dir.join(RECORD_FILE), &dir, &serv)?;
        debug!(ns = %serv.ns_name, serv = %serv.name, "service stored");
        Ok(serv)
    }

    async fn update_serv(&self, serv: Service) -> Result<Service> {
        serv.validate()?;
        check_name(&serv.ns_name)?;
        check_name(&serv.name)?;
        let _guard = self.lock.write().await;
        update(
            &self.serv_dir(&serv.ns_name, &serv.name).join(RECORD_FILE),
            &serv,
        )?;
        Ok(serv)
    }

    async fn delete_serv(&self, ns_name: &str, name: &str) -> Result<()> {
        check_name(ns_name)?;
        check_name(name)?;
        let _guard = self.lock.write().await;
        let dir = self.serv_dir(ns_name, name);
        if !dir.join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        if !Self::endpoint_files(&dir)?.is_empty() {
            return Err(RegistryError::ServNotEmpty);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(ns = ns_name, serv = name, "service removed");
        Ok(())
    }

    async fn get_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<Endpoint> {
        check_name(ns_name)?;
        check_name(serv_name)?;
        check_endp_name(name)?;
        let _guard = self.lock.read().await;
        load(&self.endp_file(ns_name, serv_name, name)).map(|(_, endp)| endp)
    }

    async fn list_endp(&self, ns_name: &str, serv_name: &str) -> Result<Vec<Endpoint>> {
        check_name(ns_name)?;
        check_name(serv_name)?;
        let _guard = self.lock.read().await;
        let dir = self.serv_dir(ns_name, serv_name);
        if !dir.join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        let mut endpoints = vec![];
        for path in Self::endpoint_files(&dir)? {
            match load::<Endpoint>(&path) {
                Ok((_, endp)) => endpoints.push(endp),
                Err(err) => warn!("skipped endpoint file {}: {err}", path.display()),
            }
        }
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(endpoints)
    }

    async fn create_endp(&self, endp: Endpoint) -> Result<Endpoint> {
        endp.validate()?;
        check_name(&endp.ns_name)?;
        check_name(&endp.serv_name)?;
        check_endp_name(&endp.name)?;
        let _guard = self.lock.write().await;
        let dir = self.serv_dir(&endp.ns_name, &endp.serv_name);
        if !dir.join(RECORD_FILE).is_file() {
            return Err(RegistryError::NotFound);
        }
        create(
            &self.endp_file(&endp.ns_name, &endp.serv_name, &endp.name),
            &dir,
            &endp,
        )?;
        debug!(ns = %endp.ns_name, serv = %endp.serv_name, endp = %endp.name, "endpoint stored");
        Ok(endp)
    }

    async fn update_endp(&self, endp: Endpoint) -> Result<Endpoint> {
        endp.validate()?;
        check_name(&endp.ns_name)?;
        check_name(&endp.serv_name)?;
        check_endp_name(&endp.name)?;
        let _guard = self.lock.write().await;
        update(
            &self.endp_file(&endp.ns_name, &endp.serv_name, &endp.name),
            &endp,
        )?;
        Ok(endp)
    }

    async fn delete_endp(&self, ns_name: &str, serv_name: &str, name: &str) -> Result<()> {
        check_name(ns_name)?;
        check_name(serv_name)?;
        check_endp_name(name)?;
        let _guard = self.lock.write().await;
        let path = self.endp_file(ns_name, serv_name, name);
        if !path.is_file() {
            return Err(RegistryError::NotFound);
        }
        std::fs::remove_file(&path)?;
        debug!(ns = ns_name, serv = serv_name, endp = name, "endpoint removed");
        Ok(())
    }
}

/// names become path segments
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(RegistryError::Backend(format!(
            "invalid record name: {name:?}"
        )));
    }
    Ok(())
}

fn check_endp_name(name: &str) -> Result<()> {
    check_name(name)?;
    if name == RECORD_NAME {
        return Err(RegistryError::Backend(format!(
            "reserved endpoint name: {name:?}"
        )));
    }
    Ok(())
}

fn load<R: DeserializeOwned>(path: &Path) -> Result<(u64, R)> {
    if !path.is_file() {
        return Err(RegistryError::NotFound);
    }
    let storage: VersionedRecord<R> = serde_yaml::from_reader(File::open(path)?)?;
    Ok(storage.into_parts())
}

fn flush<R: Serialize>(path: &Path, revision: u64, record: &R) -> Result<()> {
    let storage = VersionedRecord::V1(RecordV1 { revision, record });
    serde_yaml::to_writer(File::create(path)?, &storage)?;
    Ok(())
}

/// transactional create: fails if the record is already there
fn create<R: Serialize>(path: &Path, dir: &Path, record: &R) -> Result<()> {
    if path.is_file() {
        return Err(RegistryError::AlreadyExists);
    }
    std::fs::create_dir_all(dir)?;
    flush(path, 0, record)
}

fn update<R: Serialize + DeserializeOwned>(path: &Path, record: &R) -> Result<()> {
    let (revision, _) = load::<R>(path)?;
    flush(path, revision + 1, record)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "api-version")]
enum VersionedRecord<R> {
    #[serde(rename = "1.0.0")]
    V1(RecordV1<R>),
}

impl<R> VersionedRecord<R> {
    fn into_parts(self) -> (u64, R) {
        match self {
            VersionedRecord::V1(storage) => (storage.revision, storage.record),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct RecordV1<R> {
    revision: u64,
    record: R,
}

#[cfg(test)]
mod tests {
    use crate::model::Metadata;

    use super::*;

    fn owned() -> Metadata {
        [("owner".to_owned(), "cnwan-operator".to_owned())]
            .into_iter()
            .collect()
    }

    #[fluvio_future::test]
    async fn test_namespace_record_on_fs() {
        //given
        let folder = tempfile::tempdir().expect("temp dir created");
        let registry = LocalRegistry::new(&folder);

        //when
        registry
            .create_ns(Namespace::new("prod").with_metadata(owned()))
            .await
            .expect("created");

        //then
        let content = std::fs::read_to_string(folder.as_ref().join("prod").join(RECORD_FILE))
            .expect("content read");
        assert_eq!(
            content,
            r#"api-version: 1.0.0
revision: 0
record:
  name: prod
  metadata:
    owner: cnwan-operator
"#
        );

        drop(folder)
    }

    #[fluvio_future::test]
    async fn test_records_loaded_from_fs() {
        //given
        let folder = tempfile::tempdir().expect("temp dir created");
        let registry = LocalRegistry::new(&folder);
        let endp = Endpoint::new("prod", "api", "api-0a1b2c3d4e").with_address("10.0.0.1", 8080);
        registry
            .create_ns(Namespace::new("prod"))
            .await
            .expect("created");
        registry
            .create_serv(Service::new("prod", "api"))
            .await
            .expect("created");
        registry.create_endp(endp.clone()).await.expect("created");
        drop(registry);

        //when
        let registry = LocalRegistry::new(&folder);

        //then
        assert_eq!(
            registry.list_ns().await.expect("listed"),
            vec![Namespace::new("prod")]
        );
        assert_eq!(
            registry.list_serv("prod").await.expect("listed"),
            vec![Service::new("prod", "api")]
        );
        assert_eq!(
            registry.list_endp("prod", "api").await.expect("listed"),
            vec![endp]
        );

        drop(folder)
    }

    #[fluvio_future::test]
    async fn test_update_bumps_revision() {
        let folder = tempfile::tempdir().expect("temp dir created");
        let registry = LocalRegistry::new(&folder);
        registry
            .create_ns(Namespace::new("prod"))
            .await
            .expect("created");

        registry
            .update_ns(Namespace::new("prod").with_metadata(owned()))
            .await
            .expect("updated");

        let (revision, ns) =
            load::<Namespace>(&folder.path().join("prod").join(RECORD_FILE)).expect("loaded");
        assert_eq!(revision, 1);
        assert_eq!(ns.metadata, owned());

        let err = registry
            .update_ns(Namespace::new("dev"))
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[fluvio_future::test]
    async fn test_hierarchy_rules() {
        let folder = tempfile::tempdir().expect("temp dir created");
        let registry = LocalRegistry::new(&folder);

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
            .create_endp(Endpoint::new("prod", "api", "api-1"))
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
        let err = registry
            .get_endp("prod", "api", "api-1")
            .await
            .expect_err("gone");
        assert!(err.is_not_found());

        registry.delete_serv("prod", "api").await.expect("deleted");
        registry.delete_ns("prod").await.expect("deleted");
        assert!(registry.list_ns().await.expect("listed").is_empty());

        let err = registry.delete_ns("prod").await.expect_err("gone");
        assert!(err.is_not_found());
    }

    #[fluvio_future::test]
    async fn test_rejects_path_like_names() {
        let folder = tempfile::tempdir().expect("temp dir created");
        let registry = LocalRegistry::new(&folder);

        let err = registry
            .create_ns(Namespace::new("../escape"))
            .await
            .expect_err("invalid");
        assert!(matches!(err, RegistryError::Backend(_)));
    }
}
