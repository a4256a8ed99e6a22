//!
//! # CLI for the operator
//!
//! Settings come from a yaml file, the registry backend is chosen on the
//! command line.
//!
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::bounded;
use clap::{Args, Parser};
use fluvio_types::event::StickyEvent;
use kube::Client;
use tracing::{debug, info};

use cnwan_registry::SharedRegistry;
use cnwan_registry::backend::{LocalRegistry, MemoryRegistry};

use crate::config::Settings;
use crate::correlator::EndpointCounter;
use crate::k8s::watch_cluster;
use crate::reconciler::ReconcilerFactory;
use crate::router::EventRouter;
use crate::worker::NamespaceDispatcher;

/// cli options
#[derive(Debug, Parser)]
#[command(
    name = "cnwan-operator",
    about = "Registers Kubernetes load balancer services into a service registry"
)]
pub struct OperatorOpt {
    #[command(flatten)]
    registry_mode: RegistryOptMode,

    /// path to the settings file
    #[arg(long, value_name = "settings path", env = "CNWAN_SETTINGS")]
    settings: PathBuf,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct RegistryOptMode {
    /// keep the registry in local files
    #[arg(long, value_name = "registry path")]
    local: Option<PathBuf>,

    /// keep the registry in memory, lost on exit
    #[arg(long)]
    memory: bool,
}

#[derive(Debug)]
pub enum RegistryMode<'a> {
    Local(&'a Path),
    Memory,
}

impl OperatorOpt {
    pub fn mode(&self) -> RegistryMode<'_> {
        match &self.registry_mode.local {
            Some(path) => RegistryMode::Local(path),
            None => RegistryMode::Memory,
        }
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::from_file(&self.settings)
            .with_context(|| format!("unable to load settings from {}", self.settings.display()))
    }

    pub fn registry(&self) -> SharedRegistry {
        match self.mode() {
            RegistryMode::Local(path) => {
                info!(path = %path.display(), "using local registry");
                Arc::new(LocalRegistry::new(path))
            }
            RegistryMode::Memory => {
                info!("using in memory registry");
                MemoryRegistry::new_shared()
            }
        }
    }
}

/// Run the operator until ctrl-c
pub async fn run(opt: OperatorOpt) -> Result<()> {
    let settings = opt.settings()?;
    debug!(?settings, "settings loaded");
    let registry = opt.registry();

    let client = Client::try_default()
        .await
        .context("unable to create kubernetes client")?;

    let shutdown = StickyEvent::shared();
    init_ctrlc(shutdown.clone())?;

    let annotations = settings.service.annotations.clone();
    let factory = Arc::new(ReconcilerFactory::new(
        registry,
        settings.broker_config(),
        Arc::new(EndpointCounter::default()),
        annotations.clone(),
    ));

    let (sender, receiver) = bounded(settings.workers.queue_capacity);
    let terminated = NamespaceDispatcher::start(
        settings.worker_config(),
        factory,
        receiver,
        shutdown.clone(),
    );
    let router = EventRouter::new(settings.namespace_policy(), annotations, sender);

    info!(policy = ?settings.list_policy(), "operator started");
    let result = watch_cluster(client, router, shutdown).await;

    terminated.listen().await;
    info!("operator stopped");
    result
}

/// notify shutdown on ctrl-c
fn init_ctrlc(shutdown: Arc<StickyEvent>) -> Result<()> {
    let result = ctrlc::set_handler(move || {
        debug!("detected control c, shutting down");
        shutdown.notify();
    });

    if let Err(err) = result {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CTRL-C handler can't be initialized {err}"),
        )
        .into());
    }
    Ok(())
}
