//!
//! Kubernetes watches feeding the [`EventRouter`].
//!
use std::sync::Arc;

use anyhow::Result;
use fluvio_types::event::StickyEvent;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use tracing::{debug, info, instrument, warn};

use crate::predicate::SERVICE_NAME_LABEL;
use crate::router::{EventRouter, WatchEvent};

/// Watch namespaces, services and endpoint slices cluster wide until
/// shutdown, routing every notification.
#[instrument(skip_all)]
pub async fn watch_cluster(
    client: Client,
    mut router: EventRouter,
    shutdown: Arc<StickyEvent>,
) -> Result<()> {
    use tokio::select;

    let namespaces = watcher(Api::<Namespace>::all(client.clone()), watcher::Config::default())
        .default_backoff();
    let services =
        watcher(Api::<Service>::all(client.clone()), watcher::Config::default()).default_backoff();
    let slices = watcher(
        Api::<EndpointSlice>::all(client),
        watcher::Config::default().labels(SERVICE_NAME_LABEL),
    )
    .default_backoff();
    tokio::pin!(namespaces, services, slices);

    info!("watching cluster");
    loop {
        select! {
            _ = shutdown.listen() => {
                debug!("shutdown requested, stopping watches");
                break;
            },
            Some(event) = namespaces.next() => {
                if let Some(event) = watch_event("namespace", event) {
                    router.on_namespace(event).await?;
                }
            },
            Some(event) = services.next() => {
                if let Some(event) = watch_event("service", event) {
                    router.on_service(event).await?;
                }
            },
            Some(event) = slices.next() => {
                if let Some(event) = watch_event("endpointslice", event) {
                    router.on_endpoint_slice(event).await?;
                }
            },
            else => {
                warn!("every watch stream ended");
                break;
            }
        }
    }
    Ok(())
}

fn watch_event<K>(
    kind: &'static str,
    event: Result<watcher::Event<K>, watcher::Error>,
) -> Option<WatchEvent<K>> {
    match event {
        Ok(watcher::Event::Apply(object) | watcher::Event::InitApply(object)) => {
            Some(WatchEvent::Applied(object))
        }
        Ok(watcher::Event::Delete(object)) => Some(WatchEvent::Deleted(object)),
        Ok(watcher::Event::Init) => {
            debug!(kind, "watch (re)started, listing objects");
            None
        }
        Ok(watcher::Event::InitDone) => {
            debug!(kind, "initial listing done");
            None
        }
        Err(err) => {
            warn!(kind, "watch error, retrying with backoff: {err}");
            None
        }
    }
}
