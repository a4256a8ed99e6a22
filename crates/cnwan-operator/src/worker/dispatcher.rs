use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_channel::Receiver;
use fluvio_future::task::spawn;
use fluvio_types::event::StickyEvent;
use tracing::{debug, error, info, instrument, warn};

use crate::event::Event;

use super::namespace_worker::WorkerHandle;
use super::{ProcessorFactory, WorkerConfig};

/// Routes events to the worker of their namespace, spawning workers lazily
/// and reclaiming the idle ones.
pub struct NamespaceDispatcher {
    config: WorkerConfig,
    factory: Arc<dyn ProcessorFactory>,
    receiver: Receiver<Event>,
    shutdown: Arc<StickyEvent>,
    workers: HashMap<String, WorkerHandle>,
}

impl NamespaceDispatcher {
    /// Start dispatching in the background.
    ///
    /// Returns an event notified once every worker has exited, either after
    /// `shutdown` or after the event channel closed and the queues drained.
    pub fn start(
        config: WorkerConfig,
        factory: Arc<dyn ProcessorFactory>,
        receiver: Receiver<Event>,
        shutdown: Arc<StickyEvent>,
    ) -> Arc<StickyEvent> {
        let terminated = StickyEvent::shared();
        let dispatcher = Self {
            config,
            factory,
            receiver,
            shutdown,
            workers: HashMap::new(),
        };

        debug!("starting namespace dispatcher");
        let done = terminated.clone();
        spawn(async move {
            dispatcher.dispatch_loop().await;
            done.notify();
        });
        terminated
    }

    #[instrument(skip(self))]
    async fn dispatch_loop(mut self) {
        use tokio::select;
        use fluvio_future::timer::sleep;

        let mut next_sweep = Instant::now() + self.config.sweep_interval;
        loop {
            let sweep_in = next_sweep.saturating_duration_since(Instant::now());
            select! {
                _ = self.shutdown.listen() => {
                    info!(workers = self.workers.len(), "shutdown requested, cancelling workers");
                    self.cancel_all().await;
                    break;
                },
                msg = self.receiver.recv() => {
                    let Ok(event) = msg else {
                        debug!(workers = self.workers.len(), "event channel closed, draining workers");
                        self.drain_all().await;
                        break;
                    };
                    self.dispatch(event).await;
                },
                _ = sleep(sweep_in) => {
                    self.sweep().await;
                    next_sweep = Instant::now() + self.config.sweep_interval;
                }
            }
        }
        info!("namespace dispatcher terminated");
    }

    async fn dispatch(&mut self, event: Event) {
        let Some(namespace) = event.namespace_name().map(str::to_owned) else {
            warn!(kind = event.kind(), "unable to resolve namespace of event, dropping");
            return;
        };

        if !self.workers.contains_key(&namespace) {
            let processor = match self.factory.create(&namespace) {
                Ok(processor) => processor,
                Err(err) => {
                    error!(ns = %namespace, "unable to create event processor: {err:#}");
                    return;
                }
            };
            debug!(ns = %namespace, "spawning namespace worker");
            let worker =
                WorkerHandle::spawn(namespace.clone(), processor, self.config.queue_capacity);
            self.workers.insert(namespace.clone(), worker);
        }

        let Some(worker) = self.workers.get_mut(&namespace) else {
            return;
        };
        worker.last_activity = Instant::now();
        // blocks while the worker queue is full
        if let Err(err) = worker.sender.send(event).await {
            error!(ns = %namespace, "namespace worker is gone, dropping event: {err}");
            self.workers.remove(&namespace);
        }
    }

    /// reclaim workers with nothing queued and no activity for too long
    async fn sweep(&mut self) {
        let max_idle = self.config.max_idle;
        let expired: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.is_idle() && worker.last_activity.elapsed() > max_idle)
            .map(|(namespace, _)| namespace.clone())
            .collect();

        for namespace in expired {
            if let Some(worker) = self.workers.remove(&namespace) {
                debug!(ns = %namespace, "reclaiming idle namespace worker");
                worker.drain().await;
            }
        }
    }

    async fn cancel_all(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.cancel().await;
        }
    }

    async fn drain_all(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.drain().await;
        }
    }
}
