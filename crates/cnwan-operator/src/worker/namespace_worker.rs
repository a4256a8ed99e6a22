use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender, bounded};
use fluvio_future::task::spawn;
use fluvio_types::event::StickyEvent;
use tracing::{debug, instrument, trace};

use crate::event::Event;

use super::EventProcessor;

/// Dispatcher side of a running namespace worker
pub(super) struct WorkerHandle {
    pub(super) sender: Sender<Event>,
    pub(super) last_activity: Instant,
    stop: Arc<StickyEvent>,
    terminated: Arc<StickyEvent>,
}

impl WorkerHandle {
    pub(super) fn spawn(
        namespace: String,
        processor: Arc<dyn EventProcessor>,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = bounded(capacity);
        let stop = StickyEvent::shared();
        let terminated = StickyEvent::shared();

        let worker = NamespaceWorker {
            namespace,
            processor,
            receiver,
            stop: stop.clone(),
            terminated: terminated.clone(),
        };
        spawn(worker.worker_loop());

        Self {
            sender,
            last_activity: Instant::now(),
            stop,
            terminated,
        }
    }

    pub(super) fn is_idle(&self) -> bool {
        self.sender.is_empty()
    }

    /// abandon queued and in-flight events
    pub(super) async fn cancel(self) {
        self.stop.notify();
        self.terminated.listen().await;
    }

    /// let the worker finish its queue
    pub(super) async fn drain(self) {
        self.sender.close();
        self.terminated.listen().await;
    }
}

struct NamespaceWorker {
    namespace: String,
    processor: Arc<dyn EventProcessor>,
    receiver: Receiver<Event>,
    stop: Arc<StickyEvent>,
    terminated: Arc<StickyEvent>,
}

impl NamespaceWorker {
    #[instrument(skip(self), fields(ns = %self.namespace))]
    async fn worker_loop(self) {
        use tokio::select;

        debug!("namespace worker started");
        loop {
            select! {
                _ = self.stop.listen() => {
                    debug!("namespace worker cancelled");
                    break;
                },
                msg = self.receiver.recv() => {
                    let Ok(event) = msg else {
                        debug!("namespace queue closed and drained");
                        break;
                    };
                    trace!(kind = event.kind(), "processing event");
                    select! {
                        _ = self.stop.listen() => {
                            debug!("in-flight event cancelled");
                            break;
                        },
                        _ = self.processor.process(event) => {}
                    }
                }
            }
        }
        self.terminated.notify();
    }
}
