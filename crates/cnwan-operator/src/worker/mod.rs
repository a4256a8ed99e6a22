//!
//! # Per namespace event workers
//!
//! The dispatcher owns one worker per active namespace. Each worker handles
//! its queue strictly in arrival order, so operations on the same namespace
//! never race while namespaces proceed in parallel.
//!
//! A full worker queue blocks the dispatcher. This throttles the producer
//! instead of dropping events.
//!
mod dispatcher;
mod namespace_worker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::event::Event;

pub use self::dispatcher::NamespaceDispatcher;

pub const DEFAULT_QUEUE_CAPACITY: usize = 25;
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub max_idle: Duration,
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_idle: DEFAULT_MAX_IDLE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Handles the events of one namespace
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: Event);
}

/// Creates the processor of a namespace worker when it is spawned
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, namespace: &str) -> anyhow::Result<Arc<dyn EventProcessor>>;
}
