//!
//! # CN-WAN Operator
//!
//! Watches namespaces, services and endpoint slices and reconciles the
//! relevant ones into a service registry through the
//! [`cnwan_registry::Broker`].
//!
//! Cluster notifications flow through the [`router::EventRouter`], which
//! applies the watch predicates and emits explicit [`event::Event`]s. The
//! [`worker::NamespaceDispatcher`] shards those events by namespace, and each
//! namespace worker drives a [`reconciler::Reconciler`].
//!
pub mod cli;
pub mod config;
pub mod correlator;
pub mod event;
pub mod extract;
pub mod filter;
pub mod k8s;
pub mod policy;
pub mod predicate;
pub mod reconciler;
pub mod router;
pub mod worker;

mod error;

pub use error::{OperatorError, Result};
