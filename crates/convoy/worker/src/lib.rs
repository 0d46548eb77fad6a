//! Convoy worker pool
//!
//! Repeatedly asks the repository for processable operations and hands each
//! one to a worker task that resolves the cluster state and calls an
//! [`convoy_invoker::Invoker`] with bounded retry.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod config;
mod error;
mod pool;
mod retriever;

pub use config::{WorkerPoolConfig, WorkerSettings};
pub use error::{WorkerError, WorkerResult};
pub use pool::WorkerPool;
pub use retriever::{ClusterStateRetriever, InventoryRetriever, PassThroughRetriever};
