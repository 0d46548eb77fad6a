//! Convoy invokers
//!
//! An [`Invoker`] asks a component reconciler to act on one operation and
//! translates its answer into operation state changes. [`LocalInvoker`] calls
//! reconcilers registered in-process, [`RemoteInvoker`] posts a [`Task`] to a
//! reconciler service which reports back through the callback endpoint.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod local;
mod params;
mod registry;
pub mod remote;
mod retry;
mod task;
#[cfg(test)]
mod testutil;

pub use error::{InvokeError, InvokeResult};
pub use local::{
    CallbackReporter, ComponentReconciler, LocalInvoker, ReconcilerRegistry, StatusHook,
};
pub use params::Params;
pub use registry::Registry;
pub use remote::{CallbackAddress, ReconcilerEndpoints, RemoteInvoker};
pub use retry::retry;
pub use task::{
    CallbackMessage, CallbackStatus, ErrorResponse, MissingDependencies, MissingDependenciesResponse,
    ReconcilerConfiguration, Task, TaskRepository,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Dispatches one operation to a component reconciler
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, cancel: &CancellationToken, params: &Params) -> InvokeResult<()>;
}
