//! Convoy daemon library
//!
//! Wires the reconciliation repository, the inventory and the scheduling
//! loops together and exposes them through a REST API:
//! - cluster registration and deletion
//! - reconciliation and operation inspection
//! - the callback endpoint of remote component reconcilers

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod storage;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
