//! Convoy reconciliation repository.
//!
//! Persists reconciliation runs and their operations and answers the central
//! scheduling question: which operations may be dispatched right now.
//!
//! Two interchangeable backends implement [`ReconciliationRepository`]:
//! - [`InMemoryReconciliationRepository`] serialises every call through one
//!   mutex and backs local runs and tests.
//! - `PostgresReconciliationRepository` (feature `postgres`) is the durable
//!   source of truth for the daemon.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod filter;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod processable;
mod traits;

pub use error::{StoreError, StoreResult};
pub use filter::{
    CurrentlyReconciling, Filter, FilterMixer, SqlArgs, SqlValue, WithCreationDateBefore,
    WithRuntimeId, WithRuntimeIds, WithSchedulingId,
};
pub use memory::InMemoryReconciliationRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresReconciliationRepository;
pub use processable::find_processable_operations;
pub use traits::ReconciliationRepository;
