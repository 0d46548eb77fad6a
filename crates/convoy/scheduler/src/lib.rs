//! Convoy scheduling loops
//!
//! - [`ClusterStatusTransition`] moves clusters between their externally
//!   visible statuses while starting and finishing reconciliations.
//! - [`Scheduler`] polls the inventory for due clusters.
//! - [`Bookkeeper`] reduces running reconciliations to a verdict and marks
//!   orphaned operations.
//! - [`Cleaner`] purges old finished reconciliations.
//! - [`LocalRunner`] reconciles a single cluster in-process.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod bookkeeper;
mod cleaner;
mod error;
mod local;
mod result;
mod scheduler;
mod transition;

pub use bookkeeper::{Bookkeeper, BookkeeperConfig, BookkeepingSummary};
pub use cleaner::{Cleaner, CleanerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use local::{LocalRunOutcome, LocalRunner};
pub use result::ReconciliationResult;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use transition::ClusterStatusTransition;
