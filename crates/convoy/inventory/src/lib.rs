//! Convoy cluster inventory
//!
//! The inventory is the authoritative source of which clusters exist, their
//! desired configuration and their current status. The scheduler only consumes
//! it through the [`Inventory`] trait; [`InMemoryInventory`] serves local runs,
//! the daemon and tests.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod memory;
mod traits;

pub use error::{InventoryError, InventoryResult};
pub use memory::InMemoryInventory;
pub use traits::{ClusterRegistration, Inventory};
