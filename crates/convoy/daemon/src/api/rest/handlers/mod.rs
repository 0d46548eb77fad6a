//! API request handlers

mod callback;
mod clusters;
mod health;
mod reconciliations;

pub use callback::*;
pub use clusters::*;
pub use health::*;
pub use reconciliations::*;
