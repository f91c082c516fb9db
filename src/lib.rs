//! Catalog Reconciler - eventually consistent product catalog client
//!
//! Mutations against the products backend are acknowledged as queued and
//! applied later. This library keeps a paginated view of the catalog in step
//! with that backend: after each queued mutation it polls the list endpoint
//! until the change is observable, the attempt budget runs out, or the user
//! moves on.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub mod test_utils;

pub use application::{MutationOutcome, ProductsController};
pub use infrastructure::AppConfig;
