//! Application layer module
//!
//! Failure classification, the reconciliation scheduler and the page
//! controller that orchestrate the domain logic over the collaborator ports.

pub mod error_classifier;
pub mod ports;
pub mod products_controller;
pub mod reconciliation;

// Re-export commonly used items
pub use error_classifier::{ApiError, Classification, ErrorClass, Operation, RecoveryAction, classify};
pub use ports::{LoginRedirect, Navigator, Notice, NoticeLevel, Notifier, ProductsApi, SessionStore};
pub use products_controller::{
    ControllerSettings, LoadOutcome, MutationOutcome, ProductsController, ProductsView, QueryState,
};
pub use reconciliation::{
    PhaseSnapshot, PollObserver, PollOutcome, PollPolicy, PollSession, ReconciliationScheduler,
    SchedulerPhase, SessionId,
};
