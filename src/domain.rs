//! Domain module - products, pagination and mutation expectations
//!
//! Pure data and pure functions only: nothing in here performs I/O or
//! touches the async runtime.

pub mod expectation;
pub mod pagination;
pub mod product;

// Re-export commonly used items for convenience
pub use expectation::{MatchPolicy, MutationIntent, is_satisfied};
pub use pagination::{PageQuery, PaginationState, normalize_offset};
pub use product::{
    AckStatus, ListResponse, MutationRequest, OperationKind, PayloadError, Product, ProductId,
    ProductPayload, QueuedOperation,
};
