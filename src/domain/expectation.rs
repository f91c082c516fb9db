//! Expectations for queued mutations
//!
//! A [`MutationIntent`] records what should eventually become observable in
//! the list endpoint once a queued mutation has been processed. Matching is
//! done purely on observable projections: totals for create/delete, the
//! target record's fields for update.

use serde::{Deserialize, Serialize};

use super::pagination::PageQuery;
use super::product::{ListResponse, MutationRequest, OperationKind, Product, ProductId, ProductPayload};

/// Default half-cent tolerance for price comparison
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.005;

/// Tolerances used when comparing an update payload with a fetched record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub price_tolerance: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
        }
    }
}

/// Client-held record of the change a queued mutation should produce.
///
/// Immutable apart from `query`, which the scheduler rewrites when the polled
/// page drifts.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    kind: OperationKind,
    previous_total: u64,
    query: PageQuery,
    target_id: Option<ProductId>,
    target_payload: Option<ProductPayload>,
}

impl MutationIntent {
    /// Build the intent for an accepted request.
    ///
    /// `previous_total` must be the total snapshotted before the request was
    /// submitted.
    pub fn for_request(request: &MutationRequest, previous_total: u64, query: PageQuery) -> Self {
        Self {
            kind: request.kind(),
            previous_total,
            query,
            target_id: request.target_id(),
            target_payload: request.payload().cloned(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn previous_total(&self) -> u64 {
        self.previous_total
    }

    pub fn query(&self) -> PageQuery {
        self.query
    }

    pub fn target_id(&self) -> Option<ProductId> {
        self.target_id
    }

    pub fn target_payload(&self) -> Option<&ProductPayload> {
        self.target_payload.as_ref()
    }

    /// Point subsequent polls at a corrected window
    pub fn with_query(self, query: PageQuery) -> Self {
        Self { query, ..self }
    }

    pub fn is_satisfied(&self, response: &ListResponse, policy: &MatchPolicy) -> bool {
        is_satisfied(self, response, policy)
    }
}

/// Decide whether the intended effect is visible in `response`.
///
/// Total over well-formed input: an update intent without a target id or
/// payload, or whose target is not on the polled page, simply does not match.
pub fn is_satisfied(intent: &MutationIntent, response: &ListResponse, policy: &MatchPolicy) -> bool {
    match intent.kind {
        OperationKind::Create => response.total > intent.previous_total,
        OperationKind::Delete => response.total < intent.previous_total,
        OperationKind::Update => {
            let (Some(id), Some(payload)) = (intent.target_id, intent.target_payload.as_ref()) else {
                return false;
            };
            response
                .find(id)
                .is_some_and(|record| record_matches(record, payload, policy))
        }
    }
}

fn record_matches(record: &Product, payload: &ProductPayload, policy: &MatchPolicy) -> bool {
    text_matches(&record.name, &payload.name)
        && text_matches(&record.brand, &payload.brand)
        && (record.price - payload.price).abs() < policy.price_tolerance
}

fn text_matches(observed: &str, expected: &str) -> bool {
    observed.trim().to_lowercase() == expected.trim().to_lowercase()
}
