//! Pagination window and offset normalization
//!
//! The displayed page is described by `{offset, limit, total}`. Offsets coming
//! back from the server never reach the view directly: every observed total is
//! folded into [`PaginationState`] through [`normalize_offset`], which pulls the
//! window back onto the last valid page when the collection shrinks under it.

use serde::{Deserialize, Serialize};

/// Requested window into the product collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageQuery {
    pub offset: u64,
    pub limit: u64,
}

impl PageQuery {
    /// A zero limit is clamped to 1 so page arithmetic never divides by zero.
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.max(1),
        }
    }

    /// First page for the given page size
    pub fn first(limit: u64) -> Self {
        Self::new(0, limit)
    }
}

/// Compute the authoritative offset for a freshly observed `total`.
///
/// - `total == 0` always yields `0`.
/// - An offset still inside the collection is returned unchanged.
/// - Otherwise the start of the last full-or-partial page is returned,
///   `floor((total - 1) / limit) * limit`.
///
/// The function is idempotent and, for `total > 0`, its result is always
/// strictly below `total`.
pub fn normalize_offset(total: u64, offset: u64, limit: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    if offset < total {
        return offset;
    }
    let limit = limit.max(1);
    ((total - 1) / limit) * limit
}

/// Pagination owned by the page controller.
///
/// Fields are private: the only way to move the window is [`observe`], which
/// routes every write through [`normalize_offset`].
///
/// [`observe`]: PaginationState::observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    offset: u64,
    limit: u64,
    total: u64,
}

impl PaginationState {
    pub fn new(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            total: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Query that reproduces the currently displayed page
    pub fn query(&self) -> PageQuery {
        PageQuery::new(self.offset, self.limit)
    }

    /// Fold a response for `requested` into the state.
    ///
    /// Returns the corrected query when normalization moved the offset away
    /// from what was requested, `None` when the requested page is still valid.
    pub fn observe(&mut self, requested: PageQuery, total: u64) -> Option<PageQuery> {
        let limit = requested.limit.max(1);
        let offset = normalize_offset(total, requested.offset, limit);

        self.offset = offset;
        self.limit = limit;
        self.total = total;

        (offset != requested.offset).then(|| PageQuery::new(offset, limit))
    }
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new(10)
    }
}
