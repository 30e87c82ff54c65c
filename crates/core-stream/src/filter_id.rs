use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity-only handle to the filter that produced a stream. Never used to
/// reach the filter itself and never participates in ownership: a stream
/// outlives the `FilterId` comparison just fine even after its producer is
/// removed from the tree. Two streams compare equal-producer by comparing
/// `FilterId`s, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

impl FilterId {
    /// Mint a fresh, process-unique id. Called once per filter at
    /// construction time, not per refresh.
    pub fn fresh() -> Self {
        FilterId(NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// A placeholder id for streams with no real producer (e.g. streams
    /// synthesized in tests or by an external loader).
    pub const UNSET: FilterId = FilterId(0);
}

impl Default for FilterId {
    fn default() -> Self {
        FilterId::UNSET
    }
}
