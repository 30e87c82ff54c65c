/// Whether a consumer may retain this stream's payload past the current
/// refresh step. Replaces the source tool's `unsigned int cached` field
/// (used as a boolean, with a documented `-1` sentinel some assertions
/// special-cased) with a closed, two-state enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cached {
    /// Owned by the producing filter's cache list. Consumers borrow it; it
    /// must not be dropped by anyone but the filter that emitted it.
    Owned,
    /// Ownership passed to the consumer (ultimately the refresh engine) on
    /// emission. The consumer must drop it when the downstream step using it
    /// completes.
    Transferred,
}

impl Cached {
    pub fn is_owned(self) -> bool {
        matches!(self, Cached::Owned)
    }

    pub fn is_transferred(self) -> bool {
        matches!(self, Cached::Transferred)
    }
}
