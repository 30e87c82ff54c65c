use std::sync::Arc;

use core_ranges::RangeFile;

/// A non-owning reference to a `RangeFile` plus two per-index enable masks.
/// `Arc` stands in for the source tool's raw non-owning pointer: the range
/// file genuinely outlives every stream derived from it (it is loaded once
/// and held by `AnalysisState`), so sharing via `Arc` keeps the "someone
/// else owns this" contract without an unsafe lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeStream {
    pub file: Arc<RangeFile>,
    pub ion_enabled: Vec<bool>,
    pub range_enabled: Vec<bool>,
}

impl RangeStream {
    pub fn new(file: Arc<RangeFile>) -> Self {
        let ion_enabled = vec![true; file.ions().len()];
        let range_enabled = vec![true; file.ranges().len()];
        Self { file, ion_enabled, range_enabled }
    }
}
