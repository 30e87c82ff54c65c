use core_stream::{FilterStream, StreamKindMask};

use crate::{AbortFlag, FilterError, FilterPropGroup, ProgressData};

/// Identifies a filter's concrete kind, independent of any tree position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    IonDownsample,
    Clip,
    Range,
    Transform,
    Spectrum,
    ClusterAnalysis,
    Annotation,
    Voxelise,
    Proxigram,
}

/// The result of a `set_property` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySetOutcome {
    pub ok: bool,
    pub needs_update: bool,
}

impl PropertySetOutcome {
    pub const REJECTED: PropertySetOutcome = PropertySetOutcome { ok: false, needs_update: false };
    pub const UNCHANGED: PropertySetOutcome = PropertySetOutcome { ok: true, needs_update: false };
    pub const ACCEPTED: PropertySetOutcome = PropertySetOutcome { ok: true, needs_update: true };
}

/// A processing node in the filter graph.
///
/// `use_mask`/`block_mask`/`emit_mask` must be constant for a given
/// parameter state and must agree with what `refresh` actually does —
/// violating that is a bug the refresh engine has no way to detect on its
/// own.
pub trait Filter: Send {
    fn kind(&self) -> FilterKind;

    fn type_string(&self) -> &'static str;

    /// A fresh filter with the same parameters and an empty cache.
    fn clone_uncached(&self) -> Box<dyn Filter>;

    fn label(&self) -> &str;

    fn set_label(&mut self, label: String);

    fn properties(&self) -> FilterPropGroup;

    /// Parse `value` per the property's declared type and apply it.
    /// Returns `ok=false` (no change made) on a parse failure, `ok=true,
    /// needs_update=false` when the value is unchanged, and `ok=true,
    /// needs_update=true` otherwise. Cosmetic properties set
    /// `needs_update=true` without invalidating the cache.
    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome;

    fn use_mask(&self) -> StreamKindMask;
    fn block_mask(&self) -> StreamKindMask;
    fn emit_mask(&self) -> StreamKindMask;

    /// Produce outputs from `inputs`. Must check `abort` at bounded
    /// intervals and return `FilterError::Aborted` without retaining
    /// partial output when it is set.
    fn refresh(
        &mut self,
        inputs: &[FilterStream],
        progress: &mut ProgressData,
        abort: &AbortFlag,
    ) -> Result<Vec<FilterStream>, FilterError>;

    /// Lightweight pre-pass run without data, letting the filter copy
    /// references (e.g. the active range table) that inform its UI.
    fn init_filter(&mut self, _inputs: &[FilterStream]) {}

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result;

    fn read_state(&mut self, xml: &str) -> Result<(), String>;

    /// True for loaders: filters that produce output with no input.
    fn is_pure_data_source(&self) -> bool {
        false
    }

    /// True for filters that execute external processes; the engine may
    /// strip these when loading state from an untrusted file.
    fn can_be_hazardous(&self) -> bool {
        false
    }

    /// Whether this filter currently holds a valid cache it can serve
    /// without re-running `refresh`.
    fn cache_valid(&self) -> bool {
        false
    }

    fn clear_cache(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constants_match_contract() {
        assert!(!PropertySetOutcome::REJECTED.ok);
        assert!(PropertySetOutcome::UNCHANGED.ok && !PropertySetOutcome::UNCHANGED.needs_update);
        assert!(PropertySetOutcome::ACCEPTED.ok && PropertySetOutcome::ACCEPTED.needs_update);
    }
}
