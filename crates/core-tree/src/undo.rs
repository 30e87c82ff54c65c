use tracing::trace;

use crate::FilterTree;

/// Undo/redo stacks move whole trees by value: each frame is a deep,
/// uncached clone of the tree at the time of the push (the `Filter` trait
/// only offers `clone_uncached`, so undo/redo necessarily drops caches —
/// callers must re-refresh after either). Depth is bounded; pushes past the
/// limit drop the oldest frame.
pub const UNDO_DEPTH_MAX: usize = 10;

#[derive(Default)]
pub struct UndoEngine {
    undo_stack: Vec<FilterTree>,
    redo_stack: Vec<FilterTree>,
}

impl UndoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Push `current` (the tree *before* the mutation about to be applied)
    /// onto the undo stack and clear the redo stack, per the "new edit
    /// invalidates redo" rule every undo/redo system follows.
    pub fn push(&mut self, current: &FilterTree) {
        self.undo_stack.push(current.clone_uncached());
        trace!(target: "tree.undo", undo_depth = self.undo_stack.len(), "push_snapshot");
        if self.undo_stack.len() > UNDO_DEPTH_MAX {
            self.undo_stack.remove(0);
            trace!(target: "tree.undo", "undo_stack_trimmed");
        }
        self.redo_stack.clear();
    }

    /// Discard the most recently pushed frame without applying it —
    /// used when a mutation the caller speculatively pushed undo for turns
    /// out to be rejected (e.g. `set_property` returning `ok=false`).
    pub fn pop_discard(&mut self) {
        self.undo_stack.pop();
    }

    /// Swap `current` with the top of the undo stack, pushing the displaced
    /// tree onto the redo stack. Returns the restored tree, or `None` if
    /// there is nothing to undo.
    pub fn undo(&mut self, current: &FilterTree) -> Option<FilterTree> {
        let restored = self.undo_stack.pop()?;
        trace!(target: "tree.undo", undo_depth = self.undo_stack.len(), "undo_pop");
        self.redo_stack.push(current.clone_uncached());
        Some(restored)
    }

    pub fn redo(&mut self, current: &FilterTree) -> Option<FilterTree> {
        let restored = self.redo_stack.pop()?;
        trace!(target: "tree.undo", redo_depth = self.redo_stack.len(), "redo_pop");
        self.undo_stack.push(current.clone_uncached());
        Some(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::{AbortFlag, FilterError, FilterKind, FilterPropGroup, ProgressData, PropertySetOutcome};
    use core_filter::Filter;
    use core_stream::{FilterStream, StreamKindMask};

    struct StubFilter;
    impl Filter for StubFilter {
        fn kind(&self) -> FilterKind {
            FilterKind::Clip
        }
        fn type_string(&self) -> &'static str {
            "Stub"
        }
        fn clone_uncached(&self) -> Box<dyn Filter> {
            Box::new(StubFilter)
        }
        fn label(&self) -> &str {
            "s"
        }
        fn set_label(&mut self, _label: String) {}
        fn properties(&self) -> FilterPropGroup {
            FilterPropGroup::new("stub")
        }
        fn set_property(&mut self, _key: u32, _value: &str) -> PropertySetOutcome {
            PropertySetOutcome::UNCHANGED
        }
        fn use_mask(&self) -> StreamKindMask {
            StreamKindMask::empty()
        }
        fn block_mask(&self) -> StreamKindMask {
            StreamKindMask::empty()
        }
        fn emit_mask(&self) -> StreamKindMask {
            StreamKindMask::empty()
        }
        fn refresh(&mut self, _inputs: &[FilterStream], _progress: &mut ProgressData, _abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
            Ok(Vec::new())
        }
        fn write_state(&self, _w: &mut dyn std::fmt::Write) -> std::fmt::Result {
            Ok(())
        }
        fn read_state(&mut self, _xml: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn undo_then_redo_round_trips_shape() {
        let mut engine = UndoEngine::new();
        let empty = FilterTree::new();
        engine.push(&empty);

        let mut one_node = FilterTree::new();
        one_node.add_filter(Box::new(StubFilter), None).unwrap();

        let restored = engine.undo(&one_node).unwrap();
        assert_eq!(restored.len(), 0);
        assert_eq!(engine.redo_depth(), 1);

        let redone = engine.redo(&restored).unwrap();
        assert_eq!(redone.len(), 1);
    }

    #[test]
    fn depth_is_bounded() {
        let mut engine = UndoEngine::new();
        for _ in 0..(UNDO_DEPTH_MAX + 5) {
            engine.push(&FilterTree::new());
        }
        assert_eq!(engine.undo_depth(), UNDO_DEPTH_MAX);
    }
}
