use std::collections::HashMap;

use core_filter::{AbortFlag, Filter, FilterError, ProgressData, SelectionDevice};
use core_stream::{FilterStream, StreamKindMask};
use core_tree::{FilterTree, NodeId, TreeState};
use tracing::{debug, trace};

use crate::RefreshError;

/// The engine's own cache, keyed by node: the effective input it last saw
/// and the effective output it computed from it. Separate from whatever a
/// `Filter` chooses to cache internally — this is what lets the engine
/// decide, without calling `refresh` again, whether a node's inputs are
/// identity-equal to the ones it was last computed from.
struct CacheEntry {
    inputs: Vec<FilterStream>,
    outputs: Vec<FilterStream>,
}

#[derive(Default)]
pub struct RefreshOutputs {
    pub per_node: HashMap<NodeId, Vec<FilterStream>>,
    pub selection_devices: Vec<SelectionDevice>,
}

#[derive(Default)]
pub struct RefreshEngine {
    caches: HashMap<NodeId, CacheEntry>,
}

impl RefreshEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the engine-level cache entry for one node — called whenever a
    /// property mutation on that filter invalidates its output.
    pub fn invalidate(&mut self, node: NodeId) {
        self.caches.remove(&node);
    }

    pub fn invalidate_all(&mut self) {
        self.caches.clear();
    }

    /// Walk the tree depth-first starting from `roots_input` (the root
    /// streams an external loader produced), honoring `abort` at
    /// per-filter granularity (filters themselves honor it at finer
    /// granularity inside `refresh`). On any node failure, engine-level
    /// cache entries created *during this walk* are rolled back; caches
    /// that were valid before the walk began are untouched.
    pub fn run(&mut self, state: &mut TreeState, roots_input: &[FilterStream], abort: &AbortFlag) -> Result<RefreshOutputs, RefreshError> {
        if !state.try_lock_for_refresh() {
            return Err(RefreshError::AlreadyRunning);
        }
        abort.clear();
        let mut out = RefreshOutputs::default();
        let total_filters = state.tree().len() as u32;
        let mut progress = ProgressData::new(total_filters);
        let mut newly_cached = Vec::new();

        let roots = state.tree().roots().to_vec();
        let tree = state.tree_mut();
        let mut result = Ok(());
        for &root in &roots {
            if let Err(e) = self.walk(tree, root, roots_input, &mut progress, abort, &mut newly_cached, &mut out) {
                result = Err(e);
                break;
            }
        }

        if let Err(e) = result {
            for node in newly_cached {
                self.caches.remove(&node);
            }
            state.unlock_after_refresh();
            return Err(e);
        }

        state.unlock_after_refresh();
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &mut self,
        tree: &mut FilterTree,
        node: NodeId,
        effective_input: &[FilterStream],
        progress: &mut ProgressData,
        abort: &AbortFlag,
        newly_cached: &mut Vec<NodeId>,
        out: &mut RefreshOutputs,
    ) -> Result<(), RefreshError> {
        if abort.is_set() {
            return Err(RefreshError::NodeFailed { node, source: FilterError::Aborted });
        }

        let cache_hit = self.caches.get(&node).map(|c| c.inputs == effective_input).unwrap_or(false);
        let (own_outputs, block_mask) = if cache_hit {
            trace!(target: "refresh.engine", ?node, "cache_hit");
            let outputs = self.caches.get(&node).unwrap().outputs.clone();
            let block_mask = tree.filter(node).map_err(node_err(node))?.block_mask();
            (outputs, block_mask)
        } else {
            let label = tree.filter(node).map_err(node_err(node))?.label().to_string();
            progress.begin_filter(label);
            let filter = tree.filter_mut(node).map_err(node_err(node))?;
            debug!(target: "refresh.engine", ?node, "refresh_node");
            let outputs = filter.refresh(effective_input, progress, abort).map_err(|source| RefreshError::NodeFailed { node, source })?;
            let block_mask = filter.block_mask();
            self.caches.insert(node, CacheEntry { inputs: effective_input.to_vec(), outputs: outputs.clone() });
            newly_cached.push(node);
            (outputs, block_mask)
        };

        let emitted_kinds = own_outputs.iter().fold(StreamKindMask::empty(), |m, s| m | s.kind());
        let mut effective_output = own_outputs;
        for stream in effective_input {
            let kind = stream.kind();
            if !block_mask.contains(kind) && !emitted_kinds.contains(kind) {
                effective_output.push(stream.clone());
            }
        }

        let children = tree.children_of(node).map_err(node_err(node))?.to_vec();
        out.per_node.insert(node, effective_output.clone());
        for child in children {
            self.walk(tree, child, &effective_output, progress, abort, newly_cached, out)?;
        }
        Ok(())
    }
}

fn node_err(node: NodeId) -> impl Fn(core_tree::TreeError) -> RefreshError {
    move |_| RefreshError::NodeFailed { node, source: FilterError::Aborted }
}
