use std::collections::HashMap;

use crate::NodeId;

/// A stable external identifier for a filter, independent of its position
/// in the tree's internal arena. Survives `add_filter`/`remove_subtree`/
/// `set_property`/`reparent`; invalidated by `copy_subtree` and by
/// undo/redo (both replace the tree wholesale, so the map is rebuilt from a
/// deterministic traversal rather than patched incrementally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterHandle(u64);

impl FilterHandle {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(v: u64) -> Self {
        FilterHandle(v)
    }
}

/// Dense bidirectional handle <-> node map. The handle namespace is dense
/// and reused after deletion: `next` only advances, but `release` returns a
/// handle to the free list so the lowest available value is reissued next.
#[derive(Default)]
pub struct HandleMap {
    handle_to_node: HashMap<FilterHandle, NodeId>,
    node_to_handle: HashMap<NodeId, FilterHandle>,
    free: Vec<u64>,
    next: u64,
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, node: NodeId) -> FilterHandle {
        let raw = self.free.pop().unwrap_or_else(|| {
            let v = self.next;
            self.next += 1;
            v
        });
        let handle = FilterHandle(raw);
        self.handle_to_node.insert(handle, node);
        self.node_to_handle.insert(node, handle);
        handle
    }

    pub fn release(&mut self, node: NodeId) {
        if let Some(handle) = self.node_to_handle.remove(&node) {
            self.handle_to_node.remove(&handle);
            self.free.push(handle.0);
        }
    }

    pub fn node_of(&self, handle: FilterHandle) -> Option<NodeId> {
        self.handle_to_node.get(&handle).copied()
    }

    pub fn handle_of(&self, node: NodeId) -> Option<FilterHandle> {
        self.node_to_handle.get(&node).copied()
    }

    /// Discard every mapping and reassign handles in `order` (a
    /// deterministic traversal, typically `FilterTree::preorder`), each
    /// getting the lowest available handle value in turn.
    pub fn rebuild(&mut self, order: &[NodeId]) {
        self.handle_to_node.clear();
        self.node_to_handle.clear();
        self.free.clear();
        self.next = 0;
        for &node in order {
            self.assign(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_reuses_lowest_freed_handle() {
        let mut map = HandleMap::new();
        let h0 = map.assign(NodeId(0));
        let _h1 = map.assign(NodeId(1));
        map.release(NodeId(0));
        let h2 = map.assign(NodeId(2));
        assert_eq!(h2, h0);
    }

    #[test]
    fn rebuild_produces_dense_handles_in_traversal_order() {
        let mut map = HandleMap::new();
        map.assign(NodeId(5));
        map.assign(NodeId(9));
        map.rebuild(&[NodeId(1), NodeId(2), NodeId(3)]);
        assert!(map.node_of(map.handle_of(NodeId(1)).unwrap()).is_some());
        assert_eq!(map.handle_of(NodeId(5)), None);
    }
}
