use core_filter::Filter;

use crate::{NodeId, TreeError};

struct Slot {
    filter: Box<dyn Filter>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An ordered, rooted multiway forest of filters. Sibling order is
/// user-visible and persisted; every mutation that can change it documents
/// where the new node lands (always appended last among its siblings).
#[derive(Default)]
pub struct FilterTree {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
}

impl FilterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        self.slots.get(id.0).and_then(|s| s.as_ref()).ok_or(TreeError::NoSuchNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, TreeError> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut()).ok_or(TreeError::NoSuchNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.get(id.0).map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn filter(&self, id: NodeId) -> Result<&dyn Filter, TreeError> {
        Ok(self.slot(id)?.filter.as_ref())
    }

    pub fn filter_mut(&mut self, id: NodeId) -> Result<&mut (dyn Filter + 'static), TreeError> {
        Ok(self.slot_mut(id)?.filter.as_mut())
    }

    pub fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.slot(id)?.parent)
    }

    pub fn children_of(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.slot(id)?.children)
    }

    fn alloc(&mut self, filter: Box<dyn Filter>, parent: Option<NodeId>) -> NodeId {
        let slot = Slot { filter, parent, children: Vec::new() };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            NodeId(idx)
        } else {
            self.slots.push(Some(slot));
            NodeId(self.slots.len() - 1)
        }
    }

    /// Insert `filter` as the last child of `parent`, or as a new root if
    /// `parent` is `None`.
    pub fn add_filter(&mut self, filter: Box<dyn Filter>, parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        if let Some(p) = parent {
            if !self.contains(p) {
                return Err(TreeError::NoSuchNode(p));
            }
        }
        let id = self.alloc(filter, parent);
        match parent {
            Some(p) => self.slot_mut(p)?.children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Remove the subtree rooted at `id`, cascading to all descendants.
    /// Returns the removed node ids (including `id`).
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::NoSuchNode(id));
        }
        let parent = self.slot(id)?.parent;
        match parent {
            Some(p) => self.slot_mut(p)?.children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let children = self.slot(cur)?.children.clone();
            stack.extend(children);
            removed.push(cur);
        }
        for &r in &removed {
            self.free.push(r.0);
            self.slots[r.0] = None;
        }
        Ok(removed)
    }

    fn is_descendant(&self, ancestor: NodeId, candidate: NodeId) -> Result<bool, TreeError> {
        let mut cur = Some(candidate);
        while let Some(c) = cur {
            if c == ancestor {
                return Ok(true);
            }
            cur = self.slot(c)?.parent;
        }
        Ok(false)
    }

    /// Move `id` (with its whole subtree) to become the last child of
    /// `new_parent`. Fails if that would create a cycle (`new_parent` is
    /// `id` itself or a descendant of it).
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), TreeError> {
        if !self.contains(id) || !self.contains(new_parent) {
            return Err(TreeError::NoSuchNode(id));
        }
        if id == new_parent || self.is_descendant(id, new_parent)? {
            return Err(TreeError::WouldCreateCycle { id, new_parent });
        }
        let old_parent = self.slot(id)?.parent;
        match old_parent {
            Some(p) => self.slot_mut(p)?.children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
        self.slot_mut(new_parent)?.children.push(id);
        self.slot_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// Deep-clone the subtree rooted at `id` (fresh, uncached filters) and
    /// graft the clone as the last child of `dst_parent`, or as a new root
    /// if `dst_parent` is `None`. Returns the root id of the new subtree.
    pub fn copy_subtree(&mut self, id: NodeId, dst_parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::NoSuchNode(id));
        }
        if let Some(p) = dst_parent {
            if !self.contains(p) {
                return Err(TreeError::NoSuchNode(p));
            }
        }
        self.copy_subtree_rec(id, dst_parent)
    }

    fn copy_subtree_rec(&mut self, src: NodeId, dst_parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        let (filter, children) = {
            let slot = self.slot(src)?;
            (slot.filter.clone_uncached(), slot.children.clone())
        };
        let new_id = self.add_filter(filter, dst_parent)?;
        for child in children {
            self.copy_subtree_rec(child, Some(new_id))?;
        }
        Ok(new_id)
    }

    /// Deep-clone the subtree rooted at `id` into a brand-new, standalone
    /// `FilterTree` with `id`'s filter as its sole root. Used to lift a
    /// subtree out into `AnalysisState`'s named stash table; the caller is
    /// responsible for removing the original via `remove_subtree`.
    pub fn to_standalone(&self, id: NodeId) -> Result<FilterTree, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::NoSuchNode(id));
        }
        let mut out = FilterTree::new();
        let mut remap = std::collections::HashMap::new();
        self.clone_into(id, None, &mut out, &mut remap);
        Ok(out)
    }

    /// A deep, uncached clone of the entire forest — the basis for undo
    /// snapshots (see `core-tree::UndoEngine`).
    pub fn clone_uncached(&self) -> FilterTree {
        let mut out = FilterTree::new();
        let mut remap = std::collections::HashMap::new();
        for &root in &self.roots {
            self.clone_into(root, None, &mut out, &mut remap);
        }
        out
    }

    fn clone_into(&self, src: NodeId, dst_parent: Option<NodeId>, out: &mut FilterTree, remap: &mut std::collections::HashMap<NodeId, NodeId>) -> NodeId {
        let slot = self.slot(src).expect("src exists by construction");
        let new_id = out.add_filter(slot.filter.clone_uncached(), dst_parent).expect("dst_parent exists by construction");
        remap.insert(src, new_id);
        for &child in &slot.children {
            self.clone_into(child, Some(new_id), out, remap);
        }
        new_id
    }

    /// Graft `other` (expected to have exactly one root, as produced by
    /// `to_standalone`) into `self` as a child of `dst_parent` (or a new
    /// root). Returns the id of the grafted root in `self`.
    pub fn graft(&mut self, other: &FilterTree, dst_parent: Option<NodeId>) -> Result<NodeId, TreeError> {
        if let Some(p) = dst_parent {
            if !self.contains(p) {
                return Err(TreeError::NoSuchNode(p));
            }
        }
        let root = *other.roots().first().ok_or(TreeError::NoSuchNode(NodeId(usize::MAX)))?;
        let mut remap = std::collections::HashMap::new();
        Ok(other.clone_into(root, dst_parent, self, &mut remap))
    }

    /// Deterministic pre-order traversal (roots in order, each subtree
    /// depth-first) used to rebuild stable handle maps after a bulk
    /// operation.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.preorder_into(root, &mut out);
        }
        out
    }

    fn preorder_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Ok(children) = self.children_of(id) {
            for &c in children.to_vec().iter() {
                self.preorder_into(c, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::{AbortFlag, FilterError, FilterKind, FilterPropGroup, ProgressData, PropertySetOutcome};
    use core_stream::{FilterStream, StreamKindMask};

    struct StubFilter(&'static str);

    impl Filter for StubFilter {
        fn kind(&self) -> FilterKind {
            FilterKind::Clip
        }
        fn type_string(&self) -> &'static str {
            "Stub"
        }
        fn clone_uncached(&self) -> Box<dyn Filter> {
            Box::new(StubFilter(self.0))
        }
        fn label(&self) -> &str {
            self.0
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
    fn add_and_remove_subtree() {
        let mut tree = FilterTree::new();
        let root = tree.add_filter(Box::new(StubFilter("root")), None).unwrap();
        let child = tree.add_filter(Box::new(StubFilter("child")), Some(root)).unwrap();
        assert_eq!(tree.len(), 2);
        let removed = tree.remove_subtree(root).unwrap();
        assert!(removed.contains(&root) && removed.contains(&child));
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn reparent_rejects_cycle_into_own_descendant() {
        let mut tree = FilterTree::new();
        let root = tree.add_filter(Box::new(StubFilter("root")), None).unwrap();
        let child = tree.add_filter(Box::new(StubFilter("child")), Some(root)).unwrap();
        let err = tree.reparent(root, child).unwrap_err();
        assert!(matches!(err, TreeError::WouldCreateCycle { .. }));
    }

    #[test]
    fn copy_subtree_is_independent_of_original() {
        let mut tree = FilterTree::new();
        let root = tree.add_filter(Box::new(StubFilter("root")), None).unwrap();
        let _child = tree.add_filter(Box::new(StubFilter("child")), Some(root)).unwrap();
        let copy_root = tree.copy_subtree(root, None).unwrap();
        assert_eq!(tree.children_of(copy_root).unwrap().len(), 1);
        tree.remove_subtree(root).unwrap();
        assert!(tree.contains(copy_root));
    }

    #[test]
    fn preorder_visits_roots_in_order_depth_first() {
        let mut tree = FilterTree::new();
        let a = tree.add_filter(Box::new(StubFilter("a")), None).unwrap();
        let b = tree.add_filter(Box::new(StubFilter("b")), None).unwrap();
        let a1 = tree.add_filter(Box::new(StubFilter("a1")), Some(a)).unwrap();
        assert_eq!(tree.preorder(), vec![a, a1, b]);
    }
}
