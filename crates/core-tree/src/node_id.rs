/// Opaque internal arena index. Not user-visible and not stable across
/// whole-tree replacement (undo/redo, `copy_subtree`); `TreeState`'s
/// `FilterHandle` is the stable identity callers should hold onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);
