use std::collections::{HashMap, HashSet};

use core_filter::AbortFlag;
use core_tree::{FilterHandle, FilterTree, TreeError, TreeState};

use crate::animation::AnimationRecord;
use crate::camera::Camera;
use crate::effect::Effect;
use crate::modify_level::ModifyLevel;

/// Errors specific to `AnalysisState`'s bookkeeping around `TreeState`
/// (cameras, stashes, visibility) rather than tree structure itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("camera index {0} out of range")]
    NoSuchCamera(usize),
    #[error("refusing to remove the last camera")]
    LastCamera,
    #[error("no stash named {0:?}")]
    NoSuchStash(String),
    #[error("a stash named {0:?} already exists")]
    DuplicateStash(String),
    #[error("colour component {0} out of [0,1]")]
    ColourOutOfRange(f32),
}

/// Owns a `TreeState` plus everything else the original tool persisted
/// alongside it per filter-graph document: cameras, stashed subtrees,
/// effects, background colour, plot visibility, animation, and the
/// modification-level marker that decides whether a save prompt is needed.
pub struct AnalysisState {
    tree: TreeState,
    stashes: HashMap<String, FilterTree>,
    cameras: Vec<Camera>,
    active_camera: usize,
    effects: Vec<Effect>,
    background: (f32, f32, f32),
    show_axis: bool,
    plot_visibility: HashSet<(String, u32)>,
    animation: AnimationRecord,
    working_dir: String,
    use_relative_paths: bool,
    modify_level: ModifyLevel,
    abort: AbortFlag,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            tree: TreeState::new(),
            stashes: HashMap::new(),
            cameras: vec![Camera::default()],
            active_camera: 0,
            effects: Vec::new(),
            background: (0.0, 0.0, 0.0),
            show_axis: true,
            plot_visibility: HashSet::new(),
            animation: AnimationRecord::new(),
            working_dir: String::new(),
            use_relative_paths: false,
            modify_level: ModifyLevel::None,
            abort: AbortFlag::new(),
        }
    }
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &TreeState {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TreeState {
        &mut self.tree
    }

    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn modify_level(&self) -> ModifyLevel {
        self.modify_level
    }

    /// Raise the modification level if `level` is more severe than what has
    /// been recorded since the last save/load; never lowers it.
    pub fn touch(&mut self, level: ModifyLevel) {
        self.modify_level.raise(level);
    }

    pub fn reset_modify_level(&mut self) {
        self.modify_level = ModifyLevel::None;
    }

    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    pub fn set_working_dir(&mut self, dir: impl Into<String>) {
        self.working_dir = dir.into();
    }

    pub fn use_relative_paths(&self) -> bool {
        self.use_relative_paths
    }

    pub fn set_use_relative_paths(&mut self, v: bool) {
        self.use_relative_paths = v;
        self.touch(ModifyLevel::View);
    }

    pub fn background(&self) -> (f32, f32, f32) {
        self.background
    }

    pub fn set_background(&mut self, rgb: (f32, f32, f32)) -> Result<(), AnalysisError> {
        for c in [rgb.0, rgb.1, rgb.2] {
            if !(0.0..=1.0).contains(&c) {
                return Err(AnalysisError::ColourOutOfRange(c));
            }
        }
        self.background = rgb;
        self.touch(ModifyLevel::View);
        Ok(())
    }

    pub fn show_axis(&self) -> bool {
        self.show_axis
    }

    pub fn set_show_axis(&mut self, v: bool) {
        self.show_axis = v;
        self.touch(ModifyLevel::View);
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn active_camera_index(&self) -> usize {
        self.active_camera
    }

    pub fn active_camera(&self) -> &Camera {
        &self.cameras[self.active_camera]
    }

    pub fn set_active_camera(&mut self, idx: usize) -> Result<(), AnalysisError> {
        if idx >= self.cameras.len() {
            return Err(AnalysisError::NoSuchCamera(idx));
        }
        self.active_camera = idx;
        self.touch(ModifyLevel::View);
        Ok(())
    }

    pub fn add_camera(&mut self, camera: Camera) -> usize {
        self.cameras.push(camera);
        self.touch(ModifyLevel::View);
        self.cameras.len() - 1
    }

    /// Always leaves at least one camera behind; a state with zero cameras
    /// has no well-defined view.
    pub fn remove_camera(&mut self, idx: usize) -> Result<(), AnalysisError> {
        if idx >= self.cameras.len() {
            return Err(AnalysisError::NoSuchCamera(idx));
        }
        if self.cameras.len() == 1 {
            return Err(AnalysisError::LastCamera);
        }
        self.cameras.remove(idx);
        if self.active_camera >= self.cameras.len() {
            self.active_camera = self.cameras.len() - 1;
        }
        self.touch(ModifyLevel::View);
        Ok(())
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
        self.touch(ModifyLevel::Ancillary);
    }

    pub fn clear_effects(&mut self) {
        self.effects.clear();
        self.touch(ModifyLevel::Ancillary);
    }

    pub fn animation(&self) -> &AnimationRecord {
        &self.animation
    }

    pub fn animation_mut(&mut self) -> &mut AnimationRecord {
        self.touch(ModifyLevel::Ancillary);
        &mut self.animation
    }

    pub fn plot_visibility(&self) -> &HashSet<(String, u32)> {
        &self.plot_visibility
    }

    pub fn set_plot_visible(&mut self, filter_path: impl Into<String>, plot_id: u32, visible: bool) {
        let key = (filter_path.into(), plot_id);
        if visible {
            self.plot_visibility.insert(key);
        } else {
            self.plot_visibility.remove(&key);
        }
        self.touch(ModifyLevel::View);
    }

    pub fn is_plot_visible(&self, filter_path: &str, plot_id: u32) -> bool {
        self.plot_visibility.contains(&(filter_path.to_string(), plot_id))
    }

    /// The slash-joined chain of filter labels from the root down to
    /// `handle`, used as the stable key for plot visibility and state-file
    /// `<enableplot filter=.../>` entries. `None` if the handle is stale.
    pub fn filter_path(&self, handle: FilterHandle) -> Option<String> {
        let mut node = self.tree.node_of(handle)?;
        let mut labels = vec![self.tree.tree().filter(node).ok()?.label().to_string()];
        while let Some(parent) = self.tree.tree().parent_of(node).ok()? {
            labels.push(self.tree.tree().filter(parent).ok()?.label().to_string());
            node = parent;
        }
        labels.reverse();
        Some(labels.join("/"))
    }

    pub fn stashes(&self) -> impl Iterator<Item = &str> {
        self.stashes.keys().map(String::as_str)
    }

    pub fn stash(&self, name: &str) -> Option<&FilterTree> {
        self.stashes.get(name)
    }

    /// Extract the subtree at `handle` out of the live tree and file it
    /// under `name`. Fails if `name` is already taken, leaving the tree
    /// untouched.
    pub fn stash_subtree(&mut self, name: impl Into<String>, handle: FilterHandle) -> Result<(), AnalysisError> {
        let name = name.into();
        if self.stashes.contains_key(&name) {
            return Err(AnalysisError::DuplicateStash(name));
        }
        let extracted = self.tree.extract_subtree(handle)?;
        self.stashes.insert(name, extracted);
        self.touch(ModifyLevel::Data);
        Ok(())
    }

    /// Graft a previously-stashed subtree back into the live tree and
    /// forget the stash entry. The stash is consumed even if the graft
    /// itself later fails to find `dst_parent`, matching
    /// "stash then restore" being a single user-visible action.
    pub fn unstash(&mut self, name: &str, dst_parent: Option<FilterHandle>) -> Result<FilterHandle, AnalysisError> {
        let subtree = self.stashes.remove(name).ok_or_else(|| AnalysisError::NoSuchStash(name.to_string()))?;
        let handle = self.tree.graft_subtree(&subtree, dst_parent)?;
        self.touch(ModifyLevel::Data);
        Ok(handle)
    }

    pub(crate) fn set_tree_raw(&mut self, tree: TreeState) {
        self.tree = tree;
    }

    pub(crate) fn set_flat_fields_raw(&mut self, background: (f32, f32, f32), show_axis: bool, use_relative_paths: bool, working_dir: String) {
        self.background = background;
        self.show_axis = show_axis;
        self.use_relative_paths = use_relative_paths;
        self.working_dir = working_dir;
    }

    pub(crate) fn set_stashes_raw(&mut self, stashes: HashMap<String, FilterTree>) {
        self.stashes = stashes;
    }

    pub(crate) fn set_cameras_raw(&mut self, cameras: Vec<Camera>, active: usize) {
        self.cameras = cameras;
        self.active_camera = active;
    }

    pub(crate) fn set_effects_raw(&mut self, effects: Vec<Effect>) {
        self.effects = effects;
    }

    pub(crate) fn set_animation_raw(&mut self, animation: AnimationRecord) {
        self.animation = animation;
    }

    pub(crate) fn set_plot_visibility_raw(&mut self, set: HashSet<(String, u32)>) {
        self.plot_visibility = set;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::{Filter, FilterError, FilterKind, FilterPropGroup, ProgressData, PropertySetOutcome};
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
    fn cannot_remove_the_last_camera() {
        let mut state = AnalysisState::new();
        assert_eq!(state.cameras().len(), 1);
        assert_eq!(state.remove_camera(0), Err(AnalysisError::LastCamera));
    }

    #[test]
    fn background_rejects_out_of_range_components() {
        let mut state = AnalysisState::new();
        assert!(state.set_background((0.5, 0.5, 0.5)).is_ok());
        assert!(state.set_background((1.5, 0.0, 0.0)).is_err());
    }

    #[test]
    fn stash_then_unstash_round_trips_the_subtree() {
        let mut state = AnalysisState::new();
        let root = state.tree_mut().add_filter(Box::new(StubFilter("root")), None).unwrap();
        state.tree_mut().add_filter(Box::new(StubFilter("child")), Some(root)).unwrap();
        state.stash_subtree("s", root).unwrap();
        assert_eq!(state.tree().tree().len(), 0);
        assert_eq!(state.stashes().count(), 1);

        let restored = state.unstash("s", None).unwrap();
        assert!(state.tree().node_of(restored).is_some());
        assert_eq!(state.tree().tree().len(), 2);
        assert_eq!(state.stashes().count(), 0);
    }

    #[test]
    fn duplicate_stash_name_is_rejected() {
        let mut state = AnalysisState::new();
        let a = state.tree_mut().add_filter(Box::new(StubFilter("a")), None).unwrap();
        let b = state.tree_mut().add_filter(Box::new(StubFilter("b")), None).unwrap();
        state.stash_subtree("dup", a).unwrap();
        assert_eq!(state.stash_subtree("dup", b), Err(AnalysisError::DuplicateStash("dup".to_string())));
    }

    #[test]
    fn modify_level_only_ever_rises() {
        let mut state = AnalysisState::new();
        state.touch(ModifyLevel::View);
        state.touch(ModifyLevel::None);
        assert_eq!(state.modify_level(), ModifyLevel::View);
        state.touch(ModifyLevel::Data);
        assert_eq!(state.modify_level(), ModifyLevel::Data);
    }

    #[test]
    fn filter_path_joins_labels_root_first() {
        let mut state = AnalysisState::new();
        let root = state.tree_mut().add_filter(Box::new(StubFilter("root")), None).unwrap();
        let child = state.tree_mut().add_filter(Box::new(StubFilter("child")), Some(root)).unwrap();
        assert_eq!(state.filter_path(child).unwrap(), "root/child");
    }
}
