use std::collections::{HashMap, HashSet};
use std::io::Write as _;
use std::path::Path;

use core_filter::Filter;
use core_geom::Point3D;
use core_tree::{FilterTree, NodeId, TreeState};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::animation::{AnimationKeyframe, AnimationRecord};
use crate::camera::Camera;
use crate::effect::Effect;
use crate::error::{StateLoadError, StateSaveError};
use crate::state::AnalysisState;

/// The writer version this crate stamps into new state files. Loaders warn
/// (never reject) on a mismatch; only structural errors fail a load.
pub const WRITER_VERSION: &str = "1.0.0";

/// Supplies filter constructors by type-string so `core-analysis` can parse
/// a `<filtertree>` without depending on `filters-stock` (which would
/// invert the crate dependency order). The caller — typically `ap-cli` —
/// registers every stock filter's `type_string()` before loading.
pub trait FilterRegistry {
    fn construct(&self, type_string: &str) -> Option<Box<dyn Filter>>;
}

impl From<quick_xml::Error> for StateSaveError {
    fn from(e: quick_xml::Error) -> Self {
        StateSaveError::Encoding(e.to_string())
    }
}

// ---------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------

pub fn save_state(state: &AnalysisState) -> Result<String, StateSaveError> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Start(BytesStart::new("apstate")))?;

    let mut wv = BytesStart::new("writer");
    wv.push_attribute(("version", WRITER_VERSION));
    w.write_event(Event::Empty(wv))?;

    let (r, g, b) = state.background();
    let mut bc = BytesStart::new("backcolour");
    bc.push_attribute(("r", r.to_string().as_str()));
    bc.push_attribute(("g", g.to_string().as_str()));
    bc.push_attribute(("b", b.to_string().as_str()));
    w.write_event(Event::Empty(bc))?;

    let mut sa = BytesStart::new("showaxis");
    sa.push_attribute(("value", if state.show_axis() { "1" } else { "0" }));
    w.write_event(Event::Empty(sa))?;

    let mut ps = BytesStart::new("plotstatus");
    ps.push_attribute(("legend", "1"));
    w.write_event(Event::Start(ps))?;
    for (path, id) in state.plot_visibility() {
        let mut ep = BytesStart::new("enableplot");
        ep.push_attribute(("filter", path.as_str()));
        ep.push_attribute(("id", id.to_string().as_str()));
        w.write_event(Event::Empty(ep))?;
    }
    w.write_event(Event::End(BytesEnd::new("plotstatus")))?;

    if state.use_relative_paths() {
        let mut urp = BytesStart::new("userelativepaths");
        urp.push_attribute(("origworkdir", state.working_dir()));
        w.write_event(Event::Empty(urp))?;
    }

    w.write_event(Event::Start(BytesStart::new("filtertree")))?;
    for &root in state.tree().tree().roots() {
        write_filter_node(&mut w, state.tree().tree(), root)?;
    }
    w.write_event(Event::End(BytesEnd::new("filtertree")))?;

    w.write_event(Event::Start(BytesStart::new("cameras")))?;
    let mut active = BytesStart::new("active");
    active.push_attribute(("value", state.active_camera_index().to_string().as_str()));
    w.write_event(Event::Empty(active))?;
    for cam in state.cameras() {
        write_camera(&mut w, cam)?;
    }
    w.write_event(Event::End(BytesEnd::new("cameras")))?;

    let stash_names: Vec<&str> = state.stashes().collect();
    if !stash_names.is_empty() {
        w.write_event(Event::Start(BytesStart::new("stashedfilters")))?;
        for name in stash_names {
            let tree = state.stash(name).expect("name came from this state's own stash iterator");
            let mut stash_tag = BytesStart::new("stash");
            stash_tag.push_attribute(("name", name));
            w.write_event(Event::Start(stash_tag))?;
            w.write_event(Event::Start(BytesStart::new("filtertree")))?;
            for &root in tree.roots() {
                write_filter_node(&mut w, tree, root)?;
            }
            w.write_event(Event::End(BytesEnd::new("filtertree")))?;
            w.write_event(Event::End(BytesEnd::new("stash")))?;
        }
        w.write_event(Event::End(BytesEnd::new("stashedfilters")))?;
    }

    if !state.effects().is_empty() {
        w.write_event(Event::Start(BytesStart::new("effects")))?;
        for effect in state.effects() {
            let mut e = BytesStart::new("effect");
            e.push_attribute(("kind", effect.kind.as_str()));
            w.write_event(Event::Start(e))?;
            for (k, v) in &effect.params {
                let mut p = BytesStart::new("param");
                p.push_attribute(("key", k.as_str()));
                p.push_attribute(("value", v.as_str()));
                w.write_event(Event::Empty(p))?;
            }
            w.write_event(Event::End(BytesEnd::new("effect")))?;
        }
        w.write_event(Event::End(BytesEnd::new("effects")))?;
    }

    if !state.animation().is_empty() {
        w.write_event(Event::Start(BytesStart::new("animationstate")))?;
        for kf in state.animation().keyframes() {
            let mut k = BytesStart::new("keyframe");
            k.push_attribute(("time", kf.time.to_string().as_str()));
            k.push_attribute(("path", kf.path.as_str()));
            k.push_attribute(("value", kf.value.as_str()));
            w.write_event(Event::Empty(k))?;
        }
        w.write_event(Event::End(BytesEnd::new("animationstate")))?;
    }

    w.write_event(Event::End(BytesEnd::new("apstate")))?;

    String::from_utf8(w.into_inner()).map_err(|e| StateSaveError::Encoding(e.to_string()))
}

pub fn save_state_to_file(state: &AnalysisState, path: impl AsRef<Path>) -> Result<(), StateSaveError> {
    let xml = save_state(state)?;
    let path = path.as_ref();
    std::fs::write(path, xml).map_err(|e| StateSaveError::Io { path: path.display().to_string(), reason: e.to_string() })
}

fn write_camera(w: &mut Writer<Vec<u8>>, cam: &Camera) -> Result<(), StateSaveError> {
    let mut tag = BytesStart::new(Camera::TAG);
    tag.push_attribute(("eye", cam.eye.to_string().as_str()));
    tag.push_attribute(("target", cam.target.to_string().as_str()));
    tag.push_attribute(("up", cam.up.to_string().as_str()));
    tag.push_attribute(("fov", cam.fov_deg.to_string().as_str()));
    w.write_event(Event::Empty(tag))?;
    Ok(())
}

fn write_filter_node(w: &mut Writer<Vec<u8>>, tree: &FilterTree, node: NodeId) -> Result<(), StateSaveError> {
    let filter = tree.filter(node).expect("node came from this tree's own traversal");
    let tag = filter.type_string();
    w.write_event(Event::Start(BytesStart::new(tag)))?;

    let mut us = BytesStart::new("userstring");
    us.push_attribute(("value", filter.label()));
    w.write_event(Event::Empty(us))?;

    let mut frag = String::new();
    filter.write_state(&mut frag).map_err(|e| StateSaveError::Encoding(e.to_string()))?;
    if !frag.is_empty() {
        w.get_mut()
            .write_all(frag.as_bytes())
            .map_err(|e| StateSaveError::Io { path: String::new(), reason: e.to_string() })?;
    }

    let children = tree.children_of(node).expect("node came from this tree's own traversal");
    if !children.is_empty() {
        w.write_event(Event::Start(BytesStart::new("children")))?;
        for &child in children {
            write_filter_node(w, tree, child)?;
        }
        w.write_event(Event::End(BytesEnd::new("children")))?;
    }

    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

// ---------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------

fn malformed(e: impl std::fmt::Display) -> StateLoadError {
    StateLoadError::Malformed(e.to_string())
}

fn get_attr(e: &BytesStart, name: &'static str, element: &str) -> Result<String, StateLoadError> {
    for a in e.attributes() {
        let a = a.map_err(malformed)?;
        if a.key.as_ref() == name.as_bytes() {
            let v = a.unescape_value().map_err(malformed)?;
            return Ok(v.into_owned());
        }
    }
    Err(StateLoadError::MissingAttribute { element: element.to_string(), attr: name })
}

fn get_attr_opt(e: &BytesStart, name: &'static str) -> Option<String> {
    e.attributes().flatten().find(|a| a.key.as_ref() == name.as_bytes()).and_then(|a| a.unescape_value().ok()).map(|v| v.into_owned())
}

fn parse_f32_attr(e: &BytesStart, name: &'static str, element: &str) -> Result<f32, StateLoadError> {
    let s = get_attr(e, name, element)?;
    s.trim()
        .parse::<f32>()
        .map_err(|_| StateLoadError::BadAttribute { element: element.to_string(), attr: name, expected: "f32", value: s })
}

fn parse_point3d_attr(e: &BytesStart, name: &'static str, element: &str) -> Result<Point3D, StateLoadError> {
    let s = get_attr(e, name, element)?;
    Point3D::parse(&s).map_err(|_| StateLoadError::BadAttribute { element: element.to_string(), attr: name, expected: "Point3D", value: s })
}

fn check_writer_version(version: &str) {
    if version != WRITER_VERSION {
        tracing::warn!(target: "analysis.load", found = version, supported = WRITER_VERSION, "state file writer version differs; loading leniently");
    }
}

/// Load a state document from a string. `strip_hazardous` should be `true`
/// whenever the XML came from an untrusted path (§7): any filter whose
/// `can_be_hazardous()` is true is dropped, along with its whole subtree,
/// rather than constructed.
pub fn load_state(xml: &str, registry: &dyn FilterRegistry, strip_hazardous: bool) -> Result<AnalysisState, StateLoadError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_tree = false;
    let mut background = (0.0f32, 0.0f32, 0.0f32);
    let mut show_axis = true;
    let mut use_relative_paths = false;
    let mut working_dir = String::new();
    let mut plot_visibility = HashSet::new();
    let mut tree = FilterTree::new();
    let mut stashes = HashMap::new();
    let mut cameras = vec![Camera::default()];
    let mut active_camera = 0usize;
    let mut effects = Vec::new();
    let mut animation = AnimationRecord::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Eof => break,
            Event::Empty(e) => match e.name().as_ref() {
                b"writer" => check_writer_version(&get_attr(&e, "version", "writer")?),
                b"backcolour" => {
                    let r = parse_f32_attr(&e, "r", "backcolour")?;
                    let g = parse_f32_attr(&e, "g", "backcolour")?;
                    let b = parse_f32_attr(&e, "b", "backcolour")?;
                    background = (r, g, b);
                }
                b"showaxis" => show_axis = get_attr(&e, "value", "showaxis")?.trim() == "1",
                b"userelativepaths" => {
                    use_relative_paths = true;
                    working_dir = get_attr_opt(&e, "origworkdir").unwrap_or_default();
                }
                other => {
                    tracing::warn!(target: "analysis.load", element = %String::from_utf8_lossy(other), "ignoring unrecognized element");
                }
            },
            Event::Start(e) => {
                let owned = e.to_owned();
                match owned.name().as_ref() {
                    b"apstate" => {}
                    b"plotstatus" => plot_visibility = parse_plotstatus(&mut reader)?,
                    b"filtertree" => {
                        tree = parse_filtertree(&mut reader, registry, strip_hazardous)?;
                        saw_tree = true;
                    }
                    b"cameras" => {
                        let (c, a) = parse_cameras(&mut reader)?;
                        cameras = c;
                        active_camera = a;
                    }
                    b"stashedfilters" => stashes = parse_stashedfilters(&mut reader, registry, strip_hazardous)?,
                    b"effects" => effects = parse_effects(&mut reader)?,
                    b"animationstate" => animation = parse_animation(&mut reader)?,
                    _ => {
                        tracing::warn!(target: "analysis.load", element = %String::from_utf8_lossy(owned.name().as_ref()), "skipping unrecognized element");
                        reader.read_to_end(owned.name()).map_err(malformed)?;
                    }
                }
            }
            _ => {}
        }
    }

    if !saw_tree {
        return Err(StateLoadError::MissingElement("filtertree"));
    }

    let mut state = AnalysisState::new();
    state.set_tree_raw(TreeState::from_tree(tree));
    state.set_flat_fields_raw(background, show_axis, use_relative_paths, working_dir);
    state.set_plot_visibility_raw(plot_visibility);
    state.set_stashes_raw(stashes);
    state.set_cameras_raw(cameras, active_camera);
    state.set_effects_raw(effects);
    state.set_animation_raw(animation);
    state.reset_modify_level();
    Ok(state)
}

pub fn load_state_from_file(path: impl AsRef<Path>, registry: &dyn FilterRegistry, strip_hazardous: bool) -> Result<AnalysisState, StateLoadError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| StateLoadError::Io { path: path.display().to_string(), reason: e.to_string() })?;
    load_state(&xml, registry, strip_hazardous)
}

fn parse_plotstatus(reader: &mut Reader<&[u8]>) -> Result<HashSet<(String, u32)>, StateLoadError> {
    let mut set = HashSet::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"plotstatus" => break,
            Event::Empty(e) if e.name().as_ref() == b"enableplot" => {
                let filter = get_attr(&e, "filter", "enableplot")?;
                let id_str = get_attr(&e, "id", "enableplot")?;
                let id: u32 = id_str
                    .trim()
                    .parse()
                    .map_err(|_| StateLoadError::BadAttribute { element: "enableplot".into(), attr: "id", expected: "u32", value: id_str })?;
                set.insert((filter, id));
            }
            Event::Eof => return Err(malformed("unexpected eof in <plotstatus>")),
            _ => {}
        }
    }
    Ok(set)
}

fn parse_cameras(reader: &mut Reader<&[u8]>) -> Result<(Vec<Camera>, usize), StateLoadError> {
    let mut cams = Vec::new();
    let mut active = 0usize;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"cameras" => break,
            Event::Empty(e) if e.name().as_ref() == b"active" => {
                let v = get_attr(&e, "value", "active")?;
                active = v.trim().parse().map_err(|_| StateLoadError::BadAttribute { element: "active".into(), attr: "value", expected: "usize", value: v })?;
            }
            Event::Empty(e) if e.name().as_ref() == Camera::TAG.as_bytes() => {
                let eye = parse_point3d_attr(&e, "eye", Camera::TAG)?;
                let target = parse_point3d_attr(&e, "target", Camera::TAG)?;
                let up = parse_point3d_attr(&e, "up", Camera::TAG)?;
                let fov = parse_f32_attr(&e, "fov", Camera::TAG)?;
                cams.push(Camera::new(eye, target, up, fov));
            }
            Event::Eof => return Err(malformed("unexpected eof in <cameras>")),
            _ => {}
        }
    }
    if cams.is_empty() {
        cams.push(Camera::default());
    }
    if active >= cams.len() {
        active = 0;
    }
    Ok((cams, active))
}

fn parse_stashedfilters(reader: &mut Reader<&[u8]>, registry: &dyn FilterRegistry, strip_hazardous: bool) -> Result<HashMap<String, FilterTree>, StateLoadError> {
    let mut out = HashMap::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"stashedfilters" => break,
            Event::Start(e) if e.name().as_ref() == b"stash" => {
                let name = get_attr(&e, "name", "stash")?;
                let tree = loop {
                    match reader.read_event().map_err(malformed)? {
                        Event::Start(fe) if fe.name().as_ref() == b"filtertree" => {
                            break parse_filtertree(reader, registry, strip_hazardous)?;
                        }
                        Event::Eof => return Err(StateLoadError::MissingElement("filtertree")),
                        _ => {}
                    }
                };
                loop {
                    match reader.read_event().map_err(malformed)? {
                        Event::End(se) if se.name().as_ref() == b"stash" => break,
                        Event::Eof => return Err(malformed("unexpected eof in <stash>")),
                        _ => {}
                    }
                }
                if out.contains_key(&name) {
                    return Err(StateLoadError::DuplicateStashName(name));
                }
                out.insert(name, tree);
            }
            Event::Eof => return Err(malformed("unexpected eof in <stashedfilters>")),
            _ => {}
        }
    }
    Ok(out)
}

fn parse_effects(reader: &mut Reader<&[u8]>) -> Result<Vec<Effect>, StateLoadError> {
    let mut out = Vec::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"effects" => break,
            Event::Start(e) if e.name().as_ref() == b"effect" => {
                let kind = get_attr(&e, "kind", "effect")?;
                let mut eff = Effect::new(kind);
                loop {
                    match reader.read_event().map_err(malformed)? {
                        Event::End(ee) if ee.name().as_ref() == b"effect" => break,
                        Event::Empty(pe) if pe.name().as_ref() == b"param" => {
                            let k = get_attr(&pe, "key", "param")?;
                            let v = get_attr(&pe, "value", "param")?;
                            eff.params.push((k, v));
                        }
                        Event::Eof => return Err(malformed("unexpected eof in <effect>")),
                        _ => {}
                    }
                }
                out.push(eff);
            }
            Event::Eof => return Err(malformed("unexpected eof in <effects>")),
            _ => {}
        }
    }
    Ok(out)
}

fn parse_animation(reader: &mut Reader<&[u8]>) -> Result<AnimationRecord, StateLoadError> {
    let mut rec = AnimationRecord::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"animationstate" => break,
            Event::Empty(e) if e.name().as_ref() == b"keyframe" => {
                let time_str = get_attr(&e, "time", "keyframe")?;
                let time: f64 = time_str
                    .trim()
                    .parse()
                    .map_err(|_| StateLoadError::BadAttribute { element: "keyframe".into(), attr: "time", expected: "f64", value: time_str })?;
                let path = get_attr(&e, "path", "keyframe")?;
                let value = get_attr(&e, "value", "keyframe")?;
                rec.insert(AnimationKeyframe::new(time, path, value));
            }
            Event::Eof => return Err(malformed("unexpected eof in <animationstate>")),
            _ => {}
        }
    }
    Ok(rec)
}

fn parse_filtertree(reader: &mut Reader<&[u8]>, registry: &dyn FilterRegistry, strip_hazardous: bool) -> Result<FilterTree, StateLoadError> {
    let mut tree = FilterTree::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::End(e) if e.name().as_ref() == b"filtertree" => break,
            Event::Start(e) => {
                let owned = e.to_owned();
                parse_filter_node(reader, registry, strip_hazardous, &mut tree, None, &owned)?;
            }
            Event::Eof => return Err(malformed("unexpected eof in <filtertree>")),
            _ => {}
        }
    }
    Ok(tree)
}

#[allow(clippy::too_many_arguments)]
fn parse_filter_node(
    reader: &mut Reader<&[u8]>,
    registry: &dyn FilterRegistry,
    strip_hazardous: bool,
    tree: &mut FilterTree,
    parent: Option<NodeId>,
    start: &BytesStart,
) -> Result<Option<NodeId>, StateLoadError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut label = String::new();
    let mut own_writer = Writer::new(Vec::new());
    let mut inserted: Option<NodeId> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Empty(e) if e.name().as_ref() == b"userstring" => {
                label = get_attr(&e, "value", "userstring")?;
            }
            Event::Start(e) if e.name().as_ref() == b"children" => {
                ensure_filter_inserted(&mut inserted, &tag, &label, &mut own_writer, registry, strip_hazardous, tree, parent)?;
                loop {
                    match reader.read_event().map_err(malformed)? {
                        Event::End(ce) if ce.name().as_ref() == b"children" => break,
                        Event::Start(cs) => {
                            let cs_owned = cs.to_owned();
                            parse_filter_node(reader, registry, strip_hazardous, tree, inserted, &cs_owned)?;
                        }
                        Event::Eof => return Err(malformed("unexpected eof in <children>")),
                        _ => {}
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == tag.as_bytes() => {
                ensure_filter_inserted(&mut inserted, &tag, &label, &mut own_writer, registry, strip_hazardous, tree, parent)?;
                break;
            }
            Event::Eof => return Err(malformed(format!("unexpected eof inside <{tag}>"))),
            other => {
                // Part of this filter's own serialized state, written by
                // `Filter::write_state`. Echo it back into a scratch buffer
                // so `Filter::read_state` sees the exact fragment it wrote.
                own_writer.write_event(other).map_err(malformed)?;
            }
        }
    }
    Ok(inserted)
}

#[allow(clippy::too_many_arguments)]
fn ensure_filter_inserted(
    inserted: &mut Option<NodeId>,
    tag: &str,
    label: &str,
    own_writer: &mut Writer<Vec<u8>>,
    registry: &dyn FilterRegistry,
    strip_hazardous: bool,
    tree: &mut FilterTree,
    parent: Option<NodeId>,
) -> Result<(), StateLoadError> {
    if inserted.is_some() {
        return Ok(());
    }
    let mut filter = registry.construct(tag).ok_or_else(|| StateLoadError::UnknownFilterType(tag.to_string()))?;
    if strip_hazardous && filter.can_be_hazardous() {
        tracing::warn!(target: "analysis.load", filter = tag, "stripped hazardous filter loaded from an untrusted state file");
        return Ok(());
    }
    filter.set_label(label.to_string());
    let own_xml = String::from_utf8(std::mem::replace(own_writer, Writer::new(Vec::new())).into_inner()).map_err(malformed)?;
    filter.read_state(&own_xml).map_err(|reason| StateLoadError::FilterRejectedState { path: tag.to_string(), reason })?;
    let node = tree.add_filter(filter, parent).map_err(malformed)?;
    *inserted = Some(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::{AbortFlag, FilterError, FilterKind, FilterPropGroup, ProgressData, PropertySetOutcome};
    use core_stream::{FilterStream, StreamKindMask};

    #[derive(Clone)]
    struct EchoFilter {
        label: String,
        count: u32,
    }

    impl Filter for EchoFilter {
        fn kind(&self) -> FilterKind {
            FilterKind::IonDownsample
        }
        fn type_string(&self) -> &'static str {
            "Echo"
        }
        fn clone_uncached(&self) -> Box<dyn Filter> {
            Box::new(self.clone())
        }
        fn label(&self) -> &str {
            &self.label
        }
        fn set_label(&mut self, label: String) {
            self.label = label;
        }
        fn properties(&self) -> FilterPropGroup {
            FilterPropGroup::new("echo")
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
        fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
            write!(w, "<count value=\"{}\"/>", self.count)
        }
        fn read_state(&mut self, xml: &str) -> Result<(), String> {
            let needle = "value=\"";
            let start = xml.find(needle).ok_or("missing count")? + needle.len();
            let end = xml[start..].find('"').ok_or("unterminated count")? + start;
            self.count = xml[start..end].parse().map_err(|_| "bad count".to_string())?;
            Ok(())
        }
    }

    struct HazardFilter;
    impl Filter for HazardFilter {
        fn kind(&self) -> FilterKind {
            FilterKind::Annotation
        }
        fn type_string(&self) -> &'static str {
            "Hazard"
        }
        fn clone_uncached(&self) -> Box<dyn Filter> {
            Box::new(HazardFilter)
        }
        fn label(&self) -> &str {
            "hazard"
        }
        fn set_label(&mut self, _label: String) {}
        fn properties(&self) -> FilterPropGroup {
            FilterPropGroup::new("hazard")
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
        fn can_be_hazardous(&self) -> bool {
            true
        }
    }

    struct TestRegistry;
    impl FilterRegistry for TestRegistry {
        fn construct(&self, type_string: &str) -> Option<Box<dyn Filter>> {
            match type_string {
                "Echo" => Some(Box::new(EchoFilter { label: String::new(), count: 0 })),
                "Hazard" => Some(Box::new(HazardFilter)),
                _ => None,
            }
        }
    }

    #[test]
    fn save_then_load_round_trips_tree_shape_and_parameters() {
        let mut state = AnalysisState::new();
        let root = state.tree_mut().add_filter(Box::new(EchoFilter { label: "root".into(), count: 7 }), None).unwrap();
        state.tree_mut().add_filter(Box::new(EchoFilter { label: "child".into(), count: 9 }), Some(root)).unwrap();
        state.set_background((0.1, 0.2, 0.3)).unwrap();
        state.set_plot_visible("root", 0, true);

        let xml = save_state(&state).unwrap();
        let loaded = load_state(&xml, &TestRegistry, false).unwrap();

        assert_eq!(loaded.tree().tree().len(), 2);
        assert_eq!(loaded.background(), (0.1, 0.2, 0.3));
        assert!(loaded.is_plot_visible("root", 0));
        let roots = loaded.tree().tree().roots();
        assert_eq!(roots.len(), 1);
        let root_filter = loaded.tree().tree().filter(roots[0]).unwrap();
        assert_eq!(root_filter.label(), "root");
        let children = loaded.tree().tree().children_of(roots[0]).unwrap();
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn round_trip_preserves_filter_specific_parameters() {
        let mut state = AnalysisState::new();
        state.tree_mut().add_filter(Box::new(EchoFilter { label: "r".into(), count: 42 }), None).unwrap();
        let xml = save_state(&state).unwrap();
        let loaded = load_state(&xml, &TestRegistry, false).unwrap();
        let roots = loaded.tree().tree().roots();
        // downcast isn't available; re-serialize and check the fragment survived instead.
        let reserialized = save_state(&loaded).unwrap();
        assert!(reserialized.contains("count value=\"42\""));
        let _ = roots;
    }

    #[test]
    fn stash_round_trips_through_save_and_load() {
        let mut state = AnalysisState::new();
        let root = state.tree_mut().add_filter(Box::new(EchoFilter { label: "r".into(), count: 1 }), None).unwrap();
        state.stash_subtree("s", root).unwrap();
        let xml = save_state(&state).unwrap();
        let loaded = load_state(&xml, &TestRegistry, false).unwrap();
        assert_eq!(loaded.stashes().count(), 1);
        assert!(loaded.stash("s").is_some());
    }

    #[test]
    fn hazardous_filter_is_stripped_on_untrusted_load() {
        let mut state = AnalysisState::new();
        state.tree_mut().add_filter(Box::new(HazardFilter), None).unwrap();
        let xml = save_state(&state).unwrap();

        let loaded_untrusted = load_state(&xml, &TestRegistry, true).unwrap();
        assert_eq!(loaded_untrusted.tree().tree().len(), 0);

        let loaded_trusted = load_state(&xml, &TestRegistry, false).unwrap();
        assert_eq!(loaded_trusted.tree().tree().len(), 1);
    }

    #[test]
    fn missing_filtertree_is_a_structural_error() {
        let xml = format!(r#"<apstate><writer version="{WRITER_VERSION}"/><backcolour r="0" g="0" b="0"/><showaxis value="1"/><plotstatus legend="1"></plotstatus><cameras><active value="0"/></cameras></apstate>"#);
        assert!(matches!(load_state(&xml, &TestRegistry, false), Err(StateLoadError::MissingElement("filtertree"))));
    }

    #[test]
    fn unknown_top_level_element_is_skipped_leniently() {
        let mut state = AnalysisState::new();
        state.tree_mut().add_filter(Box::new(EchoFilter { label: "r".into(), count: 0 }), None).unwrap();
        let xml = save_state(&state).unwrap();
        let xml = xml.replacen("</apstate>", "<futurefeature extra=\"1\"><nested/></futurefeature></apstate>", 1);
        assert!(load_state(&xml, &TestRegistry, false).is_ok());
    }
}
