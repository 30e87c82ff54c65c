use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::Point3D;
use core_stream::{Cached, DrawList, DrawPrimitive, FilterId, FilterStream, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_KIND: u32 = 0;
const KEY_TEXT: u32 = 1;
const KEY_ORIGIN: u32 = 2;
const KEY_TARGET: u32 = 3;
const KEY_COLOUR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnnotationKind {
    Text,
    Arrow,
}

impl AnnotationKind {
    fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Text => "text",
            AnnotationKind::Arrow => "arrow",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(AnnotationKind::Text),
            "arrow" => Some(AnnotationKind::Arrow),
            _ => None,
        }
    }
}

/// Draws a fixed text caption or arrow in the scene; it is a pure data
/// source (no ion input) whose every property is cosmetic, since redrawing
/// the annotation never requires re-running any upstream filter.
pub struct AnnotationFilter {
    label: String,
    kind: AnnotationKind,
    text: String,
    origin: Point3D,
    target: Point3D,
    colour: (f32, f32, f32, f32),
}

impl Default for AnnotationFilter {
    fn default() -> Self {
        Self {
            label: "Annotation".to_string(),
            kind: AnnotationKind::Text,
            text: "annotation".to_string(),
            origin: Point3D::ZERO,
            target: Point3D::new(1.0, 0.0, 0.0),
            colour: (1.0, 1.0, 1.0, 1.0),
        }
    }
}

impl AnnotationFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for AnnotationFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Annotation
    }

    fn type_string(&self) -> &'static str {
        "Annotation"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self { label: self.label.clone(), kind: self.kind, text: self.text.clone(), origin: self.origin, target: self.target, colour: self.colour })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Annotation");
        g.push(FilterProperty::new("Kind", PropertyType::Choice, KEY_KIND, self.kind.as_str(), "text caption or arrow").with_choices(&["text", "arrow"]).cosmetic());
        g.push(FilterProperty::new("Text", PropertyType::String, KEY_TEXT, self.text.clone(), "caption text, used when kind is text").cosmetic());
        g.push(FilterProperty::new("Origin", PropertyType::Point3D, KEY_ORIGIN, self.origin.to_string(), "caption anchor, or arrow start").cosmetic());
        g.push(FilterProperty::new("Target", PropertyType::Point3D, KEY_TARGET, self.target.to_string(), "arrow end point, unused for text").cosmetic());
        g.push(FilterProperty::new("Colour", PropertyType::Colour, KEY_COLOUR, colour_to_string(self.colour), "RGBA draw colour").cosmetic());
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_KIND => match AnnotationKind::parse(value) {
                Some(k) if k == self.kind => PropertySetOutcome::UNCHANGED,
                Some(k) => {
                    self.kind = k;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_TEXT => {
                if value == self.text {
                    PropertySetOutcome::UNCHANGED
                } else {
                    self.text = value.to_string();
                    PropertySetOutcome::ACCEPTED
                }
            }
            KEY_ORIGIN => match Point3D::parse(value) {
                Ok(p) if p == self.origin => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.origin = p;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_TARGET => match Point3D::parse(value) {
                Ok(p) if p == self.target => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.target = p;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_COLOUR => match core_filter::parse_colour(value) {
                Some(c) if c == self.colour => PropertySetOutcome::UNCHANGED,
                Some(c) => {
                    self.colour = c;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            _ => PropertySetOutcome::REJECTED,
        }
    }

    fn use_mask(&self) -> StreamKindMask {
        StreamKindMask::empty()
    }

    fn block_mask(&self) -> StreamKindMask {
        StreamKindMask::empty()
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::DRAW
    }

    fn refresh(&mut self, _inputs: &[FilterStream], _progress: &mut ProgressData, _abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let mut list = DrawList::new();
        list.items.push(match self.kind {
            AnnotationKind::Text => DrawPrimitive::Text { origin: self.origin, text: self.text.clone(), colour: self.colour },
            AnnotationKind::Arrow => DrawPrimitive::Arrow { start: self.origin, end: self.target, colour: self.colour, width: 1.0 },
        });
        Ok(vec![FilterStream::Draw { parent: FilterId::fresh(), cached: Cached::Transferred, data: list }])
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_KIND, self.kind.as_str())?;
        write_param(w, KEY_TEXT, &self.text)?;
        write_param(w, KEY_ORIGIN, self.origin)?;
        write_param(w, KEY_TARGET, self.target)?;
        write_param(w, KEY_COLOUR, colour_to_string(self.colour))
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_KIND) {
            self.kind = AnnotationKind::parse(v).ok_or_else(|| format!("bad annotation kind {v:?}"))?;
        }
        if let Some(v) = params.get(&KEY_TEXT) {
            self.text = v.clone();
        }
        if let Some(v) = params.get(&KEY_ORIGIN) {
            self.origin = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = params.get(&KEY_TARGET) {
            self.target = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = params.get(&KEY_COLOUR) {
            self.colour = core_filter::parse_colour(v).ok_or_else(|| format!("bad colour {v:?}"))?;
        }
        Ok(())
    }

    fn is_pure_data_source(&self) -> bool {
        true
    }
}

fn colour_to_string(c: (f32, f32, f32, f32)) -> String {
    format!("{},{},{},{}", c.0, c.1, c.2, c.3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_a_text_primitive_by_default() {
        let mut f = AnnotationFilter::new();
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&[], &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::Draw { data, .. } = &out[0] else { panic!("expected Draw") };
        assert!(matches!(data.items[0], DrawPrimitive::Text { .. }));
    }

    #[test]
    fn arrow_kind_emits_an_arrow_primitive() {
        let mut f = AnnotationFilter::new();
        f.set_property(KEY_KIND, "arrow");
        f.set_property(KEY_ORIGIN, "0,0,0");
        f.set_property(KEY_TARGET, "1,1,1");
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&[], &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::Draw { data, .. } = &out[0] else { panic!("expected Draw") };
        assert!(matches!(data.items[0], DrawPrimitive::Arrow { .. }));
    }

    #[test]
    fn is_pure_data_source() {
        assert!(AnnotationFilter::new().is_pure_data_source());
    }

    #[test]
    fn state_round_trips() {
        let mut f = AnnotationFilter::new();
        f.set_property(KEY_KIND, "arrow");
        f.set_property(KEY_TEXT, "hello");
        f.set_property(KEY_ORIGIN, "1,2,3");
        f.set_property(KEY_TARGET, "4,5,6");
        f.set_property(KEY_COLOUR, "1,0,0,1");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = AnnotationFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.kind, AnnotationKind::Arrow);
        assert_eq!(g.text, "hello");
        assert_eq!(g.origin, Point3D::new(1.0, 2.0, 3.0));
        assert_eq!(g.target, Point3D::new(4.0, 5.0, 6.0));
        assert_eq!(g.colour, (1.0, 0.0, 0.0, 1.0));
    }
}
