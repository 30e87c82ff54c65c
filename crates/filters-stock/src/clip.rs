use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::{BoundCube, Point3D};
use core_stream::{FilterStream, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_LO: u32 = 0;
const KEY_HI: u32 = 1;
const KEY_INVERT: u32 = 2;

/// Keeps only the ions falling inside (or, inverted, outside) an
/// axis-aligned box.
pub struct ClipFilter {
    label: String,
    bounds: BoundCube,
    invert: bool,
}

impl Default for ClipFilter {
    fn default() -> Self {
        Self { label: "Clip".to_string(), bounds: BoundCube::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0)), invert: false }
    }
}

impl ClipFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lo(&self) -> Point3D {
        self.bounds.min().unwrap_or(Point3D::ZERO)
    }

    fn hi(&self) -> Point3D {
        self.bounds.max().unwrap_or(Point3D::ZERO)
    }
}

impl Filter for ClipFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Clip
    }

    fn type_string(&self) -> &'static str {
        "Clip"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self { label: self.label.clone(), bounds: self.bounds, invert: self.invert })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Clip");
        g.push(FilterProperty::new("Lower corner", PropertyType::Point3D, KEY_LO, self.lo().to_string(), "lower corner of the clip box"));
        g.push(FilterProperty::new("Upper corner", PropertyType::Point3D, KEY_HI, self.hi().to_string(), "upper corner of the clip box"));
        g.push(FilterProperty::new("Invert", PropertyType::Bool, KEY_INVERT, if self.invert { "1" } else { "0" }, "keep ions outside the box instead of inside"));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_LO => match Point3D::parse(value) {
                Ok(p) if p == self.lo() => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.bounds = BoundCube::new(p, self.hi());
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_HI => match Point3D::parse(value) {
                Ok(p) if p == self.hi() => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.bounds = BoundCube::new(self.lo(), p);
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_INVERT => match FilterProperty::new("", PropertyType::Bool, key, value, "x").parse_bool() {
                Some(v) if v == self.invert => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.invert = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            _ => PropertySetOutcome::REJECTED,
        }
    }

    fn use_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS
    }

    fn block_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let mut out_streams = Vec::new();
        for stream in inputs {
            let FilterStream::Ions { parent: _, data, .. } = stream else { continue };
            let mut kept = Vec::with_capacity(data.hits.len());
            for (i, hit) in data.hits.iter().enumerate() {
                if i % 4096 == 0 && abort.is_set() {
                    return Err(FilterError::Aborted);
                }
                let inside = self.bounds.contains_pt(&hit.pos);
                if inside != self.invert {
                    kept.push(*hit);
                }
            }
            let mut out = core_stream::IonsStream::new(kept);
            out.colour = data.colour;
            out.point_size = data.point_size;
            out.value_type = data.value_type;
            out_streams.push(FilterStream::Ions {
                parent: core_stream::FilterId::fresh(),
                cached: core_stream::Cached::Transferred,
                data: out,
            });
        }
        Ok(out_streams)
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_LO, self.lo())?;
        write_param(w, KEY_HI, self.hi())?;
        write_param(w, KEY_INVERT, self.invert)
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        let mut lo = self.lo();
        let mut hi = self.hi();
        if let Some(v) = params.get(&KEY_LO) {
            lo = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = params.get(&KEY_HI) {
            hi = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        self.bounds = BoundCube::new(lo, hi);
        if let Some(v) = params.get(&KEY_INVERT) {
            self.invert = v == "true";
        }
        Ok(())
    }
}
