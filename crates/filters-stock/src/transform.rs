use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::Point3D;
use core_stream::{Cached, FilterId, FilterStream, IonsStream, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_TRANSLATE: u32 = 0;
const KEY_ROTATE_AXIS: u32 = 1;
const KEY_ROTATE_ANGLE: u32 = 2;
const KEY_SCALE: u32 = 3;

/// Applies a rigid/affine transform to ion positions: scale about the
/// origin, then rotate about `rotate_axis` by `rotate_angle_rad`, then
/// translate. Order is fixed so repeated property edits stay predictable.
pub struct TransformFilter {
    label: String,
    translate: Point3D,
    rotate_axis: Point3D,
    rotate_angle_rad: f32,
    scale: f32,
}

impl Default for TransformFilter {
    fn default() -> Self {
        Self {
            label: "Transform".to_string(),
            translate: Point3D::ZERO,
            rotate_axis: Point3D::new(0.0, 0.0, 1.0),
            rotate_angle_rad: 0.0,
            scale: 1.0,
        }
    }
}

impl TransformFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, p: Point3D) -> Point3D {
        let scaled = p * self.scale;
        let rotated = if self.rotate_angle_rad != 0.0 { scaled.rotate(self.rotate_axis, self.rotate_angle_rad) } else { scaled };
        rotated + self.translate
    }
}

impl Filter for TransformFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Transform
    }

    fn type_string(&self) -> &'static str {
        "Transform"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self {
            label: self.label.clone(),
            translate: self.translate,
            rotate_axis: self.rotate_axis,
            rotate_angle_rad: self.rotate_angle_rad,
            scale: self.scale,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Transform");
        g.push(FilterProperty::new("Translate", PropertyType::Point3D, KEY_TRANSLATE, self.translate.to_string(), "offset added after scale and rotation"));
        g.push(FilterProperty::new("Rotation axis", PropertyType::Point3D, KEY_ROTATE_AXIS, self.rotate_axis.to_string(), "axis the rotation turns about"));
        g.push(FilterProperty::new("Rotation angle (rad)", PropertyType::Real, KEY_ROTATE_ANGLE, self.rotate_angle_rad.to_string(), "rotation angle in radians"));
        g.push(FilterProperty::new("Scale", PropertyType::Real, KEY_SCALE, self.scale.to_string(), "uniform scale factor applied about the origin first"));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_TRANSLATE => match Point3D::parse(value) {
                Ok(p) if p == self.translate => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.translate = p;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_ROTATE_AXIS => match Point3D::parse(value) {
                Ok(p) if p == self.rotate_axis => PropertySetOutcome::UNCHANGED,
                Ok(p) => {
                    self.rotate_axis = p;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_ROTATE_ANGLE => match value.trim().parse::<f32>() {
                Ok(v) if v == self.rotate_angle_rad => PropertySetOutcome::UNCHANGED,
                Ok(v) => {
                    self.rotate_angle_rad = v;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_SCALE => match value.trim().parse::<f32>() {
                Ok(v) if v == self.scale => PropertySetOutcome::UNCHANGED,
                Ok(v) if v != 0.0 => {
                    self.scale = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
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
            let FilterStream::Ions { data, .. } = stream else { continue };
            let mut hits = data.hits.clone();
            for (i, hit) in hits.iter_mut().enumerate() {
                if i % 4096 == 0 && abort.is_set() {
                    return Err(FilterError::Aborted);
                }
                hit.pos = self.apply(hit.pos);
            }
            let mut out = IonsStream::new(hits);
            out.colour = data.colour;
            out.point_size = data.point_size;
            out.value_type = data.value_type;
            out_streams.push(FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: out });
        }
        Ok(out_streams)
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_TRANSLATE, self.translate)?;
        write_param(w, KEY_ROTATE_AXIS, self.rotate_axis)?;
        write_param(w, KEY_ROTATE_ANGLE, self.rotate_angle_rad)?;
        write_param(w, KEY_SCALE, self.scale)
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_TRANSLATE) {
            self.translate = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = params.get(&KEY_ROTATE_AXIS) {
            self.rotate_axis = Point3D::parse(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = params.get(&KEY_ROTATE_ANGLE) {
            self.rotate_angle_rad = v.parse().map_err(|_| "bad rotate angle".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SCALE) {
            self.scale = v.parse().map_err(|_| "bad scale".to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_stream::IonHit;

    fn ions_input(hits: Vec<IonHit>) -> FilterStream {
        FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
    }

    #[test]
    fn translate_shifts_every_point() {
        let mut f = TransformFilter::new();
        f.set_property(KEY_TRANSLATE, "1,2,3");
        let input = vec![ions_input(vec![IonHit::new(Point3D::ZERO, 1.0)])];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        assert_eq!(out[0].as_ions().unwrap().hits[0].pos, Point3D::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn scale_then_rotate_then_translate_order() {
        let mut f = TransformFilter::new();
        f.set_property(KEY_SCALE, "2.0");
        f.set_property(KEY_ROTATE_AXIS, "0,0,1");
        f.set_property(KEY_ROTATE_ANGLE, &std::f32::consts::FRAC_PI_2.to_string());
        f.set_property(KEY_TRANSLATE, "0,0,5");
        let input = vec![ions_input(vec![IonHit::new(Point3D::new(1.0, 0.0, 0.0), 1.0)])];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let p = out[0].as_ions().unwrap().hits[0].pos;
        assert!((p.x).abs() < 1e-4);
        assert!((p.y - 2.0).abs() < 1e-4);
        assert!((p.z - 5.0).abs() < 1e-4);
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut f = TransformFilter::new();
        assert!(!f.set_property(KEY_SCALE, "0").ok);
    }

    #[test]
    fn state_round_trips() {
        let mut f = TransformFilter::new();
        f.set_property(KEY_TRANSLATE, "1,1,1");
        f.set_property(KEY_SCALE, "3.0");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = TransformFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.translate, Point3D::new(1.0, 1.0, 1.0));
        assert_eq!(g.scale, 3.0);
    }
}
