use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_ranges::UNRANGED;
use core_stream::{Cached, FilterId, FilterStream, IonsStream, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_ENABLED_IONS: u32 = 0;

/// Keeps only ions whose mass-to-charge value falls in one of the named
/// species kept enabled, per the attached range file. An empty enabled list
/// keeps every ranged ion and drops unranged ones.
pub struct RangeFilter {
    label: String,
    enabled_ions: Vec<String>,
}

impl Default for RangeFilter {
    fn default() -> Self {
        Self { label: "Range".to_string(), enabled_ions: Vec::new() }
    }
}

impl RangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode_enabled(&self) -> String {
        self.enabled_ions.join(",")
    }

    fn decode_enabled(value: &str) -> Vec<String> {
        value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }
}

impl Filter for RangeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Range
    }

    fn type_string(&self) -> &'static str {
        "Range"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self { label: self.label.clone(), enabled_ions: self.enabled_ions.clone() })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Range");
        g.push(FilterProperty::new(
            "Enabled ions",
            PropertyType::String,
            KEY_ENABLED_IONS,
            self.encode_enabled(),
            "comma-separated ion species names to keep; empty keeps every ranged ion",
        ));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_ENABLED_IONS => {
                let parsed = Self::decode_enabled(value);
                if parsed == self.enabled_ions {
                    PropertySetOutcome::UNCHANGED
                } else {
                    self.enabled_ions = parsed;
                    PropertySetOutcome::ACCEPTED
                }
            }
            _ => PropertySetOutcome::REJECTED,
        }
    }

    fn use_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS | StreamKindMask::RANGE
    }

    fn block_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let range = inputs.iter().find_map(FilterStream::as_range);

        let keep_ion = |ion_idx: usize| -> bool {
            let Some(range) = range else { return true };
            if ion_idx == UNRANGED {
                return false;
            }
            if self.enabled_ions.is_empty() {
                return true;
            }
            range
                .file
                .ions()
                .get(ion_idx)
                .map(|ion| self.enabled_ions.iter().any(|name| name == &ion.name))
                .unwrap_or(false)
        };

        let mut out_streams = Vec::new();
        for stream in inputs {
            let FilterStream::Ions { data, .. } = stream else { continue };
            let mut kept = Vec::with_capacity(data.hits.len());
            for (i, hit) in data.hits.iter().enumerate() {
                if i % 4096 == 0 && abort.is_set() {
                    return Err(FilterError::Aborted);
                }
                let ion_idx = range.map(|r| r.file.ion_id_for_value(hit.value)).unwrap_or(UNRANGED);
                if keep_ion(ion_idx) {
                    kept.push(*hit);
                }
            }
            let mut out = IonsStream::new(kept);
            out.colour = data.colour;
            out.point_size = data.point_size;
            out.value_type = data.value_type;
            out_streams.push(FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: out });
        }
        Ok(out_streams)
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_ENABLED_IONS, self.encode_enabled())
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_ENABLED_IONS) {
            self.enabled_ions = Self::decode_enabled(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geom::Point3D;
    use core_ranges::{Colour, Ion, Range, RangeFile};
    use core_stream::{IonHit, RangeStream};
    use std::sync::Arc;

    fn range_input() -> FilterStream {
        let mut rf = RangeFile::new();
        let h = rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap();
        let o = rf.add_ion(Ion { name: "O".into(), colour: Colour::default() }).unwrap();
        rf.add_range(Range { lo: 0.9, hi: 1.1, ion: h }).unwrap();
        rf.add_range(Range { lo: 15.5, hi: 16.5, ion: o }).unwrap();
        let rs = RangeStream::new(Arc::new(rf));
        FilterStream::Range { parent: FilterId::fresh(), cached: Cached::Owned, data: rs }
    }

    fn ions_input() -> FilterStream {
        let hits = vec![
            IonHit::new(Point3D::ZERO, 1.0),
            IonHit::new(Point3D::ZERO, 16.0),
            IonHit::new(Point3D::ZERO, 5.0),
        ];
        FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
    }

    #[test]
    fn drops_unranged_ions_by_default() {
        let mut f = RangeFilter::new();
        let input = vec![ions_input(), range_input()];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        assert_eq!(out[0].as_ions().unwrap().len(), 2);
    }

    #[test]
    fn enabled_list_restricts_to_named_species() {
        let mut f = RangeFilter::new();
        f.set_property(KEY_ENABLED_IONS, "O");
        let input = vec![ions_input(), range_input()];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let kept = out[0].as_ions().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.hits[0].value, 16.0);
    }

    #[test]
    fn state_round_trips() {
        let mut f = RangeFilter::new();
        f.set_property(KEY_ENABLED_IONS, "H, O");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = RangeFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.enabled_ions, vec!["H".to_string(), "O".to_string()]);
    }
}
