use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::FilterRng;
use core_stream::{Cached, FilterId, FilterStream, IonsStream, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_FIXED_COUNT: u32 = 0;
const KEY_MAX_COUNT: u32 = 1;
const KEY_FRACTION: u32 = 2;
const KEY_SEED: u32 = 3;

/// Reduces an ion stream's point count, either to an exact target count
/// (reservoir sampling) or by an independent per-ion keep probability.
pub struct IonDownsampleFilter {
    label: String,
    fixed_count: bool,
    max_count: u64,
    fraction: f64,
    seed: u64,
}

impl Default for IonDownsampleFilter {
    fn default() -> Self {
        Self { label: "Downsample".to_string(), fixed_count: true, max_count: 10_000, fraction: 0.1, seed: 0 }
    }
}

impl IonDownsampleFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for IonDownsampleFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::IonDownsample
    }

    fn type_string(&self) -> &'static str {
        "IonDownsample"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self {
            label: self.label.clone(),
            fixed_count: self.fixed_count,
            max_count: self.max_count,
            fraction: self.fraction,
            seed: self.seed,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Ion downsample");
        g.push(FilterProperty::new("Fixed count", PropertyType::Bool, KEY_FIXED_COUNT, if self.fixed_count { "1" } else { "0" }, "select a fixed output count instead of a fraction"));
        g.push(FilterProperty::new("Max count", PropertyType::Integer, KEY_MAX_COUNT, self.max_count.to_string(), "target output ion count in fixed-count mode"));
        g.push(FilterProperty::new("Fraction", PropertyType::Real, KEY_FRACTION, self.fraction.to_string(), "per-ion keep probability in fraction mode"));
        g.push(FilterProperty::new("Seed", PropertyType::Integer, KEY_SEED, self.seed.to_string(), "RNG seed for reproducible sampling"));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_FIXED_COUNT => match FilterProperty::new("", PropertyType::Bool, key, value, "x").parse_bool() {
                Some(v) if v == self.fixed_count => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.fixed_count = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_MAX_COUNT => match value.trim().parse::<u64>() {
                Ok(v) if v == self.max_count => PropertySetOutcome::UNCHANGED,
                Ok(v) => {
                    self.max_count = v;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_FRACTION => match value.trim().parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) && v == self.fraction => PropertySetOutcome::UNCHANGED,
                Ok(v) if (0.0..=1.0).contains(&v) => {
                    self.fraction = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SEED => match value.trim().parse::<u64>() {
                Ok(v) if v == self.seed => PropertySetOutcome::UNCHANGED,
                Ok(v) => {
                    self.seed = v;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
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
        let mut rng = FilterRng::from_seed(self.seed);
        let mut out_streams = Vec::new();
        for stream in inputs {
            let FilterStream::Ions { data, .. } = stream else { continue };
            let kept = if self.fixed_count {
                reservoir_sample(&data.hits, self.max_count as usize, &mut rng, abort)?
            } else {
                bernoulli_sample(&data.hits, self.fraction, &mut rng, abort)?
            };
            let mut out = IonsStream::new(kept);
            out.colour = data.colour;
            out.point_size = data.point_size;
            out.value_type = data.value_type;
            out_streams.push(FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: out });
        }
        Ok(out_streams)
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_FIXED_COUNT, self.fixed_count)?;
        write_param(w, KEY_MAX_COUNT, self.max_count)?;
        write_param(w, KEY_FRACTION, self.fraction)?;
        write_param(w, KEY_SEED, self.seed)
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_FIXED_COUNT) {
            self.fixed_count = v == "true";
        }
        if let Some(v) = params.get(&KEY_MAX_COUNT) {
            self.max_count = v.parse().map_err(|_| "bad max_count".to_string())?;
        }
        if let Some(v) = params.get(&KEY_FRACTION) {
            self.fraction = v.parse().map_err(|_| "bad fraction".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SEED) {
            self.seed = v.parse().map_err(|_| "bad seed".to_string())?;
        }
        Ok(())
    }

    fn is_pure_data_source(&self) -> bool {
        false
    }
}

/// Classic Algorithm R: uniform selection of `k` items from a stream of
/// unknown-in-advance length, one pass, no bias toward early or late items.
fn reservoir_sample(hits: &[core_stream::IonHit], k: usize, rng: &mut FilterRng, abort: &AbortFlag) -> Result<Vec<core_stream::IonHit>, FilterError> {
    if k >= hits.len() {
        return Ok(hits.to_vec());
    }
    let mut reservoir: Vec<core_stream::IonHit> = hits[..k].to_vec();
    for (i, hit) in hits.iter().enumerate().skip(k) {
        if i % 4096 == 0 && abort.is_set() {
            return Err(FilterError::Aborted);
        }
        let j = rng.gen_range_usize(0, i + 1);
        if j < k {
            reservoir[j] = *hit;
        }
    }
    Ok(reservoir)
}

fn bernoulli_sample(hits: &[core_stream::IonHit], fraction: f64, rng: &mut FilterRng, abort: &AbortFlag) -> Result<Vec<core_stream::IonHit>, FilterError> {
    let mut out = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        if i % 4096 == 0 && abort.is_set() {
            return Err(FilterError::Aborted);
        }
        if rng.gen_bool(fraction) {
            out.push(*hit);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geom::Point3D;
    use core_stream::IonHit;

    fn ions(n: usize) -> IonsStream {
        IonsStream::new((0..n).map(|i| IonHit::new(Point3D::new(i as f32, i as f32, i as f32), i as f32)).collect())
    }

    #[test]
    fn fixed_count_emits_exactly_the_target() {
        let mut f = IonDownsampleFilter::new();
        f.set_property(KEY_FIXED_COUNT, "1");
        f.set_property(KEY_MAX_COUNT, "1000");
        let input = vec![FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: ions(10_000) }];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let data = out[0].as_ions().unwrap();
        assert_eq!(data.len(), 1000);
        assert!(data.hits.iter().all(|h| h.pos.x == h.pos.y && h.pos.y == h.pos.z));
    }

    #[test]
    fn fraction_mode_keeps_roughly_the_expected_share() {
        let mut f = IonDownsampleFilter::new();
        f.set_property(KEY_FIXED_COUNT, "0");
        f.set_property(KEY_FRACTION, "0.1");
        let input = vec![FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: ions(10_000) }];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let kept = out[0].as_ions().unwrap().len();
        assert!(kept >= 100 && kept <= 10_000);
    }

    #[test]
    fn fixed_count_above_input_size_returns_everything() {
        let mut f = IonDownsampleFilter::new();
        f.set_property(KEY_MAX_COUNT, "50");
        let input = vec![FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: ions(10) }];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        assert_eq!(out[0].as_ions().unwrap().len(), 10);
    }

    #[test]
    fn state_round_trips() {
        let mut f = IonDownsampleFilter::new();
        f.set_property(KEY_MAX_COUNT, "777");
        f.set_property(KEY_FRACTION, "0.25");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = IonDownsampleFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.max_count, 777);
        assert_eq!(g.fraction, 0.25);
    }
}
