use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_stream::{Cached, FilterId, FilterStream, Plot1D, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_BIN_COUNT: u32 = 0;
const KEY_LOG_Y: u32 = 1;

/// Bins an ion stream's mass-to-charge values into a fixed-width histogram,
/// emitted as a Plot1D.
pub struct SpectrumFilter {
    label: String,
    bin_count: u32,
    log_y: bool,
}

impl Default for SpectrumFilter {
    fn default() -> Self {
        Self { label: "Spectrum".to_string(), bin_count: 200, log_y: false }
    }
}

impl SpectrumFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for SpectrumFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Spectrum
    }

    fn type_string(&self) -> &'static str {
        "Spectrum"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self { label: self.label.clone(), bin_count: self.bin_count, log_y: self.log_y })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Spectrum");
        g.push(FilterProperty::new("Bin count", PropertyType::Integer, KEY_BIN_COUNT, self.bin_count.to_string(), "number of equal-width histogram bins"));
        g.push(FilterProperty::new("Log Y", PropertyType::Bool, KEY_LOG_Y, if self.log_y { "1" } else { "0" }, "display the count axis on a log scale").cosmetic());
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_BIN_COUNT => match value.trim().parse::<u32>() {
                Ok(v) if v == self.bin_count => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0 => {
                    self.bin_count = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_LOG_Y => match FilterProperty::new("", PropertyType::Bool, key, value, "x").parse_bool() {
                Some(v) if v == self.log_y => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.log_y = v;
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
        StreamKindMask::empty()
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::PLOT1D
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for stream in inputs {
            let Some(data) = stream.as_ions() else { continue };
            for hit in &data.hits {
                lo = lo.min(hit.value);
                hi = hi.max(hit.value);
            }
        }
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            let mut plot = Plot1D::new(self.label.clone());
            plot.x_label = "mass-to-charge".to_string();
            plot.y_label = "count".to_string();
            plot.log_y = self.log_y;
            return Ok(vec![FilterStream::Plot1D { parent: FilterId::fresh(), cached: Cached::Transferred, data: plot }]);
        }

        let bin_count = self.bin_count.max(1) as usize;
        let width = (hi - lo) / bin_count as f32;
        let mut counts = vec![0f64; bin_count];
        for stream in inputs {
            let Some(data) = stream.as_ions() else { continue };
            for (i, hit) in data.hits.iter().enumerate() {
                if i % 4096 == 0 && abort.is_set() {
                    return Err(FilterError::Aborted);
                }
                let bin = (((hit.value - lo) / width) as usize).min(bin_count - 1);
                counts[bin] += 1.0;
            }
        }

        let mut plot = Plot1D::new(self.label.clone());
        plot.x_label = "mass-to-charge".to_string();
        plot.y_label = "count".to_string();
        plot.log_y = self.log_y;
        for (i, count) in counts.into_iter().enumerate() {
            let x = lo as f64 + (i as f64 + 0.5) * width as f64;
            plot.push(x, count);
        }
        Ok(vec![FilterStream::Plot1D { parent: FilterId::fresh(), cached: Cached::Transferred, data: plot }])
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_BIN_COUNT, self.bin_count)?;
        write_param(w, KEY_LOG_Y, self.log_y)
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_BIN_COUNT) {
            self.bin_count = v.parse().map_err(|_| "bad bin count".to_string())?;
        }
        if let Some(v) = params.get(&KEY_LOG_Y) {
            self.log_y = v == "true";
        }
        Ok(())
    }
}
