mod annotation;
mod clip;
mod cluster;
mod contribution;
mod downsample;
mod proxigram;
mod range;
mod spectrum;
mod state_io;
mod transform;
mod voxelise;

pub use annotation::AnnotationFilter;
pub use clip::ClipFilter;
pub use cluster::ClusterAnalysisFilter;
pub use downsample::IonDownsampleFilter;
pub use proxigram::ProxigramFilter;
pub use range::RangeFilter;
pub use spectrum::SpectrumFilter;
pub use transform::TransformFilter;
pub use voxelise::VoxeliseFilter;

use core_analysis::FilterRegistry;
use core_filter::Filter;

/// Constructs a freshly defaulted instance of one of this crate's filters
/// by its `type_string`, for use by `core_analysis::load_state` and by
/// anything building a filter tree from a declarative script.
pub fn construct_stock_filter(type_string: &str) -> Option<Box<dyn Filter>> {
    match type_string {
        "IonDownsample" => Some(Box::new(IonDownsampleFilter::new())),
        "Clip" => Some(Box::new(ClipFilter::new())),
        "Range" => Some(Box::new(RangeFilter::new())),
        "Transform" => Some(Box::new(TransformFilter::new())),
        "Spectrum" => Some(Box::new(SpectrumFilter::new())),
        "ClusterAnalysis" => Some(Box::new(ClusterAnalysisFilter::new())),
        "Annotation" => Some(Box::new(AnnotationFilter::new())),
        "Voxelise" => Some(Box::new(VoxeliseFilter::new())),
        "Proxigram" => Some(Box::new(ProxigramFilter::new())),
        _ => None,
    }
}

/// The `FilterRegistry` that wires this crate's filters into
/// `core_analysis`'s state save/load path.
#[derive(Debug, Default, Clone, Copy)]
pub struct StockFilterRegistry;

impl FilterRegistry for StockFilterRegistry {
    fn construct(&self, type_string: &str) -> Option<Box<dyn Filter>> {
        construct_stock_filter(type_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_every_known_filter_type() {
        for ty in [
            "IonDownsample",
            "Clip",
            "Range",
            "Transform",
            "Spectrum",
            "ClusterAnalysis",
            "Annotation",
            "Voxelise",
            "Proxigram",
        ] {
            let filter = construct_stock_filter(ty).unwrap_or_else(|| panic!("{ty} should construct"));
            assert_eq!(filter.type_string(), ty);
        }
    }

    #[test]
    fn unknown_type_string_returns_none() {
        assert!(construct_stock_filter("NotAFilter").is_none());
    }

    #[test]
    fn registry_delegates_to_construct_stock_filter() {
        let registry = StockFilterRegistry;
        assert!(registry.construct("Range").is_some());
        assert!(registry.construct("Bogus").is_none());
    }
}
