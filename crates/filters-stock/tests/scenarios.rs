use std::sync::Arc;

use core_analysis::{load_state, save_state, AnalysisState};
use core_filter::{AbortFlag, Filter, ProgressData};
use core_geom::Point3D;
use core_ranges::{Colour, Ion, Range, RangeFile};
use core_stream::{Cached, FilterId, FilterStream, IonHit, IonsStream, RangeStream};
use core_voxel::SparseVoxel;
use filters_stock::{IonDownsampleFilter, ProxigramFilter, StockFilterRegistry};

fn ions(n: usize) -> FilterStream {
    let hits: Vec<IonHit> = (0..n).map(|i| IonHit::new(Point3D::new(i as f32, 0.0, 0.0), i as f32)).collect();
    FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
}

/// Scenario 1: downsampling 10,000 ions by fixed count to exactly 1,000.
#[test]
fn downsample_by_fixed_count_yields_exactly_the_target() {
    let mut f = IonDownsampleFilter::new();
    f.set_property(0, "1");
    f.set_property(1, "1000");
    let mut progress = ProgressData::new(1);
    let out = f.refresh(&[ions(10_000)], &mut progress, &AbortFlag::new()).unwrap();
    assert_eq!(out[0].as_ions().unwrap().len(), 1000);
}

/// Scenario 2: downsampling by fraction, with the kept count checked against
/// a Hoeffding bound rather than an exact value (independent Bernoulli
/// trials, so the count is a random variable, not a fixed one).
#[test]
fn downsample_by_fraction_stays_within_a_hoeffding_bound() {
    let n = 10_000usize;
    let p = 0.2f64;
    let mut f = IonDownsampleFilter::new();
    f.set_property(0, "0");
    f.set_property(2, &p.to_string());
    f.set_property(3, "7");
    let mut progress = ProgressData::new(1);
    let out = f.refresh(&[ions(n)], &mut progress, &AbortFlag::new()).unwrap();
    let kept = out[0].as_ions().unwrap().len() as f64;

    // P(|X/n - p| > eps) <= 2*exp(-2*n*eps^2); eps chosen so the one-sided
    // failure probability is below 1e-6, generous enough to never flake.
    let eps = ((-(1e-6f64).ln() / (2.0 * n as f64)).sqrt()) * 1.5;
    let expected = p * n as f64;
    assert!((kept - expected).abs() <= eps * n as f64, "kept={kept} expected={expected} eps*n={}", eps * n as f64);
}

/// Scenario 5: shell binning with a 0.3nm shell width out to a 1.5nm max
/// distance must produce 11 shells (-1.5..=1.5 in 0.3 steps).
#[test]
fn proxigram_shell_count_matches_the_configured_geometry() {
    let mut f = ProxigramFilter::new();
    f.set_property(1, "0.3");
    f.set_property(2, "1.5");

    let mut field = SparseVoxel::<f32>::new(Point3D::ZERO, Point3D::new(0.2, 0.2, 0.2));
    for x in -8..=8 {
        for y in -8..=8 {
            for z in -8..=8 {
                let centre = field.cell_centre((x, y, z));
                let value = if centre.magnitude() <= 1.0 { 1.0 } else { 0.0 };
                field.set((x, y, z), value);
            }
        }
    }
    let mut sparse_data = core_stream::VoxelSparseStream::new(field);
    sparse_data.iso_level = 0.5;
    let sparse = FilterStream::VoxelSparse { parent: FilterId::fresh(), cached: Cached::Owned, data: sparse_data };
    let hits: Vec<IonHit> = (0..40).map(|i| {
        let t = i as f32 * 0.15;
        IonHit::new(Point3D::new(t.cos(), t.sin(), 0.0), 1.0)
    }).collect();
    let ions_stream = FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) };

    let mut progress = ProgressData::new(1);
    let out = f.refresh(&[sparse, ions_stream], &mut progress, &AbortFlag::new()).unwrap();
    assert_eq!(out.len(), 2);
    for stream in &out {
        let FilterStream::Plot1D { data, .. } = stream else { panic!("expected Plot1D") };
        assert_eq!(data.len(), 11);
    }
}

/// Scenario 6: state round-trip through one stashed tree named "s"
/// containing a single downsample filter.
#[test]
fn state_round_trip_preserves_a_stashed_downsample_tree() {
    let mut state = AnalysisState::new();
    let handle = state.tree_mut().add_filter(Box::new(IonDownsampleFilter::new()), None).unwrap();
    state.stash_subtree("s", handle).unwrap();
    assert_eq!(state.tree().tree().len(), 0);
    assert_eq!(state.stashes().count(), 1);

    let xml = save_state(&state).unwrap();
    let registry = StockFilterRegistry;
    let loaded = load_state(&xml, &registry, false).unwrap();

    assert_eq!(loaded.stashes().count(), 1);
    let stashed = loaded.stash("s").expect("stash \"s\" should round-trip");
    assert_eq!(stashed.len(), 1);
    let root = stashed.roots()[0];
    assert_eq!(stashed.filter(root).unwrap().type_string(), "IonDownsample");
}

/// A range stream should pass unranged ions through the downsample-then-range
/// pipeline untouched when no enabled-ion restriction is set but fail to
/// match anything that was never loaded.
#[test]
fn range_stream_survives_ion_downsampling_upstream() {
    let mut rf = RangeFile::new();
    let h = rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap();
    rf.add_range(Range { lo: 0.5, hi: 1.5, ion: h }).unwrap();
    let range = FilterStream::Range {
        parent: FilterId::fresh(),
        cached: Cached::Owned,
        data: RangeStream::new(Arc::new(rf)),
    };

    let mut downsample = IonDownsampleFilter::new();
    downsample.set_property(1, "50");
    let mut progress = ProgressData::new(1);
    let mut downsampled = downsample.refresh(&[ions(500)], &mut progress, &AbortFlag::new()).unwrap();
    downsampled.push(range);

    assert_eq!(downsampled.len(), 2);
    assert!(downsampled.iter().any(|s| s.as_range().is_some()));
    assert_eq!(downsampled.iter().find_map(FilterStream::as_ions).unwrap().len(), 50);
}
