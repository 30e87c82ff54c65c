use std::collections::HashMap;

use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_stream::{Cached, FilterId, FilterStream, Plot1D, StreamKindMask};

use crate::state_io::{parse_params, write_param};

const KEY_LINK_DISTANCE: u32 = 0;
const KEY_MIN_CLUSTER_SIZE: u32 = 1;

/// Single-linkage clustering over ion positions: any two ions within
/// `link_distance` of each other belong to the same cluster. Emits the
/// cluster-size distribution (how many clusters have each size) as a
/// Plot1D; ions themselves pass through untouched.
pub struct ClusterAnalysisFilter {
    label: String,
    link_distance: f64,
    min_cluster_size: u32,
}

impl Default for ClusterAnalysisFilter {
    fn default() -> Self {
        Self { label: "Cluster analysis".to_string(), link_distance: 1.0, min_cluster_size: 2 }
    }
}

impl ClusterAnalysisFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

impl Filter for ClusterAnalysisFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::ClusterAnalysis
    }

    fn type_string(&self) -> &'static str {
        "ClusterAnalysis"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self { label: self.label.clone(), link_distance: self.link_distance, min_cluster_size: self.min_cluster_size })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Cluster analysis");
        g.push(FilterProperty::new("Link distance", PropertyType::Real, KEY_LINK_DISTANCE, self.link_distance.to_string(), "maximum separation between two ions in the same cluster"));
        g.push(FilterProperty::new("Min cluster size", PropertyType::Integer, KEY_MIN_CLUSTER_SIZE, self.min_cluster_size.to_string(), "clusters smaller than this are excluded from the distribution"));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_LINK_DISTANCE => match value.trim().parse::<f64>() {
                Ok(v) if v == self.link_distance => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.link_distance = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_MIN_CLUSTER_SIZE => match value.trim().parse::<u32>() {
                Ok(v) if v == self.min_cluster_size => PropertySetOutcome::UNCHANGED,
                Ok(v) if v >= 1 => {
                    self.min_cluster_size = v;
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
        StreamKindMask::empty()
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::PLOT1D
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let mut positions = Vec::new();
        for stream in inputs {
            let Some(data) = stream.as_ions() else { continue };
            positions.extend(data.hits.iter().map(|h| h.pos));
        }

        let cell_size = self.link_distance.max(1e-6) as f32;
        let cell_of = |p: core_geom::Point3D| -> (i32, i32, i32) {
            ((p.x / cell_size).floor() as i32, (p.y / cell_size).floor() as i32, (p.z / cell_size).floor() as i32)
        };
        let mut grid: HashMap<(i32, i32, i32), Vec<usize>> = HashMap::new();
        for (i, p) in positions.iter().enumerate() {
            grid.entry(cell_of(*p)).or_default().push(i);
        }

        let mut uf = UnionFind::new(positions.len());
        let link_sq = (self.link_distance * self.link_distance) as f32;
        for (i, p) in positions.iter().enumerate() {
            if i % 4096 == 0 && abort.is_set() {
                return Err(FilterError::Aborted);
            }
            let (cx, cy, cz) = cell_of(*p);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(neighbours) = grid.get(&(cx + dx, cy + dy, cz + dz)) else { continue };
                        for &j in neighbours {
                            if j <= i {
                                continue;
                            }
                            if p.sqr_dist(&positions[j]) <= link_sq {
                                uf.union(i, j);
                            }
                        }
                    }
                }
            }
        }

        let mut cluster_sizes: HashMap<usize, u32> = HashMap::new();
        for i in 0..positions.len() {
            let root = uf.find(i);
            *cluster_sizes.entry(root).or_insert(0) += 1;
        }

        let mut size_histogram: HashMap<u32, u64> = HashMap::new();
        for &size in cluster_sizes.values() {
            if size >= self.min_cluster_size {
                *size_histogram.entry(size).or_insert(0) += 1;
            }
        }

        let mut plot = Plot1D::new(self.label.clone());
        plot.x_label = "cluster size".to_string();
        plot.y_label = "cluster count".to_string();
        let mut sizes: Vec<u32> = size_histogram.keys().copied().collect();
        sizes.sort_unstable();
        for size in sizes {
            plot.push(size as f64, size_histogram[&size] as f64);
        }

        Ok(vec![FilterStream::Plot1D { parent: FilterId::fresh(), cached: Cached::Transferred, data: plot }])
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_LINK_DISTANCE, self.link_distance)?;
        write_param(w, KEY_MIN_CLUSTER_SIZE, self.min_cluster_size)
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_LINK_DISTANCE) {
            self.link_distance = v.parse().map_err(|_| "bad link distance".to_string())?;
        }
        if let Some(v) = params.get(&KEY_MIN_CLUSTER_SIZE) {
            self.min_cluster_size = v.parse().map_err(|_| "bad min cluster size".to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geom::Point3D;
    use core_stream::{IonHit, IonsStream};

    fn ions_input(positions: &[Point3D]) -> FilterStream {
        let hits = positions.iter().map(|&p| IonHit::new(p, 1.0)).collect();
        FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
    }

    #[test]
    fn two_close_pairs_form_two_clusters_of_size_two() {
        let mut f = ClusterAnalysisFilter::new();
        f.set_property(KEY_LINK_DISTANCE, "0.5");
        f.set_property(KEY_MIN_CLUSTER_SIZE, "1");
        let positions = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(0.1, 0.0, 0.0),
            Point3D::new(10.0, 0.0, 0.0),
            Point3D::new(10.1, 0.0, 0.0),
        ];
        let input = vec![ions_input(&positions)];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::Plot1D { data, .. } = &out[0] else { panic!("expected Plot1D") };
        assert_eq!(data.x, vec![2.0]);
        assert_eq!(data.y, vec![2.0]);
    }

    #[test]
    fn min_cluster_size_excludes_singletons() {
        let mut f = ClusterAnalysisFilter::new();
        f.set_property(KEY_LINK_DISTANCE, "0.1");
        f.set_property(KEY_MIN_CLUSTER_SIZE, "2");
        let positions = vec![Point3D::new(0.0, 0.0, 0.0), Point3D::new(100.0, 0.0, 0.0)];
        let input = vec![ions_input(&positions)];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::Plot1D { data, .. } = &out[0] else { panic!("expected Plot1D") };
        assert!(data.is_empty());
    }

    #[test]
    fn state_round_trips() {
        let mut f = ClusterAnalysisFilter::new();
        f.set_property(KEY_LINK_DISTANCE, "2.5");
        f.set_property(KEY_MIN_CLUSTER_SIZE, "3");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = ClusterAnalysisFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.link_distance, 2.5);
        assert_eq!(g.min_cluster_size, 3);
    }
}
