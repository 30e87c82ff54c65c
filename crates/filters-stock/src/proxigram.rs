use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::Point3D;
use core_ranges::UNRANGED;
use core_stream::{Cached, FilterId, FilterStream, Plot1D, StreamKindMask};
use core_voxel::SparseVoxel;

use crate::contribution::trilinear_deposit;
use crate::state_io::{parse_params, write_param};

const KEY_LEVEL_SET_VOXEL_SIZE: u32 = 0;
const KEY_SHELL_WIDTH: u32 = 1;
const KEY_MAX_DISTANCE: u32 = 2;
const KEY_DISTANCE_WEIGHTING: u32 = 3;
const KEY_NUMERATOR_IONS: u32 = 4;
const KEY_DENOMINATOR_IONS: u32 = 5;

/// A point cloud standing in for the triangle mesh `volume_to_mesh` would
/// extract: only vertex positions are needed downstream, to seed the
/// narrow-band signed-distance field, so no face topology is kept.
struct Mesh {
    vertices: Vec<Point3D>,
}

/// Extracts the iso-crossing points of a sparse scalar field: for every
/// active cell on or above `iso_level`, interpolate a crossing point toward
/// each face neighbour that falls below it.
fn volume_to_mesh(field: &SparseVoxel<f32>, iso_level: f32) -> Option<Mesh> {
    let mut vertices = Vec::new();
    for (&idx, &value) in field.iter() {
        if value < iso_level {
            continue;
        }
        for neighbour in SparseVoxel::<f32>::face_neighbours(idx) {
            let Some(nvalue) = field.get(neighbour) else { continue };
            if nvalue >= iso_level {
                continue;
            }
            let denom = nvalue - value;
            let t = if denom == 0.0 { 0.0 } else { ((iso_level - value) / denom).clamp(0.0, 1.0) };
            let a = field.cell_centre(idx);
            let b = field.cell_centre(neighbour);
            vertices.push(a + (b - a) * t);
        }
    }
    if vertices.is_empty() {
        None
    } else {
        Some(Mesh { vertices })
    }
}

/// Any vertex carrying a non-finite coordinate collapses to the origin
/// rather than letting a degenerate face sweep across the whole field.
fn sanitize_mesh(mesh: &mut Mesh) {
    for v in mesh.vertices.iter_mut() {
        if !v.x.is_finite() || !v.y.is_finite() || !v.z.is_finite() {
            *v = Point3D::ZERO;
        }
    }
}

/// Builds a narrow-band signed distance field, in level-set voxel units,
/// around `mesh`. A cell's sign is negative when the source field was
/// active and at-or-above `iso_level` at that position (inside the
/// isosurface), positive otherwise. `bandwidth_cells` bounds the search
/// radius around each vertex.
fn mesh_to_narrow_band_sdf(mesh: &Mesh, source: &SparseVoxel<f32>, iso_level: f32, voxel_size: f32, bandwidth_cells: i32) -> SparseVoxel<f32> {
    let vs = Point3D::new(voxel_size, voxel_size, voxel_size);
    let mut sdf = SparseVoxel::<f32>::new(source.origin(), vs);
    for vertex in &mesh.vertices {
        let centre_idx = sdf.index_of(*vertex);
        for dz in -bandwidth_cells..=bandwidth_cells {
            for dy in -bandwidth_cells..=bandwidth_cells {
                for dx in -bandwidth_cells..=bandwidth_cells {
                    let idx = (centre_idx.0 + dx, centre_idx.1 + dy, centre_idx.2 + dz);
                    let cell_centre = sdf.cell_centre(idx);
                    let dist_cells = (cell_centre - *vertex).magnitude() / voxel_size;
                    if dist_cells > bandwidth_cells as f32 {
                        continue;
                    }
                    let inside = source.get_at_point(cell_centre).map(|v| v >= iso_level).unwrap_or(false);
                    let signed = if inside { -dist_cells } else { dist_cells };
                    let keep = match sdf.get(idx) {
                        Some(current) if current.abs() <= signed.abs() => current,
                        _ => signed,
                    };
                    sdf.set(idx, keep);
                }
            }
        }
    }
    sdf
}

fn scale_sdf_to_physical(sdf: &mut SparseVoxel<f32>, voxel_size: f32) {
    let keys: Vec<_> = sdf.iter().map(|(&k, _)| k).collect();
    for key in keys {
        let v = sdf.get(key).unwrap_or(0.0);
        sdf.set(key, v * voxel_size);
    }
}

struct IonMask<'a> {
    range: Option<&'a core_stream::RangeStream>,
    names: &'a [String],
}

impl<'a> IonMask<'a> {
    fn matches(&self, value: f32) -> bool {
        if self.names.is_empty() {
            return true;
        }
        let Some(range) = self.range else { return false };
        let idx = range.file.ion_id_for_value(value);
        if idx == UNRANGED {
            return false;
        }
        range.file.ions().get(idx).map(|ion| self.names.iter().any(|n| n == &ion.name)).unwrap_or(false)
    }
}

/// Bins the composition of ions around an implicit isosurface by distance:
/// a concentration profile (numerator/denominator ion counts per shell)
/// against signed distance to the surface extracted from an upstream
/// voxelization filter's isosurface representation.
pub struct ProxigramFilter {
    label: String,
    level_set_voxel_size: f32,
    shell_width: f32,
    max_distance: f32,
    distance_weighting: bool,
    numerator_ions: Vec<String>,
    denominator_ions: Vec<String>,
}

impl Default for ProxigramFilter {
    fn default() -> Self {
        Self {
            label: "Proxigram".to_string(),
            level_set_voxel_size: 0.2,
            shell_width: 0.3,
            max_distance: 1.5,
            distance_weighting: false,
            numerator_ions: Vec::new(),
            denominator_ions: Vec::new(),
        }
    }
}

impl ProxigramFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_ion_list(value: &str) -> Vec<String> {
        value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    /// Number of integer shells on either side of zero, per spec: centers
    /// run `0, ±w, ±2w, ..., ±D` inclusive.
    fn max_shell_index(&self) -> i32 {
        (self.max_distance / self.shell_width).round().max(0.0) as i32
    }
}

impl Filter for ProxigramFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Proxigram
    }

    fn type_string(&self) -> &'static str {
        "Proxigram"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self {
            label: self.label.clone(),
            level_set_voxel_size: self.level_set_voxel_size,
            shell_width: self.shell_width,
            max_distance: self.max_distance,
            distance_weighting: self.distance_weighting,
            numerator_ions: self.numerator_ions.clone(),
            denominator_ions: self.denominator_ions.clone(),
        })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Proxigram");
        g.push(FilterProperty::new("Level-set voxel size", PropertyType::Real, KEY_LEVEL_SET_VOXEL_SIZE, self.level_set_voxel_size.to_string(), "voxel size of the narrow-band signed distance field"));
        g.push(FilterProperty::new("Shell width", PropertyType::Real, KEY_SHELL_WIDTH, self.shell_width.to_string(), "proximity shell width in physical units"));
        g.push(FilterProperty::new("Max distance", PropertyType::Real, KEY_MAX_DISTANCE, self.max_distance.to_string(), "maximum distance from the surface to bin"));
        g.push(FilterProperty::new("Distance weighting", PropertyType::Bool, KEY_DISTANCE_WEIGHTING, if self.distance_weighting { "1" } else { "0" }, "weight each ion's contribution by its distance from the shell centre"));
        g.push(FilterProperty::new("Numerator ions", PropertyType::String, KEY_NUMERATOR_IONS, self.numerator_ions.join(","), "ion species counted in the numerator"));
        g.push(FilterProperty::new("Denominator ions", PropertyType::String, KEY_DENOMINATOR_IONS, self.denominator_ions.join(","), "ion species counted in the denominator; empty means all ions"));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_LEVEL_SET_VOXEL_SIZE => match value.trim().parse::<f32>() {
                Ok(v) if v == self.level_set_voxel_size => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.level_set_voxel_size = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SHELL_WIDTH => match value.trim().parse::<f32>() {
                Ok(v) if v == self.shell_width => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.shell_width = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_MAX_DISTANCE => match value.trim().parse::<f32>() {
                Ok(v) if v == self.max_distance => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.max_distance = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_DISTANCE_WEIGHTING => match FilterProperty::new("", PropertyType::Bool, key, value, "x").parse_bool() {
                Some(v) if v == self.distance_weighting => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.distance_weighting = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_NUMERATOR_IONS => {
                let parsed = Self::decode_ion_list(value);
                if parsed == self.numerator_ions {
                    PropertySetOutcome::UNCHANGED
                } else {
                    self.numerator_ions = parsed;
                    PropertySetOutcome::ACCEPTED
                }
            }
            KEY_DENOMINATOR_IONS => {
                let parsed = Self::decode_ion_list(value);
                if parsed == self.denominator_ions {
                    PropertySetOutcome::UNCHANGED
                } else {
                    self.denominator_ions = parsed;
                    PropertySetOutcome::ACCEPTED
                }
            }
            _ => PropertySetOutcome::REJECTED,
        }
    }

    fn use_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS | StreamKindMask::RANGE | StreamKindMask::VOXEL_SPARSE
    }

    fn block_mask(&self) -> StreamKindMask {
        StreamKindMask::empty()
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::PLOT1D
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let Some(sparse) = inputs.iter().find_map(FilterStream::as_voxel_sparse) else {
            return Err(FilterError::FilterSpecific { filter: self.label.clone(), reason: "no voxel-sparse input stream".to_string() });
        };

        let Some(mut mesh) = volume_to_mesh(&sparse.field, sparse.iso_level) else {
            tracing::warn!(target: "filters.proxigram", label = %self.label, "meshing produced no surface; skipping plot");
            return Ok(vec![]);
        };
        sanitize_mesh(&mut mesh);

        let bandwidth_cells = ((self.max_distance + self.shell_width / 2.0) / self.level_set_voxel_size).ceil().max(1.0) as i32;
        let mut sdf = mesh_to_narrow_band_sdf(&mesh, &sparse.field, sparse.iso_level, self.level_set_voxel_size, bandwidth_cells);
        scale_sdf_to_physical(&mut sdf, self.level_set_voxel_size);

        let voxel_size = Point3D::new(self.level_set_voxel_size, self.level_set_voxel_size, self.level_set_voxel_size);
        let origin = sdf.origin();
        let mut numerator = SparseVoxel::<f32>::new(origin, voxel_size);
        let mut denominator = SparseVoxel::<f32>::new(origin, voxel_size);
        for (&key, _) in sdf.iter() {
            numerator.set(key, 0.0);
            denominator.set(key, 0.0);
        }

        let range = inputs.iter().find_map(FilterStream::as_range);
        let numerator_mask = IonMask { range, names: &self.numerator_ions };
        let denominator_mask = IonMask { range, names: &self.denominator_ions };

        let mut processed = 0usize;
        for stream in inputs {
            let Some(ions) = stream.as_ions() else { continue };
            for hit in &ions.hits {
                processed += 1;
                if processed % 4096 == 0 && abort.is_set() {
                    return Err(FilterError::Aborted);
                }
                let rel = hit.pos - origin;
                let in_denominator = denominator_mask.matches(hit.value);
                let in_numerator = numerator_mask.matches(hit.value);
                if !in_denominator && !in_numerator {
                    continue;
                }
                for (idx, weight) in trilinear_deposit(rel, voxel_size) {
                    if weight <= 0.0 || !denominator.contains(idx) {
                        continue;
                    }
                    if in_denominator {
                        let cur = denominator.get(idx).unwrap_or(0.0);
                        denominator.set(idx, cur + weight);
                    }
                    if in_numerator {
                        let cur = numerator.get(idx).unwrap_or(0.0);
                        numerator.set(idx, cur + weight);
                    }
                }
            }
        }

        let max_k = self.max_shell_index();
        let shell_count = (2 * max_k + 1) as usize;
        let mut numerator_sum = vec![0.0f64; shell_count];
        let mut denominator_sum = vec![0.0f64; shell_count];

        for (&key, &distance) in sdf.iter() {
            let k = (distance / self.shell_width).round() as i32;
            if k.abs() > max_k {
                continue;
            }
            let weight = if self.distance_weighting { 1.0 / (1.0 + distance.abs() as f64) } else { 1.0 };
            let slot = (k + max_k) as usize;
            numerator_sum[slot] += numerator.get(key).unwrap_or(0.0) as f64 * weight;
            denominator_sum[slot] += denominator.get(key).unwrap_or(0.0) as f64 * weight;
        }

        let mut concentration = Plot1D::new(format!("{} concentration", self.label));
        concentration.x_label = "distance from surface".to_string();
        concentration.y_label = "concentration".to_string();
        let mut atom_counts = Plot1D::new(format!("{} atom counts", self.label));
        atom_counts.x_label = "distance from surface".to_string();
        atom_counts.y_label = "atom count".to_string();

        for k in -max_k..=max_k {
            let slot = (k + max_k) as usize;
            let centre = k as f64 * self.shell_width as f64;
            let conc = if denominator_sum[slot] == 0.0 { 0.0 } else { numerator_sum[slot] / denominator_sum[slot] };
            concentration.push(centre, conc);
            atom_counts.push(centre, denominator_sum[slot]);
        }

        Ok(vec![
            FilterStream::Plot1D { parent: FilterId::fresh(), cached: Cached::Transferred, data: concentration },
            FilterStream::Plot1D { parent: FilterId::fresh(), cached: Cached::Transferred, data: atom_counts },
        ])
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_LEVEL_SET_VOXEL_SIZE, self.level_set_voxel_size)?;
        write_param(w, KEY_SHELL_WIDTH, self.shell_width)?;
        write_param(w, KEY_MAX_DISTANCE, self.max_distance)?;
        write_param(w, KEY_DISTANCE_WEIGHTING, self.distance_weighting)?;
        write_param(w, KEY_NUMERATOR_IONS, self.numerator_ions.join(","))?;
        write_param(w, KEY_DENOMINATOR_IONS, self.denominator_ions.join(","))
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_LEVEL_SET_VOXEL_SIZE) {
            self.level_set_voxel_size = v.parse().map_err(|_| "bad level-set voxel size".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SHELL_WIDTH) {
            self.shell_width = v.parse().map_err(|_| "bad shell width".to_string())?;
        }
        if let Some(v) = params.get(&KEY_MAX_DISTANCE) {
            self.max_distance = v.parse().map_err(|_| "bad max distance".to_string())?;
        }
        if let Some(v) = params.get(&KEY_DISTANCE_WEIGHTING) {
            self.distance_weighting = v == "true";
        }
        if let Some(v) = params.get(&KEY_NUMERATOR_IONS) {
            self.numerator_ions = Self::decode_ion_list(v);
        }
        if let Some(v) = params.get(&KEY_DENOMINATOR_IONS) {
            self.denominator_ions = Self::decode_ion_list(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_stream::{IonHit, IonsStream, VoxelSparseStream};

    fn shell_grid(iso_level: f32) -> SparseVoxel<f32> {
        let mut field = SparseVoxel::<f32>::new(Point3D::ZERO, Point3D::new(0.2, 0.2, 0.2));
        for x in -10..=10 {
            for y in -10..=10 {
                for z in -10..=10 {
                    let centre = field.cell_centre((x, y, z));
                    let radius = centre.magnitude();
                    let value = if radius <= 1.0 { 1.0 } else { 0.0 };
                    if value >= iso_level || radius <= 1.4 {
                        field.set((x, y, z), value);
                    }
                }
            }
        }
        field
    }

    #[test]
    fn shell_binning_matches_the_expected_shell_count() {
        let f = ProxigramFilter::new();
        assert_eq!(f.max_shell_index(), 5);
    }

    #[test]
    fn produces_concentration_and_atom_count_plots_for_a_spherical_shell() {
        let mut f = ProxigramFilter::new();
        f.set_property(KEY_LEVEL_SET_VOXEL_SIZE, "0.2");
        f.set_property(KEY_SHELL_WIDTH, "0.3");
        f.set_property(KEY_MAX_DISTANCE, "1.5");

        let field = shell_grid(0.5);
        let mut sparse_data = VoxelSparseStream::new(field);
        sparse_data.iso_level = 0.5;
        let sparse = FilterStream::VoxelSparse { parent: FilterId::fresh(), cached: Cached::Owned, data: sparse_data };

        let hits: Vec<IonHit> = (0..50)
            .map(|i| {
                let t = i as f32 * 0.12;
                IonHit::new(Point3D::new(t.cos() * 1.0, t.sin() * 1.0, 0.0), 1.0)
            })
            .collect();
        let ions = FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) };

        let mut progress = ProgressData::new(1);
        let out = f.refresh(&[sparse, ions], &mut progress, &AbortFlag::new()).unwrap();
        assert_eq!(out.len(), 2);
        let FilterStream::Plot1D { data: concentration, .. } = &out[0] else { panic!("expected Plot1D") };
        let FilterStream::Plot1D { data: atom_counts, .. } = &out[1] else { panic!("expected Plot1D") };
        assert_eq!(concentration.len(), 11);
        assert_eq!(atom_counts.len(), 11);
    }

    #[test]
    fn no_mesh_yields_no_plots() {
        let mut f = ProxigramFilter::new();
        let field = SparseVoxel::<f32>::new(Point3D::ZERO, Point3D::new(0.2, 0.2, 0.2));
        let mut sparse_data = VoxelSparseStream::new(field);
        sparse_data.iso_level = 0.5;
        let sparse = FilterStream::VoxelSparse { parent: FilterId::fresh(), cached: Cached::Owned, data: sparse_data };
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&[sparse], &mut progress, &AbortFlag::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn state_round_trips() {
        let mut f = ProxigramFilter::new();
        f.set_property(KEY_LEVEL_SET_VOXEL_SIZE, "0.25");
        f.set_property(KEY_SHELL_WIDTH, "0.4");
        f.set_property(KEY_MAX_DISTANCE, "2.0");
        f.set_property(KEY_DISTANCE_WEIGHTING, "1");
        f.set_property(KEY_NUMERATOR_IONS, "H");
        f.set_property(KEY_DENOMINATOR_IONS, "H,O");
        let mut frag = String::new();
        f.write_state(&mut frag).unwrap();
        let mut g = ProxigramFilter::new();
        g.read_state(&frag).unwrap();
        assert_eq!(g.level_set_voxel_size, 0.25);
        assert_eq!(g.shell_width, 0.4);
        assert_eq!(g.max_distance, 2.0);
        assert!(g.distance_weighting);
        assert_eq!(g.numerator_ions, vec!["H".to_string()]);
        assert_eq!(g.denominator_ions, vec!["H".to_string(), "O".to_string()]);
    }
}
