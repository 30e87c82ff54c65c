use core_filter::{AbortFlag, Filter, FilterError, FilterKind, FilterPropGroup, FilterProperty, ProgressData, PropertySetOutcome, PropertyType};
use core_geom::{BoundCube, Point3D};
use core_ranges::UNRANGED;
use core_stream::{
    Cached, ColourBar, DrawList, DrawPrimitive, FilterId, FilterStream, SliceImage, StreamKindMask, VoxelDenseStream, VoxelSparseStream,
};
use core_voxel::{InterpMode as GridInterpMode, SparseVoxel, Voxels};

use crate::contribution::trilinear_deposit;
use crate::state_io::{parse_params, write_param};

const KEY_USE_FIXED_WIDTH: u32 = 0;
const KEY_CELL_COUNT: u32 = 1;
const KEY_CELL_WIDTH: u32 = 2;
const KEY_SPARSE_VOXEL_SIZE: u32 = 3;
const KEY_REPRESENTATION: u32 = 4;
const KEY_NORMALIZATION: u32 = 5;
const KEY_NUMERATOR_IONS: u32 = 6;
const KEY_DENOMINATOR_IONS: u32 = 7;
const KEY_POST_FILTER: u32 = 8;
const KEY_POST_STDEV: u32 = 9;
const KEY_POST_WINDOW_RATIO: u32 = 10;
const KEY_COLOUR_MAP: u32 = 11;
const KEY_ISO_LEVEL: u32 = 12;
const KEY_OPACITY: u32 = 13;
const KEY_SLICE_AXIS: u32 = 14;
const KEY_SLICE_OFFSET: u32 = 15;
const KEY_SLICE_INTERP: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Representation {
    PointCloud,
    Isosurface,
    AxialSlice,
}

impl Representation {
    fn as_str(self) -> &'static str {
        match self {
            Representation::PointCloud => "point_cloud",
            Representation::Isosurface => "isosurface",
            Representation::AxialSlice => "axial_slice",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "point_cloud" => Some(Representation::PointCloud),
            "isosurface" => Some(Representation::Isosurface),
            "axial_slice" => Some(Representation::AxialSlice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    Raw,
    Density,
    Fraction,
    Ratio,
}

impl Normalization {
    fn as_str(self) -> &'static str {
        match self {
            Normalization::Raw => "raw",
            Normalization::Density => "density",
            Normalization::Fraction => "fraction",
            Normalization::Ratio => "ratio",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(Normalization::Raw),
            "density" => Some(Normalization::Density),
            "fraction" => Some(Normalization::Fraction),
            "ratio" => Some(Normalization::Ratio),
            _ => None,
        }
    }

    fn needs_denominator_mask(self) -> bool {
        matches!(self, Normalization::Ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostFilter {
    None,
    Gaussian,
    LaplacianOfGaussian,
}

impl PostFilter {
    fn as_str(self) -> &'static str {
        match self {
            PostFilter::None => "none",
            PostFilter::Gaussian => "gaussian",
            PostFilter::LaplacianOfGaussian => "laplacian_of_gaussian",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(PostFilter::None),
            "gaussian" => Some(PostFilter::Gaussian),
            "laplacian_of_gaussian" => Some(PostFilter::LaplacianOfGaussian),
            _ => None,
        }
    }
}

/// Bins ion positions into a 3D grid, in one of three representations
/// (dense point-cloud counts, a sparse implicit isosurface field, or a
/// single colour-mapped axial slice), with optional normalization against a
/// denominator grid and an optional smoothing post-filter.
pub struct VoxeliseFilter {
    label: String,
    use_fixed_width: bool,
    cell_count: (u32, u32, u32),
    cell_width: f32,
    sparse_voxel_size: f32,
    representation: Representation,
    normalization: Normalization,
    numerator_ions: Vec<String>,
    denominator_ions: Vec<String>,
    post_filter: PostFilter,
    post_stdev: f32,
    post_window_ratio: f32,
    colour_map: String,
    iso_level: f32,
    opacity: f32,
    slice_axis: u32,
    slice_offset: f32,
    slice_interp: GridInterpMode,
}

impl Default for VoxeliseFilter {
    fn default() -> Self {
        Self {
            label: "Voxelise".to_string(),
            use_fixed_width: false,
            cell_count: (64, 64, 64),
            cell_width: 1.0,
            sparse_voxel_size: 1.0,
            representation: Representation::PointCloud,
            normalization: Normalization::Raw,
            numerator_ions: Vec::new(),
            denominator_ions: Vec::new(),
            post_filter: PostFilter::None,
            post_stdev: 1.0,
            post_window_ratio: 3.0,
            colour_map: "default".to_string(),
            iso_level: 0.5,
            opacity: 1.0,
            slice_axis: 2,
            slice_offset: 0.5,
            slice_interp: GridInterpMode::Linear,
        }
    }
}

impl VoxeliseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_ion_list(value: &str) -> Vec<String> {
        value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    /// Derives the grid dimensions from the input bounding cube, per the
    /// selected sizing mode.
    fn grid_dims(&self, bc: &BoundCube) -> (usize, usize, usize) {
        if !self.use_fixed_width {
            return (self.cell_count.0 as usize, self.cell_count.1 as usize, self.cell_count.2 as usize);
        }
        let extent = bc.extent();
        let width = self.cell_width.max(1e-6);
        let n = |e: f32| ((e / width).floor() as usize) + 1;
        (n(extent.x), n(extent.y), n(extent.z))
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

impl Filter for VoxeliseFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Voxelise
    }

    fn type_string(&self) -> &'static str {
        "Voxelise"
    }

    fn clone_uncached(&self) -> Box<dyn Filter> {
        Box::new(Self {
            label: self.label.clone(),
            use_fixed_width: self.use_fixed_width,
            cell_count: self.cell_count,
            cell_width: self.cell_width,
            sparse_voxel_size: self.sparse_voxel_size,
            representation: self.representation,
            normalization: self.normalization,
            numerator_ions: self.numerator_ions.clone(),
            denominator_ions: self.denominator_ions.clone(),
            post_filter: self.post_filter,
            post_stdev: self.post_stdev,
            post_window_ratio: self.post_window_ratio,
            colour_map: self.colour_map.clone(),
            iso_level: self.iso_level,
            opacity: self.opacity,
            slice_axis: self.slice_axis,
            slice_offset: self.slice_offset,
            slice_interp: self.slice_interp,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }

    fn properties(&self) -> FilterPropGroup {
        let mut g = FilterPropGroup::new("Voxelise");
        g.push(FilterProperty::new("Use fixed cell width", PropertyType::Bool, KEY_USE_FIXED_WIDTH, if self.use_fixed_width { "1" } else { "0" }, "size the grid by physical cell width instead of a fixed cell count"));
        g.push(FilterProperty::new("Cell count", PropertyType::Point3D, KEY_CELL_COUNT, format!("{} {} {}", self.cell_count.0, self.cell_count.1, self.cell_count.2), "grid dimensions when not using a fixed width"));
        g.push(FilterProperty::new("Cell width", PropertyType::Real, KEY_CELL_WIDTH, self.cell_width.to_string(), "physical cell width when using fixed width sizing"));
        g.push(FilterProperty::new("Sparse voxel size", PropertyType::Real, KEY_SPARSE_VOXEL_SIZE, self.sparse_voxel_size.to_string(), "isotropic voxel size for the isosurface representation"));
        g.push(FilterProperty::new("Representation", PropertyType::Choice, KEY_REPRESENTATION, self.representation.as_str(), "how the voxelised field is emitted").with_choices(&["point_cloud", "isosurface", "axial_slice"]));
        g.push(FilterProperty::new("Normalization", PropertyType::Choice, KEY_NORMALIZATION, self.normalization.as_str(), "how raw counts are normalized").with_choices(&["raw", "density", "fraction", "ratio"]));
        g.push(FilterProperty::new("Numerator ions", PropertyType::String, KEY_NUMERATOR_IONS, self.numerator_ions.join(","), "ion species counted in the numerator, for fraction/ratio modes"));
        g.push(FilterProperty::new("Denominator ions", PropertyType::String, KEY_DENOMINATOR_IONS, self.denominator_ions.join(","), "ion species counted in the denominator, for ratio mode"));
        g.push(FilterProperty::new("Post filter", PropertyType::Choice, KEY_POST_FILTER, self.post_filter.as_str(), "optional smoothing pass after normalization").with_choices(&["none", "gaussian", "laplacian_of_gaussian"]));
        g.push(FilterProperty::new("Post filter stdev", PropertyType::Real, KEY_POST_STDEV, self.post_stdev.to_string(), "Gaussian standard deviation in cells"));
        g.push(FilterProperty::new("Post filter window ratio", PropertyType::Real, KEY_POST_WINDOW_RATIO, self.post_window_ratio.to_string(), "kernel half-width as a multiple of stdev"));
        g.push(FilterProperty::new("Colour map", PropertyType::String, KEY_COLOUR_MAP, self.colour_map.clone(), "named colour map used by the renderer").cosmetic());
        g.push(FilterProperty::new("Iso level", PropertyType::Real, KEY_ISO_LEVEL, self.iso_level.to_string(), "iso-value used by the renderer for the isosurface representation").cosmetic());
        g.push(FilterProperty::new("Opacity", PropertyType::Real, KEY_OPACITY, self.opacity.to_string(), "display opacity").cosmetic());
        g.push(FilterProperty::new("Slice axis", PropertyType::Integer, KEY_SLICE_AXIS, self.slice_axis.to_string(), "0=x, 1=y, 2=z axis the axial slice cuts"));
        g.push(FilterProperty::new("Slice offset", PropertyType::Real, KEY_SLICE_OFFSET, self.slice_offset.to_string(), "fractional offset (0..1) along the slice axis"));
        g.push(FilterProperty::new("Slice interpolation", PropertyType::Choice, KEY_SLICE_INTERP, if self.slice_interp == GridInterpMode::Linear { "linear" } else { "none" }, "interpolate the slice between bracketing planes").with_choices(&["none", "linear"]));
        g
    }

    fn set_property(&mut self, key: u32, value: &str) -> PropertySetOutcome {
        match key {
            KEY_USE_FIXED_WIDTH => match FilterProperty::new("", PropertyType::Bool, key, value, "x").parse_bool() {
                Some(v) if v == self.use_fixed_width => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.use_fixed_width = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_CELL_COUNT => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 3 {
                    return PropertySetOutcome::REJECTED;
                }
                let parsed: Result<Vec<u32>, _> = parts.iter().map(|p| p.parse::<u32>()).collect();
                match parsed {
                    Ok(v) if v.iter().all(|&n| n > 0) => {
                        let next = (v[0], v[1], v[2]);
                        if next == self.cell_count {
                            PropertySetOutcome::UNCHANGED
                        } else {
                            self.cell_count = next;
                            PropertySetOutcome::ACCEPTED
                        }
                    }
                    _ => PropertySetOutcome::REJECTED,
                }
            }
            KEY_CELL_WIDTH => match value.trim().parse::<f32>() {
                Ok(v) if v == self.cell_width => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.cell_width = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SPARSE_VOXEL_SIZE => match value.trim().parse::<f32>() {
                Ok(v) if v == self.sparse_voxel_size => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.sparse_voxel_size = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_REPRESENTATION => match Representation::parse(value) {
                Some(v) if v == self.representation => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.representation = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_NORMALIZATION => match Normalization::parse(value) {
                Some(v) if v == self.normalization => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.normalization = v;
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
            KEY_POST_FILTER => match PostFilter::parse(value) {
                Some(v) if v == self.post_filter => PropertySetOutcome::UNCHANGED,
                Some(v) => {
                    self.post_filter = v;
                    PropertySetOutcome::ACCEPTED
                }
                None => PropertySetOutcome::REJECTED,
            },
            KEY_POST_STDEV => match value.trim().parse::<f32>() {
                Ok(v) if v == self.post_stdev => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.post_stdev = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_POST_WINDOW_RATIO => match value.trim().parse::<f32>() {
                Ok(v) if v == self.post_window_ratio => PropertySetOutcome::UNCHANGED,
                Ok(v) if v > 0.0 => {
                    self.post_window_ratio = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_COLOUR_MAP => {
                if value == self.colour_map {
                    PropertySetOutcome::UNCHANGED
                } else {
                    self.colour_map = value.to_string();
                    PropertySetOutcome::ACCEPTED
                }
            }
            KEY_ISO_LEVEL => match value.trim().parse::<f32>() {
                Ok(v) if v == self.iso_level => PropertySetOutcome::UNCHANGED,
                Ok(v) => {
                    self.iso_level = v;
                    PropertySetOutcome::ACCEPTED
                }
                Err(_) => PropertySetOutcome::REJECTED,
            },
            KEY_OPACITY => match value.trim().parse::<f32>() {
                Ok(v) if v == self.opacity => PropertySetOutcome::UNCHANGED,
                Ok(v) if (0.0..=1.0).contains(&v) => {
                    self.opacity = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SLICE_AXIS => match value.trim().parse::<u32>() {
                Ok(v) if v == self.slice_axis => PropertySetOutcome::UNCHANGED,
                Ok(v) if v < 3 => {
                    self.slice_axis = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SLICE_OFFSET => match value.trim().parse::<f32>() {
                Ok(v) if v == self.slice_offset => PropertySetOutcome::UNCHANGED,
                Ok(v) if (0.0..=1.0).contains(&v) => {
                    self.slice_offset = v;
                    PropertySetOutcome::ACCEPTED
                }
                _ => PropertySetOutcome::REJECTED,
            },
            KEY_SLICE_INTERP => {
                let next = match value {
                    "none" => Some(GridInterpMode::None),
                    "linear" => Some(GridInterpMode::Linear),
                    _ => None,
                };
                match next {
                    Some(v) if v == self.slice_interp => PropertySetOutcome::UNCHANGED,
                    Some(v) => {
                        self.slice_interp = v;
                        PropertySetOutcome::ACCEPTED
                    }
                    None => PropertySetOutcome::REJECTED,
                }
            }
            _ => PropertySetOutcome::REJECTED,
        }
    }

    fn use_mask(&self) -> StreamKindMask {
        StreamKindMask::IONS | StreamKindMask::RANGE
    }

    fn block_mask(&self) -> StreamKindMask {
        StreamKindMask::empty()
    }

    fn emit_mask(&self) -> StreamKindMask {
        StreamKindMask::VOXEL_DENSE | StreamKindMask::VOXEL_SPARSE | StreamKindMask::DRAW
    }

    fn refresh(&mut self, inputs: &[FilterStream], _progress: &mut ProgressData, abort: &AbortFlag) -> Result<Vec<FilterStream>, FilterError> {
        let range = inputs.iter().find_map(FilterStream::as_range);
        let numerator_mask = IonMask { range, names: &self.numerator_ions };
        let denominator_mask = IonMask { range, names: &self.denominator_ions };

        let mut positions = Vec::new();
        for stream in inputs {
            let Some(data) = stream.as_ions() else { continue };
            positions.extend(data.hits.iter().map(|h| (h.pos, h.value)));
        }

        let bc = BoundCube::from_points(positions.iter().map(|(p, _)| *p));
        if !bc.is_valid() || bc.is_empty() {
            tracing::warn!(target: "filters.voxelise", label = %self.label, "input has no spatial extent");
            return Err(FilterError::InvalidGeometry("voxelisation input has no spatial extent".to_string()));
        }
        tracing::debug!(target: "filters.voxelise", label = %self.label, representation = self.representation.as_str(), ion_count = positions.len(), "refresh");

        match self.representation {
            Representation::Isosurface => self.refresh_sparse(&positions, &bc, &numerator_mask, &denominator_mask, abort),
            Representation::PointCloud => {
                let grid = self.accumulate_dense(&positions, &bc, &numerator_mask, &denominator_mask, abort)?;
                Ok(vec![self.emit_dense(grid)])
            }
            Representation::AxialSlice => {
                let grid = self.accumulate_dense(&positions, &bc, &numerator_mask, &denominator_mask, abort)?;
                Ok(vec![self.emit_slice(&grid)])
            }
        }
    }

    fn write_state(&self, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
        write_param(w, KEY_USE_FIXED_WIDTH, self.use_fixed_width)?;
        write_param(w, KEY_CELL_COUNT, format!("{} {} {}", self.cell_count.0, self.cell_count.1, self.cell_count.2))?;
        write_param(w, KEY_CELL_WIDTH, self.cell_width)?;
        write_param(w, KEY_SPARSE_VOXEL_SIZE, self.sparse_voxel_size)?;
        write_param(w, KEY_REPRESENTATION, self.representation.as_str())?;
        write_param(w, KEY_NORMALIZATION, self.normalization.as_str())?;
        write_param(w, KEY_NUMERATOR_IONS, self.numerator_ions.join(","))?;
        write_param(w, KEY_DENOMINATOR_IONS, self.denominator_ions.join(","))?;
        write_param(w, KEY_POST_FILTER, self.post_filter.as_str())?;
        write_param(w, KEY_POST_STDEV, self.post_stdev)?;
        write_param(w, KEY_POST_WINDOW_RATIO, self.post_window_ratio)?;
        write_param(w, KEY_COLOUR_MAP, &self.colour_map)?;
        write_param(w, KEY_ISO_LEVEL, self.iso_level)?;
        write_param(w, KEY_OPACITY, self.opacity)?;
        write_param(w, KEY_SLICE_AXIS, self.slice_axis)?;
        write_param(w, KEY_SLICE_OFFSET, self.slice_offset)?;
        write_param(w, KEY_SLICE_INTERP, if self.slice_interp == GridInterpMode::Linear { "linear" } else { "none" })
    }

    fn read_state(&mut self, xml: &str) -> Result<(), String> {
        let params = parse_params(xml)?;
        if let Some(v) = params.get(&KEY_USE_FIXED_WIDTH) {
            self.use_fixed_width = v == "true";
        }
        if let Some(v) = params.get(&KEY_CELL_COUNT) {
            let parts: Vec<&str> = v.split_whitespace().collect();
            if parts.len() == 3 {
                self.cell_count = (
                    parts[0].parse().map_err(|_| "bad cell count".to_string())?,
                    parts[1].parse().map_err(|_| "bad cell count".to_string())?,
                    parts[2].parse().map_err(|_| "bad cell count".to_string())?,
                );
            }
        }
        if let Some(v) = params.get(&KEY_CELL_WIDTH) {
            self.cell_width = v.parse().map_err(|_| "bad cell width".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SPARSE_VOXEL_SIZE) {
            self.sparse_voxel_size = v.parse().map_err(|_| "bad sparse voxel size".to_string())?;
        }
        if let Some(v) = params.get(&KEY_REPRESENTATION) {
            self.representation = Representation::parse(v).ok_or_else(|| format!("bad representation {v:?}"))?;
        }
        if let Some(v) = params.get(&KEY_NORMALIZATION) {
            self.normalization = Normalization::parse(v).ok_or_else(|| format!("bad normalization {v:?}"))?;
        }
        if let Some(v) = params.get(&KEY_NUMERATOR_IONS) {
            self.numerator_ions = Self::decode_ion_list(v);
        }
        if let Some(v) = params.get(&KEY_DENOMINATOR_IONS) {
            self.denominator_ions = Self::decode_ion_list(v);
        }
        if let Some(v) = params.get(&KEY_POST_FILTER) {
            self.post_filter = PostFilter::parse(v).ok_or_else(|| format!("bad post filter {v:?}"))?;
        }
        if let Some(v) = params.get(&KEY_POST_STDEV) {
            self.post_stdev = v.parse().map_err(|_| "bad post stdev".to_string())?;
        }
        if let Some(v) = params.get(&KEY_POST_WINDOW_RATIO) {
            self.post_window_ratio = v.parse().map_err(|_| "bad post window ratio".to_string())?;
        }
        if let Some(v) = params.get(&KEY_COLOUR_MAP) {
            self.colour_map = v.clone();
        }
        if let Some(v) = params.get(&KEY_ISO_LEVEL) {
            self.iso_level = v.parse().map_err(|_| "bad iso level".to_string())?;
        }
        if let Some(v) = params.get(&KEY_OPACITY) {
            self.opacity = v.parse().map_err(|_| "bad opacity".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SLICE_AXIS) {
            self.slice_axis = v.parse().map_err(|_| "bad slice axis".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SLICE_OFFSET) {
            self.slice_offset = v.parse().map_err(|_| "bad slice offset".to_string())?;
        }
        if let Some(v) = params.get(&KEY_SLICE_INTERP) {
            self.slice_interp = match v.as_str() {
                "linear" => GridInterpMode::Linear,
                _ => GridInterpMode::None,
            };
        }
        Ok(())
    }
}

impl VoxeliseFilter {
    #[allow(clippy::too_many_arguments)]
    fn accumulate_dense(
        &self,
        positions: &[(Point3D, f32)],
        bc: &BoundCube,
        numerator_mask: &IonMask,
        denominator_mask: &IonMask,
        abort: &AbortFlag,
    ) -> Result<Voxels<f32>, FilterError> {
        let (nx, ny, nz) = self.grid_dims(bc);
        let mut numerator = Voxels::<f32>::from_bound_cube(nx, ny, nz, bc).map_err(|_| FilterError::InvalidGeometry("degenerate voxel bounds".to_string()))?;
        let needs_denominator = matches!(self.normalization, Normalization::Fraction | Normalization::Ratio);
        let mut denominator = if needs_denominator {
            Some(Voxels::<f32>::from_bound_cube(nx, ny, nz, bc).map_err(|_| FilterError::InvalidGeometry("degenerate voxel bounds".to_string()))?)
        } else {
            None
        };

        for (i, &(p, value)) in positions.iter().enumerate() {
            if i % 4096 == 0 && abort.is_set() {
                return Err(FilterError::Aborted);
            }
            let Some((ix, iy, iz)) = numerator.world_to_index(p) else { continue };
            if numerator_mask.matches(value) {
                let idx_flat = flat_index(&numerator, ix, iy, iz);
                let next = numerator.get_flat(idx_flat) + 1.0;
                numerator.set_flat(idx_flat, next);
            }
            if let Some(denom) = denominator.as_mut() {
                let use_for_denom = if self.normalization.needs_denominator_mask() { denominator_mask.matches(value) } else { true };
                if use_for_denom {
                    let idx_flat = flat_index(denom, ix, iy, iz);
                    let next = denom.get_flat(idx_flat) + 1.0;
                    denom.set_flat(idx_flat, next);
                }
            }
        }

        match self.normalization {
            Normalization::Raw => {}
            Normalization::Density => numerator.calculate_density(),
            Normalization::Fraction | Normalization::Ratio => {
                if let Some(denom) = denominator {
                    numerator.divide_elementwise(&denom);
                }
            }
        }

        match self.post_filter {
            PostFilter::None => {}
            PostFilter::Gaussian => numerator.isotropic_gaussian_smooth(self.post_stdev, self.post_window_ratio),
            PostFilter::LaplacianOfGaussian => numerator.laplace_of_gaussian(self.post_stdev, self.post_window_ratio),
        }

        Ok(numerator)
    }

    fn emit_dense(&self, grid: Voxels<f32>) -> FilterStream {
        let mut data = VoxelDenseStream::new(grid);
        data.colour_map = self.colour_map.clone();
        data.iso_level = self.iso_level;
        data.opacity = self.opacity;
        FilterStream::VoxelDense { parent: FilterId::fresh(), cached: Cached::Transferred, data }
    }

    fn emit_slice(&self, grid: &Voxels<f32>) -> FilterStream {
        let axis = self.slice_axis as usize;
        let values = grid.get_interp_slice(axis, self.slice_offset, self.slice_interp);
        let (nx, ny, nz) = grid.size();
        let sizes = [nx, ny, nz];
        let (dim_a, dim_b) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let (width, height) = (sizes[dim_a], sizes[dim_b]);
        let (lo, hi) = min_max(&values);
        let span = (hi - lo).max(1e-9);
        let rgba: Vec<[u8; 4]> = values
            .iter()
            .map(|&v| {
                let t = ((v - lo) / span).clamp(0.0, 1.0);
                let level = (t * 255.0).round() as u8;
                [level, level, level, 255]
            })
            .collect();
        let image = SliceImage { width, height, rgba };
        let colour_bar = Some(ColourBar { colour_map: self.colour_map.clone(), lo, hi });
        let (min_b, max_b) = grid.bounds();
        let prim = DrawPrimitive::TexturedQuad {
            origin: min_b,
            u_axis: Point3D::new((max_b.x - min_b.x).max(1e-9), 0.0, 0.0),
            v_axis: Point3D::new(0.0, (max_b.y - min_b.y).max(1e-9), 0.0),
            image,
            colour_bar,
        };
        let mut list = DrawList::new();
        list.items.push(prim);
        FilterStream::Draw { parent: FilterId::fresh(), cached: Cached::Transferred, data: list }
    }

    fn refresh_sparse(
        &self,
        positions: &[(Point3D, f32)],
        bc: &BoundCube,
        numerator_mask: &IonMask,
        denominator_mask: &IonMask,
        abort: &AbortFlag,
    ) -> Result<Vec<FilterStream>, FilterError> {
        let voxel_size = Point3D::new(self.sparse_voxel_size, self.sparse_voxel_size, self.sparse_voxel_size);
        let origin = bc.min().unwrap_or(Point3D::ZERO);
        let needs_denominator = matches!(self.normalization, Normalization::Fraction | Normalization::Ratio);

        let mut numerator = SparseVoxel::<f32>::new(origin, voxel_size);
        let mut denominator = if needs_denominator { Some(SparseVoxel::<f32>::new(origin, voxel_size)) } else { None };

        for (i, &(p, value)) in positions.iter().enumerate() {
            if i % 4096 == 0 && abort.is_set() {
                return Err(FilterError::Aborted);
            }
            let rel = p - origin;
            if numerator_mask.matches(value) {
                for (idx, weight) in trilinear_deposit(rel, voxel_size) {
                    if weight <= 0.0 {
                        continue;
                    }
                    let cur = numerator.get(idx).unwrap_or(0.0);
                    numerator.set(idx, cur + weight);
                }
            }
            if let Some(denom) = denominator.as_mut() {
                let use_for_denom = if self.normalization.needs_denominator_mask() { denominator_mask.matches(value) } else { true };
                if use_for_denom {
                    for (idx, weight) in trilinear_deposit(rel, voxel_size) {
                        if weight <= 0.0 {
                            continue;
                        }
                        let cur = denom.get(idx).unwrap_or(0.0);
                        denom.set(idx, cur + weight);
                    }
                }
            }
        }

        if let Some(denom) = denominator {
            match self.normalization {
                Normalization::Fraction | Normalization::Ratio => {
                    let keys: Vec<_> = numerator.iter().map(|(&k, _)| k).collect();
                    for key in keys {
                        let n = numerator.get(key).unwrap_or(0.0);
                        let d = denom.get(key).unwrap_or(0.0);
                        let ratio = if d == 0.0 { 0.0 } else { n / d };
                        numerator.set(key, if ratio.is_finite() { ratio } else { 0.0 });
                    }
                }
                _ => {}
            }
        } else if matches!(self.normalization, Normalization::Density) {
            let vol = (voxel_size.x * voxel_size.y * voxel_size.z) as f64;
            let keys: Vec<_> = numerator.iter().map(|(&k, _)| k).collect();
            for key in keys {
                let v = numerator.get(key).unwrap_or(0.0);
                numerator.set(key, (v as f64 / vol) as f32);
            }
        }

        let mut data = VoxelSparseStream::new(numerator);
        data.iso_level = self.iso_level;
        data.opacity = self.opacity;
        Ok(vec![FilterStream::VoxelSparse { parent: FilterId::fresh(), cached: Cached::Transferred, data }])
    }
}

fn flat_index(grid: &Voxels<f32>, x: usize, y: usize, z: usize) -> usize {
    let (_, ny, nz) = grid.size();
    (x * ny + y) * nz + z
}

fn min_max(values: &[f32]) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_stream::{FilterId as Fid, IonHit, IonsStream};

    fn ions_input(positions: &[Point3D]) -> FilterStream {
        let hits = positions.iter().map(|&p| IonHit::new(p, 1.0)).collect();
        FilterStream::Ions { parent: Fid::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) }
    }

    #[test]
    fn point_cloud_single_count_matches_scenario_three() {
        let mut f = VoxeliseFilter::new();
        f.set_property(KEY_CELL_COUNT, "4 4 4");
        let positions: Vec<Point3D> = (0..5).map(|i| Point3D::new(i as f32 * 0.2, 0.0, 0.0)).collect();
        let input = vec![ions_input(&positions)];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::VoxelDense { data, .. } = &out[0] else { panic!("expected VoxelDense") };
        let (max, _) = (data.grid.min_max().1, ());
        assert!(max <= 5.0);
        assert_eq!(data.grid.fill_sum(), 5.0);
    }

    #[test]
    fn ratio_mode_keeps_every_cell_in_unit_range() {
        let mut f = VoxeliseFilter::new();
        f.set_property(KEY_CELL_COUNT, "4 4 4");
        f.set_property(KEY_NORMALIZATION, "ratio");
        f.set_property(KEY_NUMERATOR_IONS, "H");
        f.set_property(KEY_DENOMINATOR_IONS, "H,O");
        let mut rf = core_ranges::RangeFile::new();
        let h = rf.add_ion(core_ranges::Ion { name: "H".into(), colour: core_ranges::Colour::default() }).unwrap();
        let o = rf.add_ion(core_ranges::Ion { name: "O".into(), colour: core_ranges::Colour::default() }).unwrap();
        rf.add_range(core_ranges::Range { lo: 0.5, hi: 1.5, ion: h }).unwrap();
        rf.add_range(core_ranges::Range { lo: 15.5, hi: 16.5, ion: o }).unwrap();
        let range_stream = core_stream::RangeStream::new(std::sync::Arc::new(rf));

        let positions: Vec<Point3D> = (0..20).map(|i| Point3D::new((i as f32 * 0.05) % 1.0, 0.0, 0.0)).collect();
        let hits: Vec<IonHit> = positions.iter().enumerate().map(|(i, &p)| IonHit::new(p, if i % 2 == 0 { 1.0 } else { 16.0 })).collect();
        let ions = FilterStream::Ions { parent: Fid::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) };
        let range = FilterStream::Range { parent: Fid::fresh(), cached: Cached::Owned, data: range_stream };
        let input = vec![ions, range];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::VoxelDense { data, .. } = &out[0] else { panic!("expected VoxelDense") };
        assert!(data.grid.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn isosurface_mode_emits_sparse_stream() {
        let mut f = VoxeliseFilter::new();
        f.set_property(KEY_REPRESENTATION, "isosurface");
        f.set_property(KEY_SPARSE_VOXEL_SIZE, "0.5");
        let positions = vec![Point3D::new(0.25, 0.25, 0.25), Point3D::new(1.0, 1.0, 1.0)];
        let input = vec![ions_input(&positions)];
        let mut progress = ProgressData::new(1);
        let out = f.refresh(&input, &mut progress, &AbortFlag::new()).unwrap();
        let FilterStream::VoxelSparse { data, .. } = &out[0] else { panic!("expected VoxelSparse") };
        assert!(!data.field.is_empty());
    }
}
