use glam::Mat4;
use splat_sh_utils::{sh_bands_for_coeffs, sh_coeffs_for_bands};

use crate::ExportError;
use crate::tint::ColorAdjustment;

/// Per-splat state bits.
pub mod state {
    pub const SELECTED: u8 = 1;
    pub const HIDDEN: u8 = 2;
    pub const DELETED: u8 = 4;
}

/// Bookkeeping columns that never make it into an export.
pub const INTERNAL_COLUMNS: [&str; 2] = ["state", "transform"];

/// Largest number of rest coefficients per channel (bands 1 to 3).
pub const MAX_REST_PER_CHANNEL: usize = 15;

/// A float column every exporter knows how to transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    X,
    Y,
    Z,
    Scale(u8),
    Rot(u8),
    FDc(u8),
    Opacity,
    FRest(u8),
}

impl Column {
    /// Columns the compressed and compact formats can't do without.
    pub const CORE: [Self; 14] = [
        Self::X,
        Self::Y,
        Self::Z,
        Self::Scale(0),
        Self::Scale(1),
        Self::Scale(2),
        Self::Rot(0),
        Self::Rot(1),
        Self::Rot(2),
        Self::Rot(3),
        Self::FDc(0),
        Self::FDc(1),
        Self::FDc(2),
        Self::Opacity,
    ];

    pub fn name(self) -> String {
        match self {
            Self::X => "x".to_owned(),
            Self::Y => "y".to_owned(),
            Self::Z => "z".to_owned(),
            Self::Scale(i) => format!("scale_{i}"),
            Self::Rot(i) => format!("rot_{i}"),
            Self::FDc(i) => format!("f_dc_{i}"),
            Self::Opacity => "opacity".to_owned(),
            Self::FRest(i) => format!("f_rest_{i}"),
        }
    }

    /// Parse a PLY property name. Anything unknown is a pass-through column.
    pub fn from_name(name: &str) -> Option<Self> {
        // Only the canonical spelling, so `f_rest_07` stays a pass-through column.
        let indexed = |prefix: &str, max: u8| {
            let digits = name.strip_prefix(prefix)?;
            digits
                .parse::<u8>()
                .ok()
                .filter(|&i| i < max && i.to_string() == digits)
        };

        match name {
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            "opacity" => Some(Self::Opacity),
            _ => indexed("scale_", 3)
                .map(Self::Scale)
                .or_else(|| indexed("rot_", 4).map(Self::Rot))
                .or_else(|| indexed("f_dc_", 3).map(Self::FDc))
                .or_else(|| indexed("f_rest_", 3 * MAX_REST_PER_CHANNEL as u8).map(Self::FRest)),
        }
    }
}

/// Alternate rigid transforms that splats of one source can opt into.
///
/// Index 0 is the identity entry, so a splat on index 0 only moves with its entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPalette {
    transforms: Vec<Mat4>,
}

impl Default for TransformPalette {
    fn default() -> Self {
        Self {
            transforms: vec![Mat4::IDENTITY],
        }
    }
}

impl TransformPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform and return the index splats should use to refer to it.
    pub fn push(&mut self, transform: Mat4) -> u32 {
        self.transforms.push(transform);
        (self.transforms.len() - 1) as u32
    }

    /// Look up a transform. Unknown indices resolve to identity.
    pub fn get(&self, index: u32) -> Mat4 {
        self.transforms
            .get(index as usize)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }
}

/// One splat asset as the editor holds it: named float columns plus the
/// bookkeeping needed to export it.
#[derive(Debug, Clone)]
pub struct SplatSource {
    num_splats: usize,
    columns: Vec<(String, Vec<f32>)>,
    state: Vec<u8>,
    transform: Option<Vec<u32>>,
    palette: TransformPalette,
    world_transform: Mat4,
    color: ColorAdjustment,
}

impl SplatSource {
    /// An empty source of `num_splats` splats with no columns, all live.
    pub fn new(num_splats: usize) -> Self {
        Self {
            num_splats,
            columns: Vec::new(),
            state: vec![0; num_splats],
            transform: None,
            palette: TransformPalette::default(),
            world_transform: Mat4::IDENTITY,
            color: ColorAdjustment::default(),
        }
    }

    /// Build a source from flat splat arrays.
    ///
    /// `means` and `log_scales` are `[x, y, z, ...]`, `rotations` are `[w, x, y, z, ...]`,
    /// `f_dc` is `[r, g, b, ...]` and `opacities` holds one logit per splat.
    pub fn from_raw(
        means: &[f32],
        rotations: &[f32],
        log_scales: &[f32],
        f_dc: &[f32],
        opacities: &[f32],
    ) -> Result<Self, ExportError> {
        let num_splats = opacities.len();
        let strided = |data: &[f32], stride: usize, i: usize| -> Vec<f32> {
            data.iter().skip(i).step_by(stride).copied().collect()
        };

        let mut source = Self::new(num_splats);
        for (name, names, data) in [
            ("means", &["x", "y", "z"][..], means),
            ("log_scales", &["scale_0", "scale_1", "scale_2"][..], log_scales),
            ("rotations", &["rot_0", "rot_1", "rot_2", "rot_3"][..], rotations),
            ("f_dc", &["f_dc_0", "f_dc_1", "f_dc_2"][..], f_dc),
        ] {
            let stride = names.len();
            Self::check_len(name, data.len(), num_splats * stride)?;
            for (i, column) in names.iter().enumerate() {
                source = source.with_column(column, strided(data, stride, i))?;
            }
        }

        source.with_column("opacity", opacities.to_vec())
    }

    fn check_len(name: &str, len: usize, expected: usize) -> Result<(), ExportError> {
        if len == expected {
            Ok(())
        } else {
            Err(ExportError::ColumnLength {
                name: name.to_owned(),
                len,
                expected,
            })
        }
    }

    /// Add or replace a named float column.
    pub fn with_column(mut self, name: &str, values: Vec<f32>) -> Result<Self, ExportError> {
        Self::check_len(name, values.len(), self.num_splats)?;

        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name.to_owned(), values)),
        }
        Ok(self)
    }

    /// Add rest SH coefficients for `bands` bands, laid out `[N, 3, rest_per_channel]`.
    pub fn with_sh_rest(mut self, bands: u32, rest: &[f32]) -> Result<Self, ExportError> {
        let per_channel = sh_coeffs_for_bands(bands.min(3)) - 1;
        Self::check_len("f_rest", rest.len(), self.num_splats * 3 * per_channel)?;

        let per_splat = 3 * per_channel;
        for k in 0..per_splat {
            let column = rest.iter().skip(k).step_by(per_splat).copied().collect();
            self = self.with_column(&format!("f_rest_{k}"), column)?;
        }
        Ok(self)
    }

    pub fn with_state(mut self, state: Vec<u8>) -> Result<Self, ExportError> {
        Self::check_len("state", state.len(), self.num_splats)?;
        self.state = state;
        Ok(self)
    }

    pub fn with_transform_indices(mut self, indices: Vec<u32>) -> Result<Self, ExportError> {
        Self::check_len("transform", indices.len(), self.num_splats)?;
        self.transform = Some(indices);
        Ok(self)
    }

    pub fn with_palette(mut self, palette: TransformPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_world_transform(mut self, world_transform: Mat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_color(mut self, color: ColorAdjustment) -> Self {
        self.color = color;
        self
    }

    pub fn num_splats(&self) -> usize {
        self.num_splats
    }

    pub fn state(&self) -> &[u8] {
        &self.state
    }

    pub fn is_deleted(&self, index: usize) -> bool {
        self.state[index] & state::DELETED != 0
    }

    /// Indices of every splat that isn't deleted, in storage order.
    pub fn live_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_splats).filter(|&i| !self.is_deleted(i))
    }

    pub fn num_live(&self) -> usize {
        self.live_indices().count()
    }

    /// Palette index of a splat, 0 when the source carries no transform column.
    pub fn palette_index(&self, index: usize) -> u32 {
        self.transform.as_ref().map_or(0, |t| t[index])
    }

    pub fn palette(&self) -> &TransformPalette {
        &self.palette
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    pub fn color(&self) -> &ColorAdjustment {
        &self.color
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f32]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn known_column(&self, column: Column) -> Option<&[f32]> {
        self.column(&column.name())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Fail with the first core column this source lacks.
    pub fn require_core_columns(&self) -> Result<(), ExportError> {
        match Column::CORE.iter().find(|c| self.known_column(**c).is_none()) {
            Some(missing) => Err(ExportError::MissingColumn(missing.name())),
            None => Ok(()),
        }
    }

    /// Number of SH bands above band 0 carried by the `f_rest_*` columns.
    ///
    /// Only a full prefix `f_rest_0..` counts, so a partial band rounds down.
    pub fn sh_bands(&self) -> u32 {
        let rest = (0..3 * MAX_REST_PER_CHANNEL)
            .take_while(|k| self.has_column(&format!("f_rest_{k}")))
            .count();
        sh_bands_for_coeffs(rest / 3 + 1)
    }
}
