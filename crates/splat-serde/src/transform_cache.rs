use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3, Vec4};
use splat_sh_utils::ShRotation;

use crate::source::SplatSource;

/// Scenes are rotated 180° about Z when loaded. Exports undo that turn so files
/// come back out in the orientation they were read in.
pub const LOAD_TIME_AXIS_CORRECTION: Mat4 = Mat4::from_cols(
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -1.0, 0.0, 0.0),
    Vec4::Z,
    Vec4::W,
);

/// Everything a writer needs to move one splat from source space to export space.
#[derive(Debug, Clone)]
pub struct TransformEntry {
    pub matrix: Mat4,
    pub rotation: Quat,
    pub scale: Vec3,
    pub sh_rotation: ShRotation,
}

impl TransformEntry {
    fn new(matrix: Mat4) -> Self {
        let (scale, rotation, _) = matrix.to_scale_rotation_translation();
        let rotation = rotation.normalize();
        Self {
            matrix,
            rotation,
            scale,
            sh_rotation: ShRotation::from_quat(rotation),
        }
    }
}

/// Export-scoped memo of the combined transform for each palette index a
/// source's splats use.
pub struct TransformCache<'a> {
    source: &'a SplatSource,
    entries: HashMap<u32, TransformEntry>,
}

impl<'a> TransformCache<'a> {
    pub fn new(source: &'a SplatSource) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    /// The resolved transform of one splat, computed the first time its
    /// palette index is seen.
    pub fn entry(&mut self, splat_index: usize) -> &TransformEntry {
        let source = self.source;
        let index = source.palette_index(splat_index);
        self.entries.entry(index).or_insert_with(|| {
            let mut matrix = LOAD_TIME_AXIS_CORRECTION * source.world_transform();
            if index > 0 {
                matrix *= source.palette().get(index);
            }
            TransformEntry::new(matrix)
        })
    }

    pub fn matrix_for(&mut self, splat_index: usize) -> Mat4 {
        self.entry(splat_index).matrix
    }

    pub fn rotation_for(&mut self, splat_index: usize) -> Quat {
        self.entry(splat_index).rotation
    }

    pub fn scale_for(&mut self, splat_index: usize) -> Vec3 {
        self.entry(splat_index).scale
    }

    pub fn sh_rotation_for(&mut self, splat_index: usize) -> &ShRotation {
        &self.entry(splat_index).sh_rotation
    }

    /// Number of distinct palette entries resolved so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TransformPalette;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_correction_is_half_turn_about_z() {
        let expected = Mat4::from_quat(Quat::from_rotation_z(PI));
        for (a, b) in LOAD_TIME_AXIS_CORRECTION
            .to_cols_array()
            .iter()
            .zip(expected.to_cols_array())
        {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        }
        assert_eq!(
            LOAD_TIME_AXIS_CORRECTION * LOAD_TIME_AXIS_CORRECTION,
            Mat4::IDENTITY
        );
    }

    #[test]
    fn test_identity_entity_applies_correction() {
        let source = SplatSource::new(1);
        let mut cache = TransformCache::new(&source);
        let p = cache
            .matrix_for(0)
            .transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p, Vec3::new(-1.0, -2.0, 3.0));
        assert_relative_eq!(cache.scale_for(0).x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_entries_memoized_per_palette_index() {
        let mut palette = TransformPalette::new();
        let lifted = palette.push(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let scaled = palette.push(Mat4::from_scale(Vec3::new(2.0, 3.0, 4.0)));

        let source = SplatSource::new(5)
            .with_palette(palette)
            .with_transform_indices(vec![0, lifted, lifted, scaled, 9])
            .unwrap();

        let mut cache = TransformCache::new(&source);
        for i in 0..5 {
            cache.entry(i);
        }
        // 0, 1, 2 and the unknown index 9.
        assert_eq!(cache.len(), 4);

        assert_eq!(cache.matrix_for(1).w_axis.z, 5.0);

        let scale = cache.scale_for(3);
        assert_relative_eq!(scale.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(scale.y, 3.0, epsilon = 1e-5);
        assert_relative_eq!(scale.z, 4.0, epsilon = 1e-5);

        // Unknown palette entries fall back to identity.
        assert_eq!(cache.matrix_for(4), cache.matrix_for(0));
    }

    #[test]
    fn test_palette_applies_after_entity() {
        let mut palette = TransformPalette::new();
        let index = palette.push(Mat4::from_translation(Vec3::X));
        let source = SplatSource::new(1)
            .with_world_transform(Mat4::from_scale(Vec3::splat(2.0)))
            .with_palette(palette)
            .with_transform_indices(vec![index])
            .unwrap();

        let mut cache = TransformCache::new(&source);
        let p = cache.matrix_for(0).transform_point3(Vec3::ZERO);
        // Palette first moves to x = 1, the entity doubles it, then the correction flips it.
        assert_relative_eq!(p.x, -2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sh_rotation_matches_rotation() {
        let source =
            SplatSource::new(1).with_world_transform(Mat4::from_rotation_y(0.8));
        let mut cache = TransformCache::new(&source);
        let rotation = cache.rotation_for(0);
        assert_eq!(*cache.sh_rotation_for(0), ShRotation::from_quat(rotation));
    }
}
