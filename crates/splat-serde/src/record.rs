use glam::{Quat, Vec3};
use splat_sh_utils::{SH_COEFFS_MAX, sh_bands_for_coeffs, sh_coeffs_for_bands};

use crate::source::{Column, MAX_REST_PER_CHANNEL, SplatSource};
use crate::transform_cache::{TransformCache, TransformEntry};

/// One splat after transform, tint and SH rotation, in the units the source
/// stores: log scale, raw opacity logit and SH-encoded color.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatRecord {
    pub position: Vec3,
    pub rotation: Quat,
    pub log_scale: Vec3,
    pub f_dc: [f32; 3],
    pub opacity: f32,
    /// Channel-major rest coefficients, `rest_per_channel` per channel.
    pub rest: [f32; 3 * MAX_REST_PER_CHANNEL],
    pub rest_per_channel: usize,
}

impl SplatRecord {
    pub fn rest_channel(&self, channel: usize) -> &[f32] {
        let n = self.rest_per_channel;
        &self.rest[channel * n..(channel + 1) * n]
    }
}

/// Reads splats of one source into export space.
///
/// Missing core columns read as neutral values (origin, identity rotation,
/// unit scale, mid gray, zero logit).
pub struct SplatReader<'a> {
    source: &'a SplatSource,
    cache: TransformCache<'a>,
    core: [Option<&'a [f32]>; 14],
    rest: Vec<&'a [f32]>,
    rest_per_channel: usize,
}

impl<'a> SplatReader<'a> {
    /// A reader that also rotates and tints `rest_per_channel` rest
    /// coefficients per channel. Pass 0 to skip rest SH entirely.
    pub fn new(source: &'a SplatSource, rest_per_channel: usize) -> Self {
        let core = Column::CORE.map(|c| source.known_column(c));

        // Only full bands the source actually has.
        let available = source.sh_bands();
        let bands = sh_bands_for_coeffs(rest_per_channel + 1).min(available);
        let rest_per_channel = sh_coeffs_for_bands(bands) - 1;

        let source_per_channel = sh_coeffs_for_bands(available) - 1;
        let rest = (0..3)
            .flat_map(|c| (0..rest_per_channel).map(move |k| c * source_per_channel + k))
            .filter_map(|k| source.column(&format!("f_rest_{k}")))
            .collect();

        Self {
            source,
            cache: TransformCache::new(source),
            core,
            rest,
            rest_per_channel,
        }
    }

    pub fn rest_per_channel(&self) -> usize {
        self.rest_per_channel
    }

    pub fn transform(&mut self, index: usize) -> &TransformEntry {
        self.cache.entry(index)
    }

    fn core(&self, field: usize, index: usize, default: f32) -> f32 {
        self.core[field].map_or(default, |c| c[index])
    }

    fn raw_position(&self, index: usize) -> Vec3 {
        Vec3::new(
            self.core(0, index, 0.0),
            self.core(1, index, 0.0),
            self.core(2, index, 0.0),
        )
    }

    /// Log scale as stored, before any transform scale is folded in.
    pub fn raw_log_scale(&self, index: usize) -> Vec3 {
        Vec3::new(
            self.core(3, index, 0.0),
            self.core(4, index, 0.0),
            self.core(5, index, 0.0),
        )
    }

    fn raw_rotation(&self, index: usize) -> Quat {
        // Stored as rot_0 = w, rot_1..3 = xyz.
        Quat::from_xyzw(
            self.core(7, index, 0.0),
            self.core(8, index, 0.0),
            self.core(9, index, 0.0),
            self.core(6, index, 1.0),
        )
    }

    /// World-space center of a splat.
    pub fn position(&mut self, index: usize) -> Vec3 {
        let raw = self.raw_position(index);
        self.cache.entry(index).matrix.transform_point3(raw)
    }

    pub fn read(&mut self, index: usize) -> SplatRecord {
        let raw_position = self.raw_position(index);
        let raw_rotation = self.raw_rotation(index);
        let raw_log_scale = self.raw_log_scale(index);

        let mut f_dc = [
            self.core(10, index, 0.0),
            self.core(11, index, 0.0),
            self.core(12, index, 0.0),
        ];
        let opacity = self.core(13, index, 0.0);

        let n = self.rest_per_channel;
        let mut rest = [0.0; 3 * MAX_REST_PER_CHANNEL];
        for (dst, column) in rest.iter_mut().zip(&self.rest) {
            *dst = column[index];
        }

        let source = self.source;
        source.color().apply_tint(&mut f_dc, &mut rest[..3 * n], n);

        let entry = self.cache.entry(index);
        let position = entry.matrix.transform_point3(raw_position);
        let rotation = (entry.rotation * raw_rotation).normalize();
        let scale = entry.scale.abs();
        let log_scale = raw_log_scale + Vec3::new(scale.x.ln(), scale.y.ln(), scale.z.ln());

        if n > 0 {
            let mut scratch = [0.0f32; SH_COEFFS_MAX];
            for channel in rest[..3 * n].chunks_exact_mut(n) {
                scratch[0] = 0.0;
                scratch[1..=n].copy_from_slice(channel);
                entry.sh_rotation.rotate_in_place(&mut scratch[..=n]);
                channel.copy_from_slice(&scratch[1..=n]);
            }
        }

        SplatRecord {
            position,
            rotation,
            log_scale,
            f_dc,
            opacity,
            rest,
            rest_per_channel: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_source;
    use crate::tint::ColorAdjustment;
    use crate::transform_cache::LOAD_TIME_AXIS_CORRECTION;
    use approx::assert_relative_eq;
    use glam::Mat4;

    #[test]
    fn test_corrected_entity_reads_raw_values() {
        let source = create_test_source(3, 2).with_world_transform(LOAD_TIME_AXIS_CORRECTION);
        let mut reader = SplatReader::new(&source, 15);

        for i in 0..2 {
            let record = reader.read(i);
            let offset = i as f32;
            assert_eq!(record.position, Vec3::new(offset, offset + 1.0, offset + 2.0));
            assert_relative_eq!(record.rotation.w, 1.0, epsilon = 1e-6);
            assert_relative_eq!(record.log_scale.x, -0.1 + offset * 0.05, epsilon = 1e-6);
            assert_relative_eq!(record.log_scale.z, -0.3 + offset * 0.05, epsilon = 1e-6);
            assert_eq!(record.opacity, source.column("opacity").unwrap()[i]);
            assert_eq!(record.rest_per_channel, 15);
            for k in 0..45 {
                let raw = source.column(&format!("f_rest_{k}")).unwrap()[i];
                assert_relative_eq!(record.rest[k], raw, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_default_entity_flips_x_and_y() {
        let source = create_test_source(0, 1);
        let mut reader = SplatReader::new(&source, 0);
        assert_eq!(reader.read(0).position, Vec3::new(-0.0, -1.0, 2.0));
    }

    #[test]
    fn test_entity_scale_folds_into_log_scale() {
        let source = create_test_source(0, 1).with_world_transform(
            LOAD_TIME_AXIS_CORRECTION * Mat4::from_scale(Vec3::new(2.0, 1.0, 0.5)),
        );
        let mut reader = SplatReader::new(&source, 0);
        let record = reader.read(0);
        assert_relative_eq!(record.log_scale.x, -0.1 + 2.0f32.ln(), epsilon = 1e-5);
        assert_relative_eq!(record.log_scale.y, 0.2, epsilon = 1e-5);
        assert_relative_eq!(record.log_scale.z, -0.3 + 0.5f32.ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_applies_to_orientation_and_sh() {
        let turn = Quat::from_rotation_y(0.9);
        let source = create_test_source(2, 1)
            .with_world_transform(LOAD_TIME_AXIS_CORRECTION * Mat4::from_quat(turn));
        let mut reader = SplatReader::new(&source, 8);
        let record = reader.read(0);

        assert!(record.rotation.abs_diff_eq(turn, 1e-5));

        let rotation = splat_sh_utils::ShRotation::from_quat(turn);
        for channel in 0..3 {
            let mut expected = [0.0f32; 9];
            for k in 0..8 {
                expected[k + 1] = source.column(&format!("f_rest_{}", channel * 8 + k)).unwrap()[0];
            }
            rotation.rotate_in_place(&mut expected);
            for (a, b) in record.rest_channel(channel).iter().zip(&expected[1..]) {
                assert_relative_eq!(*a, *b, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_rest_truncates_to_requested_bands() {
        let source = create_test_source(3, 1).with_world_transform(LOAD_TIME_AXIS_CORRECTION);
        let mut reader = SplatReader::new(&source, 3);
        let record = reader.read(0);

        assert_eq!(record.rest_per_channel, 3);
        // Green band 1 starts at f_rest_15 in the source layout.
        for k in 0..3 {
            let raw = source.column(&format!("f_rest_{}", 15 + k)).unwrap()[0];
            assert_relative_eq!(record.rest_channel(1)[k], raw, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_more_bands_than_source_has() {
        let source = create_test_source(1, 1);
        let reader = SplatReader::new(&source, 15);
        assert_eq!(reader.rest_per_channel(), 3);
    }

    #[test]
    fn test_tint_reaches_record() {
        let source = create_test_source(1, 1)
            .with_world_transform(LOAD_TIME_AXIS_CORRECTION)
            .with_color(ColorAdjustment {
                brightness: 2.0,
                ..Default::default()
            });
        let mut reader = SplatReader::new(&source, 3);
        let record = reader.read(0);
        let raw_rest = source.column("f_rest_0").unwrap()[0];
        assert_relative_eq!(record.rest[0], raw_rest * 2.0, epsilon = 1e-5);
        assert_ne!(record.f_dc[0], source.column("f_dc_0").unwrap()[0]);
    }

    #[test]
    fn test_missing_columns_read_neutral() {
        let source = SplatSource::new(1)
            .with_column("x", vec![3.0])
            .unwrap()
            .with_world_transform(LOAD_TIME_AXIS_CORRECTION);
        let mut reader = SplatReader::new(&source, 0);
        let record = reader.read(0);
        assert_eq!(record.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(record.rotation, Quat::IDENTITY);
        assert_eq!(record.f_dc, [0.0; 3]);
    }
}
