use glam::Vec3;
use serde::{Deserialize, Serialize};
use splat_sh_utils::SH_C0;

/// Per-entity color grading applied while exporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorAdjustment {
    /// Added to the decoded base color.
    pub ambient: Vec3,
    /// Multiplies the decoded base color and every rest SH coefficient.
    pub tint: Vec3,
    pub brightness: f32,
}

impl Default for ColorAdjustment {
    fn default() -> Self {
        Self {
            ambient: Vec3::ZERO,
            tint: Vec3::ONE,
            brightness: 1.0,
        }
    }
}

impl ColorAdjustment {
    pub fn is_identity(&self) -> bool {
        self.ambient == Vec3::ZERO && self.tint == Vec3::ONE && self.brightness == 1.0
    }

    /// Apply the adjustment to one splat's DC color and, optionally, its
    /// channel-major rest coefficients (`rest_per_channel` values per channel).
    pub fn apply_tint(&self, dc: &mut [f32; 3], rest: &mut [f32], rest_per_channel: usize) {
        if self.is_identity() {
            return;
        }

        let gain = self.tint * self.brightness;
        for c in 0..3 {
            let decoded = dc[c] * SH_C0 + 0.5;
            let adjusted = self.ambient[c] + decoded * gain[c];
            dc[c] = (adjusted - 0.5) / SH_C0;
        }

        if rest_per_channel > 0 {
            for (c, channel) in rest.chunks_exact_mut(rest_per_channel).take(3).enumerate() {
                channel.iter_mut().for_each(|v| *v *= gain[c]);
            }
        }
    }
}
