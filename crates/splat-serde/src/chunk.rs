//! Quantized 256-splat chunks of the compressed PLY layout.
//!
//! Every chunk stores position and scale bounds as 12 floats. Each splat is
//! four `u32`s:
//! - position: x/y/z normalized to the chunk bounds at 11/10/11 bits
//! - rotation: smallest-three quaternion, 2-bit index plus 3×10 bits
//! - scale: like position, over `exp(log_scale)`
//! - color: RGBA at 8 bits each, base color decoded from SH and opacity through a sigmoid

use std::f32::consts::FRAC_1_SQRT_2;

use glam::{Quat, Vec3, Vec4};
use splat_sh_utils::SH_C0;

use crate::record::SplatRecord;

pub const CHUNK_SIZE: usize = 256;

/// Log scales are clamped to this range before exponentiating.
const LOG_SCALE_LIMIT: f32 = 20.0;

/// Bound ranges narrower than this normalize to 0.
const MIN_RANGE: f32 = 1e-5;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Map `x` into `0..=1` over `[min, max]`.
pub fn normalize(x: f32, min: f32, max: f32) -> f32 {
    if x <= min {
        0.0
    } else if x >= max {
        1.0
    } else if max - min < MIN_RANGE {
        0.0
    } else {
        (x - min) / (max - min)
    }
}

/// Quantize a `0..=1` value to `bits` bits.
pub fn pack_unorm(value: f32, bits: u32) -> u32 {
    let t = ((1u32 << bits) - 1) as f32;
    (value * t).round().clamp(0.0, t) as u32
}

pub fn unpack_unorm(value: u32, bits: u32) -> f32 {
    let t = (1u32 << bits) - 1;
    (value & t) as f32 / t as f32
}

pub fn pack_111011(v: Vec3) -> u32 {
    (pack_unorm(v.x, 11) << 21) | (pack_unorm(v.y, 10) << 11) | pack_unorm(v.z, 11)
}

pub fn unpack_111011(value: u32) -> Vec3 {
    Vec3::new(
        unpack_unorm(value >> 21, 11),
        unpack_unorm(value >> 11, 10),
        unpack_unorm(value, 11),
    )
}

pub fn pack_8888(v: Vec4) -> u32 {
    (pack_unorm(v.x, 8) << 24)
        | (pack_unorm(v.y, 8) << 16)
        | (pack_unorm(v.z, 8) << 8)
        | pack_unorm(v.w, 8)
}

pub fn unpack_8888(value: u32) -> Vec4 {
    Vec4::new(
        unpack_unorm(value >> 24, 8),
        unpack_unorm(value >> 16, 8),
        unpack_unorm(value >> 8, 8),
        unpack_unorm(value, 8),
    )
}

/// Smallest-three packing of a rotation.
///
/// Components are taken in `[w, x, y, z]` order. The largest one is dropped and
/// its index kept in the top two bits; the quaternion is negated first when
/// that component is negative, so it can be rebuilt as a positive square root.
pub fn pack_rotation(q: Quat) -> u32 {
    let q = q.normalize();
    let a = [q.w, q.x, q.y, q.z];

    let mut largest = 0;
    for i in 1..4 {
        if a[i].abs() > a[largest].abs() {
            largest = i;
        }
    }
    let sign = if a[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut result = largest as u32;
    for (i, v) in a.iter().enumerate() {
        if i != largest {
            result = (result << 10) | pack_unorm(v * sign * FRAC_1_SQRT_2 + 0.5, 10);
        }
    }
    result
}

/// Inverse of [`pack_rotation`]; the result has a non-negative dropped component.
pub fn unpack_rotation(value: u32) -> Quat {
    let largest = (value >> 30) as usize;
    let norm = std::f32::consts::SQRT_2;

    let mut a = [0.0f32; 4];
    let mut shift: i32 = 20;
    for (i, slot) in a.iter_mut().enumerate() {
        if i != largest {
            *slot = (unpack_unorm(value >> shift, 10) - 0.5) * norm;
            shift -= 10;
        }
    }
    let sum: f32 = a.iter().map(|v| v * v).sum();
    a[largest] = (1.0 - sum).max(0.0).sqrt();

    Quat::from_xyzw(a[1], a[2], a[3], a[0])
}

/// Position and scale bounds of one chunk, in file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub min_scale: Vec3,
    pub max_scale: Vec3,
}

impl ChunkBounds {
    pub fn to_floats(&self) -> [f32; 12] {
        let mut out = [0.0; 12];
        for (dst, v) in out
            .chunks_exact_mut(3)
            .zip([self.min, self.max, self.min_scale, self.max_scale])
        {
            dst.copy_from_slice(&v.to_array());
        }
        out
    }

    pub fn from_floats(f: &[f32; 12]) -> Self {
        Self {
            min: Vec3::new(f[0], f[1], f[2]),
            max: Vec3::new(f[3], f[4], f[5]),
            min_scale: Vec3::new(f[6], f[7], f[8]),
            max_scale: Vec3::new(f[9], f[10], f[11]),
        }
    }
}

/// Staging buffer for one chunk, reused from block to block.
pub struct Chunk {
    position: Vec<Vec3>,
    rotation: Vec<Quat>,
    scale: Vec<Vec3>,
    color: Vec<Vec4>,

    pub packed_position: Vec<u32>,
    pub packed_rotation: Vec<u32>,
    pub packed_scale: Vec<u32>,
    pub packed_color: Vec<u32>,
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            position: vec![Vec3::ZERO; CHUNK_SIZE],
            rotation: vec![Quat::IDENTITY; CHUNK_SIZE],
            scale: vec![Vec3::ZERO; CHUNK_SIZE],
            color: vec![Vec4::ZERO; CHUNK_SIZE],
            packed_position: vec![0; CHUNK_SIZE],
            packed_rotation: vec![0; CHUNK_SIZE],
            packed_scale: vec![0; CHUNK_SIZE],
            packed_color: vec![0; CHUNK_SIZE],
        }
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a transformed splat into `slot`.
    pub fn set(&mut self, slot: usize, record: &SplatRecord) {
        self.position[slot] = record.position;
        self.rotation[slot] = record.rotation;
        let s = record
            .log_scale
            .clamp(Vec3::splat(-LOG_SCALE_LIMIT), Vec3::splat(LOG_SCALE_LIMIT));
        self.scale[slot] = Vec3::new(s.x.exp(), s.y.exp(), s.z.exp());

        let [r, g, b] = record.f_dc.map(|c| c * SH_C0 + 0.5);
        self.color[slot] = Vec4::new(r, g, b, sigmoid(record.opacity));
    }

    /// Quantize the first `count` slots and return the bounds they were
    /// normalized against.
    pub fn pack(&mut self, count: usize) -> ChunkBounds {
        let count = count.min(CHUNK_SIZE);
        let positions = &self.position[..count];
        let scales = &self.scale[..count];

        let bounds_of = |values: &[Vec3]| {
            values.iter().fold(
                (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
                |(min, max), v| (min.min(*v), max.max(*v)),
            )
        };
        let (min, max) = bounds_of(positions);
        let (min_scale, max_scale) = bounds_of(scales);

        let norm3 = |v: Vec3, min: Vec3, max: Vec3| {
            Vec3::new(
                normalize(v.x, min.x, max.x),
                normalize(v.y, min.y, max.y),
                normalize(v.z, min.z, max.z),
            )
        };

        for i in 0..count {
            self.packed_position[i] = pack_111011(norm3(self.position[i], min, max));
            self.packed_rotation[i] = pack_rotation(self.rotation[i]);
            self.packed_scale[i] = pack_111011(norm3(self.scale[i], min_scale, max_scale));
            self.packed_color[i] = pack_8888(self.color[i]);
        }

        if count == 0 {
            return ChunkBounds {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
                min_scale: Vec3::ZERO,
                max_scale: Vec3::ZERO,
            };
        }

        ChunkBounds {
            min,
            max,
            min_scale,
            max_scale,
        }
    }
}
