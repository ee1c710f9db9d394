//! Spherical harmonics rotation for Gaussian splat export.
//!
//! When a splat is rotated, its view-dependent color has to rotate with it,
//! otherwise highlights stay glued to world directions. This crate builds the
//! per-band rotation matrices for a 3D rotation and applies them to SH vectors.
//!
//! # SH Coefficient Layout
//!
//! Coefficients use the real spherical harmonic basis of the 3DGS reference
//! renderer, one vector per color channel:
//! - Band 0 (1 coeff): DC term (rotationally invariant)
//! - Band 1 (3 coeffs): Y₁⁻¹, Y₁⁰, Y₁¹ → proportional to -y, z, -x
//! - Band 2 (5 coeffs): Y₂⁻², Y₂⁻¹, Y₂⁰, Y₂¹, Y₂²
//! - Band 3 (7 coeffs): Y₃⁻³, Y₃⁻², Y₃⁻¹, Y₃⁰, Y₃¹, Y₃², Y₃³
//!
//! The band-1 matrix is read straight off the 3×3 rotation. Bands 2 and 3 are
//! built from it with the Ivanic-Ruedenberg recurrence.

use glam::{Mat3, Quat};

/// Number of coefficients per channel for bands 0 through 3.
pub const SH_COEFFS_MAX: usize = 16;

/// Band-0 basis constant. Stored DC values encode a color `c` as `(c - 0.5) / SH_C0`.
pub const SH_C0: f32 = 0.282_094_8;

/// Number of coefficients per channel for a given band count (0..=3).
pub fn sh_coeffs_for_bands(bands: u32) -> usize {
    ((bands + 1) * (bands + 1)) as usize
}

/// Number of bands encoded by a per-channel coefficient count, DC included.
///
/// Counts that fall between full bands round down.
pub fn sh_bands_for_coeffs(coeffs: usize) -> u32 {
    match coeffs {
        0..4 => 0,
        4..9 => 1,
        9..16 => 2,
        _ => 3,
    }
}

/// Compute the 3×3 rotation matrix for band-1 (l=1) spherical harmonics.
///
/// The l=1 SH rotation is a permuted/signed version of the 3D rotation matrix.
/// The signs carry the Condon-Shortley phase of the basis.
pub fn sh_rotation_matrix_l1(rot: Mat3) -> [[f32; 3]; 3] {
    let r = rot.to_cols_array_2d();
    // r[col][row], so R_{ij} = r[j][i]
    let rm = |row: usize, col: usize| r[col][row];

    [
        [rm(1, 1), -rm(1, 2), rm(1, 0)],
        [-rm(2, 1), rm(2, 2), -rm(2, 0)],
        [rm(0, 1), -rm(0, 2), rm(0, 0)],
    ]
}

/// Build the rotation of band `l = (N - 1) / 2` from band 1 and band `l - 1`.
///
/// `P` is the size of the previous band and must equal `N - 2`.
fn next_band_rotation<const N: usize, const P: usize>(
    r1: &[[f32; 3]; 3],
    r_prev: &[[f32; P]; P],
) -> [[f32; N]; N] {
    debug_assert_eq!(P + 2, N);

    let l = (N as i32 - 1) / 2;
    let band = Band { l, r1, r_prev };
    let mut result = [[0.0f32; N]; N];

    for m in -l..=l {
        for n in -l..=l {
            let (u, v, w) = uvw_coeff(m, n, l);

            let mut val = 0.0;
            if u.abs() > 1e-10 {
                val += u * band.p(0, m, n);
            }
            if v.abs() > 1e-10 {
                val += v * band.v(m, n);
            }
            if w.abs() > 1e-10 {
                val += w * band.w(m, n);
            }

            result[(m + l) as usize][(n + l) as usize] = val;
        }
    }

    result
}

/// Recurrence state for one band: the band-1 matrix and the previous band.
/// Indices are centered, running from -l to l.
struct Band<'a, const P: usize> {
    l: i32,
    r1: &'a [[f32; 3]; 3],
    r_prev: &'a [[f32; P]; P],
}

impl<const P: usize> Band<'_, P> {
    fn r1(&self, i: i32, j: i32) -> f32 {
        self.r1[(i + 1) as usize][(j + 1) as usize]
    }

    fn prev(&self, i: i32, j: i32) -> f32 {
        let l_prev = self.l - 1;
        let row = i + l_prev;
        let col = j + l_prev;
        if row >= 0 && row < P as i32 && col >= 0 && col < P as i32 {
            self.r_prev[row as usize][col as usize]
        } else {
            0.0
        }
    }

    fn p(&self, i: i32, a: i32, b: i32) -> f32 {
        let l = self.l;
        if b == l {
            self.r1(i, 1) * self.prev(a, l - 1) - self.r1(i, -1) * self.prev(a, -l + 1)
        } else if b == -l {
            self.r1(i, 1) * self.prev(a, -l + 1) + self.r1(i, -1) * self.prev(a, l - 1)
        } else {
            self.r1(i, 0) * self.prev(a, b)
        }
    }

    fn v(&self, m: i32, n: i32) -> f32 {
        if m == 0 {
            self.p(1, 1, n) + self.p(-1, -1, n)
        } else if m > 0 {
            let d = if m == 1 { 1.0_f32 } else { 0.0_f32 };
            self.p(1, m - 1, n) * (1.0 + d).sqrt() - self.p(-1, -m + 1, n) * (1.0 - d)
        } else {
            let d = if m == -1 { 1.0_f32 } else { 0.0_f32 };
            self.p(1, m + 1, n) * (1.0 - d) + self.p(-1, -m - 1, n) * (1.0 + d).sqrt()
        }
    }

    fn w(&self, m: i32, n: i32) -> f32 {
        if m == 0 {
            0.0
        } else if m > 0 {
            self.p(1, m + 1, n) + self.p(-1, -m - 1, n)
        } else {
            self.p(1, m - 1, n) - self.p(-1, -m + 1, n)
        }
    }
}

/// Compute the UVW weights of the recurrence.
fn uvw_coeff(m: i32, n: i32, l: i32) -> (f32, f32, f32) {
    let d = if m == 0 { 1.0_f32 } else { 0.0_f32 };
    let abs_m = m.abs() as f32;
    let lf = l as f32;
    let mf = m as f32;
    let nf = n as f32;

    let denom = if n.abs() == l {
        2.0 * lf * (2.0 * lf - 1.0)
    } else {
        (lf + nf) * (lf - nf)
    };

    let u = ((lf + mf) * (lf - mf) / denom).sqrt();
    let v = 0.5 * ((1.0 + d) * (lf + abs_m - 1.0) * (lf + abs_m) / denom).sqrt() * (1.0 - 2.0 * d);
    let w = -0.5 * ((lf - abs_m - 1.0).max(0.0) * (lf - abs_m) / denom).sqrt() * (1.0 - d);

    (u, v, w)
}

/// Precomputed rotation matrices for bands 1 to 3 of one rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ShRotation {
    /// 3×3 rotation matrix for l=1
    pub l1: [[f32; 3]; 3],
    /// 5×5 rotation matrix for l=2
    pub l2: [[f32; 5]; 5],
    /// 7×7 rotation matrix for l=3
    pub l3: [[f32; 7]; 7],
}

impl ShRotation {
    pub fn identity() -> Self {
        Self::from_mat3(Mat3::IDENTITY)
    }

    /// Compute rotation matrices for all bands from a quaternion.
    pub fn from_quat(quat: Quat) -> Self {
        Self::from_mat3(Mat3::from_quat(quat.normalize()))
    }

    /// Compute rotation matrices for all bands from a 3×3 rotation matrix.
    ///
    /// The matrix must be orthonormal; strip any scale before calling this.
    pub fn from_mat3(rot: Mat3) -> Self {
        let l1 = sh_rotation_matrix_l1(rot);
        let l2 = next_band_rotation(&l1, &l1);
        let l3 = next_band_rotation(&l1, &l2);
        Self { l1, l2, l3 }
    }

    /// Rotate one channel's coefficients from `src` into `dst`.
    ///
    /// `src[0]` is the DC term. Rotation stops early when `src` is too short
    /// to hold the next band: fewer than 4 values copies band 0 only, fewer than
    /// 9 stops after band 1 and fewer than 16 stops after band 2. Anything past
    /// the last complete band is left untouched in `dst`.
    pub fn rotate(&self, dst: &mut [f32], src: &[f32]) {
        debug_assert!(dst.len() >= src.len());

        if src.is_empty() {
            return;
        }
        dst[0] = src[0];

        if src.len() < 4 {
            return;
        }
        rotate_band(&mut dst[1..4], &src[1..4], &self.l1);

        if src.len() < 9 {
            return;
        }
        rotate_band(&mut dst[4..9], &src[4..9], &self.l2);

        if src.len() < 16 {
            return;
        }
        rotate_band(&mut dst[9..16], &src[9..16], &self.l3);
    }

    /// Rotate one channel's coefficients in place, with the same early exits
    /// as [`ShRotation::rotate`].
    pub fn rotate_in_place(&self, coeffs: &mut [f32]) {
        let len = coeffs.len().min(SH_COEFFS_MAX);
        let mut input = [0.0f32; SH_COEFFS_MAX];
        input[..len].copy_from_slice(&coeffs[..len]);
        self.rotate(&mut coeffs[..len], &input[..len]);
    }
}

/// Apply a band rotation matrix to one band.
fn rotate_band<const N: usize>(dst: &mut [f32], src: &[f32], matrix: &[[f32; N]; N]) {
    debug_assert_eq!(src.len(), N);

    for (out, row) in dst.iter_mut().zip(matrix) {
        *out = row.iter().zip(src).map(|(m, s)| m * s).sum();
    }
}

/// Rotate spherical harmonic coefficients in-place.
///
/// # Arguments
/// * `sh_coeffs` - Flattened SH coefficients in planar layout:
///   `[N, 3, coeffs_per_channel]`, where 3 is the RGB channels.
///   Each Gaussian has `3 * coeffs_per_channel` consecutive floats.
/// * `sh_bands` - The number of SH bands (0-3).
/// * `rotation` - The rotation quaternion to apply.
pub fn rotate_sh_coefficients_in_place(sh_coeffs: &mut [f32], sh_bands: u32, rotation: Quat) {
    if sh_bands == 0 {
        return;
    }

    let rotation = ShRotation::from_quat(rotation);
    let coeffs_per_channel = sh_coeffs_for_bands(sh_bands.min(3));

    for channel in sh_coeffs.chunks_exact_mut(coeffs_per_channel) {
        rotation.rotate_in_place(channel);
    }
}
