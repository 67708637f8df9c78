//! Unit dual quaternion math
//!
//! A unit dual quaternion encodes a rigid rotation+translation in eight
//! parameters: a unit quaternion `real` part and a `dual` part carrying
//! the translation. Unlike separately interpolated rotation/translation
//! pairs it supports screw-linear interpolation (sclerp), which blends
//! along the screw axis of the relative motion.
//!
//! Used by the skeleton builder (bind poses), the animation resampler
//! (per-frame samples) and the keyframe compressor (difference
//! transforms).

use glam::{Mat3, Mat4, Quat, Vec3};

/// Rotations closer than this to identity are interpolated linearly.
const SCLERP_EPSILON: f32 = 1e-6;

/// A unit dual quaternion: `real` encodes rotation, `dual` encodes
/// translation as `0.5 * t * real`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl Default for DualQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    pub const fn new(real: Quat, dual: Quat) -> Self {
        Self { real, dual }
    }

    /// Build from a unit rotation quaternion and a translation vector.
    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        let t = Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
        Self {
            real: rotation,
            dual: (t * rotation) * 0.5,
        }
    }

    /// Decompose an affine matrix into a unit dual quaternion plus a
    /// uniform scale (the X component of the decomposed scale).
    ///
    /// A reflection (negative basis determinant) is handled by flipping
    /// the third basis vector and tracking the flip sign; if the flip
    /// disagrees with the sign of the rotation's scalar part, both parts
    /// are negated so the double cover matches the reflection parity.
    pub fn from_mat4(mat: Mat4) -> (Self, f32) {
        let mut m = mat;
        let mut flip = 1.0f32;
        if Mat3::from_mat4(m).determinant() < 0.0 {
            m.z_axis = -m.z_axis;
            flip = -1.0;
        }

        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        let mut dq = Self::from_rotation_translation(rotation, translation);

        let w_sign = if rotation.w < 0.0 { -1.0 } else { 1.0 };
        if flip * w_sign < 0.0 {
            dq = -dq;
        }

        (dq, scale.x)
    }

    /// Translation encoded in the dual part.
    #[inline]
    pub fn translation(&self) -> Vec3 {
        let t = (self.dual * 2.0) * self.real.conjugate();
        Vec3::new(t.x, t.y, t.z)
    }

    /// Inverse of a unit dual quaternion (quaternion conjugate of both
    /// parts).
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            real: self.real.conjugate(),
            dual: self.dual.conjugate(),
        }
    }

    /// Composition: `self * rhs` applies `rhs` first, then `self`.
    #[inline]
    pub fn mul(&self, rhs: Self) -> Self {
        Self {
            real: self.real * rhs.real,
            dual: self.real * rhs.dual + self.dual * rhs.real,
        }
    }

    /// Negate both parts if the real scalar part is negative, picking the
    /// canonical hemisphere of the double cover.
    #[inline]
    pub fn canonicalized(self) -> Self {
        if self.real.w < 0.0 {
            -self
        } else {
            self
        }
    }

    /// Screw-linear interpolation from `self` to `to` by `t` in [0, 1].
    ///
    /// Takes the shortest path (flips `to` when the real parts point into
    /// opposite hemispheres), extracts the screw parameters of the
    /// relative transform, scales them by `t` and re-composes.
    pub fn sclerp(&self, to: Self, t: f32) -> Self {
        let to = if self.real.dot(to.real) < 0.0 { -to } else { to };
        let diff = self.inverse().mul(to);

        let vr = Vec3::new(diff.real.x, diff.real.y, diff.real.z);
        let vr_len = vr.length();
        if vr_len < SCLERP_EPSILON {
            // Pure translation: the screw axis is at infinity, so scale
            // the translation part directly.
            let step = Self {
                real: Quat::IDENTITY,
                dual: diff.dual * t,
            };
            return self.mul(step);
        }

        let inv_vr = 1.0 / vr_len;
        let angle = 2.0 * diff.real.w.clamp(-1.0, 1.0).acos();
        let pitch = -2.0 * diff.dual.w * inv_vr;
        let direction = vr * inv_vr;
        let moment = (Vec3::new(diff.dual.x, diff.dual.y, diff.dual.z)
            - direction * (pitch * diff.real.w * 0.5))
            * inv_vr;

        let (sin_half, cos_half) = (0.5 * angle * t).sin_cos();
        let real = Quat::from_xyzw(
            direction.x * sin_half,
            direction.y * sin_half,
            direction.z * sin_half,
            cos_half,
        );
        let d = moment * sin_half + direction * (0.5 * pitch * t * cos_half);
        let dual = Quat::from_xyzw(d.x, d.y, d.z, -(0.5 * pitch * t) * sin_half);

        self.mul(Self { real, dual })
    }
}

impl std::ops::Neg for DualQuat {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            real: -self.real,
            dual: -self.dual,
        }
    }
}

/// Encode an orthonormal tangent frame as a single rotation quaternion.
///
/// The quaternion rotates the reference basis so that X maps to the
/// tangent, Y to the bitangent and Z to the normal. The handedness of the
/// supplied binormal rides on the sign of the scalar part, which is kept
/// clear of zero so the sign survives 8-bit quantization.
pub fn tangent_frame_to_quat(tangent: Vec3, binormal: Vec3, normal: Vec3) -> Quat {
    let bitangent = normal.cross(tangent);
    let handedness = if bitangent.dot(binormal) < 0.0 { -1.0 } else { 1.0 };

    let m = Mat3::from_cols(tangent, bitangent.normalize_or_zero(), normal);
    let mut q = Quat::from_mat3(&m).normalize();

    // Smallest representable w at 8 bits per channel
    const BIAS: f32 = 1.0 / 127.0;
    if q.w.abs() < BIAS {
        let renorm = (1.0 - BIAS * BIAS).sqrt();
        q = Quat::from_xyzw(
            q.x * renorm,
            q.y * renorm,
            q.z * renorm,
            if q.w >= 0.0 { BIAS } else { -BIAS },
        );
    }

    if q.w * handedness < 0.0 {
        q = -q;
    }
    q
}
