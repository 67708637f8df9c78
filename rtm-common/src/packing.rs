//! Vertex attribute quantization
//!
//! Provides functions to convert f32 vertex data to the packed formats
//! the merged GPU buffers use:
//! - positions/texcoords → snorm16 against a per-mesh bounding box
//! - normals and tangent-frame quaternions → unorm8 channels of a u32
//! - blend weights/indices → unorm8 + u8, four influences per vertex
//!
//! Shared by the converter (write side) and loaders (read side).

use glam::{Quat, Vec3};

/// Maximum number of joint influences kept per vertex.
pub const MAX_BLEND_INFLUENCES: usize = 4;

// ============================================================================
// Bounded snorm16 (positions, texcoords)
// ============================================================================

/// Quantize a value inside `[center - extent, center + extent]` to the
/// full i16 range.
///
/// A degenerate axis (zero extent) maps to the midpoint rather than
/// dividing by zero.
#[inline]
pub fn pack_bounded_snorm16(value: f32, center: f32, extent: f32) -> i16 {
    let normalized = if extent > 0.0 {
        (value - center) / extent * 0.5 + 0.5
    } else {
        0.5
    };
    (normalized * 65535.0 - 32768.0)
        .round()
        .clamp(-32768.0, 32767.0) as i16
}

/// Recover the original value within `extent / 32768` per axis.
#[inline]
pub fn unpack_bounded_snorm16(packed: i16, center: f32, extent: f32) -> f32 {
    ((packed as f32 + 32768.0) / 65535.0 * 2.0 - 1.0) * extent + center
}

// ============================================================================
// Unorm8 channel packing (normals, tangent-frame quaternions)
// ============================================================================

/// Map a value in [-1, 1] to [0, 255].
#[inline]
pub fn f32_to_unorm8_biased(value: f32) -> u8 {
    ((value * 0.5 + 0.5) * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

/// Pack a unit normal into the low three unorm8 channels of a u32.
#[inline]
pub fn pack_normal_u32(n: Vec3) -> u32 {
    (f32_to_unorm8_biased(n.x) as u32)
        | ((f32_to_unorm8_biased(n.y) as u32) << 8)
        | ((f32_to_unorm8_biased(n.z) as u32) << 16)
}

/// Pack a unit quaternion into four unorm8 channels of a u32.
#[inline]
pub fn pack_quat_u32(q: Quat) -> u32 {
    (f32_to_unorm8_biased(q.x) as u32)
        | ((f32_to_unorm8_biased(q.y) as u32) << 8)
        | ((f32_to_unorm8_biased(q.z) as u32) << 16)
        | ((f32_to_unorm8_biased(q.w) as u32) << 24)
}

/// Unpack four unorm8 channels back to an (unnormalized) quaternion.
#[inline]
pub fn unpack_quat_u32(packed: u32) -> Quat {
    let ch = |shift: u32| ((packed >> shift) & 0xFF) as f32 / 255.0 * 2.0 - 1.0;
    Quat::from_xyzw(ch(0), ch(8), ch(16), ch(24))
}

// ============================================================================
// Blend influence packing
// ============================================================================

/// Pack up to four joint influences into (weights, joint ids).
///
/// `influences` must be sorted by descending weight; the kept weights are
/// renormalized to sum 1 before quantizing to unorm8. Unused slots are
/// zero-filled.
pub fn pack_blend_influences(
    influences: &[(u32, f32)],
) -> ([u8; MAX_BLEND_INFLUENCES], [u8; MAX_BLEND_INFLUENCES]) {
    let num = influences.len().min(MAX_BLEND_INFLUENCES);

    let mut total_weight = 0.0f32;
    for &(_, weight) in &influences[..num] {
        total_weight += weight;
    }

    let mut weights = [0u8; MAX_BLEND_INFLUENCES];
    let mut joint_ids = [0u8; MAX_BLEND_INFLUENCES];
    if total_weight > 0.0 {
        for (slot, &(joint, weight)) in influences[..num].iter().enumerate() {
            joint_ids[slot] = joint as u8;
            weights[slot] = ((weight / total_weight) * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
        }
    }

    (weights, joint_ids)
}

// ============================================================================
// Index width
// ============================================================================

/// True when every index fits a u16, deciding the shared buffer format.
#[inline]
pub const fn index_fits_u16(max_index: u32) -> bool {
    max_index < 0xFFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_snorm16_range() {
        assert_eq!(pack_bounded_snorm16(-1.0, 0.0, 1.0), -32768);
        assert_eq!(pack_bounded_snorm16(1.0, 0.0, 1.0), 32767);
        // Center maps to the midpoint of the asymmetric i16 range
        let mid = pack_bounded_snorm16(0.0, 0.0, 1.0);
        assert!((-1..=0).contains(&(mid as i32)));
    }

    #[test]
    fn test_bounded_snorm16_roundtrip_bound() {
        let center = 3.0;
        let extent = 5.0;
        for &value in &[-2.0f32, 0.0, 1.5, 3.0, 7.999, 8.0] {
            let packed = pack_bounded_snorm16(value, center, extent);
            let recovered = unpack_bounded_snorm16(packed, center, extent);
            assert!(
                (recovered - value).abs() <= extent / 32768.0,
                "value {value} recovered as {recovered}"
            );
        }
    }

    #[test]
    fn test_bounded_snorm16_degenerate_axis() {
        assert_eq!(
            pack_bounded_snorm16(2.0, 2.0, 0.0),
            pack_bounded_snorm16(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn test_unorm8_biased_range() {
        assert_eq!(f32_to_unorm8_biased(-1.0), 0);
        assert_eq!(f32_to_unorm8_biased(0.0), 128);
        assert_eq!(f32_to_unorm8_biased(1.0), 255);
    }

    #[test]
    fn test_pack_normal_channels() {
        let packed = pack_normal_u32(Vec3::new(1.0, -1.0, 0.0));
        assert_eq!(packed & 0xFF, 255);
        assert_eq!((packed >> 8) & 0xFF, 0);
        assert_eq!((packed >> 16) & 0xFF, 128);
    }

    #[test]
    fn test_quat_u32_roundtrip() {
        let q = Quat::from_rotation_y(0.8);
        let unpacked = unpack_quat_u32(pack_quat_u32(q)).normalize();
        assert!(q.dot(unpacked).abs() > 0.999);
    }

    #[test]
    fn test_blend_influences_renormalized() {
        let (weights, ids) = pack_blend_influences(&[(3, 0.6), (7, 0.2)]);
        assert_eq!(ids, [3, 7, 0, 0]);
        // 0.6/0.8 = 0.75, 0.2/0.8 = 0.25
        assert_eq!(weights[0], 191);
        assert_eq!(weights[1], 64);
        assert_eq!(weights[2], 0);
    }

    #[test]
    fn test_blend_influences_truncates_to_four() {
        let influences = [(0, 0.4), (1, 0.3), (2, 0.2), (3, 0.05), (4, 0.05)];
        let (weights, ids) = pack_blend_influences(&influences);
        assert_eq!(ids, [0, 1, 2, 3]);
        let sum: u32 = weights.iter().map(|&w| w as u32).sum();
        assert!((250..=258).contains(&sum));
    }

    #[test]
    fn test_index_width() {
        assert!(index_fits_u16(0));
        assert!(index_fits_u16(0xFFFE));
        assert!(!index_fits_u16(0xFFFF));
    }
}
