//! The `.rtm` binary model format
//!
//! Single-file runtime model: one header followed by the sections in
//! fixed order. All integers little-endian; strings are u16 length +
//! UTF-8 bytes.
//!
//! # Layout
//! ```text
//! 0x00: magic   [u8; 4] = "RTMD"
//! 0x04: version u32
//! 0x08: num_materials u32
//! 0x0C: num_joints u32
//! 0x10: num_actions u32
//! 0x14: num_submeshes u32
//! 0x18: num_streams u32
//! 0x1C: frame_rate u32
//! 0x20: num_frames u32
//! 0x24: index_format u8 (0 = u16, 1 = u32)
//! 0x25: num_lods u8
//! 0x26: padding (2 bytes)
//! 0x28: materials, joints, keyframe sets, actions, layout,
//!       vertex buffers, index buffer, submeshes
//! ```

use std::io::Write;

use anyhow::{bail, Result};
use glam::Vec3;

use crate::bounds::Aabb;
use crate::dualquat::DualQuat;
use crate::model::{
    ElementFormat, IndexFormat, RuntimeModel, Submesh, VertexElement, VertexUsage,
};

/// File magic for packed runtime models.
pub const RTM_MAGIC: [u8; 4] = *b"RTMD";
/// Current format version.
pub const RTM_VERSION: u32 = 1;
/// Default file extension.
pub const RTM_MODEL_EXT: &str = "rtm";

/// RtModel header (40 bytes)
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RtModelHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub num_materials: u32,
    pub num_joints: u32,
    pub num_actions: u32,
    pub num_submeshes: u32,
    pub num_streams: u32,
    pub frame_rate: u32,
    pub num_frames: u32,
    pub index_format: u8,
    pub num_lods: u8,
    pub _padding: [u8; 2],
}

impl RtModelHeader {
    pub const SIZE: usize = 40;

    pub fn new(model: &RuntimeModel) -> Self {
        Self {
            magic: RTM_MAGIC,
            version: RTM_VERSION,
            num_materials: model.materials.len() as u32,
            num_joints: model.joints.len() as u32,
            num_actions: model.actions.len() as u32,
            num_submeshes: model.submeshes.len() as u32,
            num_streams: model.layout.len() as u32,
            frame_rate: model.frame_rate,
            num_frames: model.num_frames,
            index_format: match model.index_format {
                IndexFormat::U16 => 0,
                IndexFormat::U32 => 1,
            },
            num_lods: model
                .submeshes
                .first()
                .map(|sm| sm.lods.len() as u8)
                .unwrap_or(0),
            _padding: [0; 2],
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.num_materials.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.num_joints.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.num_actions.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.num_submeshes.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.num_streams.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.frame_rate.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.num_frames.to_le_bytes());
        bytes[36] = self.index_format;
        bytes[37] = self.num_lods;
        // padding bytes stay 0
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let u32_at = |off: usize| {
            u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        Some(Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u32_at(4),
            num_materials: u32_at(8),
            num_joints: u32_at(12),
            num_actions: u32_at(16),
            num_submeshes: u32_at(20),
            num_streams: u32_at(24),
            frame_rate: u32_at(28),
            num_frames: u32_at(32),
            index_format: bytes[36],
            num_lods: bytes[37],
            _padding: [0; 2],
        })
    }

    /// Validate header
    pub fn validate(&self) -> bool {
        self.magic == RTM_MAGIC && self.version == RTM_VERSION && self.index_format <= 1
    }
}

// ============================================================================
// Element codes
// ============================================================================

const fn usage_code(usage: VertexUsage) -> u8 {
    match usage {
        VertexUsage::Position => 0,
        VertexUsage::Normal => 1,
        VertexUsage::TangentFrame => 2,
        VertexUsage::Diffuse => 3,
        VertexUsage::Specular => 4,
        VertexUsage::TexCoord => 5,
        VertexUsage::BlendWeights => 6,
        VertexUsage::BlendIndices => 7,
    }
}

const fn format_code(format: ElementFormat) -> u8 {
    match format {
        ElementFormat::Snorm16x4 => 0,
        ElementFormat::Snorm16x2 => 1,
        ElementFormat::Unorm8x4 => 2,
        ElementFormat::Uint8x4 => 3,
    }
}

// ============================================================================
// Writer
// ============================================================================

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        bail!("String too long for format: {} bytes", s.len());
    }
    w.write_all(&(s.len() as u16).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> Result<()> {
    for c in v.to_array() {
        w.write_all(&c.to_le_bytes())?;
    }
    Ok(())
}

fn write_dualquat<W: Write>(w: &mut W, dq: &DualQuat) -> Result<()> {
    for c in dq.real.to_array().into_iter().chain(dq.dual.to_array()) {
        w.write_all(&c.to_le_bytes())?;
    }
    Ok(())
}

fn write_aabb<W: Write>(w: &mut W, aabb: &Aabb) -> Result<()> {
    write_vec3(w, aabb.min)?;
    write_vec3(w, aabb.max)
}

fn write_submesh<W: Write>(w: &mut W, submesh: &Submesh) -> Result<()> {
    write_string(w, &submesh.name)?;
    w.write_all(&submesh.material_id.to_le_bytes())?;
    write_aabb(w, &submesh.pos_bounds)?;
    write_aabb(w, &submesh.texcoord_bounds)?;
    for lod in &submesh.lods {
        w.write_all(&lod.num_vertices.to_le_bytes())?;
        w.write_all(&lod.base_vertex.to_le_bytes())?;
        w.write_all(&lod.num_indices.to_le_bytes())?;
        w.write_all(&lod.start_index.to_le_bytes())?;
    }

    match &submesh.frame_bounds {
        Some(fb) => {
            w.write_all(&(fb.frame_ids.len() as u32).to_le_bytes())?;
            for (frame_id, bounds) in fb.frame_ids.iter().zip(&fb.bounds) {
                w.write_all(&frame_id.to_le_bytes())?;
                write_aabb(w, bounds)?;
            }
        }
        None => w.write_all(&0u32.to_le_bytes())?,
    }
    Ok(())
}

/// Write a complete packed model.
///
/// Submeshes must all carry the same number of LODs (the header stores a
/// single LOD count).
pub fn write_model<W: Write>(w: &mut W, model: &RuntimeModel) -> Result<()> {
    let num_lods = model
        .submeshes
        .first()
        .map(|sm| sm.lods.len())
        .unwrap_or(0);
    if model.submeshes.iter().any(|sm| sm.lods.len() != num_lods) {
        bail!("Submeshes disagree on LOD count");
    }
    if model.vertex_buffers.len() != model.layout.len() {
        bail!(
            "Expected {} vertex buffers, got {}",
            model.layout.len(),
            model.vertex_buffers.len()
        );
    }

    let header = RtModelHeader::new(model);
    w.write_all(&header.to_bytes())?;

    for mtl in &model.materials {
        write_string(w, &mtl.name)?;
        for c in mtl.albedo.to_array() {
            w.write_all(&c.to_le_bytes())?;
        }
        w.write_all(&mtl.metalness.to_le_bytes())?;
        w.write_all(&mtl.glossiness.to_le_bytes())?;
        write_vec3(w, mtl.emissive)?;
        let flags = (mtl.transparent as u8) | ((mtl.two_sided as u8) << 1);
        w.write_all(&[flags])?;
        for tex in &mtl.textures {
            write_string(w, tex)?;
        }
    }

    for joint in &model.joints {
        write_string(w, &joint.name)?;
        w.write_all(&joint.parent.to_le_bytes())?;
        write_dualquat(w, &joint.bind)?;
        w.write_all(&joint.bind_scale.to_le_bytes())?;
        write_dualquat(w, &joint.inverse_bind)?;
        w.write_all(&joint.inverse_bind_scale.to_le_bytes())?;
    }

    for kf in &model.key_frame_sets {
        w.write_all(&(kf.len() as u32).to_le_bytes())?;
        for frame_id in &kf.frame_ids {
            w.write_all(&frame_id.to_le_bytes())?;
        }
        for bind in &kf.binds {
            write_dualquat(w, bind)?;
        }
        for scale in &kf.scales {
            w.write_all(&scale.to_le_bytes())?;
        }
    }

    for action in &model.actions {
        write_string(w, &action.name)?;
        w.write_all(&action.start_frame.to_le_bytes())?;
        w.write_all(&action.end_frame.to_le_bytes())?;
    }

    for element in &model.layout {
        w.write_all(&[usage_code(element.usage), format_code(element.format)])?;
    }

    for buffer in &model.vertex_buffers {
        w.write_all(&(buffer.len() as u32).to_le_bytes())?;
        w.write_all(buffer)?;
    }

    w.write_all(&(model.index_buffer.len() as u32).to_le_bytes())?;
    w.write_all(&model.index_buffer)?;

    for submesh in &model.submeshes {
        write_submesh(w, submesh)?;
    }

    Ok(())
}

// ============================================================================
// Summary reader
// ============================================================================

/// Header-level description of a packed model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSummary {
    pub num_materials: u32,
    pub num_joints: u32,
    pub num_actions: u32,
    pub num_submeshes: u32,
    pub num_streams: u32,
    pub frame_rate: u32,
    pub num_frames: u32,
    pub index_format: IndexFormat,
    pub num_lods: u8,
}

/// Parse the header of a packed model file.
pub fn read_model_summary(bytes: &[u8]) -> Result<ModelSummary> {
    let Some(header) = RtModelHeader::from_bytes(bytes) else {
        bail!(
            "File too small for model header: {} bytes, need {}",
            bytes.len(),
            RtModelHeader::SIZE
        );
    };
    if !header.validate() {
        bail!("Not a packed model file (bad magic or version)");
    }
    Ok(ModelSummary {
        num_materials: header.num_materials,
        num_joints: header.num_joints,
        num_actions: header.num_actions,
        num_submeshes: header.num_submeshes,
        num_streams: header.num_streams,
        frame_rate: header.frame_rate,
        num_frames: header.num_frames,
        index_format: if header.index_format == 0 {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        },
        num_lods: header.num_lods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmeshLod;

    fn minimal_model() -> RuntimeModel {
        RuntimeModel {
            materials: vec![crate::model::Material {
                name: "default".to_string(),
                ..Default::default()
            }],
            layout: vec![VertexElement {
                usage: VertexUsage::Position,
                format: ElementFormat::Snorm16x4,
            }],
            vertex_buffers: vec![vec![0u8; 24]],
            index_format: IndexFormat::U16,
            index_buffer: vec![0u8; 6],
            submeshes: vec![Submesh {
                name: "tri".to_string(),
                material_id: 0,
                pos_bounds: Aabb::default(),
                texcoord_bounds: Aabb::default(),
                lods: vec![SubmeshLod {
                    num_vertices: 3,
                    base_vertex: 0,
                    num_indices: 3,
                    start_index: 0,
                }],
                frame_bounds: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let model = minimal_model();
        let header = RtModelHeader::new(&model);
        let parsed = RtModelHeader::from_bytes(&header.to_bytes()).unwrap();
        assert!(parsed.validate());
        assert_eq!(parsed.num_materials, 1);
        assert_eq!(parsed.num_submeshes, 1);
        assert_eq!(parsed.num_lods, 1);
    }

    #[test]
    fn test_write_then_summarize() {
        let model = minimal_model();
        let mut bytes = Vec::new();
        write_model(&mut bytes, &model).unwrap();

        let summary = read_model_summary(&bytes).unwrap();
        assert_eq!(summary.num_materials, 1);
        assert_eq!(summary.num_joints, 0);
        assert_eq!(summary.num_streams, 1);
        assert_eq!(summary.index_format, IndexFormat::U16);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(read_model_summary(&[0u8; 8]).is_err());
        let mut bad = [0u8; RtModelHeader::SIZE];
        bad[0..4].copy_from_slice(b"NOPE");
        assert!(read_model_summary(&bad).is_err());
    }

    #[test]
    fn test_mismatched_buffers_rejected() {
        let mut model = minimal_model();
        model.vertex_buffers.clear();
        let mut bytes = Vec::new();
        assert!(write_model(&mut bytes, &model).is_err());
    }
}
