//! Runtime model data types
//!
//! The converter's output: a fully quantized, merged model ready for GPU
//! upload. All buffers are shared across submeshes and LODs; per-submesh
//! LOD records carry offsets and counts into them.

use glam::{Vec3, Vec4};

use crate::bounds::Aabb;
use crate::dualquat::DualQuat;

/// Texture semantic slots a material can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TextureSlot {
    Albedo = 0,
    Glossiness,
    Emissive,
    Normal,
    Height,
}

pub const NUM_TEXTURE_SLOTS: usize = 5;

/// Surface material, normalized by the importer boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// RGB albedo with opacity in the alpha channel.
    pub albedo: Vec4,
    pub metalness: f32,
    pub glossiness: f32,
    pub emissive: Vec3,
    pub transparent: bool,
    pub two_sided: bool,
    /// Texture names by semantic slot, empty when unassigned.
    pub textures: [String; NUM_TEXTURE_SLOTS],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec4::new(0.0, 0.0, 0.0, 1.0),
            metalness: 0.0,
            glossiness: 0.0,
            emissive: Vec3::ZERO,
            transparent: false,
            two_sided: false,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn texture(&self, slot: TextureSlot) -> Option<&str> {
        let name = &self.textures[slot as usize];
        (!name.is_empty()).then_some(name.as_str())
    }
}

/// One joint of the skeleton.
///
/// `bind` is the world-space bind pose as a unit dual quaternion with a
/// uniform scale; `inverse_bind` is its precomputed inverse used for
/// skinning. Invariant: `bind.real` is unit length with a non-negative
/// scalar part.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Index of the parent joint, -1 for roots.
    pub parent: i16,
    pub bind: DualQuat,
    pub bind_scale: f32,
    pub inverse_bind: DualQuat,
    pub inverse_bind_scale: f32,
}

/// Sparse transform track for one joint over the model's full timeline.
///
/// Parallel arrays; `frame_ids` strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFrameSet {
    pub frame_ids: Vec<u32>,
    pub binds: Vec<DualQuat>,
    pub scales: Vec<f32>,
}

impl KeyFrameSet {
    pub fn len(&self) -> usize {
        self.frame_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_ids.is_empty()
    }

    pub fn push(&mut self, frame_id: u32, bind: DualQuat, scale: f32) {
        debug_assert!(self.frame_ids.last().is_none_or(|&last| frame_id > last));
        self.frame_ids.push(frame_id);
        self.binds.push(bind);
        self.scales.push(scale);
    }

    pub fn remove(&mut self, index: usize) {
        self.frame_ids.remove(index);
        self.binds.remove(index);
        self.scales.remove(index);
    }
}

/// A named clip spanning `[start_frame, end_frame)` of the global
/// timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationAction {
    pub name: String,
    pub start_frame: u32,
    pub end_frame: u32,
}

/// Per-frame position bounds of a submesh, for coarse culling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AabbKeyFrameSet {
    pub frame_ids: Vec<u32>,
    pub bounds: Vec<Aabb>,
}

// ============================================================================
// Vertex layout
// ============================================================================

/// What a vertex stream holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexUsage {
    Position,
    Normal,
    TangentFrame,
    Diffuse,
    Specular,
    TexCoord,
    BlendWeights,
    BlendIndices,
}

/// On-disk/GPU element format of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    Snorm16x4,
    Snorm16x2,
    Unorm8x4,
    Uint8x4,
}

impl ElementFormat {
    /// Bytes per vertex in this format.
    pub const fn size(&self) -> usize {
        match self {
            ElementFormat::Snorm16x4 => 8,
            ElementFormat::Snorm16x2 => 4,
            ElementFormat::Unorm8x4 => 4,
            ElementFormat::Uint8x4 => 4,
        }
    }
}

/// One stream of the shared vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub usage: VertexUsage,
    pub format: ElementFormat,
}

/// Width of the shared index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(&self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

impl Default for IndexFormat {
    fn default() -> Self {
        IndexFormat::U16
    }
}

// ============================================================================
// Submeshes and the assembled model
// ============================================================================

/// Offsets and counts of one LOD of one submesh inside the shared
/// buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmeshLod {
    pub num_vertices: u32,
    pub base_vertex: u32,
    pub num_indices: u32,
    pub start_index: u32,
}

/// One drawable piece of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub name: String,
    pub material_id: u32,
    /// World-space LOD-0 position bounds (the quantization domain).
    pub pos_bounds: Aabb,
    /// LOD-0 texcoord bounds (the quantization domain).
    pub texcoord_bounds: Aabb,
    pub lods: Vec<SubmeshLod>,
    /// Present only on skinned models.
    pub frame_bounds: Option<AabbKeyFrameSet>,
}

/// The finished runtime model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeModel {
    pub materials: Vec<Material>,
    pub joints: Vec<Joint>,
    /// One keyframe set per joint, parallel to `joints`.
    pub key_frame_sets: Vec<KeyFrameSet>,
    pub actions: Vec<AnimationAction>,
    pub frame_rate: u32,
    pub num_frames: u32,
    /// Shared vertex layout; one byte buffer per element, parallel.
    pub layout: Vec<VertexElement>,
    pub vertex_buffers: Vec<Vec<u8>>,
    pub index_format: IndexFormat,
    pub index_buffer: Vec<u8>,
    pub submeshes: Vec<Submesh>,
}

impl RuntimeModel {
    pub fn is_skinned(&self) -> bool {
        !self.joints.is_empty()
    }
}
