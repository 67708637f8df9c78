//! The importer boundary
//!
//! Everything the pipeline consumes arrives through [`SceneImporter`] as an
//! [`ImportedScene`]: a flat node arena, raw float meshes, normalized
//! materials, and animation clips with arbitrarily-timed key tracks. The
//! pipeline never touches a source file format directly.
//!
//! Nodes live in an arena indexed by `usize`; `nodes[0]` is the root.
//! Traversals use explicit stacks over those indices, never recursion over
//! pointers.

use std::path::Path;

use anyhow::Result;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use rtm_common::Material;

/// Converts one source file into a normalized in-memory scene.
///
/// Implementations own all format-specific parsing. An error return is an
/// import failure: the conversion aborts and no model is produced.
pub trait SceneImporter {
    fn import(&self, source: &Path) -> Result<ImportedScene>;
}

/// One node of the hierarchy, arena-indexed.
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    /// Local (node-to-parent) transform.
    pub transform: Mat4,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Meshes attached to this node, as indices into [`ImportedScene::meshes`].
    pub mesh_ids: Vec<usize>,
}

/// One bone reference of a mesh.
#[derive(Debug, Clone)]
pub struct SceneBone {
    /// Names a node in the hierarchy.
    pub name: String,
    /// Mesh-space to bone-space transform (the bind-pose inverse,
    /// relative to the mesh node).
    pub offset: Mat4,
    /// `(vertex id, weight)` pairs.
    pub weights: Vec<(u32, f32)>,
}

/// Raw float mesh data for one LOD source.
///
/// Attribute arrays are either empty (absent) or one entry per vertex.
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub name: String,
    pub material_id: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub binormals: Vec<Vec3>,
    /// Texcoord channels; the first non-empty channel is the one merged.
    pub texcoords: Vec<Vec<Vec2>>,
    pub diffuses: Vec<Vec4>,
    pub speculars: Vec<Vec4>,
    /// Triangle list.
    pub indices: Vec<u32>,
    pub bones: Vec<SceneBone>,
}

impl SceneMesh {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Index of the first texcoord channel with data, if any.
    pub fn first_texcoord_channel(&self) -> Option<usize> {
        self.texcoords.iter().position(|tc| !tc.is_empty())
    }
}

/// One joint's key tracks within a clip. Key times are in
/// animation-native ticks, not seconds, and are not uniformly spaced.
#[derive(Debug, Clone, Default)]
pub struct SceneChannel {
    /// Names the animated node (and thus the joint).
    pub node_name: String,
    pub position_keys: Vec<(f32, Vec3)>,
    pub rotation_keys: Vec<(f32, Quat)>,
    pub scale_keys: Vec<(f32, Vec3)>,
}

/// One animation clip.
#[derive(Debug, Clone, Default)]
pub struct SceneAnimation {
    pub name: String,
    /// Clip length in ticks.
    pub duration: f32,
    pub ticks_per_second: f32,
    pub channels: Vec<SceneChannel>,
}

impl SceneAnimation {
    pub fn duration_seconds(&self) -> f32 {
        if self.ticks_per_second > 0.0 {
            self.duration / self.ticks_per_second
        } else {
            0.0
        }
    }
}

/// A fully normalized scene, as handed over by an importer.
#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub materials: Vec<Material>,
    pub meshes: Vec<SceneMesh>,
    /// Node arena; `nodes[0]` is the root.
    pub nodes: Vec<SceneNode>,
    pub animations: Vec<SceneAnimation>,
}

impl ImportedScene {
    /// Pre-order traversal of the node arena, calling `visit` with the
    /// node index and its accumulated global transform.
    pub fn walk_nodes(&self, mut visit: impl FnMut(usize, Mat4)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![(0usize, Mat4::IDENTITY)];
        while let Some((index, parent_global)) = stack.pop() {
            let node = &self.nodes[index];
            let global = parent_global * node.transform;
            visit(index, global);
            // Reverse push so children come off the stack in order
            for &child in node.children.iter().rev() {
                stack.push((child, global));
            }
        }
    }
}
