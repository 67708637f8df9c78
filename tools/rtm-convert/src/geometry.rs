//! Geometry accumulator
//!
//! Collects per-mesh, per-LOD raw attribute arrays and the node
//! placements that position them. LOD 0 is authoritative: meshes,
//! materials, and node names come from it, and higher LODs must expose
//! same-named mesh nodes or the conversion fails.
//!
//! Meshes without authored normals get face-averaged ones; meshes with
//! texcoords but no tangent frame get one derived from the UV gradients.
//! Attribute presence is then backfilled scene-wide so every mesh can be
//! quantized against one shared layout.

use anyhow::Result;
use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;
use tracing::error;

use rtm_common::Aabb;

use crate::error::ConvertError;
use crate::scene::ImportedScene;
use crate::skeleton::Skeleton;

/// Influences below this weight never make it into a binding.
const MIN_JOINT_WEIGHT: f32 = 0.5 / 255.0;

/// Per-vertex joint influences, sorted by descending weight.
pub type JointBinding = SmallVec<[(u32, f32); 4]>;

/// Raw attribute arrays for one LOD of one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshLodData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub binormals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub diffuses: Vec<Vec4>,
    pub speculars: Vec<Vec4>,
    pub indices: Vec<u32>,
    /// One entry per vertex when the mesh is skinned, empty otherwise.
    pub joint_bindings: Vec<JointBinding>,
}

/// One mesh across all LODs.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub name: String,
    pub material_id: u32,
    pub has_normal: bool,
    pub has_tangent_frame: bool,
    pub has_texcoord: bool,
    pub lods: Vec<MeshLodData>,
    /// LOD-0 position bounds in mesh-local space (the quantization
    /// domain for every LOD).
    pub pos_bounds: Aabb,
    pub texcoord_bounds: Aabb,
}

/// Placement of one mesh-bearing node, with a transform per LOD.
#[derive(Debug, Clone, Default)]
pub struct NodePlacement {
    pub name: String,
    pub mesh_ids: Vec<usize>,
    pub lod_transforms: Vec<Mat4>,
}

/// Everything the merger needs: meshes, placements, and which
/// attributes exist anywhere in the scene.
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    pub meshes: Vec<MeshData>,
    pub nodes: Vec<NodePlacement>,
    pub has_normal: bool,
    pub has_tangent_quat: bool,
    pub has_texcoord: bool,
    pub has_diffuse: bool,
    pub has_specular: bool,
}

/// Area-weighted per-vertex normals from the triangle list.
fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}

/// Tangent and binormal per vertex from UV gradients, orthogonalized
/// against the normal.
fn compute_tangents(
    positions: &[Vec3],
    texcoords: &[Vec2],
    normals: &[Vec3],
    indices: &[u32],
) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut tangents = vec![Vec3::ZERO; positions.len()];
    let mut binormals = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let e1 = positions[b] - positions[a];
        let e2 = positions[c] - positions[a];
        let uv1 = texcoords[b] - texcoords[a];
        let uv2 = texcoords[c] - texcoords[a];

        let det = uv1.x * uv2.y - uv2.x * uv1.y;
        if det.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * uv2.y - e2 * uv1.y) * r;
        let binormal = (e2 * uv1.x - e1 * uv2.x) * r;

        for &v in &[a, b, c] {
            tangents[v] += tangent;
            binormals[v] += binormal;
        }
    }

    for v in 0..positions.len() {
        let n = normals[v];
        let t = (tangents[v] - n * n.dot(tangents[v])).normalize_or_zero();
        let handedness = if n.cross(t).dot(binormals[v]) < 0.0 {
            -1.0
        } else {
            1.0
        };
        tangents[v] = t;
        binormals[v] = n.cross(t) * handedness;
    }

    (tangents, binormals)
}

/// Collect geometry from every LOD scene.
///
/// Panics if a bone names a joint missing from the skeleton; the
/// skeleton was built from these same scenes, so that is an internal
/// inconsistency.
pub fn accumulate(scenes: &[ImportedScene], skeleton: &Skeleton) -> Result<GeometryData> {
    let num_lods = scenes.len();
    let mut geometry = GeometryData::default();

    geometry.meshes = scenes[0]
        .meshes
        .iter()
        .map(|mesh| MeshData {
            name: mesh.name.clone(),
            material_id: mesh.material_id,
            lods: vec![MeshLodData::default(); num_lods],
            ..Default::default()
        })
        .collect();

    for (lod, scene) in scenes.iter().enumerate() {
        for (mi, mesh) in scene.meshes.iter().enumerate() {
            if mi >= geometry.meshes.len() {
                break;
            }
            let num_vertices = mesh.num_vertices();
            let data = &mut geometry.meshes[mi];
            let lod_data = &mut data.lods[lod];

            lod_data.indices = mesh.indices.clone();
            lod_data.positions = mesh.positions.clone();
            lod_data.diffuses = mesh.diffuses.clone();
            lod_data.speculars = mesh.speculars.clone();

            let first_texcoord = mesh.first_texcoord_channel();
            if let Some(channel) = first_texcoord {
                lod_data.texcoords = mesh.texcoords[channel].clone();
            }

            lod_data.normals = if mesh.normals.is_empty() {
                compute_normals(&lod_data.positions, &lod_data.indices)
            } else {
                mesh.normals.clone()
            };

            let mut has_tangent = !mesh.tangents.is_empty() && !mesh.binormals.is_empty();
            if has_tangent {
                lod_data.tangents = mesh.tangents.clone();
                lod_data.binormals = mesh.binormals.clone();
            } else if !lod_data.texcoords.is_empty() {
                let (tangents, binormals) = compute_tangents(
                    &lod_data.positions,
                    &lod_data.texcoords,
                    &lod_data.normals,
                    &lod_data.indices,
                );
                lod_data.tangents = tangents;
                lod_data.binormals = binormals;
                has_tangent = true;
            } else {
                lod_data.tangents = vec![Vec3::ZERO; num_vertices];
                lod_data.binormals = vec![Vec3::ZERO; num_vertices];
            }

            data.has_normal = true;
            data.has_tangent_frame |= has_tangent;
            data.has_texcoord |= first_texcoord.is_some();

            if data.has_tangent_frame {
                geometry.has_tangent_quat = true;
            } else {
                geometry.has_normal = true;
            }
            geometry.has_texcoord |= data.has_texcoord;
            geometry.has_diffuse |= !mesh.diffuses.is_empty();
            geometry.has_specular |= !mesh.speculars.is_empty();

            if !mesh.bones.is_empty() {
                lod_data.joint_bindings = vec![JointBinding::new(); num_vertices];
                for bone in &mesh.bones {
                    let joint_id = skeleton
                        .joint_index(&bone.name)
                        .unwrap_or_else(|| panic!("Joint {:?} not found", bone.name));
                    for &(vertex_id, weight) in &bone.weights {
                        if weight >= MIN_JOINT_WEIGHT {
                            lod_data.joint_bindings[vertex_id as usize].push((joint_id, weight));
                        }
                    }
                }
                for binding in &mut lod_data.joint_bindings {
                    binding.sort_by(|a, b| b.1.total_cmp(&a.1));
                }
            }
        }

        // Node placements: LOD 0 defines them, higher LODs must match by name
        let mut correspondence: Result<(), ConvertError> = Ok(());
        scene.walk_nodes(|index, global| {
            if correspondence.is_err() {
                return;
            }
            let node = &scene.nodes[index];
            if node.mesh_ids.is_empty() {
                return;
            }
            if lod == 0 {
                let mut lod_transforms = vec![Mat4::IDENTITY; num_lods];
                lod_transforms[0] = global;
                geometry.nodes.push(NodePlacement {
                    name: node.name.clone(),
                    mesh_ids: node.mesh_ids.clone(),
                    lod_transforms,
                });
            } else {
                match geometry.nodes.iter_mut().find(|n| n.name == node.name) {
                    Some(placement) => placement.lod_transforms[lod] = global,
                    None => {
                        error!(
                            "Could not find the correspondence node {:?} between LODs",
                            node.name
                        );
                        correspondence = Err(ConvertError::LodCorrespondence {
                            name: node.name.clone(),
                            lod: lod as u32,
                        });
                    }
                }
            }
        });
        correspondence?;
    }

    // Scene-wide backfill so one layout fits every mesh
    for mesh in &mut geometry.meshes {
        if geometry.has_tangent_quat {
            mesh.has_tangent_frame = true;
        }
        if geometry.has_texcoord {
            mesh.has_texcoord = true;
        }
    }

    // LOD-0 bounds are the quantization domain
    for mesh in &mut geometry.meshes {
        mesh.pos_bounds = Aabb::from_points(mesh.lods[0].positions.iter().copied());
        mesh.texcoord_bounds =
            Aabb::from_points(mesh.lods[0].texcoords.iter().map(|tc| tc.extend(0.0)));
    }

    Ok(geometry)
}
