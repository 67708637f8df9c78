//! Vertex merger/quantizer
//!
//! Decides one shared vertex layout for the whole scene, then quantizes
//! every mesh's per-LOD attributes into shared byte streams, one buffer
//! per element. Each mesh is quantized against its own LOD-0 bounds, so
//! submeshes share a layout but not a quantization domain. Indices go
//! into a single buffer whose width is decided once, globally.

use glam::{Mat3, Mat4, Vec4};

use rtm_common::{
    index_fits_u16, pack_blend_influences, pack_bounded_snorm16, pack_normal_u32, pack_quat_u32,
    ElementFormat, IndexFormat, Submesh, SubmeshLod, VertexElement, VertexUsage,
};
use rtm_common::dualquat::tangent_frame_to_quat;

use crate::geometry::GeometryData;

/// Shared buffers plus the per-submesh records pointing into them.
#[derive(Debug, Clone, Default)]
pub struct MergedGeometry {
    pub layout: Vec<VertexElement>,
    pub vertex_buffers: Vec<Vec<u8>>,
    pub index_format: IndexFormat,
    pub index_buffer: Vec<u8>,
    pub submeshes: Vec<Submesh>,
}

/// Stream indices for the layout actually chosen.
#[derive(Debug, Clone, Copy, Default)]
struct StreamMap {
    position: usize,
    normal: Option<usize>,
    tangent_quat: Option<usize>,
    diffuse: Option<usize>,
    specular: Option<usize>,
    texcoord: Option<usize>,
    blend_weights: Option<usize>,
    blend_indices: Option<usize>,
}

/// Fixed stream order: position, tangent frame or normal, diffuse,
/// specular, texcoord, then the blend pair for skinned scenes.
fn decide_layout(geometry: &GeometryData, skinned: bool) -> (Vec<VertexElement>, StreamMap) {
    let mut layout = Vec::new();
    let mut map = StreamMap::default();

    layout.push(VertexElement {
        usage: VertexUsage::Position,
        format: ElementFormat::Snorm16x4,
    });
    map.position = 0;

    if geometry.has_tangent_quat {
        map.tangent_quat = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::TangentFrame,
            format: ElementFormat::Unorm8x4,
        });
    } else if geometry.has_normal {
        map.normal = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::Normal,
            format: ElementFormat::Unorm8x4,
        });
    }
    if geometry.has_diffuse {
        map.diffuse = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::Diffuse,
            format: ElementFormat::Unorm8x4,
        });
    }
    if geometry.has_specular {
        map.specular = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::Specular,
            format: ElementFormat::Unorm8x4,
        });
    }
    if geometry.has_texcoord {
        map.texcoord = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::TexCoord,
            format: ElementFormat::Snorm16x2,
        });
    }
    if skinned {
        map.blend_weights = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::BlendWeights,
            format: ElementFormat::Unorm8x4,
        });
        map.blend_indices = Some(layout.len());
        layout.push(VertexElement {
            usage: VertexUsage::BlendIndices,
            format: ElementFormat::Uint8x4,
        });
    }

    (layout, map)
}

fn pack_color_u32(color: Vec4) -> u32 {
    let channel = |v: f32| (v * 255.0 + 0.5).clamp(0.0, 255.0) as u32;
    channel(color.x) | (channel(color.y) << 8) | (channel(color.z) << 16) | (channel(color.w) << 24)
}

/// Merge and quantize all meshes into shared buffers.
///
/// `global_transform` (auto-centering included) is composed in front of
/// every node transform; normals go through its inverse transpose.
pub fn merge(geometry: &GeometryData, global_transform: Mat4, skinned: bool) -> MergedGeometry {
    let (layout, map) = decide_layout(geometry, skinned);
    let mut merged = MergedGeometry {
        vertex_buffers: vec![Vec::new(); layout.len()],
        layout,
        ..Default::default()
    };

    let Some(num_lods) = geometry.meshes.first().map(|m| m.lods.len()) else {
        return merged;
    };

    let mut base_vertex = 0u32;
    for node in &geometry.nodes {
        let trans0 = global_transform * node.lod_transforms[0];
        for &mesh_index in &node.mesh_ids {
            let mesh = &geometry.meshes[mesh_index];
            let pos_bounds = mesh.pos_bounds.transformed(trans0);
            let pos_center = pos_bounds.center();
            let pos_extent = pos_bounds.half_size();
            let tc_center = mesh.texcoord_bounds.center();
            let tc_extent = mesh.texcoord_bounds.half_size();

            let mut submesh = Submesh {
                name: node.name.clone(),
                material_id: mesh.material_id,
                pos_bounds,
                texcoord_bounds: mesh.texcoord_bounds,
                lods: Vec::with_capacity(num_lods),
                frame_bounds: None,
            };

            for lod in 0..num_lods {
                let trans = global_transform * node.lod_transforms[lod];
                let linear = Mat3::from_mat4(trans);
                let normal_mat = Mat3::from_mat4(trans.inverse().transpose());

                let lod_data = &mesh.lods[lod];

                for &position in &lod_data.positions {
                    let p = trans.transform_point3(position);
                    let packed = [
                        pack_bounded_snorm16(p.x, pos_center.x, pos_extent.x),
                        pack_bounded_snorm16(p.y, pos_center.y, pos_extent.y),
                        pack_bounded_snorm16(p.z, pos_center.z, pos_extent.z),
                        i16::MAX,
                    ];
                    merged.vertex_buffers[map.position]
                        .extend_from_slice(bytemuck::cast_slice(&packed));
                }
                if let Some(stream) = map.normal {
                    let buffer = &mut merged.vertex_buffers[stream];
                    for &n in &lod_data.normals {
                        let world = (normal_mat * n).normalize_or_zero();
                        buffer.extend_from_slice(&pack_normal_u32(world).to_le_bytes());
                    }
                }
                if let Some(stream) = map.tangent_quat {
                    let buffer = &mut merged.vertex_buffers[stream];
                    for i in 0..lod_data.positions.len() {
                        let tangent = (linear * lod_data.tangents[i]).normalize_or_zero();
                        let binormal = (linear * lod_data.binormals[i]).normalize_or_zero();
                        let normal = (normal_mat * lod_data.normals[i]).normalize_or_zero();
                        let quat = tangent_frame_to_quat(tangent, binormal, normal);
                        buffer.extend_from_slice(&pack_quat_u32(quat).to_le_bytes());
                    }
                }
                if let Some(stream) = map.diffuse {
                    let buffer = &mut merged.vertex_buffers[stream];
                    for i in 0..lod_data.positions.len() {
                        let color = lod_data.diffuses.get(i).copied().unwrap_or(Vec4::ZERO);
                        buffer.extend_from_slice(&pack_color_u32(color).to_le_bytes());
                    }
                }
                if let Some(stream) = map.specular {
                    let buffer = &mut merged.vertex_buffers[stream];
                    for i in 0..lod_data.positions.len() {
                        let color = lod_data.speculars.get(i).copied().unwrap_or(Vec4::ZERO);
                        buffer.extend_from_slice(&pack_color_u32(color).to_le_bytes());
                    }
                }
                if let Some(stream) = map.texcoord {
                    let buffer = &mut merged.vertex_buffers[stream];
                    for i in 0..lod_data.positions.len() {
                        let tc = lod_data.texcoords.get(i).copied().unwrap_or_default();
                        let packed = [
                            pack_bounded_snorm16(tc.x, tc_center.x, tc_extent.x),
                            pack_bounded_snorm16(tc.y, tc_center.y, tc_extent.y),
                        ];
                        buffer.extend_from_slice(bytemuck::cast_slice(&packed));
                    }
                }
                if let (Some(weights_stream), Some(indices_stream)) =
                    (map.blend_weights, map.blend_indices)
                {
                    for i in 0..lod_data.positions.len() {
                        let binding = lod_data
                            .joint_bindings
                            .get(i)
                            .map(|b| b.as_slice())
                            .unwrap_or(&[]);
                        let (weights, joint_ids) = pack_blend_influences(binding);
                        merged.vertex_buffers[weights_stream].extend_from_slice(&weights);
                        merged.vertex_buffers[indices_stream].extend_from_slice(&joint_ids);
                    }
                }

                submesh.lods.push(SubmeshLod {
                    num_vertices: lod_data.positions.len() as u32,
                    base_vertex,
                    num_indices: lod_data.indices.len() as u32,
                    start_index: 0, // filled by the index pass
                });
                base_vertex += lod_data.positions.len() as u32;
            }

            merged.submeshes.push(submesh);
        }
    }

    // Index width is a single global decision
    let max_index = geometry
        .meshes
        .iter()
        .flat_map(|mesh| mesh.lods.iter())
        .flat_map(|lod| lod.indices.iter().copied())
        .max()
        .unwrap_or(0);
    merged.index_format = if index_fits_u16(max_index) {
        IndexFormat::U16
    } else {
        IndexFormat::U32
    };

    let mut start_index = 0u32;
    let mut submesh_iter = merged.submeshes.iter_mut();
    for node in &geometry.nodes {
        for &mesh_index in &node.mesh_ids {
            let submesh = submesh_iter
                .next()
                .unwrap_or_else(|| unreachable!("Submesh count diverged from node walk"));
            for lod in 0..num_lods {
                let lod_data = &geometry.meshes[mesh_index].lods[lod];
                for &index in &lod_data.indices {
                    match merged.index_format {
                        IndexFormat::U16 => merged
                            .index_buffer
                            .extend_from_slice(&(index as u16).to_le_bytes()),
                        IndexFormat::U32 => {
                            merged.index_buffer.extend_from_slice(&index.to_le_bytes())
                        }
                    }
                }
                submesh.lods[lod].start_index = start_index;
                start_index += lod_data.indices.len() as u32;
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MeshData, MeshLodData, NodePlacement};
    use glam::Vec3;
    use rtm_common::{unpack_bounded_snorm16, Aabb};

    fn triangle_geometry() -> GeometryData {
        let lod = MeshLodData {
            positions: vec![
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            ],
            normals: vec![Vec3::Z; 3],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        GeometryData {
            meshes: vec![MeshData {
                name: "tri".to_string(),
                pos_bounds: Aabb::from_points(lod.positions.iter().copied()),
                lods: vec![lod],
                has_normal: true,
                ..Default::default()
            }],
            nodes: vec![NodePlacement {
                name: "tri_node".to_string(),
                mesh_ids: vec![0],
                lod_transforms: vec![Mat4::IDENTITY],
            }],
            has_normal: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_static_triangle_layout_and_counts() {
        let merged = merge(&triangle_geometry(), Mat4::IDENTITY, false);

        assert_eq!(merged.layout.len(), 2);
        assert_eq!(merged.layout[0].usage, VertexUsage::Position);
        assert_eq!(merged.layout[1].usage, VertexUsage::Normal);
        assert_eq!(merged.vertex_buffers[0].len(), 3 * 8);
        assert_eq!(merged.vertex_buffers[1].len(), 3 * 4);
        assert_eq!(merged.index_format, IndexFormat::U16);
        assert_eq!(merged.index_buffer.len(), 3 * 2);

        let submesh = &merged.submeshes[0];
        assert_eq!(submesh.name, "tri_node");
        assert_eq!(submesh.lods.len(), 1);
        assert_eq!(submesh.lods[0].num_vertices, 3);
        assert_eq!(submesh.lods[0].num_indices, 3);
        assert_eq!(submesh.lods[0].base_vertex, 0);
        assert_eq!(submesh.lods[0].start_index, 0);
    }

    #[test]
    fn test_position_roundtrip_within_bound() {
        let geometry = triangle_geometry();
        let merged = merge(&geometry, Mat4::IDENTITY, false);

        let bounds = geometry.meshes[0].pos_bounds;
        let center = bounds.center();
        let extent = bounds.half_size();

        // vertex 1 = (1, 0, 0)
        let bytes = &merged.vertex_buffers[0][8..16];
        let x = i16::from_le_bytes([bytes[0], bytes[1]]);
        let recovered = unpack_bounded_snorm16(x, center.x, extent.x);
        assert!((recovered - 1.0).abs() <= extent.x / 32768.0);
    }

    #[test]
    fn test_global_transform_moves_bounds() {
        let geometry = triangle_geometry();
        let shift = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let merged = merge(&geometry, shift, false);

        let bounds = merged.submeshes[0].pos_bounds;
        assert!((bounds.center().x - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_skinned_layout_has_blend_pair() {
        let mut geometry = triangle_geometry();
        geometry.meshes[0].lods[0].joint_bindings =
            vec![smallvec::smallvec![(0u32, 1.0f32)]; 3];
        let merged = merge(&geometry, Mat4::IDENTITY, true);

        let usages: Vec<_> = merged.layout.iter().map(|e| e.usage).collect();
        assert!(usages.contains(&VertexUsage::BlendWeights));
        assert!(usages.contains(&VertexUsage::BlendIndices));
        // weights renormalized: single full influence
        let weights_stream = merged.layout.len() - 2;
        assert_eq!(merged.vertex_buffers[weights_stream][0], 255);
    }
}
