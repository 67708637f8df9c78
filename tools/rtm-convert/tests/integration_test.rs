//! End-to-end pipeline tests over in-memory scenes.

use glam::{Mat4, Quat, Vec2, Vec3};

use rtm_common::{read_model_summary, IndexFormat, VertexUsage};
use rtm_convert::convert_scenes;
use rtm_convert::scene::{
    ImportedScene, SceneAnimation, SceneBone, SceneChannel, SceneMesh, SceneNode,
};
use rtm_convert::settings::ConvertSettings;

fn settings_for(num_lods: usize) -> ConvertSettings {
    ConvertSettings {
        lods: (0..num_lods)
            .map(|i| format!("lod{i}.glb").into())
            .collect(),
        ..Default::default()
    }
}

fn triangle_scene() -> ImportedScene {
    ImportedScene {
        materials: vec![rtm_common::Material {
            name: "default".to_string(),
            ..Default::default()
        }],
        meshes: vec![SceneMesh {
            name: "tri".to_string(),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2],
            ..Default::default()
        }],
        nodes: vec![SceneNode {
            name: "tri_node".to_string(),
            transform: Mat4::IDENTITY,
            mesh_ids: vec![0],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// A quad skinned to two bones under a meshless root, with keys only on
/// the upper bone.
fn skinned_quad_scene() -> ImportedScene {
    let upper_global = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
    let lower_global = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));

    ImportedScene {
        materials: vec![rtm_common::Material::default()],
        meshes: vec![SceneMesh {
            name: "quad".to_string(),
            positions: vec![
                Vec3::new(-0.5, 0.0, 0.0),
                Vec3::new(0.5, 0.0, 0.0),
                Vec3::new(-0.5, 2.0, 0.0),
                Vec3::new(0.5, 2.0, 0.0),
            ],
            texcoords: vec![vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
            ]],
            indices: vec![0, 1, 2, 2, 1, 3],
            bones: vec![
                SceneBone {
                    name: "upper".to_string(),
                    offset: upper_global.inverse(),
                    weights: vec![(0, 1.0), (1, 1.0)],
                },
                SceneBone {
                    name: "lower".to_string(),
                    offset: lower_global.inverse(),
                    weights: vec![(2, 1.0), (3, 1.0)],
                },
            ],
            ..Default::default()
        }],
        nodes: vec![
            SceneNode {
                name: "root".to_string(),
                transform: Mat4::IDENTITY,
                children: vec![1],
                mesh_ids: vec![0],
                ..Default::default()
            },
            SceneNode {
                name: "upper".to_string(),
                transform: upper_global,
                parent: Some(0),
                children: vec![2],
                ..Default::default()
            },
            SceneNode {
                name: "lower".to_string(),
                transform: Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                parent: Some(1),
                ..Default::default()
            },
        ],
        animations: vec![SceneAnimation {
            name: "wave".to_string(),
            duration: 1.0,
            ticks_per_second: 1.0,
            channels: vec![SceneChannel {
                node_name: "upper".to_string(),
                position_keys: vec![
                    (0.0, Vec3::new(0.0, 1.0, 0.0)),
                    (1.0, Vec3::new(2.0, 1.0, 0.0)),
                ],
                rotation_keys: vec![(0.0, Quat::IDENTITY), (1.0, Quat::IDENTITY)],
                scale_keys: vec![(0.0, Vec3::ONE), (1.0, Vec3::ONE)],
            }],
        }],
    }
}

#[test]
fn test_multi_clip_timeline_concatenation() {
    let mut scene = skinned_quad_scene();
    // a second, longer clip on the same bone
    scene.animations.push(SceneAnimation {
        name: "sway".to_string(),
        duration: 2.0,
        ticks_per_second: 1.0,
        channels: vec![SceneChannel {
            node_name: "upper".to_string(),
            position_keys: vec![
                (0.0, Vec3::new(0.0, 1.0, 0.0)),
                (2.0, Vec3::new(0.0, 3.0, 0.0)),
            ],
            rotation_keys: vec![(0.0, Quat::IDENTITY), (2.0, Quat::IDENTITY)],
            scale_keys: vec![(0.0, Vec3::ONE), (2.0, Vec3::ONE)],
        }],
    });

    let model = convert_scenes(&[scene], &settings_for(1)).unwrap();

    // clips occupy half-open, back-to-back frame ranges
    assert_eq!(model.actions.len(), 2);
    assert_eq!(model.actions[0].name, "wave");
    assert_eq!(model.actions[0].start_frame, 0);
    assert_eq!(model.actions[0].end_frame, 25);
    assert_eq!(model.actions[1].name, "sway");
    assert_eq!(model.actions[1].start_frame, 25);
    assert_eq!(model.actions[1].end_frame, 75);
    assert_eq!(model.num_frames, 75);

    let upper = model.joints.iter().position(|j| j.name == "upper").unwrap();
    let lower = model.joints.iter().position(|j| j.name == "lower").unwrap();

    // the animated bone spans both clips, strictly increasing frame ids
    let upper_kf = &model.key_frame_sets[upper];
    assert_eq!(upper_kf.frame_ids.first(), Some(&0));
    assert_eq!(upper_kf.frame_ids.last(), Some(&74));
    assert!(upper_kf.frame_ids.iter().any(|&f| f >= 25));
    for pair in upper_kf.frame_ids.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    // each clip contributes its own default key for the keyless bone
    let lower_kf = &model.key_frame_sets[lower];
    assert_eq!(lower_kf.frame_ids, vec![0, 25]);
}

#[test]
fn test_two_lod_shared_buffer_offsets() {
    let model = convert_scenes(&[triangle_scene(), triangle_scene()], &settings_for(2)).unwrap();

    assert_eq!(model.submeshes.len(), 1);
    let lods = &model.submeshes[0].lods;
    assert_eq!(lods.len(), 2);

    // both LODs land in the shared buffers back to back
    assert_eq!(lods[0].base_vertex, 0);
    assert_eq!(lods[0].start_index, 0);
    assert_eq!(lods[1].base_vertex, 3);
    assert_eq!(lods[1].start_index, 3);
    assert_eq!(lods[1].num_vertices, 3);
    assert_eq!(lods[1].num_indices, 3);

    // position stream: 6 vertices at 8 bytes; indices: 6 at 2 bytes
    assert_eq!(model.vertex_buffers[0].len(), 6 * 8);
    assert_eq!(model.index_format, IndexFormat::U16);
    assert_eq!(model.index_buffer.len(), 6 * 2);
}

#[test]
fn test_static_triangle_model() {
    let model = convert_scenes(&[triangle_scene()], &settings_for(1)).unwrap();

    assert_eq!(model.materials.len(), 1);
    assert!(model.joints.is_empty());
    assert!(model.key_frame_sets.is_empty());
    assert!(model.actions.is_empty());
    assert!(!model.is_skinned());

    // position plus the derived normal stream
    let usages: Vec<_> = model.layout.iter().map(|e| e.usage).collect();
    assert_eq!(usages, [VertexUsage::Position, VertexUsage::Normal]);
    assert_eq!(model.vertex_buffers[0].len(), 3 * 8);
    assert_eq!(model.index_format, IndexFormat::U16);
    assert_eq!(model.index_buffer.len(), 3 * 2);

    assert_eq!(model.submeshes.len(), 1);
    let lod = model.submeshes[0].lods[0];
    assert_eq!(lod.num_vertices, 3);
    assert_eq!(lod.num_indices, 3);
    assert!(model.submeshes[0].frame_bounds.is_none());
}

#[test]
fn test_skinned_quad_resampling_defaults() {
    let model = convert_scenes(&[skinned_quad_scene()], &settings_for(1)).unwrap();

    assert!(model.is_skinned());
    assert_eq!(model.joints.len(), 3);
    assert_eq!(model.frame_rate, 25);

    // one clip of 1s at 25 fps
    assert_eq!(model.actions.len(), 1);
    assert_eq!(model.actions[0].start_frame, 0);
    assert_eq!(model.actions[0].end_frame, 25);
    assert_eq!(model.num_frames, 25);

    let upper = model.joints.iter().position(|j| j.name == "upper").unwrap();
    let lower = model.joints.iter().position(|j| j.name == "lower").unwrap();

    // the animated bone keeps its endpoints after compression
    let upper_kf = &model.key_frame_sets[upper];
    assert_eq!(upper_kf.frame_ids.first(), Some(&0));
    assert_eq!(upper_kf.frame_ids.last(), Some(&24));
    assert!(upper_kf.len() >= 2);

    // the keyless bone holds a single frame-0 local bind, untouched by
    // the compressor
    let lower_kf = &model.key_frame_sets[lower];
    assert_eq!(lower_kf.frame_ids, vec![0]);
    let t = lower_kf.binds[0].translation();
    assert!((t - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);

    // blend streams present, frame bounds attached
    let usages: Vec<_> = model.layout.iter().map(|e| e.usage).collect();
    assert!(usages.contains(&VertexUsage::BlendWeights));
    assert!(usages.contains(&VertexUsage::BlendIndices));
    let frame_bounds = model.submeshes[0].frame_bounds.as_ref().unwrap();
    assert_eq!(frame_bounds.frame_ids, vec![0, 24]);
}

#[test]
fn test_bind_pose_invariants() {
    let model = convert_scenes(&[skinned_quad_scene()], &settings_for(1)).unwrap();

    for joint in &model.joints {
        assert!(joint.bind.real.w >= 0.0, "joint {:?}", joint.name);
        assert!((joint.bind.real.length() - 1.0).abs() < 1e-5);
        // inverse undoes the bind
        let id = joint.bind.mul(joint.inverse_bind);
        assert!((id.real.w.abs() - 1.0).abs() < 1e-5);
        assert!(id.dual.length() < 1e-5);
        assert!((joint.bind_scale * joint.inverse_bind_scale - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_lod_correspondence_failure() {
    let lod0 = triangle_scene();
    let mut lod1 = triangle_scene();
    lod1.nodes[0].name = "renamed".to_string();

    let err = convert_scenes(&[lod0, lod1], &settings_for(2)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<rtm_convert::ConvertError>(),
        Some(rtm_convert::ConvertError::LodCorrespondence { lod: 1, .. })
    ));
}

#[test]
fn test_model_file_roundtrip() {
    let model = convert_scenes(&[skinned_quad_scene()], &settings_for(1)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.rtm");
    rtm_convert::write_model_file(&model, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let summary = read_model_summary(&bytes).unwrap();
    assert_eq!(summary.num_materials, model.materials.len() as u32);
    assert_eq!(summary.num_joints, 3);
    assert_eq!(summary.num_actions, 1);
    assert_eq!(summary.num_submeshes, 1);
    assert_eq!(summary.num_frames, 25);
    assert_eq!(summary.frame_rate, 25);
    assert_eq!(summary.index_format, IndexFormat::U16);
}

#[test]
fn test_joint_limit_enforced() {
    let num_bones = 300usize;
    let mut scene = ImportedScene {
        materials: vec![rtm_common::Material::default()],
        ..Default::default()
    };

    let mut mesh = SceneMesh {
        name: "blob".to_string(),
        positions: vec![Vec3::ZERO; num_bones],
        indices: vec![0; 3],
        ..Default::default()
    };

    scene.nodes.push(SceneNode {
        name: "root".to_string(),
        transform: Mat4::IDENTITY,
        mesh_ids: vec![0],
        ..Default::default()
    });
    for i in 0..num_bones {
        let name = format!("bone{i}");
        mesh.bones.push(SceneBone {
            name: name.clone(),
            offset: Mat4::IDENTITY,
            weights: vec![(i as u32, 1.0)],
        });
        let parent = if i == 0 { 0 } else { i }; // chain under root
        scene.nodes.push(SceneNode {
            name,
            transform: Mat4::IDENTITY,
            parent: Some(parent),
            ..Default::default()
        });
        scene.nodes[parent].children.push(i + 1);
    }
    scene.meshes.push(mesh);

    let err = convert_scenes(&[scene], &settings_for(1)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<rtm_convert::ConvertError>(),
        Some(rtm_convert::ConvertError::JointLimitExceeded(_))
    ));
}
