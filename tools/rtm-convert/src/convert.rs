//! Conversion pipeline
//!
//! One-shot, single-threaded, strictly forward: import LODs, build the
//! skeleton, accumulate geometry, resample and compress animation, prune
//! unused resources, merge and quantize, assemble the runtime model.
//! Any stage error aborts the whole conversion with no partial model.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Mat4;
use tracing::info;

use rtm_common::{write_model, Aabb, AabbKeyFrameSet, Joint, RuntimeModel};

use crate::animation::build_animation;
use crate::error::ConvertError;
use crate::geometry::{self, GeometryData};
use crate::merge::merge;
use crate::prune::{remove_unused_joints, remove_unused_materials};
use crate::scene::{ImportedScene, SceneImporter};
use crate::settings::ConvertSettings;
use crate::skeleton::build_skeleton;

/// Joint ids must fit the 8-bit blend index channel.
const MAX_JOINTS: usize = 256;

/// Union of every placed mesh's transformed LOD-0 bounds.
fn scene_bounds(geometry: &GeometryData) -> Aabb {
    let mut bounds: Option<Aabb> = None;
    for node in &geometry.nodes {
        for &mesh_index in &node.mesh_ids {
            let transformed = geometry.meshes[mesh_index]
                .pos_bounds
                .transformed(node.lod_transforms[0]);
            bounds = Some(match bounds {
                Some(b) => b.union(&transformed),
                None => transformed,
            });
        }
    }
    bounds.unwrap_or_default()
}

/// Run the pipeline over already-imported LOD scenes. `scenes[0]` is
/// authoritative for materials, skeleton, and animation.
pub fn convert_scenes(scenes: &[ImportedScene], settings: &ConvertSettings) -> Result<RuntimeModel> {
    settings.validate()?;
    anyhow::ensure!(
        scenes.len() == settings.lods.len().max(1),
        "Expected {} LOD scenes, got {}",
        settings.lods.len().max(1),
        scenes.len()
    );

    let skeleton = build_skeleton(&scenes[0]);
    let skinned = !skeleton.is_empty();
    let mut geometry = geometry::accumulate(scenes, &skeleton)?;

    let (mut key_frame_sets, actions, num_frames) = if skinned {
        build_animation(&skeleton, &scenes[0].animations, settings.frame_rate)
    } else {
        (Vec::new(), Vec::new(), 0)
    };

    let mut joints = skeleton.joints;
    let mut materials = scenes[0].materials.clone();
    if skinned {
        remove_unused_joints(&mut joints, &mut key_frame_sets, &mut geometry.meshes);
        if joints.len() > MAX_JOINTS {
            return Err(ConvertError::JointLimitExceeded(joints.len()).into());
        }
    }
    remove_unused_materials(&mut materials, &mut geometry.meshes);

    let mut global_transform = settings.global_transform();
    if settings.auto_center {
        let center = scene_bounds(&geometry).center();
        global_transform *= Mat4::from_translation(-center);
    }

    let merged = merge(&geometry, global_transform, skinned);

    let joints: Vec<Joint> = joints
        .into_iter()
        .map(|j| Joint {
            name: j.name,
            parent: j.parent,
            bind: j.world_bind,
            bind_scale: j.world_scale,
            inverse_bind: j.world_bind.inverse(),
            inverse_bind_scale: 1.0 / j.world_scale,
        })
        .collect();

    let mut submeshes = merged.submeshes;
    if skinned {
        // Until CPU skinning informs them, frame bounds are the rest
        // pose sampled at the first and last frame.
        for submesh in &mut submeshes {
            submesh.frame_bounds = Some(AabbKeyFrameSet {
                frame_ids: vec![0, num_frames.saturating_sub(1)],
                bounds: vec![submesh.pos_bounds, submesh.pos_bounds],
            });
        }
    }

    info!(
        "Converted {} submeshes, {} materials, {} joints, {} frames",
        submeshes.len(),
        materials.len(),
        joints.len(),
        num_frames
    );

    Ok(RuntimeModel {
        materials,
        joints,
        key_frame_sets,
        actions,
        frame_rate: if skinned { settings.frame_rate } else { 0 },
        num_frames,
        layout: merged.layout,
        vertex_buffers: merged.vertex_buffers,
        index_format: merged.index_format,
        index_buffer: merged.index_buffer,
        submeshes,
    })
}

/// Resolve and import every configured LOD source, then convert.
/// Relative sources resolve against `base_dir`.
pub fn convert(
    importer: &dyn SceneImporter,
    settings: &ConvertSettings,
    base_dir: &Path,
) -> Result<RuntimeModel> {
    settings.validate()?;
    let sources = settings.resolve_sources(base_dir)?;

    let mut scenes = Vec::with_capacity(sources.len());
    for (lod, path) in sources.iter().enumerate() {
        info!("Importing LOD {} from {:?}", lod, path);
        let scene = importer.import(path).map_err(|e| ConvertError::Import {
            path: path.clone(),
            message: format!("{e:#}"),
        })?;
        scenes.push(scene);
    }

    convert_scenes(&scenes, settings)
}

/// Write a converted model to disk in the packed `.rtm` form.
pub fn write_model_file(model: &RuntimeModel, output: &Path) -> Result<()> {
    let file =
        File::create(output).with_context(|| format!("Failed to create {output:?}"))?;
    let mut writer = BufWriter::new(file);
    write_model(&mut writer, model).with_context(|| format!("Failed to write {output:?}"))?;
    info!("Wrote {:?}", output);
    Ok(())
}
