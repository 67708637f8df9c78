//! Resource pruner
//!
//! Drops joints no vertex references (keeping ancestors of referenced
//! joints so the forest stays connected) and materials no mesh
//! references, then rewrites every downstream index through a dense
//! remap table. Output arrays are built fresh by one forward pass; the
//! remap is monotonic (`new <= old`) by construction.

use rtm_common::{KeyFrameSet, Material};

use crate::geometry::MeshData;
use crate::skeleton::BuiltJoint;

/// Remove unreferenced joints, compacting `joints` and
/// `key_frame_sets` in step and rewriting mesh joint bindings.
pub fn remove_unused_joints(
    joints: &mut Vec<BuiltJoint>,
    key_frame_sets: &mut Vec<KeyFrameSet>,
    meshes: &mut [MeshData],
) {
    debug_assert_eq!(joints.len(), key_frame_sets.len());

    let mut used = vec![false; joints.len()];
    for mesh in meshes.iter() {
        for lod in &mesh.lods {
            for binding in &lod.joint_bindings {
                for &(joint_id, _) in binding.iter() {
                    used[joint_id as usize] = true;
                }
            }
        }
    }

    // Ancestors of a used joint stay
    for ji in 0..joints.len() {
        if !used[ji] {
            continue;
        }
        let mut parent = joints[ji].parent;
        while parent >= 0 && !used[parent as usize] {
            used[parent as usize] = true;
            parent = joints[parent as usize].parent;
        }
    }

    let mut remap = vec![0u32; joints.len()];
    let mut next_id = 0u32;
    for (ji, &keep) in used.iter().enumerate() {
        if keep {
            remap[ji] = next_id;
            next_id += 1;
        }
    }

    let mut new_joints = Vec::with_capacity(next_id as usize);
    let mut new_kfs = Vec::with_capacity(next_id as usize);
    for (ji, keep) in used.iter().enumerate() {
        if !keep {
            continue;
        }
        debug_assert!(remap[ji] as usize <= ji);
        let mut joint = joints[ji].clone();
        if joint.parent >= 0 {
            debug_assert!(used[joint.parent as usize]);
            joint.parent = remap[joint.parent as usize] as i16;
        }
        new_joints.push(joint);
        new_kfs.push(key_frame_sets[ji].clone());
    }
    *joints = new_joints;
    *key_frame_sets = new_kfs;

    for mesh in meshes.iter_mut() {
        for lod in &mut mesh.lods {
            for binding in &mut lod.joint_bindings {
                for influence in binding.iter_mut() {
                    influence.0 = remap[influence.0 as usize];
                }
            }
        }
    }
}

/// Remove materials no mesh references, rewriting mesh material ids.
pub fn remove_unused_materials(materials: &mut Vec<Material>, meshes: &mut [MeshData]) {
    let mut used = vec![false; materials.len()];
    for mesh in meshes.iter() {
        used[mesh.material_id as usize] = true;
    }

    let mut remap = vec![0u32; materials.len()];
    let mut new_materials = Vec::new();
    for (mi, &keep) in used.iter().enumerate() {
        if keep {
            remap[mi] = new_materials.len() as u32;
            debug_assert!(remap[mi] as usize <= mi);
            new_materials.push(materials[mi].clone());
        }
    }
    *materials = new_materials;

    for mesh in meshes.iter_mut() {
        mesh.material_id = remap[mesh.material_id as usize];
    }
}
