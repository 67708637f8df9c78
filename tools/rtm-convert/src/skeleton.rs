//! Skeleton builder
//!
//! Derives the joint list from mesh bone-offset data and the node
//! hierarchy, in three passes over the LOD-0 scene:
//!
//! 1. Gather bind poses: for every bone of every mesh, the world bind is
//!    `node_global * offset.inverse()`, decomposed into a unit dual
//!    quaternion plus a uniform scale.
//! 2. Mark joint nodes: a node is a joint if it carries bone data or has
//!    a bone anywhere among its descendants. Marked nodes without bone
//!    data become identity-bind connector joints so the parent chain
//!    stays skinnable.
//! 3. Allocate: a pre-order walk assigns final joint indices to marked
//!    nodes only, recording parent links and capturing each node's local
//!    transform alongside the world bind.

use hashbrown::{HashMap, HashSet};

use rtm_common::DualQuat;

use crate::scene::ImportedScene;

/// One joint as produced by the builder.
///
/// `world_bind` and `local_bind` are kept as separate fields: the world
/// bind feeds the skinning palette, the local (node-to-parent) transform
/// is the default keyframe for joints a clip does not animate.
#[derive(Debug, Clone)]
pub struct BuiltJoint {
    pub name: String,
    /// Index of the parent joint, -1 for roots.
    pub parent: i16,
    pub world_bind: DualQuat,
    pub world_scale: f32,
    pub local_bind: DualQuat,
    pub local_scale: f32,
}

/// The deduplicated joint list in pre-order, with a name index.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub joints: Vec<BuiltJoint>,
    by_name: HashMap<String, u32>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint_index(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }
}

/// Build the skeleton from the LOD-0 scene.
///
/// Panics if a bone names a node that does not exist in the hierarchy;
/// that is malformed input the importer should never produce.
pub fn build_skeleton(scene: &ImportedScene) -> Skeleton {
    // Pass 1: world bind pose per bone name
    let mut bind_poses: HashMap<String, (DualQuat, f32)> = HashMap::new();
    scene.walk_nodes(|index, global| {
        for &mesh_id in &scene.nodes[index].mesh_ids {
            for bone in &scene.meshes[mesh_id].bones {
                let bone_to_mesh = global * bone.offset.inverse();
                let (bind, scale) = DualQuat::from_mat4(bone_to_mesh);
                bind_poses.insert(bone.name.clone(), (bind, scale));
            }
        }
    });

    let node_names: HashSet<&str> = scene.nodes.iter().map(|n| n.name.as_str()).collect();
    for name in bind_poses.keys() {
        assert!(
            node_names.contains(name.as_str()),
            "Bone {name:?} has no matching hierarchy node"
        );
    }

    // Pass 2: mark bone nodes and all of their ancestors
    let mut marked = vec![false; scene.nodes.len()];
    for (index, node) in scene.nodes.iter().enumerate() {
        if !bind_poses.contains_key(&node.name) {
            continue;
        }
        marked[index] = true;
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            if marked[parent] {
                break;
            }
            marked[parent] = true;
            cursor = scene.nodes[parent].parent;
        }
    }

    // Pass 3: pre-order allocation of marked nodes
    let mut skeleton = Skeleton::default();
    if scene.nodes.is_empty() {
        return skeleton;
    }
    let mut stack: Vec<(usize, i32)> = vec![(0, -1)];
    while let Some((index, parent_id)) = stack.pop() {
        let node = &scene.nodes[index];
        let mut joint_id = -1;
        if marked[index] {
            joint_id = skeleton.joints.len() as i32;

            let (world_bind, world_scale) = bind_poses
                .get(&node.name)
                .copied()
                .unwrap_or((DualQuat::IDENTITY, 1.0));
            let (local_bind, local_scale) = DualQuat::from_mat4(node.transform);

            skeleton.by_name.insert(node.name.clone(), joint_id as u32);
            skeleton.joints.push(BuiltJoint {
                name: node.name.clone(),
                parent: parent_id as i16,
                world_bind,
                world_scale,
                local_bind,
                local_scale,
            });
        }
        for &child in node.children.iter().rev() {
            stack.push((child, joint_id));
        }
    }

    skeleton
}
