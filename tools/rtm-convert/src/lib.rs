//! rtm-convert library
//!
//! Converts imported 3D scenes (meshes, materials, skeleton, animation
//! clips) into compact quantized runtime models. Source-format parsing
//! lives behind the [`scene::SceneImporter`] trait; this crate owns
//! everything after it: skeleton building, animation resampling and
//! compression, pruning, vertex merge/quantization, and model assembly.

pub mod animation;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod merge;
pub mod prune;
pub mod scene;
pub mod settings;
pub mod skeleton;

pub use convert::{convert, convert_scenes, write_model_file};
pub use error::ConvertError;
pub use scene::{
    ImportedScene, SceneAnimation, SceneBone, SceneChannel, SceneImporter, SceneMesh, SceneNode,
};
pub use settings::{load_settings, ConvertSettings, DEFAULT_FRAME_RATE};
pub use skeleton::{build_skeleton, BuiltJoint, Skeleton};
