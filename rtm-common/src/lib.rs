//! Shared types and utilities for the rtm asset pipeline
//!
//! This crate provides everything the converter and downstream loaders
//! agree on:
//!
//! # Modules
//!
//! - [`dualquat`] - Unit dual quaternion math (rigid transforms, screw interpolation)
//! - [`bounds`] - Axis-aligned bounding boxes
//! - [`packing`] - Quantization of vertex attributes into GPU-ready bytes
//! - [`model`] - Runtime model data types (materials, joints, keyframes, buffers)
//! - [`formats`] - The `.rtm` binary model format

pub mod bounds;
pub mod dualquat;
pub mod formats;
pub mod model;
pub mod packing;

pub use bounds::Aabb;
pub use dualquat::DualQuat;

// Re-export commonly used packing items
pub use packing::{
    index_fits_u16, pack_blend_influences, pack_bounded_snorm16, pack_normal_u32, pack_quat_u32,
    unpack_bounded_snorm16, MAX_BLEND_INFLUENCES,
};

// Re-export commonly used model items
pub use model::{
    AabbKeyFrameSet, AnimationAction, ElementFormat, IndexFormat, Joint, KeyFrameSet, Material,
    RuntimeModel, Submesh, SubmeshLod, TextureSlot, VertexElement, VertexUsage,
};

// Re-export format items
pub use formats::{
    read_model_summary, write_model, ModelSummary, RtModelHeader, RTM_MAGIC, RTM_MODEL_EXT,
    RTM_VERSION,
};
