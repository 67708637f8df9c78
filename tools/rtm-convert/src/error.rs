//! Conversion error taxonomy
//!
//! Every variant aborts the whole conversion; there are no retries and no
//! partial models. Violated internal invariants (a bone naming a node that
//! does not exist, an unexpanded attribute array) are panics, not variants.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// A configured LOD source could not be located on disk.
    #[error("Could not find LOD {lod} source {path:?}")]
    SourceNotFound { lod: u32, path: PathBuf },

    /// The importer boundary rejected a source scene.
    #[error("Failed to import {path:?}: {message}")]
    Import { path: PathBuf, message: String },

    /// A mesh-bearing node in a higher LOD has no same-named counterpart
    /// in LOD 0.
    #[error("Could not find the correspondence node {name:?} between LOD 0 and LOD {lod}")]
    LodCorrespondence { name: String, lod: u32 },

    /// Blend indices are stored as 8-bit joint ids.
    #[error("Skeleton has {0} joints, over the 256 supported by 8-bit blend indices")]
    JointLimitExceeded(usize),
}
