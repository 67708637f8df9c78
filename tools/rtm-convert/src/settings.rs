//! Per-conversion settings (TOML)
//!
//! One settings file describes one conversion: the LOD source list, the
//! output frame rate for resampled animation, and an optional global
//! transform applied to all world-space attributes.
//!
//! ```toml
//! lods = ["hero.glb", "hero_lod1.glb"]
//! frame_rate = 25
//! auto_center = true
//! scale = 0.01
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;

use crate::error::ConvertError;

/// Output frame rate when the settings file does not specify one.
pub const DEFAULT_FRAME_RATE: u32 = 25;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvertSettings {
    /// LOD source paths, coarsest last. The first entry is LOD 0 and is
    /// authoritative for materials, topology, and the skeleton.
    pub lods: Vec<PathBuf>,

    /// Resampled animation frame rate.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Translate the model so the union of its LOD-0 bounds is centered
    /// at the origin.
    #[serde(default)]
    pub auto_center: bool,

    /// Global transform, applied after the per-node transforms.
    #[serde(default)]
    pub translation: [f32; 3],

    /// Global rotation as an xyzw quaternion (normalized on use).
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 4],

    /// Global uniform scale.
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_scale() -> f32 {
    1.0
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            lods: Vec::new(),
            frame_rate: default_frame_rate(),
            auto_center: false,
            translation: [0.0; 3],
            rotation: default_rotation(),
            scale: default_scale(),
        }
    }
}

impl ConvertSettings {
    pub fn num_lods(&self) -> u32 {
        self.lods.len() as u32
    }

    /// The configured global transform (scale, then rotate, then
    /// translate). Auto-centering prepends a further translation computed
    /// from the scene, see the converter.
    ///
    /// Only translate/rotate/uniform-scale is configurable; shear or
    /// non-uniform scale must be baked into the source scene.
    pub fn global_transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_array(self.rotation).normalize(),
            Vec3::from_array(self.translation),
        )
    }

    /// Structural validation, independent of the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.lods.is_empty() {
            bail!("Settings must list at least one LOD source");
        }
        if self.frame_rate == 0 {
            bail!("frame_rate must be non-zero");
        }
        if self.scale == 0.0 {
            bail!("scale must be non-zero");
        }
        Ok(())
    }

    /// Check that every LOD source exists on disk. Paths are resolved
    /// relative to `base_dir` (usually the settings file's directory).
    pub fn resolve_sources(&self, base_dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
        let mut resolved = Vec::with_capacity(self.lods.len());
        for (lod, source) in self.lods.iter().enumerate() {
            let path = if source.is_absolute() {
                source.clone()
            } else {
                base_dir.join(source)
            };
            if !path.exists() {
                return Err(ConvertError::SourceNotFound {
                    lod: lod as u32,
                    path,
                });
            }
            resolved.push(path);
        }
        Ok(resolved)
    }
}

/// Load and validate a settings file.
pub fn load_settings(path: &Path) -> Result<ConvertSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {path:?}"))?;
    let settings: ConvertSettings =
        toml::from_str(&text).with_context(|| format!("Failed to parse settings file {path:?}"))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: ConvertSettings = toml::from_str(r#"lods = ["a.glb"]"#).unwrap();
        assert_eq!(settings.frame_rate, 25);
        assert!(!settings.auto_center);
        assert_eq!(settings.scale, 1.0);
        assert_eq!(settings.global_transform(), Mat4::IDENTITY);
        settings.validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_lods() {
        let settings: ConvertSettings = toml::from_str("lods = []").unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result: Result<ConvertSettings, _> = toml::from_str(
            r#"
            lods = ["a.glb"]
            fps = 30
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_global_transform_composition() {
        let settings: ConvertSettings = toml::from_str(
            r#"
            lods = ["a.glb"]
            translation = [1.0, 2.0, 3.0]
            scale = 2.0
            "#,
        )
        .unwrap();
        let m = settings.global_transform();
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 2.0, 3.0));
    }
}
