//! Configuration loading and persistence
//!
//! Configuration types implement [`Config`] to gain file loading and saving.
//! The on-disk format is chosen from the file extension: `.toml` or `.ron`.

mod renderer;

pub use renderer::{RendererConfig, ShaderConfig, WindowConfig};
pub use serde::{Deserialize, Serialize};

use std::path::Path;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load configuration from file, falling back to defaults if the file is missing
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration values failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("render_core_{}_{}", std::process::id(), name))
    }

    /// TOML files survive a save/load cycle with custom values intact
    #[test]
    fn test_toml_save_and_load() {
        let path = scratch_path("renderer.toml");
        let config = RendererConfig::new("Toml Viewer").with_max_frames_in_flight(3);
        config.save_to_file(&path).unwrap();

        let loaded = RendererConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.application_name, "Toml Viewer");
        assert_eq!(loaded.max_frames_in_flight, 3);
        std::fs::remove_file(&path).ok();
    }

    /// RON files survive a save/load cycle
    #[test]
    fn test_ron_save_and_load() {
        let path = scratch_path("renderer.ron");
        let config = RendererConfig::new("Ron Viewer").with_descriptor_sets_per_frame(6);
        config.save_to_file(&path).unwrap();

        let loaded = RendererConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.descriptor_sets_per_frame, 6);
        std::fs::remove_file(&path).ok();
    }

    /// Unknown extensions are rejected before touching the filesystem
    #[test]
    fn test_unsupported_extension() {
        let config = RendererConfig::default();
        let err = config.save_to_file(scratch_path("renderer.json")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    /// Missing files fall back to defaults
    #[test]
    fn test_load_or_default_missing_file() {
        let config = RendererConfig::load_or_default(scratch_path("absent.toml")).unwrap();
        assert_eq!(config.max_frames_in_flight, 2);
    }
}
