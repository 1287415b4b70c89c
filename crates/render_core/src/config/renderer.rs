//! # Renderer Configuration
//!
//! Settings consumed by [`RenderContext`](crate::render::backends::vulkan::RenderContext)
//! at creation: instance metadata, frame pipelining depth, descriptor pool sizing,
//! window geometry and shader locations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Config;

/// Shader file locations for the fixed graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Searches the usual build output and source locations so the viewer can be
    /// launched from the workspace root or from its own directory.
    pub fn with_path_resolution(vertex_file: &str, fragment_file: &str) -> Self {
        const SEARCH_DIRS: [&str; 4] = ["target/shaders/", "../target/shaders/", "shaders/", "./"];

        let resolve = |file: &str| {
            SEARCH_DIRS
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(vertex_file),
            fragment_shader_path: resolve(fragment_file),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("mesh_vert.spv", "mesh_frag.spv")
    }
}

/// Window geometry and title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Render Core".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// # Renderer Configuration
///
/// `max_frames_in_flight` is the size of the frame ring. The descriptor pool is
/// sized to `max_frames_in_flight * descriptor_sets_per_frame` sets, each holding
/// up to `max_textures_per_set` sampled images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Number of frame slots in the synchronization ring
    pub max_frames_in_flight: usize,
    /// Descriptor sets reserved per frame slot
    pub descriptor_sets_per_frame: u32,
    /// Sampled image bindings per descriptor set
    pub max_textures_per_set: u32,
    /// Whether to enable Vulkan validation layers (auto-detected when unset)
    pub enable_validation: Option<bool>,
    /// Log filter passed to the logger (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            max_frames_in_flight: 2,
            descriptor_sets_per_frame: 4,
            max_textures_per_set: 1,
            enable_validation: None,
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
        }
    }

    /// Set application version
    #[must_use]
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set window title and size
    #[must_use]
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window = WindowConfig {
            title: title.into(),
            width,
            height,
        };
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Set the number of descriptor sets reserved per frame slot
    #[must_use]
    pub fn with_descriptor_sets_per_frame(mut self, sets: u32) -> Self {
        self.descriptor_sets_per_frame = sets;
        self
    }

    /// Set the number of sampled image bindings per descriptor set
    #[must_use]
    pub fn with_max_textures_per_set(mut self, textures: u32) -> Self {
        self.max_textures_per_set = textures;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Whether validation layers should be requested
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Total descriptor set capacity of the pool
    pub fn descriptor_capacity(&self) -> u32 {
        u32::try_from(self.max_frames_in_flight)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.descriptor_sets_per_frame)
    }

    /// Parsed log level, falling back to `Info` for unknown strings
    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }

        if self.descriptor_sets_per_frame == 0 {
            return Err("Descriptor sets per frame must be at least 1".to_string());
        }

        // The fragment stage always samples the first texture binding
        if self.max_textures_per_set == 0 {
            return Err("Max textures per set must be at least 1".to_string());
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            ));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Render Core Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Defaults describe a two-slot ring with a 1280x720 window
    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.descriptor_sets_per_frame, 4);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.validate().is_ok());
    }

    /// Pool capacity is frames times sets per frame
    #[test]
    fn test_descriptor_capacity() {
        let config = RendererConfig::default()
            .with_max_frames_in_flight(3)
            .with_descriptor_sets_per_frame(5);
        assert_eq!(config.descriptor_capacity(), 15);
    }

    /// Frame ring size must stay within 1..=8
    #[test]
    fn test_frame_count_bounds() {
        assert!(RendererConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(8).validate().is_ok());
    }

    /// A layout without any texture binding is rejected
    #[test]
    fn test_zero_textures_rejected() {
        assert!(RendererConfig::default().with_max_textures_per_set(0).validate().is_err());
        assert!(RendererConfig::default().with_max_textures_per_set(1).validate().is_ok());
    }

    /// Degenerate window sizes are rejected
    #[test]
    fn test_zero_window_rejected() {
        let config = RendererConfig::default().with_window("x", 0, 600);
        assert!(config.validate().is_err());
    }

    /// Unknown log levels fall back to info
    #[test]
    fn test_log_filter_parsing() {
        let mut config = RendererConfig::default();
        config.log_level = "debug".to_string();
        assert_eq!(config.log_filter(), log::LevelFilter::Debug);
        config.log_level = "loud".to_string();
        assert_eq!(config.log_filter(), log::LevelFilter::Info);
    }

    /// Missing shader files are reported by path
    #[test]
    fn test_shader_validation_reports_path() {
        let shaders = ShaderConfig::new("does/not/exist.vert.spv", "does/not/exist.frag.spv");
        let err = shaders.validate().unwrap_err();
        assert!(err.contains("does/not/exist.vert.spv"));
    }
}
