//! # Rendering
//!
//! Vertex and uniform layouts shared with the shaders, the GLFW window that
//! provides the presentation surface, and the Vulkan backend.

/// Graphics backend implementations
pub mod backends;

/// Per-vertex layout
pub mod vertex;

/// Per-draw uniform block
pub mod uniform;

/// GLFW window
pub mod window;

pub use backends::vulkan::{FrameRecorder, FrameStatus, Mesh, RenderContext, Texture, VulkanError, VulkanResult};
pub use uniform::UniformBufferData;
pub use vertex::Vertex;
pub use window::{Window, WindowError};
