//! Backend implementations for the render module
//!
//! Only Vulkan is provided.

/// Vulkan rendering backend implementation
pub mod vulkan;
