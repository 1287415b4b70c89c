//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules, with
//! the [`RenderContext`] tying them together.

/// Error type shared by the whole backend
pub mod error;

/// Vulkan initialization types (instance, surface, devices)
pub mod initialization;

/// Vulkan resource management (allocator, meshes, textures, descriptors)
pub mod resources;

/// Vulkan rendering operations (commands, render pass, pipeline, recorder)
pub mod rendering;

/// Vulkan state management (swapchain, sync objects, frame ring)
pub mod state;

/// Render context
pub mod renderer;

pub use error::{VulkanError, VulkanResult};
pub use renderer::RenderContext;

pub use initialization::{LogicalDevice, PhysicalDeviceInfo, PresentSurface, SurfaceProvider, VulkanInstance};

pub use resources::{
    DescriptorBindingSet, DescriptorPool, DescriptorSetLayout, GpuBuffer, GpuResources, Mesh, ResourceAllocator,
    Texture,
};

pub use rendering::{CommandPool, FrameRecorder, GraphicsPipeline, RenderPass, ShaderModule};

pub use state::{FrameRing, FrameStatus, FrameSync, SwapchainManager};
