//! Vulkan resource management
//!
//! Contains the allocator facade and the wrappers built on it: textures,
//! meshes and descriptor binding sets.

/// Memory allocator facade over vk-mem
pub mod allocator;

/// Allocator plus one-shot command submission
pub mod gpu_resources;

/// Texture and depth target upload
pub mod texture;

/// Indexed geometry buffers
pub mod mesh;

/// Descriptor layouts, pool and binding sets
pub mod descriptor_set;

pub use allocator::{
    find_memory_type, AllocationKey, GpuBuffer, GpuImage, ImageDesc, MemoryResidency, ResourceAllocator,
    VmaAllocator,
};
pub use descriptor_set::{
    DescriptorBackend, DescriptorBindingSet, DescriptorBudget, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use gpu_resources::GpuResources;
pub use mesh::Mesh;
pub use texture::{RgbaPixels, Texture, TEXTURE_FORMAT};
