//! Error types for the Vulkan backend
//!
//! Errors fall into two classes. Swapchain staleness (`ERROR_OUT_OF_DATE_KHR`,
//! `SUBOPTIMAL_KHR`) is recoverable: the frame loop rebuilds the swapchain and
//! drops the current frame. Everything else aborts the operation that raised it.

use ash::vk;

use crate::config::ConfigError;

/// Vulkan backend error
#[derive(Debug, thiserror::Error)]
pub enum VulkanError {
    /// Raw Vulkan API error
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No physical device met the selection requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A required queue family was not found on the selected device
    #[error("Required queue family not found: {0}")]
    MissingQueueFamily(&'static str),

    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// The memory allocator could not satisfy a request
    #[error("Allocation failed: {reason}")]
    AllocationFailed {
        /// What was being allocated and why it failed
        reason: String,
    },

    /// No memory type supports the required properties
    #[error("No suitable memory type")]
    NoSuitableMemoryType,

    /// Allocating from the descriptor pool would exceed its capacity
    #[error("Descriptor pool exhausted: requested {requested}, {in_use} of {capacity} in use")]
    DescriptorPoolExhausted {
        /// Sets requested by the caller
        requested: u32,
        /// Sets already handed out
        in_use: u32,
        /// Total pool capacity
        capacity: u32,
    },

    /// A texture without an image view was passed to a descriptor write
    #[error("Texture {texture_index} has a null image view")]
    NullImageView {
        /// Position of the offending texture in the caller's list
        texture_index: usize,
    },

    /// Requested image layout transition has no barrier recipe
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Framebuffers were requested before a render pass was attached
    #[error("Cannot build framebuffers without a render pass")]
    MissingRenderPass,

    /// Frame slot index outside the ring
    #[error("Frame index {index} out of range for {count} frames")]
    FrameIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of frame slots
        count: usize,
    },

    /// Invalid operation
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Reason for invalidity
        reason: String,
    },

    /// Image decoding failed
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem error while reading shaders or images
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or was invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(String),
}

impl VulkanError {
    /// Whether this error only signals a stale swapchain
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR)
        )
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Vulkan result type
pub type VulkanResult<T> = Result<T, VulkanError>;
