//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII owners for the per-frame semaphores and fences. Semaphores order work on
//! the GPU and are never observed by the host; fences are the host's only view
//! of GPU completion.
//!
//! ```text
//! acquire ──signal──▶ image_available ──wait──▶ submit ──signal──▶ render_finished ──wait──▶ present
//!                                               submit ──signal──▶ in_flight ◀──wait── next use of slot
//! ```

use ash::{vk, Device};

use super::frame::FrameSlot;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Binary semaphore
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-observable completion signal
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Owned synchronization objects of one frame slot
pub struct FrameSync {
    /// Semaphore signaled when swapchain image becomes available
    pub image_available: Semaphore,
    /// Semaphore signaled when frame rendering is complete
    pub render_finished: Semaphore,
    /// Fence for CPU-GPU synchronization of frame, created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    ///
    /// The fence starts signaled so the first wait on a fresh slot returns at once.
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Raw handles for the frame ring
    pub fn slot(&self, command_buffer: vk::CommandBuffer) -> FrameSlot {
        FrameSlot {
            command_buffer,
            image_available: self.image_available.handle(),
            render_finished: self.render_finished.handle(),
            in_flight: self.in_flight.handle(),
        }
    }
}
