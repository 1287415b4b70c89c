//! Device-side services shared by every GPU resource wrapper
//!
//! [`GpuResources`] bundles the allocator with the graphics queue and a command
//! pool. That is everything needed to create buffers and images, record
//! one-shot layout transitions and copies, and build image views. It is owned by
//! the render context and lent out to texture, mesh and swapchain code.

use ash::{vk, Device};

use super::allocator::{GpuBuffer, GpuImage, ImageDesc, ResourceAllocator, VmaAllocator};
use crate::render::backends::vulkan::rendering::commands::{
    buffer_image_copy, full_subresource, CommandPool, LayoutTransition,
};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Allocator plus one-shot command submission
pub struct GpuResources {
    commands: CommandPool,
    allocator: VmaAllocator,
    graphics_queue: vk::Queue,
    device: Device,
}

impl GpuResources {
    /// Bundle `allocator` with a command pool on the graphics family
    pub fn new(
        device: &Device,
        graphics_queue: vk::Queue,
        graphics_family: u32,
        allocator: VmaAllocator,
    ) -> VulkanResult<Self> {
        let commands = CommandPool::new(device.clone(), graphics_family)?;
        Ok(Self {
            commands,
            allocator,
            graphics_queue,
            device: device.clone(),
        })
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Command pool used for frame and one-shot command buffers
    pub fn command_pool(&self) -> &CommandPool {
        &self.commands
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Create a device-local image
    pub fn create_image(&mut self, desc: &ImageDesc) -> VulkanResult<GpuImage> {
        self.allocator.create_image(desc)
    }

    /// Release an image
    pub fn destroy_image(&mut self, image: GpuImage) {
        self.allocator.destroy_image(image);
    }

    /// Number of live images
    pub fn live_images(&self) -> usize {
        self.allocator.live_images()
    }

    /// Create a 2D view over the first mip and layer of `image`
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(full_subresource(aspect));

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy a view created by [`Self::create_image_view`]
    pub fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe {
            self.device.destroy_image_view(view, None);
        }
    }

    /// Move `image` from `old` to `new` layout and wait for completion
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let transition = LayoutTransition::plan(format, old, new)?;
        self.commands
            .submit_single_time(self.graphics_queue, |device, command_buffer| {
                transition.record(device, command_buffer, image, old, new);
            })
    }

    /// Copy a tightly packed buffer into a `TRANSFER_DST_OPTIMAL` image and wait
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        let region = buffer_image_copy(width, height);
        self.commands
            .submit_single_time(self.graphics_queue, |device, command_buffer| unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            })
    }
}

impl ResourceAllocator for GpuResources {
    fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        self.allocator.create_buffer(size, usage)
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.allocator.write_buffer(buffer, offset, data)
    }

    fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        self.allocator.read_buffer(buffer, offset, len)
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        self.allocator.destroy_buffer(buffer);
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.allocator.wait_idle()
    }

    fn live_buffers(&self) -> usize {
        self.allocator.live_buffers()
    }
}
