//! Command recording capability handed to draw callbacks
//!
//! A [`FrameRecorder`] only exists between render pass begin and end of one
//! frame. It borrows the context's resources for that span, so nothing it
//! records can outlive the frame it was created for.

use ash::vk;

use crate::render::backends::vulkan::resources::{DescriptorBindingSet, GpuResources, Mesh};
use crate::render::backends::vulkan::VulkanResult;
use crate::render::uniform::UniformBufferData;

/// Records bind and draw commands into the active frame's command buffer
pub struct FrameRecorder<'a> {
    resources: &'a mut GpuResources,
    command_buffer: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    frame_index: usize,
    image_index: u32,
}

impl<'a> FrameRecorder<'a> {
    pub(crate) fn new(
        resources: &'a mut GpuResources,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        extent: vk::Extent2D,
        frame_index: usize,
        image_index: u32,
    ) -> Self {
        Self {
            resources,
            command_buffer,
            pipeline_layout,
            extent,
            frame_index,
            image_index,
        }
    }

    /// Bind `set` at set index 0 of the pipeline layout
    pub fn bind_descriptor_set(&mut self, set: vk::DescriptorSet) {
        unsafe {
            self.resources.device().cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Bind this frame's set from `binding_set`
    pub fn bind_binding_set(&mut self, binding_set: &DescriptorBindingSet) -> VulkanResult<()> {
        let set = binding_set.set(self.frame_index)?;
        self.bind_descriptor_set(set);
        Ok(())
    }

    /// Write `data` into this frame's uniform buffer of `binding_set`
    ///
    /// Safe to call mid-recording: the slot's fence has already been waited
    /// on, so the GPU is not reading this frame's buffer.
    pub fn set_uniform_data(
        &mut self,
        binding_set: &DescriptorBindingSet,
        data: &UniformBufferData,
    ) -> VulkanResult<()> {
        binding_set.set_uniform_data(&mut *self.resources, self.frame_index, data)
    }

    /// Bind `mesh`'s buffers and draw all of its indices
    pub fn draw_mesh(&mut self, mesh: &Mesh) -> VulkanResult<()> {
        mesh.draw(self.resources.device(), self.command_buffer)
    }

    /// Ring index of the frame being recorded
    pub fn current_frame(&self) -> usize {
        self.frame_index
    }

    /// Swapchain image the frame renders to
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Render target width in pixels
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    /// Render target height in pixels
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Width over height, for projection matrices
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }

    /// Raw command buffer, for commands not covered here
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}
