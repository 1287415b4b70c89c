//! Render context: device bring-up, the fixed pipeline and per-frame drawing
//!
//! One [`RenderContext`] exists per process by convention. It is passed
//! explicitly to everything that creates GPU resources; there is no global.
//!
//! Bring-up order:
//! instance → surface → physical device → logical device → allocator →
//! swapchain (+ depth) → render pass → framebuffers → descriptor layout →
//! pipeline → sampler → descriptor pool → frame ring.
//!
//! Teardown runs in reverse after a device-idle wait.

use ash::vk;

use super::initialization::{LogicalDevice, PhysicalDeviceInfo, PresentSurface, SurfaceProvider, VulkanInstance};
use super::rendering::render_pass::clear_values;
use super::rendering::{FrameRecorder, GraphicsPipeline, RenderPass, ShaderModule};
use super::resources::descriptor_set::{apply_writes, PlannedWrite};
use super::resources::{
    DescriptorBackend, DescriptorBindingSet, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    GpuBuffer, GpuResources, ResourceAllocator, Texture, VmaAllocator,
};
use super::state::swapchain::choose_depth_format;
use super::state::{
    run_frame, FrameDevice, FrameRing, FrameSlot, FrameStatus, FrameSync, SwapchainManager, DEPTH_FORMAT_CANDIDATES,
};
use super::{VulkanError, VulkanResult};
use crate::config::{ConfigError, RendererConfig};
use crate::render::uniform::UniformBufferData;

/// Sampler shared by every descriptor binding set
struct Sampler {
    device: ash::Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, no anisotropy, single LOD
    fn new(device: &ash::Device) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: device.clone(),
            sampler,
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Everything built on top of the swapchain during bring-up
struct PipelineState {
    frame_syncs: Vec<FrameSync>,
    ring: FrameRing,
    descriptor_pool: DescriptorPool,
    sampler: Sampler,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    descriptor_layout: DescriptorSetLayout,
}

impl PipelineState {
    fn build(
        logical: &LogicalDevice,
        resources: &GpuResources,
        swapchain: &mut SwapchainManager,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let device = &logical.device;

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), swapchain.depth_format())?;
        swapchain.set_render_pass(render_pass.handle());
        swapchain.create_framebuffers()?;

        let descriptor_layout = DescriptorSetLayoutBuilder::binding_set(config.max_textures_per_set).build(device)?;

        let vertex_shader = ShaderModule::from_file(device, &config.shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device, &config.shaders.fragment_shader_path)?;
        let pipeline = GraphicsPipeline::new(
            device,
            render_pass.handle(),
            &vertex_shader,
            &fragment_shader,
            descriptor_layout.handle(),
        )?;

        let sampler = Sampler::new(device)?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            config.descriptor_capacity(),
            config.max_textures_per_set,
        )?;

        let frames = config.max_frames_in_flight;
        let command_buffers = resources
            .command_pool()
            .allocate_command_buffers(frames as u32)?;
        let frame_syncs = (0..frames)
            .map(|_| FrameSync::new(device))
            .collect::<VulkanResult<Vec<_>>>()?;
        let ring = FrameRing::new(
            frame_syncs
                .iter()
                .zip(&command_buffers)
                .map(|(sync, &command_buffer)| sync.slot(command_buffer))
                .collect(),
        )?;

        Ok(Self {
            frame_syncs,
            ring,
            descriptor_pool,
            sampler,
            pipeline,
            render_pass,
            descriptor_layout,
        })
    }
}

/// Top-level renderer state
pub struct RenderContext {
    // Field order is drop order
    frame_syncs: Vec<FrameSync>,
    ring: FrameRing,
    swapchain: SwapchainManager,
    descriptor_pool: DescriptorPool,
    sampler: Sampler,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    descriptor_layout: DescriptorSetLayout,
    resources: GpuResources,
    device: LogicalDevice,
    physical: PhysicalDeviceInfo,
    surface: PresentSurface,
    instance: VulkanInstance,
}

impl RenderContext {
    /// Bring up the device and every fixed rendering object for `window`
    pub fn create(window: &mut dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::Config(ConfigError::Invalid(e)))?;
        log::debug!("Creating render context for {}", config.application_name);

        let instance = VulkanInstance::new(
            &*window,
            &config.application_name,
            config.application_version,
            config.validation_enabled(),
        )?;
        let surface = PresentSurface::new(&instance.entry, &instance.instance, window)?;
        let physical = PhysicalDeviceInfo::select_suitable_device(&instance.instance, &surface)?;
        let device = LogicalDevice::new(&instance.instance, &physical)?;

        let allocator = VmaAllocator::new(
            &instance.instance,
            &device.device,
            physical.device,
            &physical.memory_properties,
        )?;
        let mut resources = GpuResources::new(
            &device.device,
            device.graphics_queue,
            device.graphics_family,
            allocator,
        )?;

        let depth_format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
            instance
                .instance
                .get_physical_device_format_properties(physical.device, format)
        })?;
        log::debug!("Depth format: {:?}", depth_format);

        let mut swapchain = SwapchainManager::create(
            &device,
            &surface,
            &physical,
            &mut resources,
            window.framebuffer_size(),
            depth_format,
        )?;

        let state = match PipelineState::build(&device, &resources, &mut swapchain, config) {
            Ok(state) => state,
            Err(e) => {
                swapchain.destroy(&mut resources);
                return Err(e);
            }
        };

        log::info!(
            "Render context ready on {} ({} frames in flight)",
            physical.name,
            state.ring.len()
        );

        Ok(Self {
            frame_syncs: state.frame_syncs,
            ring: state.ring,
            swapchain,
            descriptor_pool: state.descriptor_pool,
            sampler: state.sampler,
            pipeline: state.pipeline,
            render_pass: state.render_pass,
            descriptor_layout: state.descriptor_layout,
            resources,
            device,
            physical,
            surface,
            instance,
        })
    }

    /// Wait for the GPU and release everything
    ///
    /// Resources created from this context (meshes, textures, binding sets)
    /// must be destroyed first.
    pub fn destroy(self) {
        drop(self);
    }

    /// Record and present one frame
    ///
    /// `record` runs inside the render pass with a [`FrameRecorder`] for the
    /// active slot. A stale swapchain on acquire returns
    /// [`FrameStatus::Skipped`] without calling `record`.
    pub fn draw_frame<F>(&mut self, window: &mut dyn SurfaceProvider, record: F) -> VulkanResult<FrameStatus>
    where
        F: FnOnce(&mut FrameRecorder<'_>) -> VulkanResult<()>,
    {
        let mut backend = FrameBackend {
            logical: &self.device,
            surface: &self.surface,
            physical: &self.physical,
            swapchain: &mut self.swapchain,
            resources: &mut self.resources,
            pipeline: &self.pipeline,
            render_pass: self.render_pass.handle(),
            window,
        };

        run_frame(&mut backend, &mut self.ring, |backend, target| {
            let extent = backend.swapchain.extent();
            let mut recorder = FrameRecorder::new(
                &mut *backend.resources,
                target.slot.command_buffer,
                backend.pipeline.layout(),
                extent,
                target.frame_index,
                target.image_index,
            );
            record(&mut recorder)
        })
    }

    /// Allocate `count` descriptor sets with the shared layout
    ///
    /// Fails before any device call when the pool would exceed its capacity.
    pub fn alloc_descriptor_sets(&mut self, count: u32) -> VulkanResult<Vec<vk::DescriptorSet>> {
        self.descriptor_pool
            .allocate(self.descriptor_layout.handle(), count)
    }

    /// Create a binding set for every frame in flight
    ///
    /// `textures` must hold between one and `max_textures_per_set` entries.
    pub fn create_binding_set(
        &mut self,
        textures: &[&Texture],
    ) -> VulkanResult<DescriptorBindingSet> {
        let frames = self.frames_in_flight();
        DescriptorBindingSet::create(self, frames, textures)
    }

    /// Write `data` into frame `frame`'s uniform buffer of `binding_set`
    pub fn set_uniform_data(
        &mut self,
        binding_set: &DescriptorBindingSet,
        frame: usize,
        data: &UniformBufferData,
    ) -> VulkanResult<()> {
        binding_set.set_uniform_data(&mut self.resources, frame, data)
    }

    /// Create a 2D view over `image`
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        self.resources.create_image_view(image, format, aspect)
    }

    /// Move `image` between two supported layouts, waiting for completion
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        self.resources.transition_image_layout(image, format, old, new)
    }

    /// Copy tightly packed pixels from `buffer` into `image`, waiting for completion
    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, width: u32, height: u32) -> VulkanResult<()> {
        self.resources.copy_buffer_to_image(buffer, image, width, height)
    }

    /// Swapchain width in pixels
    pub fn width(&self) -> u32 {
        self.swapchain.extent().width
    }

    /// Swapchain height in pixels
    pub fn height(&self) -> u32 {
        self.swapchain.extent().height
    }

    /// Ring index of the next frame to be drawn
    pub fn current_frame(&self) -> usize {
        self.ring.index()
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    /// Shared sampler
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.sampler
    }

    /// Layout of every binding set
    pub fn descriptor_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_layout.handle()
    }

    /// Allocator and one-shot command services
    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    /// Mutable access for texture and mesh creation
    pub fn resources_mut(&mut self) -> &mut GpuResources {
        &mut self.resources
    }

    /// Selected GPU
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        log::info!("Destroying render context");
        if let Err(e) = self.wait_idle() {
            log::error!("Device wait failed during teardown: {}", e);
        }
        self.swapchain.destroy(&mut self.resources);
    }
}

impl ResourceAllocator for RenderContext {
    fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        self.resources.create_buffer(size, usage)
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.resources.write_buffer(buffer, offset, data)
    }

    fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        self.resources.read_buffer(buffer, offset, len)
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        self.resources.destroy_buffer(buffer);
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        RenderContext::wait_idle(self)
    }

    fn live_buffers(&self) -> usize {
        self.resources.live_buffers()
    }
}

impl DescriptorBackend for RenderContext {
    fn allocate_sets(&mut self, count: u32) -> VulkanResult<Vec<vk::DescriptorSet>> {
        self.alloc_descriptor_sets(count)
    }

    fn write_set(&mut self, set: vk::DescriptorSet, writes: &[PlannedWrite]) {
        apply_writes(&self.device.device, set, writes);
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.sampler
    }

    fn max_textures(&self) -> u32 {
        self.descriptor_pool.max_textures()
    }
}

/// [`FrameDevice`] over the context's live objects for one `draw_frame` call
struct FrameBackend<'a> {
    logical: &'a LogicalDevice,
    surface: &'a PresentSurface,
    physical: &'a PhysicalDeviceInfo,
    swapchain: &'a mut SwapchainManager,
    resources: &'a mut GpuResources,
    pipeline: &'a GraphicsPipeline,
    render_pass: vk::RenderPass,
    window: &'a mut dyn SurfaceProvider,
}

impl FrameDevice for FrameBackend<'_> {
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe {
            self.logical
                .device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<(u32, bool)> {
        self.swapchain.acquire_next_image(signal)
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.logical.device.reset_fences(&[fence]).map_err(VulkanError::Api) }
    }

    fn begin_frame_commands(&mut self, command_buffer: vk::CommandBuffer, image_index: u32) -> VulkanResult<()> {
        let device = &self.logical.device;
        let extent = self.swapchain.extent();
        let framebuffer = self.swapchain.framebuffer(image_index)?;
        let clear_values = clear_values();

        let begin_info = vk::CommandBufferBeginInfo::builder();
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
        Ok(())
    }

    fn end_frame_commands(&mut self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.logical.device.cmd_end_render_pass(command_buffer);
            self.logical
                .device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)
        }
    }

    fn submit(&mut self, slot: &FrameSlot) -> VulkanResult<()> {
        let wait_semaphores = [slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer];
        let signal_semaphores = [slot.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.logical
                .device
                .queue_submit(self.logical.graphics_queue, &[submit_info.build()], slot.in_flight)
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, slot: &FrameSlot, image_index: u32) -> VulkanResult<bool> {
        self.swapchain
            .present(self.logical.present_queue, slot.render_finished, image_index)
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let drawable = self.window.framebuffer_size();
        if !self
            .swapchain
            .recreate(self.surface, self.physical, &mut *self.resources, drawable)?
        {
            log::debug!("Swapchain recreation deferred until the window has an area");
        }
        Ok(())
    }

    fn surface_resized(&mut self) -> bool {
        self.window.take_resized()
    }
}
