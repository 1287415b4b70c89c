//! Swapchain, its image views, the shared depth target and framebuffers
//!
//! Recreation is all-or-nothing: wait for idle, destroy every framebuffer,
//! view, the swapchain and the depth image, then build all of it again. There
//! is no incremental path.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::{
    LogicalDevice, PhysicalDeviceInfo, PresentSurface, SurfaceSupport,
};
use crate::render::backends::vulkan::resources::{GpuResources, Texture};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Preferred surface format, falling back to the first reported one
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("surface reports no formats".to_string()))
}

/// Mailbox when available, otherwise FIFO which every surface supports
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, or the drawable size clamped to the allowed range
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: drawable.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: drawable.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, clamped to the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// First candidate usable as an optimal-tiling depth attachment
pub fn choose_depth_format<F>(candidates: &[vk::Format], format_properties: F) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| VulkanError::InitializationFailed("no supported depth format".to_string()))
}

/// Attachments of each framebuffer: the swapchain view then the shared depth view
pub fn framebuffer_plan(
    render_pass: Option<vk::RenderPass>,
    image_views: &[vk::ImageView],
    depth_view: vk::ImageView,
) -> VulkanResult<(vk::RenderPass, Vec<[vk::ImageView; 2]>)> {
    let render_pass = render_pass.ok_or(VulkanError::MissingRenderPass)?;
    let attachments = image_views.iter().map(|&view| [view, depth_view]).collect();
    Ok((render_pass, attachments))
}

/// Parameters of one swapchain generation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
    /// Transform applied by the presentation engine
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Pick every parameter from the surface's reported support
    pub fn choose(support: &SurfaceSupport, drawable: (u32, u32)) -> VulkanResult<Self> {
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, drawable),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    /// Configuration for a rebuild, or `None` while the surface has no area
    pub fn for_recreation(support: &SurfaceSupport, drawable: (u32, u32)) -> VulkanResult<Option<Self>> {
        let config = Self::choose(support, drawable)?;
        if config.extent.width == 0 || config.extent.height == 0 {
            return Ok(None);
        }
        Ok(Some(config))
    }
}

/// Owns the presentable image chain and everything sized to it
pub struct SwapchainManager {
    device: Device,
    loader: SwapchainLoader,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    depth: Option<Texture>,
    depth_format: vk::Format,
    render_pass: Option<vk::RenderPass>,
    config: SwapchainConfig,
    queue_families: [u32; 2],
}

impl SwapchainManager {
    /// Build the swapchain, its views and the depth target
    ///
    /// Framebuffers follow once a render pass is attached.
    pub fn create(
        logical: &LogicalDevice,
        surface: &PresentSurface,
        physical: &PhysicalDeviceInfo,
        resources: &mut GpuResources,
        drawable: (u32, u32),
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let mut manager = Self {
            device: logical.device.clone(),
            loader: logical.swapchain_loader.clone(),
            surface: surface.handle(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            depth: None,
            depth_format,
            render_pass: None,
            config: SwapchainConfig::choose(&surface.support(physical.device)?, drawable)?,
            queue_families: [logical.graphics_family, logical.present_family],
        };

        if let Err(e) = manager.build(resources) {
            manager.destroy(resources);
            return Err(e);
        }
        Ok(manager)
    }

    fn build(&mut self, resources: &mut GpuResources) -> VulkanResult<()> {
        let config = self.config;
        let queue_families = self.queue_families;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        let create_info = if queue_families[0] != queue_families[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        unsafe {
            self.swapchain = self
                .loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?;
            self.images = self
                .loader
                .get_swapchain_images(self.swapchain)
                .map_err(VulkanError::Api)?;
        }

        for &image in &self.images {
            let view = resources.create_image_view(
                image,
                config.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            self.image_views.push(view);
        }

        self.depth = Some(Texture::create_depth_buffer(
            resources,
            config.extent.width,
            config.extent.height,
            self.depth_format,
        )?);

        if self.render_pass.is_some() {
            self.create_framebuffers()?;
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            self.images.len(),
            config.surface_format.format,
            config.present_mode
        );
        Ok(())
    }

    /// Attach the render pass used for framebuffers
    pub fn set_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.render_pass = Some(render_pass);
    }

    /// Build one framebuffer per swapchain image
    ///
    /// Fails with [`VulkanError::MissingRenderPass`] until a render pass is set.
    pub fn create_framebuffers(&mut self) -> VulkanResult<()> {
        let depth_view = self
            .depth
            .as_ref()
            .map_or(vk::ImageView::null(), Texture::image_view);
        let (render_pass, plan) = framebuffer_plan(self.render_pass, &self.image_views, depth_view)?;

        self.destroy_framebuffers();
        for attachments in &plan {
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(self.config.extent.width)
                .height(self.config.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.framebuffers.push(framebuffer);
        }

        log::debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Tear everything down and rebuild it for the current surface state
    ///
    /// Returns `false` without touching anything when the drawable area is
    /// empty (a minimized window); the caller retries on a later frame.
    pub fn recreate(
        &mut self,
        surface: &PresentSurface,
        physical: &PhysicalDeviceInfo,
        resources: &mut GpuResources,
        drawable: (u32, u32),
    ) -> VulkanResult<bool> {
        let Some(config) = SwapchainConfig::for_recreation(&surface.support(physical.device)?, drawable)? else {
            log::debug!("Skipping swapchain recreation for zero-sized surface");
            return Ok(false);
        };

        unsafe {
            self.device.device_wait_idle().map_err(VulkanError::Api)?;
        }
        self.destroy(resources);

        self.config = config;
        self.build(resources)?;
        log::info!("Swapchain recreated");
        Ok(true)
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }

    fn destroy_handles(&mut self) {
        self.destroy_framebuffers();
        for view in self.image_views.drain(..) {
            unsafe {
                self.device.destroy_image_view(view, None);
            }
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    /// Release framebuffers, views, the swapchain and the depth target
    ///
    /// The caller must ensure the device is idle. Safe to call repeatedly.
    pub fn destroy(&mut self, resources: &mut GpuResources) {
        self.destroy_handles();
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(resources);
        }
    }

    /// Acquire the next image, signaling `signal` when it is ready
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> VulkanResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
                .map_err(VulkanError::Api)
        }
    }

    /// Queue `image_index` for presentation after `wait`
    ///
    /// Returns whether the swapchain is suboptimal.
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, image_index: u32) -> VulkanResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.loader
                .queue_present(queue, &present_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Framebuffer for swapchain image `image_index`
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(VulkanError::FrameIndexOutOfRange {
                index: image_index as usize,
                count: self.framebuffers.len(),
            })
    }

    /// Parameters of the current generation
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Color format of the images
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    /// Format of the depth target
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        if self.depth.is_some() {
            log::warn!("Swapchain dropped without destroy; depth target leaked");
        }
        self.destroy_handles();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn capabilities(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SurfaceSupport {
        SurfaceSupport {
            capabilities,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    /// Two rebuild configurations for an unchanged surface agree on extent and count
    #[test]
    fn test_recreation_config_is_stable() {
        let support = support(capabilities(2, 8, (800, 600)));
        let first = SwapchainConfig::for_recreation(&support, (800, 600)).unwrap().unwrap();
        let second = SwapchainConfig::for_recreation(&support, (800, 600)).unwrap().unwrap();

        assert_eq!(first.extent.width, second.extent.width);
        assert_eq!(first.extent.height, second.extent.height);
        assert_eq!(first.image_count, second.image_count);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
    }

    /// A minimized surface defers the rebuild instead of producing a zero extent
    #[test]
    fn test_recreation_deferred_for_zero_extent() {
        let minimized = support(capabilities(2, 8, (0, 0)));
        assert!(SwapchainConfig::for_recreation(&minimized, (0, 0)).unwrap().is_none());

        let restored = support(capabilities(2, 8, (640, 480)));
        let config = SwapchainConfig::for_recreation(&restored, (640, 480)).unwrap().unwrap();
        assert_eq!(config.extent.width, 640);
        assert_eq!(config.extent.height, 480);
    }

    /// min + 1, clamped only when a maximum is reported
    #[test]
    fn test_image_count_clamp() {
        assert_eq!(choose_image_count(&capabilities(2, 0, (1, 1))), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2, (1, 1))), 2);
        assert_eq!(choose_image_count(&capabilities(1, 3, (1, 1))), 2);
    }

    /// Fallbacks: first format, FIFO
    #[test]
    fn test_format_and_mode_fallback() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    /// Undefined current extent means the drawable size, clamped
    #[test]
    fn test_extent_from_drawable() {
        let undefined = capabilities(2, 0, (u32::MAX, u32::MAX));
        let extent = choose_extent(&undefined, (10_000, 300));
        assert_eq!((extent.width, extent.height), (4096, 300));

        let fixed = capabilities(2, 0, (640, 480));
        let extent = choose_extent(&fixed, (10_000, 300));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    /// Framebuffers cannot be planned without a render pass
    #[test]
    fn test_framebuffer_requires_render_pass() {
        let views = [vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)];
        let depth = vk::ImageView::from_raw(9);

        assert!(matches!(
            framebuffer_plan(None, &views, depth),
            Err(VulkanError::MissingRenderPass)
        ));

        let (_, plan) = framebuffer_plan(Some(vk::RenderPass::from_raw(5)), &views, depth).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1], [views[1], depth]);
    }

    /// Depth format falls through to the first supported candidate
    #[test]
    fn test_depth_format_selection() {
        let supported = |format: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        };
        assert_eq!(
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, supported).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert!(choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default()).is_err());
    }
}
