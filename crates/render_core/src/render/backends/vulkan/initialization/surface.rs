//! Presentation surface ownership
//!
//! The windowing layer creates the OS surface; the renderer only needs the
//! handful of queries in [`SurfaceProvider`] and owns the resulting handle.

use ash::extensions::khr::Surface;
use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Window-side operations the renderer depends on
pub trait SurfaceProvider {
    /// Instance extensions required to present to this window
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a presentation surface for `instance`
    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current drawable size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Returns and clears the "window was resized" flag
    fn take_resized(&mut self) -> bool {
        false
    }
}

/// Owned `VkSurfaceKHR` plus its extension loader
pub struct PresentSurface {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl PresentSurface {
    /// Create the surface through the window provider
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        provider: &mut dyn SurfaceProvider,
    ) -> VulkanResult<Self> {
        let loader = Surface::new(entry, instance);
        let surface = provider.create_surface(instance.handle())?;
        if surface == vk::SurfaceKHR::null() {
            return Err(VulkanError::InitializationFailed(
                "Window returned a null surface".to_string(),
            ));
        }
        Ok(Self { loader, surface })
    }

    /// Surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub fn loader(&self) -> &Surface {
        &self.loader
    }

    /// Query capabilities, formats and present modes for `physical_device`
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::Api)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Surface capabilities snapshot used for swapchain configuration
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count and extent limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported (format, color space) pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}
