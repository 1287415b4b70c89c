//! Physical device selection and logical device creation
//!
//! Selection runs in two steps. Each enumerated GPU is inspected into a plain
//! [`DeviceCandidate`] record, then [`select_device`] applies the requirements to
//! the list and picks the first match. Keeping the filter pure means the policy
//! can be exercised without a GPU.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::collections::HashSet;
use std::ffi::CStr;

use super::surface::PresentSurface;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Capabilities of one physical device relevant to selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Human-readable device name
    pub name: String,
    /// Integrated, discrete, virtual, CPU...
    pub device_type: vk::PhysicalDeviceType,
    /// `geometryShader` feature support
    pub geometry_shader: bool,
    /// First queue family with graphics support
    pub graphics_family: Option<u32>,
    /// First queue family able to present to the surface
    pub present_family: Option<u32>,
    /// `VK_KHR_swapchain` support
    pub supports_swapchain: bool,
    /// Number of surface formats offered
    pub surface_format_count: usize,
    /// Number of present modes offered
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    /// First requirement this device fails, if any
    pub fn rejection_reason(&self) -> Option<&'static str> {
        if !matches!(
            self.device_type,
            vk::PhysicalDeviceType::INTEGRATED_GPU | vk::PhysicalDeviceType::DISCRETE_GPU
        ) {
            return Some("not an integrated or discrete GPU");
        }
        if !self.geometry_shader {
            return Some("geometry shaders unsupported");
        }
        if self.graphics_family.is_none() {
            return Some("no graphics queue family");
        }
        if self.present_family.is_none() {
            return Some("no present queue family");
        }
        if !self.supports_swapchain {
            return Some("VK_KHR_swapchain unsupported");
        }
        if self.surface_format_count == 0 {
            return Some("no surface formats");
        }
        if self.present_mode_count == 0 {
            return Some("no present modes");
        }
        None
    }

    /// Whether every selection requirement holds
    pub fn is_suitable(&self) -> bool {
        self.rejection_reason().is_none()
    }
}

/// Index of the first suitable candidate
pub fn select_device(candidates: &[DeviceCandidate]) -> VulkanResult<usize> {
    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.rejection_reason() {
            None => return Ok(index),
            Some(reason) => log::debug!("Skipping GPU '{}': {}", candidate.name, reason),
        }
    }
    Err(VulkanError::NoSuitableDevice)
}

/// Selected physical device and the facts the rest of the backend needs
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Graphics queue family index
    pub graphics_family: u32,
    /// Present queue family index
    pub present_family: u32,
    /// Device name
    pub name: String,
}

impl PhysicalDeviceInfo {
    /// Enumerate devices and pick the first suitable one
    pub fn select_suitable_device(instance: &Instance, surface: &PresentSurface) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let candidates = devices
            .iter()
            .map(|&device| Self::inspect(instance, device, surface))
            .collect::<VulkanResult<Vec<_>>>()?;

        let index = select_device(&candidates)?;
        let device = devices[index];
        let candidate = &candidates[index];
        let (graphics_family, present_family) = candidate
            .graphics_family
            .zip(candidate.present_family)
            .ok_or(VulkanError::MissingQueueFamily("graphics/present"))?;

        let (properties, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(device),
                instance.get_physical_device_memory_properties(device),
            )
        };

        log::info!(
            "Selected GPU: {} ({:?}), graphics family {}, present family {}",
            candidate.name,
            candidate.device_type,
            graphics_family,
            present_family
        );

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
            name: candidate.name.clone(),
        })
    }

    fn inspect(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &PresentSurface,
    ) -> VulkanResult<DeviceCandidate> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in (0u32..).zip(queue_families.iter()) {
            if graphics_family.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics_family = Some(index);
            }
            let present_support = unsafe {
                surface
                    .loader()
                    .get_physical_device_surface_support(device, index, surface.handle())
                    .map_err(VulkanError::Api)?
            };
            if present_family.is_none() && present_support {
                present_family = Some(index);
            }
            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let supports_swapchain = extensions.iter().any(|available| {
            let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            extension_name == SwapchainLoader::name()
        });

        // Surface queries are only meaningful once the swapchain extension exists
        let (surface_format_count, present_mode_count) = if supports_swapchain {
            let support = surface.support(device)?;
            (support.formats.len(), support.present_modes.len())
        } else {
            (0, 0)
        };

        Ok(DeviceCandidate {
            name,
            device_type: properties.device_type,
            geometry_shader: features.geometry_shader == vk::TRUE,
            graphics_family,
            present_family,
            supports_swapchain,
            surface_format_count,
            present_mode_count,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with one queue per distinct family
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [physical.graphics_family, physical.present_family]
            .into_iter()
            .collect();

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical.graphics_family,
            present_family: physical.present_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
