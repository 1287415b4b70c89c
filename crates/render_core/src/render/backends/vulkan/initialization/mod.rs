//! Instance, surface and device bring-up

pub mod device;
pub mod instance;
pub mod surface;

pub use device::{select_device, DeviceCandidate, LogicalDevice, PhysicalDeviceInfo};
pub use instance::VulkanInstance;
pub use surface::{PresentSurface, SurfaceProvider, SurfaceSupport};
