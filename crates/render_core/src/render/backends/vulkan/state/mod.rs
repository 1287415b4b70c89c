// Vulkan state management

pub mod frame;
pub mod swapchain;
pub mod sync;

pub use frame::{next_index, run_frame, FrameDevice, FrameRing, FrameSlot, FrameStatus, FrameTarget};
pub use swapchain::{SwapchainConfig, SwapchainManager, DEPTH_FORMAT_CANDIDATES};
pub use sync::{Fence, FrameSync, Semaphore};
