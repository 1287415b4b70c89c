// Vulkan rendering components

pub mod commands;
pub mod pipeline;
pub mod recorder;
pub mod render_pass;

pub use commands::{CommandPool, LayoutTransition};
pub use pipeline::{GraphicsPipeline, ShaderModule};
pub use recorder::FrameRecorder;
pub use render_pass::RenderPass;
