//! # Render Core
//!
//! A small Vulkan renderer: device bring-up, a swapchain that survives resizes,
//! a ring of frames in flight, and host-visible meshes, textures and
//! descriptor binding sets allocated through a single context.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     render_core::foundation::logging::init();
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut context = RenderContext::create(&mut window, &config)?;
//!
//!     let mut mesh = Mesh::triangle();
//!     mesh.create_buffers(context.resources_mut())?;
//!     mesh.upload(context.resources_mut())?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         context.draw_frame(&mut window, |frame| frame.draw_mesh(&mesh))?;
//!     }
//!
//!     mesh.destroy(context.resources_mut())?;
//!     context.destroy();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, RendererConfig, ShaderConfig},
        foundation::math::{look_at, perspective, Mat4, Vec3},
        render::{
            backends::vulkan::{DescriptorBindingSet, ResourceAllocator},
            FrameRecorder, FrameStatus, Mesh, RenderContext, Texture, UniformBufferData, Vertex, VulkanError,
            VulkanResult, Window,
        },
    };
}
