//! Window management using GLFW
//!
//! Provides the presentation surface and resize notifications for the
//! Vulkan backend.

use ash::vk;
use thiserror::Error;

use crate::render::backends::vulkan::{SurfaceProvider, VulkanError, VulkanResult};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The platform refused to create the window
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW reported no Vulkan loader
    #[error("Vulkan is not supported by this GLFW build or platform")]
    VulkanUnsupported,
}

impl From<WindowError> for VulkanError {
    fn from(err: WindowError) -> Self {
        VulkanError::Window(err.to_string())
    }
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    framebuffer_resized: bool,
}

impl Window {
    /// Open a resizable window with no client API attached
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, WindowError> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;
        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        // Vulkan renders into the surface, no OpenGL context
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Opened window \"{}\" ({}x{})", title, width, height);
        Ok(Self {
            glfw,
            window,
            events,
            framebuffer_resized: false,
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request (or cancel) closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the event queue
    ///
    /// Framebuffer size changes raise the resize flag; Escape requests close.
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    self.framebuffer_resized = true;
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                _ => {}
            }
        }
    }

    /// Block until an event arrives, then process it
    ///
    /// Used while minimized so the loop does not spin on a zero-sized surface.
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
        self.poll_events();
    }

    /// Whether a resize is pending
    pub fn framebuffer_resized(&self) -> bool {
        self.framebuffer_resized
    }

    /// Seconds since GLFW initialization
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::Window("Failed to get required extensions".to_string()))
    }

    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::Window(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.framebuffer_resized)
    }
}
