//! Textured quad viewer
//!
//! Draws two spinning squares, each with its own descriptor binding set. The
//! texture comes from the first command-line argument or falls back to a
//! generated checkerboard.
//!
//! An optional `viewer.toml` (or `viewer.ron`) in the working directory
//! overrides the renderer configuration.

use std::path::Path;
use std::time::Instant;

use render_core::config::{Config, ConfigError, RendererConfig};
use render_core::foundation::logging;
use render_core::foundation::math::{look_at, perspective, Mat4, Vec3};
use render_core::render::backends::vulkan::{DescriptorBindingSet, SurfaceProvider};
use render_core::render::{
    FrameStatus, Mesh, RenderContext, Texture, UniformBufferData, VulkanError, Window, WindowError,
};
use thiserror::Error;

const CONFIG_PATH: &str = "viewer.toml";
const RON_CONFIG_PATH: &str = "viewer.ron";
const CHECKER_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;

/// Everything that can end the viewer early
#[derive(Debug, Error)]
enum ViewerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("renderer: {0}")]
    Render(#[from] VulkanError),
}

/// RGBA checkerboard, light and dark grey
fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 220 } else { 60 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

fn load_texture(context: &mut RenderContext) -> Result<Texture, VulkanError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading texture {}", path);
            Texture::load(context.resources_mut(), path)
        }
        None => {
            log::info!("No texture given, using a generated checkerboard");
            let pixels = checkerboard(CHECKER_SIZE, CHECKER_CELL);
            Texture::from_rgba(context.resources_mut(), CHECKER_SIZE, CHECKER_SIZE, &pixels)
        }
    }
}

/// Model matrix for quad `index` of `count`, spun by `angle` radians
fn quad_model(index: usize, count: usize, angle: f32) -> Mat4 {
    let offset = index as f32 - (count as f32 - 1.0) * 0.5;
    let direction = if index % 2 == 0 { 1.0 } else { -1.0 };
    Mat4::new_translation(&Vec3::new(offset * 1.2, 0.0, 0.0))
        * Mat4::from_axis_angle(&Vec3::z_axis(), angle * direction)
}

fn run(config: &RendererConfig) -> Result<(), ViewerError> {
    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
    let mut context = RenderContext::create(&mut window, config)?;

    let mut mesh = Mesh::square();
    mesh.create_buffers(context.resources_mut())?;
    mesh.upload(context.resources_mut())?;

    let mut texture = load_texture(&mut context)?;
    let mut binding_sets: Vec<DescriptorBindingSet> = Vec::with_capacity(2);
    for _ in 0..2 {
        binding_sets.push(context.create_binding_set(&[&texture])?);
    }

    let view = look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), Vec3::y());
    let start = Instant::now();
    let mut frames: u64 = 0;
    let mut skipped: u64 = 0;

    while !window.should_close() {
        window.poll_events();

        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            window.wait_events();
            continue;
        }

        let angle = start.elapsed().as_secs_f32();
        let status = context.draw_frame(&mut window, |frame| {
            let proj = perspective(45f32.to_radians(), frame.aspect_ratio(), 0.1, 10.0);
            for (index, binding_set) in binding_sets.iter().enumerate() {
                let model = quad_model(index, binding_sets.len(), angle);
                frame.set_uniform_data(binding_set, &UniformBufferData::new(&model, &view, &proj))?;
                frame.bind_binding_set(binding_set)?;
                frame.draw_mesh(&mesh)?;
            }
            Ok(())
        })?;

        match status {
            FrameStatus::Presented => frames += 1,
            FrameStatus::Skipped => skipped += 1,
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    log::info!(
        "Presented {} frames ({} skipped) in {:.1}s, {:.1} fps",
        frames,
        skipped,
        elapsed,
        frames as f64 / elapsed.max(f64::EPSILON)
    );

    // Reverse creation order
    context.wait_idle()?;
    for binding_set in &mut binding_sets {
        binding_set.destroy(context.resources_mut());
    }
    texture.destroy(context.resources_mut());
    mesh.destroy(context.resources_mut())?;
    context.destroy();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = if Path::new(CONFIG_PATH).exists() {
        RendererConfig::load_from_file(CONFIG_PATH)?
    } else {
        RendererConfig::load_or_default(RON_CONFIG_PATH)?
    };
    logging::init_with_level(config.log_filter());

    log::info!("Starting {}", config.application_name);
    if let Err(e) = run(&config) {
        log::error!("Viewer failed: {}", e);
        return Err(e.into());
    }
    log::info!("Viewer finished");
    Ok(())
}
