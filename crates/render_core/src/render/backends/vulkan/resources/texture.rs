//! Sampled textures and depth targets
//!
//! Sampled texture upload path:
//!
//! 1. decode to RGBA8 (forced four channels)
//! 2. copy into a transient host-visible staging buffer
//! 3. allocate a device-local `R8G8B8A8_SRGB` image
//! 4. `UNDEFINED -> TRANSFER_DST_OPTIMAL`, copy, `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL`
//! 5. create the view and destroy the staging buffer
//!
//! Depth targets skip staging and go straight to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.

use ash::vk;
use std::path::Path;

use super::allocator::{GpuImage, ImageDesc, ResourceAllocator};
use super::gpu_resources::GpuResources;
use crate::render::backends::vulkan::rendering::commands::depth_aspect;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Texel format of sampled textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaPixels {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA bytes, `width * height * 4` long
    pub data: Vec<u8>,
}

impl RgbaPixels {
    /// Decode an image file, converting any channel layout to RGBA8
    pub fn open(path: impl AsRef<Path>) -> VulkanResult<Self> {
        let decoded = image::open(path.as_ref())?;
        Ok(Self::from_image(&decoded))
    }

    /// Decode an in-memory encoded image
    pub fn decode(bytes: &[u8]) -> VulkanResult<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&decoded))
    }

    fn from_image(decoded: &image::DynamicImage) -> Self {
        let rgba = decoded.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
        }
    }

    /// Byte length `width * height * 4` must hold for uploaded pixels
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize).checked_mul(height as usize)?.checked_mul(4)
    }
}

/// Device-local image with a view
pub struct Texture {
    image: Option<GpuImage>,
    view: vk::ImageView,
    width: u32,
    height: u32,
    format: vk::Format,
}

impl Texture {
    /// Decode `path` and upload it as a sampled texture
    pub fn load(resources: &mut GpuResources, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let pixels = RgbaPixels::open(path)?;
        log::debug!(
            "Decoded texture {} ({}x{})",
            path.display(),
            pixels.width,
            pixels.height
        );
        Self::from_rgba(resources, pixels.width, pixels.height, &pixels.data)
    }

    /// Upload already-decoded RGBA8 pixels as a sampled texture
    pub fn from_rgba(resources: &mut GpuResources, width: u32, height: u32, pixels: &[u8]) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("texture size {width}x{height} is empty"),
            });
        }
        if RgbaPixels::expected_len(width, height) != Some(pixels.len()) {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} bytes of pixel data do not match a {}x{} RGBA8 image",
                    pixels.len(),
                    width,
                    height
                ),
            });
        }

        let staging = resources.create_buffer(pixels.len() as vk::DeviceSize, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let uploaded = resources
            .write_buffer(&staging, 0, pixels)
            .and_then(|()| Self::upload_from_staging(resources, staging.handle(), width, height));
        // Staging memory is released whether or not the upload succeeded
        resources.destroy_buffer(staging);
        let image = uploaded?;

        let view = match resources.create_image_view(image.handle(), TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR) {
            Ok(view) => view,
            Err(e) => {
                resources.destroy_image(image);
                return Err(e);
            }
        };

        Ok(Self {
            image: Some(image),
            view,
            width,
            height,
            format: TEXTURE_FORMAT,
        })
    }

    fn upload_from_staging(
        resources: &mut GpuResources,
        staging: vk::Buffer,
        width: u32,
        height: u32,
    ) -> VulkanResult<GpuImage> {
        let image = resources.create_image(&ImageDesc {
            extent: vk::Extent2D { width, height },
            format: TEXTURE_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        })?;

        let handle = image.handle();
        let result = resources
            .transition_image_layout(
                handle,
                TEXTURE_FORMAT,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .and_then(|()| resources.copy_buffer_to_image(staging, handle, width, height))
            .and_then(|()| {
                resources.transition_image_layout(
                    handle,
                    TEXTURE_FORMAT,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            });

        match result {
            Ok(()) => Ok(image),
            Err(e) => {
                resources.destroy_image(image);
                Err(e)
            }
        }
    }

    /// Create a depth attachment in `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` layout
    pub fn create_depth_buffer(
        resources: &mut GpuResources,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> VulkanResult<Self> {
        let image = resources.create_image(&ImageDesc {
            extent: vk::Extent2D { width, height },
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        })?;

        let view = match resources.create_image_view(image.handle(), format, vk::ImageAspectFlags::DEPTH) {
            Ok(view) => view,
            Err(e) => {
                resources.destroy_image(image);
                return Err(e);
            }
        };

        let mut texture = Self {
            image: Some(image),
            view,
            width,
            height,
            format,
        };

        if let Err(e) = resources.transition_image_layout(
            texture.image_handle(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ) {
            texture.destroy(resources);
            return Err(e);
        }

        log::debug!(
            "Created {}x{} depth target {:?} ({:?})",
            width,
            height,
            format,
            depth_aspect(format)
        );
        Ok(texture)
    }

    /// Image view, null once destroyed
    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    /// Image handle, null once destroyed
    pub fn image_handle(&self) -> vk::Image {
        self.image.as_ref().map_or(vk::Image::null(), GpuImage::handle)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Release the view and image; calling again is a no-op
    ///
    /// The caller must ensure the GPU no longer samples or renders to it.
    pub fn destroy(&mut self, resources: &mut GpuResources) {
        if self.view != vk::ImageView::null() {
            resources.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        if let Some(image) = self.image.take() {
            resources.destroy_image(image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(image: &image::DynamicImage) -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    /// RGB sources are expanded to four channels with opaque alpha
    #[test]
    fn test_decode_forces_rgba() {
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let pixels = RgbaPixels::decode(&encode_png(&image::DynamicImage::ImageRgb8(rgb))).unwrap();

        assert_eq!((pixels.width, pixels.height), (3, 2));
        assert_eq!(pixels.data.len(), 3 * 2 * 4);
        assert_eq!(&pixels.data[..4], &[10, 20, 30, 255]);
    }

    /// Grayscale sources are expanded as well
    #[test]
    fn test_decode_grayscale() {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([128]));
        let pixels = RgbaPixels::decode(&encode_png(&image::DynamicImage::ImageLuma8(gray))).unwrap();
        assert_eq!(&pixels.data[..4], &[128, 128, 128, 255]);
    }

    /// Garbage input is a decode error, not a panic
    #[test]
    fn test_decode_garbage() {
        assert!(matches!(RgbaPixels::decode(b"not an image"), Err(VulkanError::Image(_))));
    }

    /// Expected byte length guards against overflow
    #[test]
    fn test_expected_len() {
        assert_eq!(RgbaPixels::expected_len(4, 4), Some(64));
        assert_eq!(RgbaPixels::expected_len(0, 4), Some(0));
    }
}
