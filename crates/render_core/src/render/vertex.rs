//! Vertex format consumed by the fixed graphics pipeline

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// Interleaved mesh vertex
///
/// The normal is carried for import compatibility; the pipeline reads only
/// position (location 0), color (location 1) and texture coordinates (location 2).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub pos: [f32; 3],
    /// Surface normal
    pub norm: [f32; 3],
    /// Vertex color
    pub color: [f32; 3],
    /// Texture coordinates
    pub tex: [f32; 2],
}

impl Vertex {
    /// Vertex with position, normal, color and texture coordinates
    pub const fn new(pos: [f32; 3], norm: [f32; 3], color: [f32; 3], tex: [f32; 2]) -> Self {
        Self { pos, norm, color, tex }
    }

    /// Vertex with a position and color, zero normal and texture coordinates
    pub const fn colored(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self::new(pos, [0.0; 3], color, [0.0; 2])
    }

    /// Vertex with a position, color and texture coordinates
    pub const fn textured(pos: [f32; 3], color: [f32; 3], tex: [f32; 2]) -> Self {
        Self::new(pos, [0.0; 3], color, tex)
    }

    /// Per-vertex binding 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attributes read by the vertex shader
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex) as u32,
            },
        ]
    }
}
