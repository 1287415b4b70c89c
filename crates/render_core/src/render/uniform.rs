//! Per-draw uniform payload

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;

/// Model, view and projection matrices as written into the uniform buffer
///
/// Three column-major 4x4 `f32` matrices, 192 bytes, no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferData {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferData {
    /// Build from `nalgebra` matrices
    pub fn new(model: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }

    /// Raw bytes in upload order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for UniformBufferData {
    fn default() -> Self {
        let identity = Mat4::identity();
        Self::new(&identity, &identity, &identity)
    }
}
