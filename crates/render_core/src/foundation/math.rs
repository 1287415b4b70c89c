//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the two camera matrices the renderer needs,
//! both producing Vulkan clip space (Y down, depth in `[0, 1]`).

pub use nalgebra::{Matrix4, Vector2, Vector3};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Right-handed perspective projection into Vulkan clip space
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let tan_half_fovy = (fov_y * 0.5).tan();

    let mut result = Mat4::zeros();
    result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
    // Vulkan's framebuffer Y axis points down
    result[(1, 1)] = -1.0 / tan_half_fovy;
    result[(2, 2)] = far / (near - far);
    result[(2, 3)] = (near * far) / (near - far);
    result[(3, 2)] = -1.0;
    result
}

/// Right-handed look-at view matrix
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}
