//! Indexed geometry with host-visible vertex and index buffers
//!
//! Lifecycle: construct on the CPU, [`Mesh::create_buffers`] (idempotent),
//! [`Mesh::upload`], [`Mesh::draw`] any number of times, then [`Mesh::destroy`].

use ash::{vk, Device};

use super::allocator::{GpuBuffer, ResourceAllocator};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::vertex::Vertex;

/// CPU vertex/index arrays plus their GPU buffer pair
#[derive(Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    buffers: Option<MeshBuffers>,
}

struct MeshBuffers {
    vertex: GpuBuffer,
    index: GpuBuffer,
}

impl Mesh {
    /// Mesh over `vertices` and 16-bit `indices`, not yet on the GPU
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        Self {
            vertices,
            indices,
            buffers: None,
        }
    }

    /// Single RGB triangle
    pub fn triangle() -> Self {
        Self::new(
            vec![
                Vertex::colored([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
                Vertex::colored([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
                Vertex::colored([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
            ],
            vec![0, 1, 2],
        )
    }

    /// Unit square in the XY plane with texture coordinates
    pub fn square() -> Self {
        Self::new(
            vec![
                Vertex::textured([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0]),
                Vertex::textured([0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::textured([0.5, 0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
                Vertex::textured([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    /// Replace the CPU vertices; takes effect on the next upload
    pub fn set_vertices(&mut self, vertices: Vec<Vertex>) {
        self.vertices = vertices;
    }

    /// Replace the CPU indices; takes effect on the next upload
    pub fn set_indices(&mut self, indices: Vec<u16>) {
        self.indices = indices;
    }

    /// CPU vertices
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// CPU indices
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Index count used by [`Self::draw`]
    pub fn num_indices(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Whether GPU buffers exist
    pub fn is_allocated(&self) -> bool {
        self.buffers.is_some()
    }

    /// Vertex buffer, if allocated
    pub fn vertex_buffer(&self) -> Option<&GpuBuffer> {
        self.buffers.as_ref().map(|b| &b.vertex)
    }

    /// Index buffer, if allocated
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        self.buffers.as_ref().map(|b| &b.index)
    }

    fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Allocate buffers sized to the current arrays; no-op once allocated
    pub fn create_buffers<A: ResourceAllocator + ?Sized>(&mut self, allocator: &mut A) -> VulkanResult<()> {
        if self.buffers.is_some() {
            return Ok(());
        }
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot allocate buffers for an empty mesh".to_string(),
            });
        }

        let vertex = allocator.create_buffer(
            self.vertex_bytes().len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index = match allocator.create_buffer(
            self.index_bytes().len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER,
        ) {
            Ok(index) => index,
            Err(e) => {
                allocator.destroy_buffer(vertex);
                return Err(e);
            }
        };

        log::debug!(
            "Allocated mesh buffers: {} vertices, {} indices",
            self.vertices.len(),
            self.indices.len()
        );
        self.buffers = Some(MeshBuffers { vertex, index });
        Ok(())
    }

    /// Copy the CPU arrays into the GPU buffers
    ///
    /// Fails if the buffers were never allocated or the arrays outgrew them.
    pub fn upload<A: ResourceAllocator + ?Sized>(&self, allocator: &mut A) -> VulkanResult<()> {
        let buffers = self.buffers.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "mesh uploaded before create_buffers".to_string(),
        })?;
        allocator.write_buffer(&buffers.vertex, 0, self.vertex_bytes())?;
        allocator.write_buffer(&buffers.index, 0, self.index_bytes())
    }

    /// Index count a draw may record against the allocated index buffer
    ///
    /// Fails when the buffers are missing or the CPU indices grew past the
    /// index buffer since allocation.
    pub fn draw_index_count(&self) -> VulkanResult<u32> {
        self.drawable_buffers().map(|(_, index_count)| index_count)
    }

    fn drawable_buffers(&self) -> VulkanResult<(&MeshBuffers, u32)> {
        let buffers = self.buffers.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "mesh drawn before create_buffers".to_string(),
        })?;
        let needed = self.index_bytes().len() as vk::DeviceSize;
        if needed > buffers.index.size() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} indices do not fit the {}-byte index buffer",
                    self.indices.len(),
                    buffers.index.size()
                ),
            });
        }
        Ok((buffers, self.num_indices()))
    }

    /// Bind both buffers and record one indexed draw over every index
    pub fn draw(&self, device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let (buffers, index_count) = self.drawable_buffers()?;

        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[buffers.vertex.handle()], &[0]);
            device.cmd_bind_index_buffer(command_buffer, buffers.index.handle(), 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
        Ok(())
    }

    /// Wait for the device to go idle, then release both buffers
    ///
    /// A mesh that was never allocated (or already destroyed) is left alone
    /// without waiting. If the wait fails the buffers are kept, since the GPU
    /// may still be reading them.
    pub fn destroy<A: ResourceAllocator + ?Sized>(&mut self, allocator: &mut A) -> VulkanResult<()> {
        if self.buffers.is_none() {
            return Ok(());
        }

        if let Err(e) = allocator.wait_idle() {
            log::error!("Device wait failed, keeping mesh buffers alive: {}", e);
            return Err(e);
        }
        if let Some(buffers) = self.buffers.take() {
            allocator.destroy_buffer(buffers.vertex);
            allocator.destroy_buffer(buffers.index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::resources::allocator::mock::MockAllocator;

    /// Uploaded arrays read back byte for byte
    #[test]
    fn test_round_trip_readback() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::square();
        mesh.create_buffers(&mut allocator).unwrap();
        mesh.upload(&mut allocator).unwrap();

        let vertex_buffer = mesh.vertex_buffer().unwrap();
        let index_buffer = mesh.index_buffer().unwrap();
        let vertices = allocator
            .read_buffer(vertex_buffer, 0, vertex_buffer.size() as usize)
            .unwrap();
        let indices = allocator
            .read_buffer(index_buffer, 0, index_buffer.size() as usize)
            .unwrap();

        assert_eq!(vertices, bytemuck::cast_slice::<Vertex, u8>(mesh.vertices()));
        assert_eq!(indices, bytemuck::cast_slice::<u16, u8>(mesh.indices()));
    }

    /// Triangle scenario: three indices, single destroy is safe
    #[test]
    fn test_triangle_lifecycle() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::triangle();
        mesh.create_buffers(&mut allocator).unwrap();
        mesh.upload(&mut allocator).unwrap();
        assert_eq!(mesh.num_indices(), 3);

        mesh.destroy(&mut allocator).unwrap();
        assert!(!mesh.is_allocated());
        assert_eq!(allocator.live_buffers(), 0);
        assert_eq!(allocator.idle_waits.get(), 1);

        // A second destroy finds nothing to release
        mesh.destroy(&mut allocator).unwrap();
        assert_eq!(allocator.destroyed.len(), 2);
        assert_eq!(allocator.idle_waits.get(), 1);
    }

    /// Destroying a never-allocated mesh touches nothing
    #[test]
    fn test_destroy_unallocated_is_noop() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::triangle();
        mesh.destroy(&mut allocator).unwrap();

        assert_eq!(allocator.idle_waits.get(), 0);
        assert!(allocator.destroyed.is_empty());
    }

    /// Repeat allocation keeps the first buffer pair
    #[test]
    fn test_create_buffers_idempotent() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::square();
        mesh.create_buffers(&mut allocator).unwrap();
        let first = mesh.vertex_buffer().unwrap().handle();

        mesh.create_buffers(&mut allocator).unwrap();
        assert_eq!(allocator.live_buffers(), 2);
        assert_eq!(mesh.vertex_buffer().unwrap().handle(), first);
    }

    /// Upload needs buffers; arrays that grew past them are rejected
    #[test]
    fn test_upload_requires_allocation() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::triangle();
        assert!(matches!(
            mesh.upload(&mut allocator),
            Err(VulkanError::InvalidOperation { .. })
        ));

        mesh.create_buffers(&mut allocator).unwrap();
        mesh.set_indices(vec![0, 1, 2, 2, 1, 0]);
        assert!(mesh.upload(&mut allocator).is_err());
        // Nor may a draw read past the three-index buffer
        assert!(matches!(
            mesh.draw_index_count(),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    /// Draws cover every index that fits the allocated buffer
    #[test]
    fn test_draw_index_count() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::square();
        assert!(mesh.draw_index_count().is_err());

        mesh.create_buffers(&mut allocator).unwrap();
        assert_eq!(mesh.draw_index_count().unwrap(), 6);

        // Shrinking stays within the buffer
        mesh.set_indices(vec![0, 1, 2]);
        assert_eq!(mesh.draw_index_count().unwrap(), 3);
    }

    /// A failed idle wait leaves the buffers allocated
    #[test]
    fn test_destroy_keeps_buffers_when_wait_fails() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::triangle();
        mesh.create_buffers(&mut allocator).unwrap();

        allocator.idle_error = Some(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(
            mesh.destroy(&mut allocator),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(mesh.is_allocated());
        assert_eq!(allocator.live_buffers(), 2);
        assert!(allocator.destroyed.is_empty());

        allocator.idle_error = None;
        mesh.destroy(&mut allocator).unwrap();
        assert_eq!(allocator.live_buffers(), 0);
    }

    /// Empty meshes cannot be allocated
    #[test]
    fn test_empty_mesh_rejected() {
        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::default();
        assert!(mesh.create_buffers(&mut allocator).is_err());
        assert_eq!(allocator.live_buffers(), 0);
    }

    /// Vertex buffers are host-visible for direct writes
    #[test]
    fn test_buffers_host_visible() {
        use crate::render::backends::vulkan::resources::allocator::MemoryResidency;

        let mut allocator = MockAllocator::default();
        let mut mesh = Mesh::triangle();
        mesh.create_buffers(&mut allocator).unwrap();
        assert_eq!(
            mesh.vertex_buffer().unwrap().residency(),
            MemoryResidency::HostVisibleCoherent
        );
        assert_eq!(mesh.index_buffer().unwrap().size(), 6);
    }
}
