//! GPU resource allocator facade
//!
//! Wraps `vk-mem` behind [`ResourceAllocator`] so wrappers such as
//! [`Mesh`](super::Mesh) and [`DescriptorBindingSet`](super::DescriptorBindingSet)
//! never touch allocator internals.
//!
//! ## Ownership
//!
//! Allocations live in a `SlotMap` arena inside the allocator. Resource wrappers
//! hold a `(vk handle, AllocationKey)` pair and hand it back on destroy, so the
//! arena length always equals the number of wrapper-held handles.
//!
//! ## Residency policy
//!
//! Buffers the host writes (uniform, vertex, index, staging) live in host-visible,
//! host-coherent memory and are written by a plain copy into mapped memory.
//! Sampled and depth images live in device-local memory. Allocation failures are
//! surfaced as [`VulkanError::AllocationFailed`]; nothing is evicted or retried.

use ash::vk;
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

slotmap::new_key_type! {
    /// Stable key of one allocation in the allocator arena
    pub struct AllocationKey;
}

/// Memory class chosen for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryResidency {
    /// Mappable memory; host writes are visible to the device without flushes
    HostVisibleCoherent,
    /// Fastest device memory, not host accessible
    DeviceLocal,
}

impl MemoryResidency {
    /// Residency for a buffer with the given usage
    ///
    /// Anything the host fills (uniform, vertex, index, staging source) is
    /// host-visible; buffers only written by the device stay device-local.
    pub fn for_buffer(usage: vk::BufferUsageFlags) -> Self {
        let host_written = vk::BufferUsageFlags::UNIFORM_BUFFER
            | vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC;
        if usage.is_empty() || usage.intersects(host_written) {
            Self::HostVisibleCoherent
        } else {
            Self::DeviceLocal
        }
    }

    /// Residency for images (sampled textures and depth targets)
    pub fn for_image(_usage: vk::ImageUsageFlags) -> Self {
        Self::DeviceLocal
    }

    /// Memory property flags a backing memory type must have
    pub fn required_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::HostVisibleCoherent => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            Self::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    fn allocation_info(self) -> vk_mem::AllocationCreateInfo {
        let flags = match self {
            Self::HostVisibleCoherent => vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            Self::DeviceLocal => vk_mem::AllocationCreateFlags::empty(),
        };
        vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags,
            required_flags: self.required_flags(),
            ..Default::default()
        }
    }
}

/// Index of the first memory type allowed by `type_filter` with all `required` properties
///
/// `type_filter` is a bitmask from `VkMemoryRequirements::memoryTypeBits`; type `i`
/// is allowed only when bit `i` is set.
pub fn find_memory_type(
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            let allowed = type_filter & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Buffer plus its allocation key; exclusively owned by one wrapper
#[derive(Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    handle: vk::Buffer,
    key: AllocationKey,
    size: vk::DeviceSize,
    residency: MemoryResidency,
}

impl GpuBuffer {
    pub(crate) fn new(
        handle: vk::Buffer,
        key: AllocationKey,
        size: vk::DeviceSize,
        residency: MemoryResidency,
    ) -> Self {
        Self {
            handle,
            key,
            size,
            residency,
        }
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Allocation key in the owning allocator
    pub fn key(&self) -> AllocationKey {
        self.key
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory class backing this buffer
    pub fn residency(&self) -> MemoryResidency {
        self.residency
    }

    /// Validate that `[offset, offset + len)` lies inside a host-visible buffer
    pub(crate) fn check_host_range(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<()> {
        if self.residency != MemoryResidency::HostVisibleCoherent {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer is not host visible".to_string(),
            });
        }
        let end = offset.checked_add(len as vk::DeviceSize);
        if end.map_or(true, |end| end > self.size) {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "range {}..{} exceeds buffer size {}",
                    offset,
                    offset.saturating_add(len as vk::DeviceSize),
                    self.size
                ),
            });
        }
        Ok(())
    }
}

/// Image plus its allocation key
#[derive(Debug, PartialEq, Eq)]
pub struct GpuImage {
    handle: vk::Image,
    key: AllocationKey,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl GpuImage {
    /// Raw image handle
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

/// Parameters for a single-mip 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Width and height in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Intended usage
    pub usage: vk::ImageUsageFlags,
}

/// Buffer operations shared by every resource wrapper
pub trait ResourceAllocator {
    /// Create a buffer whose residency follows [`MemoryResidency::for_buffer`]
    fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer>;

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()>;

    /// Read `len` bytes back from a host-visible buffer
    fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>>;

    /// Release a buffer and its memory
    ///
    /// The caller guarantees the device no longer references it.
    fn destroy_buffer(&mut self, buffer: GpuBuffer);

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Number of buffers currently allocated
    fn live_buffers(&self) -> usize;
}

/// `vk-mem` backed allocator
pub struct VmaAllocator {
    device: ash::Device,
    allocator: vk_mem::Allocator,
    buffers: SlotMap<AllocationKey, vk_mem::Allocation>,
    images: SlotMap<AllocationKey, vk_mem::Allocation>,
}

impl VmaAllocator {
    /// Create the allocator for `device`
    ///
    /// Fails with [`VulkanError::NoSuitableMemoryType`] when the device cannot back
    /// either residency class.
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
    ) -> VulkanResult<Self> {
        for residency in [MemoryResidency::HostVisibleCoherent, MemoryResidency::DeviceLocal] {
            let index = find_memory_type(u32::MAX, residency.required_flags(), memory_properties)?;
            log::debug!("{:?} memory served from type {}", residency, index);
        }

        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        let allocator = vk_mem::Allocator::new(create_info).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to create memory allocator: {e:?}"))
        })?;

        Ok(Self {
            device: device.clone(),
            allocator,
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
        })
    }

    /// Create a device-local 2D image with a single mip level
    pub fn create_image(&mut self, desc: &ImageDesc) -> VulkanResult<GpuImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let alloc_info = MemoryResidency::for_image(desc.usage).allocation_info();
        let (handle, allocation) = unsafe { self.allocator.create_image(&image_info, &alloc_info) }
            .map_err(|e| VulkanError::AllocationFailed {
                reason: format!(
                    "{}x{} {:?} image: {:?}",
                    desc.extent.width, desc.extent.height, desc.format, e
                ),
            })?;

        let key = self.images.insert(allocation);
        log::debug!(
            "Created {}x{} {:?} image ({} live)",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            self.images.len()
        );

        Ok(GpuImage {
            handle,
            key,
            extent: desc.extent,
            format: desc.format,
        })
    }

    /// Release an image and its memory
    pub fn destroy_image(&mut self, image: GpuImage) {
        match self.images.remove(image.key) {
            Some(mut allocation) => unsafe {
                self.allocator.destroy_image(image.handle, &mut allocation);
            },
            None => log::warn!("Image {:?} not owned by this allocator", image.handle),
        }
    }

    /// Number of images currently allocated
    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    fn with_mapped<R>(
        &mut self,
        buffer: &GpuBuffer,
        f: impl FnOnce(*mut u8) -> R,
    ) -> VulkanResult<R> {
        let allocation = self
            .buffers
            .get_mut(buffer.key)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("buffer {:?} not owned by this allocator", buffer.handle),
            })?;

        unsafe {
            let ptr = self
                .allocator
                .map_memory(allocation)
                .map_err(VulkanError::Api)?;
            let result = f(ptr);
            self.allocator.unmap_memory(allocation);
            Ok(result)
        }
    }
}

impl ResourceAllocator for VmaAllocator {
    fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot create a zero-sized buffer".to_string(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let residency = MemoryResidency::for_buffer(usage);
        let alloc_info = residency.allocation_info();
        let (handle, allocation) = unsafe { self.allocator.create_buffer(&buffer_info, &alloc_info) }
            .map_err(|e| VulkanError::AllocationFailed {
                reason: format!("{size} byte {usage:?} buffer: {e:?}"),
            })?;

        let key = self.buffers.insert(allocation);
        log::debug!("Created {} byte {:?} buffer ({} live)", size, usage, self.buffers.len());

        Ok(GpuBuffer::new(handle, key, size, residency))
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        buffer.check_host_range(offset, data.len())?;
        let offset = usize::try_from(offset).map_err(|_| VulkanError::InvalidOperation {
            reason: "buffer offset exceeds address space".to_string(),
        })?;
        self.with_mapped(buffer, |ptr| unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset), data.len());
        })
    }

    fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        buffer.check_host_range(offset, len)?;
        let offset = usize::try_from(offset).map_err(|_| VulkanError::InvalidOperation {
            reason: "buffer offset exceeds address space".to_string(),
        })?;
        self.with_mapped(buffer, |ptr| unsafe {
            std::slice::from_raw_parts(ptr.add(offset), len).to_vec()
        })
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        match self.buffers.remove(buffer.key) {
            Some(mut allocation) => unsafe {
                self.allocator.destroy_buffer(buffer.handle, &mut allocation);
            },
            None => log::warn!("Buffer {:?} not owned by this allocator", buffer.handle),
        }
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for VmaAllocator {
    fn drop(&mut self) {
        if !self.buffers.is_empty() || !self.images.is_empty() {
            log::warn!(
                "Allocator dropped with {} buffers and {} images still alive",
                self.buffers.len(),
                self.images.len()
            );
        }
    }
}

/// Host-memory allocator for exercising resource wrappers without a GPU
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use ash::vk::Handle;

    #[derive(Default)]
    pub(crate) struct MockAllocator {
        pub memory: SlotMap<AllocationKey, Vec<u8>>,
        pub next_handle: u64,
        pub idle_waits: std::cell::Cell<usize>,
        pub idle_error: Option<vk::Result>,
        pub destroyed: Vec<vk::Buffer>,
    }

    impl ResourceAllocator for MockAllocator {
        fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
            self.next_handle += 1;
            let key = self.memory.insert(vec![0; size as usize]);
            Ok(GpuBuffer::new(
                vk::Buffer::from_raw(self.next_handle),
                key,
                size,
                MemoryResidency::for_buffer(usage),
            ))
        }

        fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
            buffer.check_host_range(offset, data.len())?;
            let bytes = self.memory.get_mut(buffer.key()).ok_or(VulkanError::InvalidOperation {
                reason: "unknown buffer".to_string(),
            })?;
            let start = offset as usize;
            bytes[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
            buffer.check_host_range(offset, len)?;
            let bytes = self.memory.get(buffer.key()).ok_or(VulkanError::InvalidOperation {
                reason: "unknown buffer".to_string(),
            })?;
            let start = offset as usize;
            Ok(bytes[start..start + len].to_vec())
        }

        fn destroy_buffer(&mut self, buffer: GpuBuffer) {
            self.memory.remove(buffer.key());
            self.destroyed.push(buffer.handle());
        }

        fn wait_idle(&self) -> VulkanResult<()> {
            self.idle_waits.set(self.idle_waits.get() + 1);
            self.idle_error.map_or(Ok(()), |err| Err(VulkanError::Api(err)))
        }

        fn live_buffers(&self) -> usize {
            self.memory.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockAllocator;
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    /// A type whose filter bit is clear is skipped even if its properties match
    #[test]
    fn test_find_memory_type_respects_filter_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        // Type 1 matches but is excluded by the filter; only type 2 is allowed
        assert_eq!(find_memory_type(0b100, host, &props).unwrap(), 2);
        assert_eq!(find_memory_type(0b110, host, &props).unwrap(), 1);
    }

    /// A filter that allows nothing finds nothing
    #[test]
    fn test_find_memory_type_empty_filter() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            find_memory_type(0, vk::MemoryPropertyFlags::DEVICE_LOCAL, &props),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    /// All required properties must be present, not just some
    #[test]
    fn test_find_memory_type_requires_all_properties() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let required = MemoryResidency::HostVisibleCoherent.required_flags();
        assert_eq!(find_memory_type(u32::MAX, required, &props).unwrap(), 1);
    }

    /// Host-written buffers are host visible; images are device local
    #[test]
    fn test_residency_policy() {
        for usage in [
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::BufferUsageFlags::TRANSFER_SRC,
        ] {
            assert_eq!(MemoryResidency::for_buffer(usage), MemoryResidency::HostVisibleCoherent);
        }
        assert_eq!(
            MemoryResidency::for_buffer(vk::BufferUsageFlags::STORAGE_BUFFER),
            MemoryResidency::DeviceLocal
        );
        assert_eq!(
            MemoryResidency::for_image(vk::ImageUsageFlags::SAMPLED),
            MemoryResidency::DeviceLocal
        );
        assert_eq!(
            MemoryResidency::for_image(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
            MemoryResidency::DeviceLocal
        );
    }

    /// Out-of-range host writes are rejected
    #[test]
    fn test_write_out_of_range() {
        let mut allocator = MockAllocator::default();
        let buffer = allocator
            .create_buffer(16, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .unwrap();
        assert!(allocator.write_buffer(&buffer, 8, &[0u8; 16]).is_err());
        assert!(allocator.write_buffer(&buffer, 0, &[0u8; 16]).is_ok());
        allocator.destroy_buffer(buffer);
    }

    /// Device-local buffers cannot be mapped
    #[test]
    fn test_device_local_not_mappable() {
        let mut allocator = MockAllocator::default();
        let buffer = allocator
            .create_buffer(16, vk::BufferUsageFlags::STORAGE_BUFFER)
            .unwrap();
        assert!(allocator.read_buffer(&buffer, 0, 4).is_err());
        allocator.destroy_buffer(buffer);
    }

    /// Live count tracks create/destroy pairs
    #[test]
    fn test_live_count_matches_handles() {
        let mut allocator = MockAllocator::default();
        let a = allocator.create_buffer(4, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
        let b = allocator.create_buffer(4, vk::BufferUsageFlags::INDEX_BUFFER).unwrap();
        assert_eq!(allocator.live_buffers(), 2);
        allocator.destroy_buffer(a);
        assert_eq!(allocator.live_buffers(), 1);
        allocator.destroy_buffer(b);
        assert_eq!(allocator.live_buffers(), 0);
    }
}
