//! Descriptor layouts, the fixed-capacity pool and per-frame binding sets
//!
//! Every set uses the same layout:
//!
//! | binding     | type            | stage    | source                     |
//! |-------------|-----------------|----------|----------------------------|
//! | 0           | uniform buffer  | vertex   | per-frame [`UniformBufferData`] |
//! | 1           | sampler         | fragment | shared context sampler     |
//! | 2 ..= 1 + T | sampled image   | fragment | one per texture            |
//!
//! Sets are never freed individually. The pool hands out at most its declared
//! capacity and only its destruction reclaims them.

use ash::{vk, Device};

use super::allocator::{GpuBuffer, ResourceAllocator};
use super::texture::Texture;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::uniform::UniformBufferData;

/// Binding of the per-frame uniform buffer
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the shared sampler
pub const SAMPLER_BINDING: u32 = 1;
/// First sampled-image binding
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// Descriptor set layout builder for creating reusable layouts
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Layout shared by every [`DescriptorBindingSet`]
    pub fn binding_set(max_textures: u32) -> Self {
        (0..max_textures).fold(
            Self::new()
                .add_uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
                .add_sampler(SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT),
            |builder, i| builder.add_sampled_image(FIRST_TEXTURE_BINDING + i, vk::ShaderStageFlags::FRAGMENT),
        )
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a standalone sampler binding
    pub fn add_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::SAMPLER, stage_flags)
    }

    /// Add a sampled image binding
    pub fn add_sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::SAMPLED_IMAGE, stage_flags)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Count of sets handed out against a fixed maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBudget {
    in_use: u32,
    capacity: u32,
}

impl DescriptorBudget {
    /// Empty budget of `capacity` sets
    pub fn new(capacity: u32) -> Self {
        Self { in_use: 0, capacity }
    }

    /// Fail if `requested` more sets would exceed capacity
    pub fn check(&self, requested: u32) -> VulkanResult<()> {
        match self.in_use.checked_add(requested) {
            Some(total) if total <= self.capacity => Ok(()),
            _ => Err(VulkanError::DescriptorPoolExhausted {
                requested,
                in_use: self.in_use,
                capacity: self.capacity,
            }),
        }
    }

    /// Record `count` sets as handed out; call only after [`Self::check`] passed
    pub fn commit(&mut self, count: u32) {
        self.in_use += count;
    }

    /// Sets handed out so far
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// Maximum number of sets
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Descriptor pool sized for `max_sets` binding sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    budget: DescriptorBudget,
    max_textures: u32,
}

impl DescriptorPool {
    /// Create a pool holding `max_sets` sets of up to `max_textures` textures each
    pub fn new(device: Device, max_sets: u32, max_textures: u32) -> VulkanResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(max_sets)
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::SAMPLER)
                .descriptor_count(max_sets)
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(max_sets * max_textures.max(1))
                .build(),
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        log::debug!("Created descriptor pool for {} sets", max_sets);
        Ok(Self {
            pool,
            device,
            budget: DescriptorBudget::new(max_sets),
            max_textures,
        })
    }

    /// Allocate `count` sets with `layout`
    ///
    /// Rejected without a device call when the pool would run past capacity.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout, count: u32) -> VulkanResult<Vec<vk::DescriptorSet>> {
        self.budget.check(count)?;

        let layouts = vec![layout; count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::Api)?;
        self.budget.commit(count);
        Ok(sets)
    }

    /// Allocation accounting
    pub fn budget(&self) -> DescriptorBudget {
        self.budget
    }

    /// Sampled-image bindings per set
    pub fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Resource referenced by one descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Whole-range uniform buffer
    UniformBuffer {
        /// Buffer handle
        buffer: vk::Buffer,
        /// Bytes visible to the shader
        range: vk::DeviceSize,
    },
    /// Standalone sampler
    Sampler(vk::Sampler),
    /// Image view sampled in `SHADER_READ_ONLY_OPTIMAL`
    SampledImage(vk::ImageView),
}

impl DescriptorResource {
    /// Vulkan descriptor type of this resource
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            Self::Sampler(_) => vk::DescriptorType::SAMPLER,
            Self::SampledImage(_) => vk::DescriptorType::SAMPLED_IMAGE,
        }
    }
}

/// One descriptor write before it reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWrite {
    /// Destination binding
    pub binding: u32,
    /// Bound resource
    pub resource: DescriptorResource,
}

/// Reject the first null view, reporting its position
pub fn validate_views(views: &[vk::ImageView]) -> VulkanResult<()> {
    match views.iter().position(|view| *view == vk::ImageView::null()) {
        Some(texture_index) => Err(VulkanError::NullImageView { texture_index }),
        None => Ok(()),
    }
}

/// Check that `count` textures fit the `max_textures` image bindings of the layout
///
/// At least one texture is required: the fragment stage always samples the
/// first image binding.
pub fn validate_texture_count(count: usize, max_textures: u32) -> VulkanResult<()> {
    if count == 0 {
        return Err(VulkanError::InvalidOperation {
            reason: "descriptor binding set needs at least one texture".to_string(),
        });
    }
    if count > max_textures as usize {
        return Err(VulkanError::InvalidOperation {
            reason: format!("{count} textures exceed the layout's {max_textures} image bindings"),
        });
    }
    Ok(())
}

/// Writes for one set: uniform buffer, sampler, then one image per texture
pub fn plan_writes(
    uniform_buffer: vk::Buffer,
    range: vk::DeviceSize,
    sampler: vk::Sampler,
    views: &[vk::ImageView],
) -> VulkanResult<Vec<PlannedWrite>> {
    validate_views(views)?;

    let mut writes = Vec::with_capacity(2 + views.len());
    writes.push(PlannedWrite {
        binding: UNIFORM_BINDING,
        resource: DescriptorResource::UniformBuffer {
            buffer: uniform_buffer,
            range,
        },
    });
    writes.push(PlannedWrite {
        binding: SAMPLER_BINDING,
        resource: DescriptorResource::Sampler(sampler),
    });
    writes.extend(views.iter().enumerate().map(|(i, view)| PlannedWrite {
        binding: FIRST_TEXTURE_BINDING + i as u32,
        resource: DescriptorResource::SampledImage(*view),
    }));
    Ok(writes)
}

/// Issue `writes` against `set` in one update call
pub fn apply_writes(device: &Device, set: vk::DescriptorSet, writes: &[PlannedWrite]) {
    // Info arrays are fully built before any write points into them
    let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
        .iter()
        .filter_map(|write| match write.resource {
            DescriptorResource::UniformBuffer { buffer, range } => Some(vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            }),
            _ => None,
        })
        .collect();
    let image_infos: Vec<vk::DescriptorImageInfo> = writes
        .iter()
        .filter_map(|write| match write.resource {
            DescriptorResource::Sampler(sampler) => Some(vk::DescriptorImageInfo {
                sampler,
                ..Default::default()
            }),
            DescriptorResource::SampledImage(image_view) => Some(vk::DescriptorImageInfo {
                image_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ..Default::default()
            }),
            DescriptorResource::UniformBuffer { .. } => None,
        })
        .collect();

    let (mut next_buffer, mut next_image) = (0, 0);
    let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .map(|write| {
            let builder = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(write.resource.descriptor_type());
            match write.resource {
                DescriptorResource::UniformBuffer { .. } => {
                    next_buffer += 1;
                    builder
                        .buffer_info(std::slice::from_ref(&buffer_infos[next_buffer - 1]))
                        .build()
                }
                _ => {
                    next_image += 1;
                    builder
                        .image_info(std::slice::from_ref(&image_infos[next_image - 1]))
                        .build()
                }
            }
        })
        .collect();

    unsafe {
        device.update_descriptor_sets(&descriptor_writes, &[]);
    }
}

/// What a [`DescriptorBindingSet`] needs from its owner
///
/// Implemented by the render context; tests use a host-memory mock.
pub trait DescriptorBackend: ResourceAllocator {
    /// Allocate `count` sets with the shared layout
    fn allocate_sets(&mut self, count: u32) -> VulkanResult<Vec<vk::DescriptorSet>>;

    /// Write `writes` into `set`
    fn write_set(&mut self, set: vk::DescriptorSet, writes: &[PlannedWrite]);

    /// Shared sampler bound at binding 1
    fn sampler(&self) -> vk::Sampler;

    /// Sampled-image bindings declared by the shared layout
    fn max_textures(&self) -> u32;
}

/// Per-frame descriptor sets with their uniform buffers
///
/// Set `i` and uniform buffer `i` belong to frame slot `i`.
pub struct DescriptorBindingSet {
    sets: Vec<vk::DescriptorSet>,
    uniform_buffers: Vec<GpuBuffer>,
}

impl DescriptorBindingSet {
    /// Allocate and write `frames` sets binding `textures`
    pub fn create<B: DescriptorBackend + ?Sized>(
        backend: &mut B,
        frames: usize,
        textures: &[&Texture],
    ) -> VulkanResult<Self> {
        let views: Vec<vk::ImageView> = textures.iter().map(|texture| texture.image_view()).collect();
        Self::create_with_views(backend, frames, &views)
    }

    /// [`Self::create`] over raw image views
    ///
    /// Every view is checked before the first set is allocated, so a null view
    /// or more textures than the layout declares leave the pool and the device
    /// untouched.
    pub fn create_with_views<B: DescriptorBackend + ?Sized>(
        backend: &mut B,
        frames: usize,
        views: &[vk::ImageView],
    ) -> VulkanResult<Self> {
        validate_views(views)?;
        validate_texture_count(views.len(), backend.max_textures())?;
        if frames == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "descriptor binding set needs at least one frame".to_string(),
            });
        }

        let sets = backend.allocate_sets(frames as u32)?;
        let mut binding_set = Self {
            sets: Vec::with_capacity(frames),
            uniform_buffers: Vec::with_capacity(frames),
        };

        let range = std::mem::size_of::<UniformBufferData>() as vk::DeviceSize;
        for set in sets {
            let buffer = match backend.create_buffer(range, vk::BufferUsageFlags::UNIFORM_BUFFER) {
                Ok(buffer) => buffer,
                Err(e) => {
                    binding_set.destroy(backend);
                    return Err(e);
                }
            };
            let writes = plan_writes(buffer.handle(), range, backend.sampler(), views);
            binding_set.sets.push(set);
            binding_set.uniform_buffers.push(buffer);

            match writes {
                Ok(writes) => backend.write_set(set, &writes),
                Err(e) => {
                    binding_set.destroy(backend);
                    return Err(e);
                }
            }
        }

        log::debug!(
            "Created descriptor binding set: {} frames, {} textures",
            frames,
            views.len()
        );
        Ok(binding_set)
    }

    /// Descriptor set of frame slot `frame`
    pub fn set(&self, frame: usize) -> VulkanResult<vk::DescriptorSet> {
        self.sets
            .get(frame)
            .copied()
            .ok_or(VulkanError::FrameIndexOutOfRange {
                index: frame,
                count: self.sets.len(),
            })
    }

    /// Uniform buffer of frame slot `frame`
    pub fn uniform_buffer(&self, frame: usize) -> VulkanResult<&GpuBuffer> {
        self.uniform_buffers
            .get(frame)
            .ok_or(VulkanError::FrameIndexOutOfRange {
                index: frame,
                count: self.uniform_buffers.len(),
            })
    }

    /// Copy `data` into the uniform buffer of `frame`
    ///
    /// The memory is host-coherent, no flush follows.
    pub fn set_uniform_data<A: ResourceAllocator + ?Sized>(
        &self,
        allocator: &mut A,
        frame: usize,
        data: &UniformBufferData,
    ) -> VulkanResult<()> {
        let buffer = self.uniform_buffer(frame)?;
        allocator.write_buffer(buffer, 0, data.as_bytes())
    }

    /// Number of frame slots covered
    pub fn frames(&self) -> usize {
        self.sets.len()
    }

    /// Release the uniform buffers
    ///
    /// The sets themselves stay allocated until the pool is destroyed.
    pub fn destroy<A: ResourceAllocator + ?Sized>(&mut self, allocator: &mut A) {
        for buffer in self.uniform_buffers.drain(..) {
            allocator.destroy_buffer(buffer);
        }
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::resources::allocator::mock::MockAllocator;
    use ash::vk::Handle;

    struct MockDescriptorBackend {
        allocator: MockAllocator,
        budget: Option<DescriptorBudget>,
        max_textures: u32,
        device_calls: usize,
        writes: Vec<(vk::DescriptorSet, Vec<PlannedWrite>)>,
    }

    impl Default for MockDescriptorBackend {
        fn default() -> Self {
            Self {
                allocator: MockAllocator::default(),
                budget: None,
                max_textures: 4,
                device_calls: 0,
                writes: Vec::new(),
            }
        }
    }

    impl MockDescriptorBackend {
        fn with_capacity(capacity: u32) -> Self {
            Self {
                budget: Some(DescriptorBudget::new(capacity)),
                ..Default::default()
            }
        }

        /// Backend whose layout comes from `binding_set(max_textures)`
        fn with_layout(max_textures: u32) -> Self {
            let image_bindings = DescriptorSetLayoutBuilder::binding_set(max_textures)
                .bindings()
                .iter()
                .filter(|b| b.descriptor_type == vk::DescriptorType::SAMPLED_IMAGE)
                .count();
            Self {
                max_textures: image_bindings as u32,
                ..Default::default()
            }
        }
    }

    impl ResourceAllocator for MockDescriptorBackend {
        fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
            self.allocator.create_buffer(size, usage)
        }
        fn write_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
            self.allocator.write_buffer(buffer, offset, data)
        }
        fn read_buffer(&mut self, buffer: &GpuBuffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
            self.allocator.read_buffer(buffer, offset, len)
        }
        fn destroy_buffer(&mut self, buffer: GpuBuffer) {
            self.allocator.destroy_buffer(buffer)
        }
        fn wait_idle(&self) -> VulkanResult<()> {
            self.allocator.wait_idle()
        }
        fn live_buffers(&self) -> usize {
            self.allocator.live_buffers()
        }
    }

    impl DescriptorBackend for MockDescriptorBackend {
        fn allocate_sets(&mut self, count: u32) -> VulkanResult<Vec<vk::DescriptorSet>> {
            let budget = self.budget.get_or_insert(DescriptorBudget::new(u32::MAX));
            budget.check(count)?;
            budget.commit(count);
            self.device_calls += 1;
            let first = budget.in_use() - count;
            Ok((first..first + count)
                .map(|i| vk::DescriptorSet::from_raw(u64::from(i) + 1))
                .collect())
        }

        fn write_set(&mut self, set: vk::DescriptorSet, writes: &[PlannedWrite]) {
            self.writes.push((set, writes.to_vec()));
        }

        fn sampler(&self) -> vk::Sampler {
            vk::Sampler::from_raw(0x5a)
        }

        fn max_textures(&self) -> u32 {
            self.max_textures
        }
    }

    fn views(count: u64) -> Vec<vk::ImageView> {
        (1..=count).map(|i| vk::ImageView::from_raw(0x100 + i)).collect()
    }

    /// T textures give 2+T writes on consecutive bindings
    #[test]
    fn test_plan_writes_bindings() {
        for texture_count in 0..4 {
            let writes = plan_writes(
                vk::Buffer::from_raw(1),
                192,
                vk::Sampler::from_raw(2),
                &views(texture_count),
            )
            .unwrap();

            assert_eq!(writes.len(), 2 + texture_count as usize);
            let bindings: Vec<u32> = writes.iter().map(|w| w.binding).collect();
            let expected: Vec<u32> = (0..2 + texture_count as u32).collect();
            assert_eq!(bindings, expected);
        }
    }

    /// Binding 0 is the uniform buffer, 1 the sampler, the rest images
    #[test]
    fn test_plan_writes_resources() {
        let image_views = views(2);
        let writes = plan_writes(vk::Buffer::from_raw(7), 192, vk::Sampler::from_raw(8), &image_views).unwrap();

        assert_eq!(
            writes[0].resource,
            DescriptorResource::UniformBuffer {
                buffer: vk::Buffer::from_raw(7),
                range: 192
            }
        );
        assert_eq!(writes[1].resource, DescriptorResource::Sampler(vk::Sampler::from_raw(8)));
        assert_eq!(writes[2].resource, DescriptorResource::SampledImage(image_views[0]));
        assert_eq!(writes[3].resource, DescriptorResource::SampledImage(image_views[1]));
        assert_eq!(writes[3].resource.descriptor_type(), vk::DescriptorType::SAMPLED_IMAGE);
    }

    /// A null view is rejected with its index before any allocation or write
    #[test]
    fn test_null_view_rejected_before_writes() {
        let mut backend = MockDescriptorBackend::default();
        let mut image_views = views(3);
        image_views[1] = vk::ImageView::null();

        let err = DescriptorBindingSet::create_with_views(&mut backend, 2, &image_views)
            .err()
            .unwrap();

        assert!(matches!(err, VulkanError::NullImageView { texture_index: 1 }));
        assert_eq!(backend.device_calls, 0);
        assert!(backend.writes.is_empty());
        assert_eq!(backend.live_buffers(), 0);
    }

    /// Each frame gets its own set and its own uniform buffer
    #[test]
    fn test_binding_set_per_frame_buffers() {
        let mut backend = MockDescriptorBackend::default();
        let binding_set = DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1)).unwrap();

        assert_eq!(binding_set.frames(), 2);
        assert_eq!(backend.live_buffers(), 2);
        assert_eq!(backend.writes.len(), 2);
        assert_ne!(binding_set.set(0).unwrap(), binding_set.set(1).unwrap());

        let buffer_of = |writes: &[PlannedWrite]| match writes[0].resource {
            DescriptorResource::UniformBuffer { buffer, .. } => buffer,
            other => panic!("unexpected {other:?}"),
        };
        assert_ne!(buffer_of(&backend.writes[0].1), buffer_of(&backend.writes[1].1));
        assert_eq!(backend.writes[0].1.len(), 3);
    }

    /// Uniform updates land in the selected frame's buffer only
    #[test]
    fn test_set_uniform_data() {
        let mut backend = MockDescriptorBackend::default();
        let binding_set = DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1)).unwrap();

        let mut data = UniformBufferData::default();
        data.model[3] = [4.0, 5.0, 6.0, 1.0];
        binding_set.set_uniform_data(&mut backend, 1, &data).unwrap();

        let frame_1 = backend
            .read_buffer(binding_set.uniform_buffer(1).unwrap(), 0, 192)
            .unwrap();
        let frame_0 = backend
            .read_buffer(binding_set.uniform_buffer(0).unwrap(), 0, 192)
            .unwrap();
        assert_eq!(frame_1, data.as_bytes());
        assert!(frame_0.iter().all(|b| *b == 0));

        assert!(matches!(
            binding_set.set_uniform_data(&mut backend, 2, &data),
            Err(VulkanError::FrameIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    /// Destroy releases uniform buffers and nothing else
    #[test]
    fn test_destroy_releases_buffers() {
        let mut backend = MockDescriptorBackend::with_capacity(4);
        let mut binding_set = DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1)).unwrap();
        binding_set.destroy(&mut backend);

        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.allocator.destroyed.len(), 2);
        // Sets are only reclaimed with the pool
        assert_eq!(backend.budget.unwrap().in_use(), 2);
    }

    /// Exceeding capacity fails before any set is handed out
    #[test]
    fn test_budget_rejects_overflow() {
        let mut budget = DescriptorBudget::new(4);
        budget.check(3).unwrap();
        budget.commit(3);

        let err = budget.check(2).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::DescriptorPoolExhausted {
                requested: 2,
                in_use: 3,
                capacity: 4
            }
        ));
        assert_eq!(budget.in_use(), 3);
        budget.check(1).unwrap();
        assert!(budget.check(u32::MAX).is_err());
    }

    /// Pool exhaustion surfaces through binding set creation
    #[test]
    fn test_binding_set_pool_exhaustion() {
        let mut backend = MockDescriptorBackend::with_capacity(3);
        DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1)).unwrap();

        let err = DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1))
            .err()
            .unwrap();
        assert!(matches!(err, VulkanError::DescriptorPoolExhausted { .. }));
        assert_eq!(backend.live_buffers(), 2);
    }

    /// More textures than the layout has image bindings fail before allocation
    #[test]
    fn test_texture_count_exceeds_layout() {
        let mut backend = MockDescriptorBackend::with_layout(1);

        let err = DescriptorBindingSet::create_with_views(&mut backend, 2, &views(3))
            .err()
            .unwrap();

        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
        assert_eq!(backend.device_calls, 0);
        assert!(backend.writes.is_empty());
        assert_eq!(backend.live_buffers(), 0);

        // Exactly the layout's capacity is accepted and stays within its bindings
        DescriptorBindingSet::create_with_views(&mut backend, 2, &views(1)).unwrap();
        let max_binding = backend
            .writes
            .iter()
            .flat_map(|(_, writes)| writes.iter().map(|w| w.binding))
            .max();
        assert_eq!(max_binding, Some(FIRST_TEXTURE_BINDING));
    }

    /// A set without textures would leave the sampled binding unwritten
    #[test]
    fn test_texture_count_bounds() {
        assert!(validate_texture_count(0, 1).is_err());
        assert!(validate_texture_count(1, 1).is_ok());
        assert!(validate_texture_count(2, 1).is_err());
        assert!(validate_texture_count(3, 4).is_ok());

        let mut backend = MockDescriptorBackend::default();
        assert!(DescriptorBindingSet::create_with_views(&mut backend, 2, &[]).is_err());
        assert_eq!(backend.device_calls, 0);
    }

    /// Layout declares the fixed binding table
    #[test]
    fn test_layout_bindings() {
        let builder = DescriptorSetLayoutBuilder::binding_set(2);
        let bindings = builder.bindings();

        assert_eq!(bindings.len(), 4);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::SAMPLER);
        assert_eq!(bindings[2].binding, 2);
        assert_eq!(bindings[3].binding, 3);
        assert_eq!(bindings[3].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
