use ash::{vk, Device};

use super::config::TransformDelivery;
use super::scene::Transforms;
use super::tracker::{ResourceKind, ResourceTracker};
use crate::vulkan::{Allocator, GpuBuffer, MemoryLocation};
use crate::{Result, VkContext};

pub const TRANSFORMS_BINDING: u32 = 0;
pub const LIGHTING_BINDING: u32 = 1;

pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// One pool entry per descriptor type, sized for a single set.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            match sizes.iter_mut().find(|size| size.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += binding.descriptor_count,
                None => sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(binding.descriptor_count),
                ),
            }
        }
        sizes
    }

    pub fn build(&self, device: &Device, tracker: &ResourceTracker) -> Result<vk::DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .context("Failed to create descriptor set layout")?
        };
        tracker.created(ResourceKind::DescriptorSetLayout);
        Ok(layout)
    }
}

/// Bindings needed for a given transform path and lighting choice.
pub fn layout_for(transforms: TransformDelivery, lit: bool) -> DescriptorSetLayoutBuilder {
    let mut builder = DescriptorSetLayoutBuilder::new();
    if transforms == TransformDelivery::FrameUniform {
        builder = builder.add_binding(
            TRANSFORMS_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX,
        );
    }
    if lit {
        builder = builder.add_binding(
            LIGHTING_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
    }
    builder
}

/// Byte stride between per-slot regions of the frame uniform buffer.
pub fn aligned_stride(size: vk::DeviceSize, min_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_alignment <= 1 {
        size
    } else {
        size.div_ceil(min_alignment) * min_alignment
    }
}

/// Host-visible transforms, one aligned region per frame slot.
pub struct FrameUniforms {
    buffer: GpuBuffer,
    stride: vk::DeviceSize,
}

impl FrameUniforms {
    pub fn new(allocator: &Allocator, slots: usize, min_alignment: vk::DeviceSize) -> Result<Self> {
        let stride = aligned_stride(Transforms::SIZE as vk::DeviceSize, min_alignment);
        let buffer = allocator.create_buffer(
            stride * slots as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::HostUpload,
        )?;
        Ok(Self { buffer, stride })
    }

    pub fn dynamic_offset(&self, slot: usize) -> u32 {
        (self.stride * slot as vk::DeviceSize) as u32
    }

    /// Only call once `slot`'s fence has signalled.
    pub fn write(&mut self, allocator: &Allocator, slot: usize, transforms: &Transforms) -> Result<()> {
        let offset = self.stride * slot as vk::DeviceSize;
        allocator.write(&mut self.buffer, offset, bytemuck::bytes_of(transforms))
    }

    /// # Safety
    /// No pending command buffer may read the buffer.
    pub unsafe fn destroy(self, allocator: &Allocator) {
        allocator.destroy_buffer(self.buffer);
    }
}

/// Layout, pool and the single descriptor set shared by every frame.
pub struct Descriptors {
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl Descriptors {
    pub fn new(device: &Device, tracker: &ResourceTracker, builder: &DescriptorSetLayoutBuilder) -> Result<Self> {
        let layout = builder.build(device, tracker)?;

        let pool_sizes = builder.pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .context("Failed to create descriptor pool")?
        };
        tracker.created(ResourceKind::DescriptorPool);

        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = unsafe {
            device
                .allocate_descriptor_sets(&allocate_info)
                .context("Failed to allocate descriptor set")?[0]
        };

        Ok(Self { layout, pool, set })
    }

    /// Points the set at its buffers. The lighting buffer only exists once the
    /// static upload has finished, so this runs after bring-up.
    pub fn write(&self, device: &Device, transforms: Option<&FrameUniforms>, lighting: Option<&GpuBuffer>) {
        let transform_info = transforms.map(|uniforms| {
            [vk::DescriptorBufferInfo::default()
                .buffer(uniforms.buffer.handle())
                .offset(0)
                .range(Transforms::SIZE as vk::DeviceSize)]
        });
        let lighting_info = lighting.map(|buffer| {
            [vk::DescriptorBufferInfo::default()
                .buffer(buffer.handle())
                .offset(0)
                .range(vk::WHOLE_SIZE)]
        });

        let mut writes = Vec::with_capacity(2);
        if let Some(info) = transform_info.as_ref() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(TRANSFORMS_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(info),
            );
        }
        if let Some(info) = lighting_info.as_ref() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(LIGHTING_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info),
            );
        }
        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }

    /// Destroys the pool (freeing the set) and the layout.
    ///
    /// # Safety
    /// No pending command buffer may reference the set.
    pub unsafe fn destroy(&mut self, device: &Device, tracker: &ResourceTracker) {
        device.destroy_descriptor_pool(self.pool, None);
        tracker.destroyed(ResourceKind::DescriptorPool);
        device.destroy_descriptor_set_layout(self.layout, None);
        tracker.destroyed(ResourceKind::DescriptorSetLayout);
    }
}
