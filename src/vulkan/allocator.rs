use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use vk_mem::Alloc as _;

use crate::renderer::tracker::{ResourceKind, ResourceTracker};
use crate::{RenderError, Result, VkContext};

/// Where an allocation should live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local memory, never touched by the host.
    Device,
    /// Device-local memory the GPU may allocate lazily (transient attachments).
    DeviceLazy,
    /// Host-visible memory written sequentially by the CPU and read by the GPU.
    HostUpload,
}

impl MemoryLocation {
    fn create_info(self) -> vk_mem::AllocationCreateInfo {
        match self {
            MemoryLocation::Device => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            MemoryLocation::DeviceLazy => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                preferred_flags: vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
                ..Default::default()
            },
            MemoryLocation::HostUpload => vk_mem::AllocationCreateInfo {
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                usage: vk_mem::MemoryUsage::Auto,
                ..Default::default()
            },
        }
    }
}

pub struct GpuBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

pub struct GpuImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
}

impl GpuImage {
    pub fn handle(&self) -> vk::Image {
        self.handle
    }
}

/// Thin facade over the VMA allocator.
///
/// Buffers and images are returned as plain values and must be handed back to
/// [`Allocator::destroy_buffer`] / [`Allocator::destroy_image`]; the allocator
/// itself must outlive every allocation it made and is released explicitly
/// with [`Allocator::destroy`].
pub struct Allocator {
    inner: ManuallyDrop<vk_mem::Allocator>,
    tracker: Arc<ResourceTracker>,
}

impl Allocator {
    /// # Safety
    /// `device` must have been created from `instance` and `physical_device`.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        api_version: u32,
        tracker: Arc<ResourceTracker>,
    ) -> Result<Self> {
        let mut create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        create_info.vulkan_api_version = api_version;
        create_info.flags = vk_mem::AllocatorCreateFlags::EXTERNALLY_SYNCHRONIZED;

        let inner = vk_mem::Allocator::new(create_info).context("Failed to create allocator")?;
        tracker.created(ResourceKind::Allocator);
        log::debug!("Memory allocator ready");

        Ok(Self {
            inner: ManuallyDrop::new(inner),
            tracker,
        })
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let (handle, allocation) = unsafe {
            self.inner
                .create_buffer(&buffer_info, &location.create_info())
                .context("Failed to create buffer")?
        };
        self.tracker.created(ResourceKind::Buffer);
        log::debug!("Created {location:?} buffer ({size}B, {usage:?})");

        Ok(GpuBuffer {
            handle,
            allocation,
            size,
        })
    }

    pub fn create_image(
        &self,
        image_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
    ) -> Result<GpuImage> {
        let (handle, allocation) = unsafe {
            self.inner
                .create_image(image_info, &location.create_info())
                .context("Failed to create image")?
        };
        self.tracker.created(ResourceKind::Image);

        Ok(GpuImage { handle, allocation })
    }

    /// Copies `bytes` into a host-visible buffer at `offset` and flushes the range.
    pub fn write(&self, buffer: &mut GpuBuffer, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
        let end = offset + bytes.len() as vk::DeviceSize;
        if end > buffer.size {
            return Err(RenderError::StagingOverflow {
                required: end,
                capacity: buffer.size,
            });
        }

        unsafe {
            let mapped = self
                .inner
                .map_memory(&mut buffer.allocation)
                .context("Failed to map buffer memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.add(offset as usize), bytes.len());
            let flushed = self
                .inner
                .flush_allocation(&buffer.allocation, offset, bytes.len() as vk::DeviceSize);
            self.inner.unmap_memory(&mut buffer.allocation);
            flushed.context("Failed to flush buffer memory")?;
        }
        Ok(())
    }

    /// # Safety
    /// The GPU must no longer reference the buffer.
    pub unsafe fn destroy_buffer(&self, mut buffer: GpuBuffer) {
        self.inner.destroy_buffer(buffer.handle, &mut buffer.allocation);
        self.tracker.destroyed(ResourceKind::Buffer);
    }

    /// # Safety
    /// The GPU must no longer reference the image and all views of it must be destroyed.
    pub unsafe fn destroy_image(&self, mut image: GpuImage) {
        self.inner.destroy_image(image.handle, &mut image.allocation);
        self.tracker.destroyed(ResourceKind::Image);
    }

    /// Releases the allocator.
    ///
    /// # Safety
    /// Every buffer and image must already be destroyed, and the allocator must
    /// not be used afterwards.
    pub unsafe fn destroy(&mut self) {
        ManuallyDrop::drop(&mut self.inner);
        self.tracker.destroyed(ResourceKind::Allocator);
    }
}
