//! One-shot transfer of immutable geometry into device-local memory.
//!
//! The upload is split into two states: [`PendingUpload`] owns the staging
//! buffer and the in-flight copy, and only [`PendingUpload::wait`] hands out
//! [`StaticBuffers`]. Nothing can bind the destination buffers before the
//! upload fence has signalled.
//!
//! ```compile_fail
//! use vfighter::renderer::upload::{PendingUpload, StaticBuffers};
//!
//! fn draw(_: &StaticBuffers) {}
//!
//! fn draw_before_upload_completes(pending: &PendingUpload) {
//!     draw(&pending.buffers);
//! }
//! ```

use ash::vk;
use log::{debug, info};

use super::geometry::{LightingBlock, StaticGeometry};
use super::tracker::ResourceTracker;
use crate::vulkan::{sync, Allocator, GpuBuffer, MemoryLocation, VulkanDevice};
use crate::{RenderError, Result, VkContext};

/// Byte range of one payload inside the staging buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StagingRegion {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// Contiguous placement of every static payload, starting at offset 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingPlan {
    regions: Vec<StagingRegion>,
    total: vk::DeviceSize,
}

impl StagingPlan {
    /// Fails with [`RenderError::StagingOverflow`] if the payloads do not fit.
    pub fn pack(sizes: &[vk::DeviceSize], capacity: vk::DeviceSize) -> Result<Self> {
        let mut regions = Vec::with_capacity(sizes.len());
        let mut offset: vk::DeviceSize = 0;
        for &size in sizes {
            regions.push(StagingRegion { offset, size });
            offset = offset.checked_add(size).ok_or(RenderError::StagingOverflow {
                required: u64::MAX,
                capacity,
            })?;
        }

        if offset > capacity {
            return Err(RenderError::StagingOverflow {
                required: offset,
                capacity,
            });
        }

        Ok(Self {
            regions,
            total: offset,
        })
    }

    pub fn regions(&self) -> &[StagingRegion] {
        &self.regions
    }

    pub fn total(&self) -> vk::DeviceSize {
        self.total
    }
}

/// Device-local buffers populated by a finished upload.
pub struct StaticBuffers {
    pub vertex: GpuBuffer,
    pub index: Option<GpuBuffer>,
    pub lighting: Option<GpuBuffer>,
    pub draw_count: u32,
}

impl StaticBuffers {
    /// # Safety
    /// No pending command buffer may reference the buffers.
    pub unsafe fn destroy(self, allocator: &Allocator) {
        allocator.destroy_buffer(self.vertex);
        if let Some(index) = self.index {
            allocator.destroy_buffer(index);
        }
        if let Some(lighting) = self.lighting {
            allocator.destroy_buffer(lighting);
        }
    }
}

/// Access mask and pipeline stages that read a static buffer of the given usage.
pub fn consumer_access(usage: vk::BufferUsageFlags) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        (vk::AccessFlags::INDEX_READ, vk::PipelineStageFlags::VERTEX_INPUT)
    } else if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        (vk::AccessFlags::VERTEX_ATTRIBUTE_READ, vk::PipelineStageFlags::VERTEX_INPUT)
    } else {
        (
            vk::AccessFlags::UNIFORM_READ,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
        )
    }
}

/// A submitted copy that has not been confirmed complete yet.
pub struct PendingUpload {
    buffers: StaticBuffers,
    staging: GpuBuffer,
    command_pool: vk::CommandPool,
    fence: vk::Fence,
}

impl PendingUpload {
    /// Packs, stages and submits every static payload.
    ///
    /// Overflow is detected before any GPU object is created.
    pub fn begin(
        device: &VulkanDevice,
        allocator: &Allocator,
        tracker: &ResourceTracker,
        geometry: &StaticGeometry,
        lighting: Option<&LightingBlock>,
        staging_capacity: vk::DeviceSize,
    ) -> Result<Self> {
        if geometry.draw_count() == 0 {
            return Err(RenderError::Mesh("Static geometry has nothing to draw".into()));
        }

        let mut payloads: Vec<(&[u8], vk::BufferUsageFlags)> = Vec::with_capacity(3);
        if let Some(indices) = geometry.index_bytes() {
            payloads.push((indices, vk::BufferUsageFlags::INDEX_BUFFER));
        }
        payloads.push((geometry.vertex_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER));
        if let Some(block) = lighting {
            payloads.push((bytemuck::bytes_of(block), vk::BufferUsageFlags::UNIFORM_BUFFER));
        }

        let sizes: Vec<vk::DeviceSize> = payloads
            .iter()
            .map(|(bytes, _)| bytes.len() as vk::DeviceSize)
            .collect();
        let plan = StagingPlan::pack(&sizes, staging_capacity)?;
        debug!(
            "Staging {} bytes across {} regions (capacity {staging_capacity})",
            plan.total(),
            plan.regions().len()
        );

        let vk_device = &device.device;
        let command_pool = sync::create_command_pool(
            vk_device,
            tracker,
            device.queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let command_buffer = sync::allocate_primary(vk_device, command_pool, 1)?[0];
        let fence = sync::create_fence(vk_device, tracker, false)?;

        let mut staging = allocator.create_buffer(
            staging_capacity,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::HostUpload,
        )?;

        let mut destinations = Vec::with_capacity(payloads.len());
        for ((bytes, usage), region) in payloads.iter().zip(plan.regions()) {
            allocator.write(&mut staging, region.offset, bytes)?;
            let buffer = allocator.create_buffer(
                region.size,
                *usage | vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::Device,
            )?;
            destinations.push(buffer);
        }

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            vk_device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("Failed to begin upload command buffer")?;
            for (destination, region) in destinations.iter().zip(plan.regions()) {
                let copy = vk::BufferCopy::default()
                    .src_offset(region.offset)
                    .dst_offset(0)
                    .size(region.size);
                vk_device.cmd_copy_buffer(command_buffer, staging.handle(), destination.handle(), &[copy]);
            }

            // Make the copies visible to the draw-time reads of later submissions.
            let mut read_stages = vk::PipelineStageFlags::empty();
            let barriers: Vec<vk::BufferMemoryBarrier> = destinations
                .iter()
                .zip(&payloads)
                .map(|(destination, (_, usage))| {
                    let (access, stages) = consumer_access(*usage);
                    read_stages |= stages;
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(destination.handle())
                        .offset(0)
                        .size(vk::WHOLE_SIZE)
                })
                .collect();
            vk_device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                read_stages,
                vk::DependencyFlags::empty(),
                &[],
                &barriers,
                &[],
            );
            vk_device
                .end_command_buffer(command_buffer)
                .context("Failed to end upload command buffer")?;

            let command_buffers = [command_buffer];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            vk_device
                .queue_submit(device.queue, &[submit], fence)
                .context("Failed to submit static upload")?;
        }

        let mut destinations = destinations.into_iter();
        let index = geometry.is_indexed().then(|| destinations.next()).flatten();
        let vertex = destinations.next().ok_or_else(|| {
            RenderError::Unsupported("Static geometry produced no vertex payload".into())
        })?;
        let lighting = destinations.next();

        Ok(Self {
            buffers: StaticBuffers {
                vertex,
                index,
                lighting,
                draw_count: geometry.draw_count(),
            },
            staging,
            command_pool,
            fence,
        })
    }

    /// Blocks on the upload fence, then releases the staging resources.
    pub fn wait(
        self,
        device: &VulkanDevice,
        allocator: &Allocator,
        tracker: &ResourceTracker,
    ) -> Result<StaticBuffers> {
        sync::wait_fence(&device.device, self.fence)?;

        unsafe {
            sync::destroy_fence(&device.device, tracker, self.fence);
            sync::destroy_command_pool(&device.device, tracker, self.command_pool);
            allocator.destroy_buffer(self.staging);
        }

        info!("Static upload complete ({} elements)", self.buffers.draw_count);
        Ok(self.buffers)
    }
}
