//! Fence, semaphore and command pool helpers that keep the resource tracker honest.

use ash::{vk, Device};

use crate::renderer::tracker::{ResourceKind, ResourceTracker};
use crate::{Result, VkContext};

pub fn create_fence(device: &Device, tracker: &ResourceTracker, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence = unsafe {
        device
            .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
            .context("Failed to create fence")?
    };
    tracker.created(ResourceKind::Fence);
    Ok(fence)
}

pub fn create_semaphore(device: &Device, tracker: &ResourceTracker) -> Result<vk::Semaphore> {
    let semaphore = unsafe {
        device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .context("Failed to create semaphore")?
    };
    tracker.created(ResourceKind::Semaphore);
    Ok(semaphore)
}

pub fn create_command_pool(
    device: &Device,
    tracker: &ResourceTracker,
    queue_family_index: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(flags)
        .queue_family_index(queue_family_index);
    let pool = unsafe {
        device
            .create_command_pool(&create_info, None)
            .context("Failed to create command pool")?
    };
    tracker.created(ResourceKind::CommandPool);
    Ok(pool)
}

pub fn allocate_primary(device: &Device, pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>> {
    let allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);
    unsafe {
        device
            .allocate_command_buffers(&allocate_info)
            .context("Failed to allocate command buffers")
    }
}

/// Blocks until `fence` signals. There is no timeout: this is the renderer's backpressure.
pub fn wait_fence(device: &Device, fence: vk::Fence) -> Result<()> {
    unsafe {
        device
            .wait_for_fences(&[fence], true, u64::MAX)
            .context("Failed to wait for fence")
    }
}

pub fn reset_fence(device: &Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]).context("Failed to reset fence") }
}

/// # Safety
/// No pending queue operation may reference `fence`.
pub unsafe fn destroy_fence(device: &Device, tracker: &ResourceTracker, fence: vk::Fence) {
    device.destroy_fence(fence, None);
    tracker.destroyed(ResourceKind::Fence);
}

/// # Safety
/// No pending queue operation may reference `semaphore`.
pub unsafe fn destroy_semaphore(device: &Device, tracker: &ResourceTracker, semaphore: vk::Semaphore) {
    device.destroy_semaphore(semaphore, None);
    tracker.destroyed(ResourceKind::Semaphore);
}

/// Destroys the pool together with every command buffer allocated from it.
///
/// # Safety
/// None of the pool's command buffers may be pending execution.
pub unsafe fn destroy_command_pool(device: &Device, tracker: &ResourceTracker, pool: vk::CommandPool) {
    device.destroy_command_pool(pool, None);
    tracker.destroyed(ResourceKind::CommandPool);
}
