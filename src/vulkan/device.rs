use std::ffi::{c_char, CStr};
use std::sync::Arc;

use ash::{khr::swapchain, vk, Device};
use log::info;

use super::instance::VulkanInstance;
use crate::renderer::tracker::{ResourceKind, ResourceTracker};
use crate::{RenderError, Result, VkContext};

/// Logical device plus the single graphics+present queue it exposes.
pub struct VulkanDevice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
    pub device: Device,
    pub queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
    pub limits: vk::PhysicalDeviceLimits,
    /// `VK_EXT_pipeline_creation_feedback` was enabled.
    pub creation_feedback: bool,
    tracker: Arc<ResourceTracker>,
}

impl VulkanDevice {
    pub fn new(instance: &VulkanInstance, tracker: Arc<ResourceTracker>) -> Result<Self> {
        unsafe {
            let (physical_device, queue_family_index) = Self::select_physical_device(instance)?;

            let vk_instance = instance.instance();
            let properties = vk_instance.get_physical_device_properties(physical_device);
            let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy();

            let available = vk_instance
                .enumerate_device_extension_properties(physical_device)
                .context("Failed to enumerate device extensions")?;
            let creation_feedback = available.iter().any(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    == ash::ext::pipeline_creation_feedback::NAME
            });

            let mut extensions: Vec<*const c_char> = vec![swapchain::NAME.as_ptr()];
            if creation_feedback {
                extensions.push(ash::ext::pipeline_creation_feedback::NAME.as_ptr());
            }

            let priorities = [0.0f32];
            let queue_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family_index)
                .queue_priorities(&priorities)];

            let create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&extensions);

            let device = vk_instance
                .create_device(physical_device, &create_info, None)
                .context("Failed to create logical device")?;
            tracker.created(ResourceKind::Device);

            let queue = device.get_device_queue(queue_family_index, 0);
            let swapchain_loader = swapchain::Device::new(vk_instance, &device);

            info!("Using GPU '{name}' (queue family {queue_family_index}, creation feedback: {creation_feedback})");

            Ok(Self {
                physical_device,
                queue_family_index,
                device,
                queue,
                swapchain_loader,
                limits: properties.limits,
                creation_feedback,
                tracker,
            })
        }
    }

    unsafe fn select_physical_device(instance: &VulkanInstance) -> Result<(vk::PhysicalDevice, u32)> {
        let vk_instance = instance.instance();
        let physical_devices = vk_instance
            .enumerate_physical_devices()
            .context("Failed to enumerate physical devices")?;

        for physical_device in physical_devices {
            let families = vk_instance.get_physical_device_queue_family_properties(physical_device);
            let family = find_queue_family(&families, |index| {
                instance
                    .surface_loader()
                    .get_physical_device_surface_support(physical_device, index, instance.surface())
                    .context("Failed to query surface support")
            })?;
            if let Some(index) = family {
                return Ok((physical_device, index));
            }
        }

        Err(RenderError::Unsupported(
            "No queue family supports both graphics and presentation".into(),
        ))
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle().context("Failed to wait for device idle") }
    }

    /// # Safety
    /// Every object created from this device, including the allocator, must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_device(None);
        self.tracker.destroyed(ResourceKind::Device);
    }
}

/// First queue family that can both draw and present.
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<u32>> {
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
