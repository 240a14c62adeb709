use ash::vk;
use log::{debug, info};

use super::config::DEPTH_FORMAT;
use super::tracker::{ResourceKind, ResourceTracker};
use crate::vulkan::{sync, Allocator, GpuImage, MemoryLocation, VulkanDevice, VulkanInstance};
use crate::{RenderError, Result, VkContext};

const PREFERRED_FORMATS: [vk::Format; 5] = [
    vk::Format::R8G8B8_SRGB,
    vk::Format::B8G8R8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::A8B8G8R8_SRGB_PACK32,
];

/// First SRGB 8-bit format the surface reports, otherwise the first format.
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| PREFERRED_FORMATS.contains(&format.format))
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| RenderError::Unsupported("Surface reports no formats".into()))
}

/// Mailbox when available, otherwise FIFO.
pub fn select_present_mode(modes: &[vk::PresentModeKHR]) -> Result<vk::PresentModeKHR> {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .ok_or_else(|| RenderError::Unsupported(format!("No acceptable present mode in {modes:?}")))
}

pub fn select_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> Result<vk::CompositeAlphaFlagsKHR> {
    [vk::CompositeAlphaFlagsKHR::OPAQUE, vk::CompositeAlphaFlagsKHR::INHERIT]
        .into_iter()
        .find(|alpha| supported.contains(*alpha))
        .ok_or_else(|| {
            RenderError::Unsupported(format!("No acceptable composite alpha in {supported:?}"))
        })
}

/// At least one more than the minimum, at least `preferred`, capped by a non-zero maximum.
pub fn clamp_image_count(preferred: u32, min: u32, max: u32) -> u32 {
    let count = preferred.max(min.saturating_add(1));
    if max == 0 {
        count
    } else {
        count.min(max)
    }
}

/// Zero-area and "window decides" extents cannot be rendered to.
pub fn validate_extent(extent: vk::Extent2D) -> Result<vk::Extent2D> {
    let degenerate = |value: u32| value == 0 || value == u32::MAX;
    if degenerate(extent.width) || degenerate(extent.height) {
        return Err(RenderError::Unsupported(format!(
            "Unusable surface extent {}x{}",
            extent.width, extent.height
        )));
    }
    Ok(extent)
}

pub fn query_surface_format(instance: &VulkanInstance, device: &VulkanDevice) -> Result<vk::SurfaceFormatKHR> {
    let formats = unsafe {
        instance
            .surface_loader()
            .get_physical_device_surface_formats(device.physical_device, instance.surface())
            .context("Failed to query surface formats")?
    };
    select_surface_format(&formats)
}

/// Resources owned per presentable image.
pub struct PerImage {
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    pub render_complete: vk::Semaphore,
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<PerImage>,
    depth: GpuImage,
    depth_view: vk::ImageView,
}

impl Swapchain {
    pub fn create(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        allocator: &Allocator,
        tracker: &ResourceTracker,
        format: vk::SurfaceFormatKHR,
        render_pass: vk::RenderPass,
        preferred_image_count: u32,
    ) -> Result<Self> {
        let surface = instance.surface();
        let loader = instance.surface_loader();
        let (caps, modes) = unsafe {
            (
                loader
                    .get_physical_device_surface_capabilities(device.physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                loader
                    .get_physical_device_surface_present_modes(device.physical_device, surface)
                    .context("Failed to query present modes")?,
            )
        };

        let extent = validate_extent(caps.current_extent)?;
        let present_mode = select_present_mode(&modes)?;
        let composite_alpha = select_composite_alpha(caps.supported_composite_alpha)?;
        let min_image_count =
            clamp_image_count(preferred_image_count, caps.min_image_count, caps.max_image_count);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true);

        let vk_device = &device.device;
        let handle = unsafe {
            device
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .context("Failed to create swapchain")?
        };
        tracker.created(ResourceKind::Swapchain);

        let raw_images = unsafe {
            device
                .swapchain_loader
                .get_swapchain_images(handle)
                .context("Failed to get swapchain images")?
        };

        let depth_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let depth = allocator.create_image(&depth_info, MemoryLocation::DeviceLazy)?;
        let depth_view = create_view(
            vk_device,
            tracker,
            depth.handle(),
            DEPTH_FORMAT,
            vk::ImageAspectFlags::DEPTH,
        )?;

        let mut images = Vec::with_capacity(raw_images.len());
        for image in raw_images {
            let view = create_view(
                vk_device,
                tracker,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
            )?;

            let attachments = [view, depth_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                vk_device
                    .create_framebuffer(&framebuffer_info, None)
                    .context("Failed to create framebuffer")?
            };
            tracker.created(ResourceKind::Framebuffer);

            let render_complete = sync::create_semaphore(vk_device, tracker)?;

            images.push(PerImage {
                view,
                framebuffer,
                render_complete,
            });
        }

        info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            handle,
            extent,
            images,
            depth,
            depth_view,
        })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    /// Destroys per-image resources, the depth target, then the swapchain itself.
    ///
    /// # Safety
    /// Every fence guarding work that touches these images must have signalled.
    pub unsafe fn destroy(self, device: &VulkanDevice, allocator: &Allocator, tracker: &ResourceTracker) {
        let vk_device = &device.device;
        let count = self.images.len();
        for per_image in self.images {
            vk_device.destroy_framebuffer(per_image.framebuffer, None);
            tracker.destroyed(ResourceKind::Framebuffer);
            vk_device.destroy_image_view(per_image.view, None);
            tracker.destroyed(ResourceKind::ImageView);
            sync::destroy_semaphore(vk_device, tracker, per_image.render_complete);
        }

        vk_device.destroy_image_view(self.depth_view, None);
        tracker.destroyed(ResourceKind::ImageView);
        allocator.destroy_image(self.depth);

        device.swapchain_loader.destroy_swapchain(self.handle, None);
        tracker.destroyed(ResourceKind::Swapchain);
        debug!("Swapchain destroyed ({count} images)");
    }
}

fn create_view(
    device: &ash::Device,
    tracker: &ResourceTracker,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    let view = unsafe {
        device
            .create_image_view(&create_info, None)
            .context("Failed to create image view")?
    };
    tracker.created(ResourceKind::ImageView);
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn srgb_format_is_preferred_over_first_entry() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(select_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_is_kept_without_srgb() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32),
            format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            select_surface_format(&formats).unwrap().format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
    }

    #[test]
    fn no_formats_is_unsupported() {
        assert!(matches!(select_surface_format(&[]), Err(RenderError::Unsupported(_))));
    }

    #[test]
    fn fifo_only_never_selects_mailbox() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO]).unwrap(),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn mailbox_is_preferred_when_offered() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&modes).unwrap(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn missing_present_modes_are_unsupported() {
        assert!(select_present_mode(&[vk::PresentModeKHR::IMMEDIATE]).is_err());
    }

    #[test]
    fn composite_alpha_preference() {
        let both = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(select_composite_alpha(both).unwrap(), vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(
            select_composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT).unwrap(),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
        assert!(select_composite_alpha(vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED).is_err());
    }

    #[test]
    fn image_count_clamping() {
        assert_eq!(clamp_image_count(3, 2, 8), 3);
        assert_eq!(clamp_image_count(3, 3, 0), 4);
        assert_eq!(clamp_image_count(3, 1, 2), 2);
        assert_eq!(clamp_image_count(3, 4, 4), 4);
    }

    #[test]
    fn degenerate_extents_are_fatal() {
        let extent = |width, height| vk::Extent2D { width, height };
        assert!(validate_extent(extent(0, 0)).is_err());
        assert!(validate_extent(extent(1600, 0)).is_err());
        assert!(validate_extent(extent(u32::MAX, u32::MAX)).is_err());
        assert_eq!(validate_extent(extent(1600, 900)).unwrap(), extent(1600, 900));
    }
}
