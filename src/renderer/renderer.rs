use std::sync::Arc;

use ash::vk;
use log::{debug, error, info, warn};

use super::config::{RendererConfig, TransformDelivery, CLEAR_COLOR};
use super::descriptors::{self, Descriptors, FrameUniforms};
use super::frame::{
    classify_acquire, classify_present, AcquireOutcome, FrameDriver, FrameOutcome, FrameScheduler,
    SurfaceStatus,
};
use super::geometry::{LightingBlock, StaticGeometry, VertexLayout};
use super::pipeline::{self, PipelineDesc, ShaderModules};
use super::pipeline_cache::PipelineCache;
use super::scene::Scene;
use super::swapchain::{self, PerImage, Swapchain};
use super::tracker::{ResourceKind, ResourceTracker};
use super::upload::{PendingUpload, StaticBuffers};
use crate::vulkan::{instance::API_VERSION, sync, Allocator, NativeWindow, VulkanDevice, VulkanInstance};
use crate::{check, RenderError, Result, VkContext};

struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

/// Draws one static mesh into an X11 window.
///
/// Construction runs the whole bring-up sequence and returns only after the
/// static upload has completed. Dropping the renderer waits for the device to
/// go idle and releases every handle in reverse creation order.
pub struct Renderer {
    scheduler: FrameScheduler,
    state: RendererState,
}

/// Every GPU object the renderer owns. Fields are listed in creation order.
struct RendererState {
    tracker: Arc<ResourceTracker>,
    instance: VulkanInstance,
    device: VulkanDevice,
    allocator: Allocator,
    static_buffers: Option<StaticBuffers>,
    command_pool: vk::CommandPool,
    pipeline_layout: vk::PipelineLayout,
    acquire_semaphore: vk::Semaphore,
    shaders: ShaderModules,
    pipeline_cache: PipelineCache,
    slots: Vec<FrameSlot>,
    frame_uniforms: Option<FrameUniforms>,
    descriptors: Option<Descriptors>,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    swapchain: Option<Swapchain>,
    surface_format: vk::SurfaceFormatKHR,
    transforms: TransformDelivery,
    preferred_image_count: u32,
}

impl Renderer {
    /// Renders the built-in coloured quad.
    pub fn new(config: RendererConfig, window: NativeWindow) -> Result<Self> {
        Self::with_geometry(config, window, StaticGeometry::demo_quad())
    }

    /// The window behind `window` must stay alive until the renderer is dropped.
    pub fn with_geometry(config: RendererConfig, window: NativeWindow, geometry: StaticGeometry) -> Result<Self> {
        let lighting = resolve_lighting(geometry.layout(), config.lighting)?;
        let ring_depth = config.ring_depth();
        let tracker = Arc::new(ResourceTracker::new());

        let instance = VulkanInstance::new(&window, config.flags, tracker.clone())?;
        let device = VulkanDevice::new(&instance, tracker.clone())?;
        let allocator = unsafe {
            Allocator::new(
                instance.instance(),
                &device.device,
                device.physical_device,
                API_VERSION,
                tracker.clone(),
            )?
        };

        let pending = PendingUpload::begin(
            &device,
            &allocator,
            &tracker,
            &geometry,
            lighting.as_ref(),
            config.staging_capacity,
        )?;

        let vk_device = &device.device;
        let command_pool = sync::create_command_pool(
            vk_device,
            &tracker,
            device.queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let layout_builder = descriptors::layout_for(config.transforms, lighting.is_some());
        let descriptors = if layout_builder.is_empty() {
            None
        } else {
            Some(Descriptors::new(vk_device, &tracker, &layout_builder)?)
        };
        let pipeline_layout = pipeline::create_pipeline_layout(
            vk_device,
            &tracker,
            descriptors.as_ref().map(|d| d.layout),
            config.transforms,
        )?;

        let acquire_semaphore = sync::create_semaphore(vk_device, &tracker)?;
        let shaders = ShaderModules::load(
            vk_device,
            &tracker,
            &config.shader_dir,
            &pipeline::shader_stem(geometry.layout(), config.transforms),
        )?;
        let pipeline_cache =
            PipelineCache::with_persistence(vk_device, &tracker, config.pipeline_cache_path.clone())?;

        let command_buffers = sync::allocate_primary(vk_device, command_pool, ring_depth as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    command_buffer,
                    fence: sync::create_fence(vk_device, &tracker, true)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let frame_uniforms = match config.transforms {
            TransformDelivery::FrameUniform => Some(FrameUniforms::new(
                &allocator,
                ring_depth,
                device.limits.min_uniform_buffer_offset_alignment,
            )?),
            TransformDelivery::PushConstants => None,
        };

        let surface_format = swapchain::query_surface_format(&instance, &device)?;
        let render_pass = pipeline::create_render_pass(vk_device, &tracker, surface_format.format)?;
        let graphics_pipeline = pipeline::create_graphics_pipeline(
            vk_device,
            &tracker,
            &PipelineDesc {
                cache: pipeline_cache.handle(),
                layout: pipeline_layout,
                render_pass,
                shaders: &shaders,
                vertex_layout: geometry.layout(),
                creation_feedback: device.creation_feedback,
            },
        )?;

        let swapchain = Swapchain::create(
            &instance,
            &device,
            &allocator,
            &tracker,
            surface_format,
            render_pass,
            config.preferred_image_count,
        )?;

        let static_buffers = pending.wait(&device, &allocator, &tracker)?;
        if let Some(descriptors) = &descriptors {
            descriptors.write(
                vk_device,
                frame_uniforms.as_ref(),
                static_buffers.lighting.as_ref(),
            );
        }

        info!(
            "Renderer ready ({ring_depth} frames in flight, {:?} transforms, {} live handles)",
            config.transforms,
            tracker.total_live()
        );

        Ok(Self {
            scheduler: FrameScheduler::new(ring_depth),
            state: RendererState {
                tracker,
                instance,
                device,
                allocator,
                static_buffers: Some(static_buffers),
                command_pool,
                pipeline_layout,
                acquire_semaphore,
                shaders,
                pipeline_cache,
                slots,
                frame_uniforms,
                descriptors,
                render_pass,
                pipeline: graphics_pipeline,
                swapchain: Some(swapchain),
                surface_format,
                transforms: config.transforms,
                preferred_image_count: config.preferred_image_count,
            },
        })
    }

    /// Renders and presents one frame. Surface staleness is absorbed by
    /// recreating the swapchain; only fatal conditions are returned as errors.
    pub fn render(&mut self, scene: &Scene) -> Result<FrameOutcome> {
        self.scheduler.tick(&mut self.state, scene)
    }

    /// Writes the pipeline cache blob to its file. I/O problems are only logged.
    pub fn save_caches(&self) -> Result<()> {
        match self.state.pipeline_cache.save(&self.state.device.device) {
            Ok(_) => Ok(()),
            Err(e @ RenderError::Io { .. }) => {
                warn!("Pipeline cache not saved: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn tracker(&self) -> Arc<ResourceTracker> {
        self.state.tracker.clone()
    }

    pub fn frames_presented(&self) -> u64 {
        self.scheduler.frames_presented()
    }

    pub fn swapchain_recreations(&self) -> u64 {
        self.scheduler.recreations()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.state.device.wait_idle() {
            error!("Device did not go idle before teardown: {e}");
        }
        unsafe { self.state.destroy() };

        let leaked = self.state.tracker.total_live();
        if leaked == 0 {
            info!("Renderer shut down cleanly");
        } else {
            error!("Renderer shut down with {leaked} live handles: {:?}", self.state.tracker);
        }
    }
}

impl RendererState {
    fn slot(&self, slot: usize) -> Result<&FrameSlot> {
        self.slots
            .get(slot)
            .ok_or_else(|| RenderError::Unsupported(format!("Frame slot {slot} out of range")))
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RenderError::Unsupported("Swapchain lost during recreation".into()))
    }

    fn per_image(&self, image: u32) -> Result<&PerImage> {
        self.swapchain()?
            .images
            .get(image as usize)
            .ok_or_else(|| RenderError::Unsupported(format!("Swapchain image {image} out of range")))
    }

    fn static_buffers(&self) -> Result<&StaticBuffers> {
        self.static_buffers
            .as_ref()
            .ok_or_else(|| RenderError::Unsupported("Static buffers already released".into()))
    }

    /// Single reverse-topological teardown walk.
    ///
    /// # Safety
    /// The device must be idle. Called exactly once.
    unsafe fn destroy(&mut self) {
        let tracker = self.tracker.clone();
        let device = &self.device.device;

        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&self.device, &self.allocator, &tracker);
        }

        for slot in self.slots.drain(..) {
            sync::destroy_fence(device, &tracker, slot.fence);
        }

        device.destroy_pipeline(self.pipeline, None);
        tracker.destroyed(ResourceKind::Pipeline);
        device.destroy_render_pass(self.render_pass, None);
        tracker.destroyed(ResourceKind::RenderPass);

        if let Some(mut descriptors) = self.descriptors.take() {
            descriptors.destroy(device, &tracker);
        }
        if let Some(uniforms) = self.frame_uniforms.take() {
            uniforms.destroy(&self.allocator);
        }

        self.pipeline_cache.destroy(device, &tracker);
        self.shaders.destroy(device, &tracker);
        sync::destroy_semaphore(device, &tracker, self.acquire_semaphore);
        device.destroy_pipeline_layout(self.pipeline_layout, None);
        tracker.destroyed(ResourceKind::PipelineLayout);
        sync::destroy_command_pool(device, &tracker, self.command_pool);

        if let Some(buffers) = self.static_buffers.take() {
            buffers.destroy(&self.allocator);
        }

        self.allocator.destroy();
        self.device.destroy();
        self.instance.destroy();
    }
}

impl FrameDriver for RendererState {
    fn acquire(&mut self) -> Result<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        let result = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                swapchain.handle,
                u64::MAX,
                self.acquire_semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    fn wait_fence(&mut self, slot: usize) -> Result<()> {
        sync::wait_fence(&self.device.device, self.slot(slot)?.fence)
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        sync::reset_fence(&self.device.device, self.slot(slot)?.fence)
    }

    fn record(&mut self, slot: usize, image: u32, scene: &Scene) -> Result<()> {
        let command_buffer = self.slot(slot)?.command_buffer;
        let framebuffer = self.per_image(image)?.framebuffer;
        let swapchain = self.swapchain()?;
        let extent = swapchain.extent;
        let transforms = scene.transforms(swapchain.aspect_ratio());

        if let Some(uniforms) = self.frame_uniforms.as_mut() {
            uniforms.write(&self.allocator, slot, &transforms)?;
        }

        let device = &self.device.device;
        let statics = self.static_buffers()?;

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            device
                .begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .context("Failed to begin command buffer")?;

            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);

            if self.transforms == TransformDelivery::PushConstants {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&transforms),
                );
            }

            device.cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);

            if let Some(descriptors) = &self.descriptors {
                let dynamic_offsets: Vec<u32> = self
                    .frame_uniforms
                    .as_ref()
                    .map(|uniforms| uniforms.dynamic_offset(slot))
                    .into_iter()
                    .collect();
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout,
                    0,
                    &[descriptors.set],
                    &dynamic_offsets,
                );
            }

            device.cmd_bind_vertex_buffers(command_buffer, 0, &[statics.vertex.handle()], &[0]);
            match &statics.index {
                Some(index) => {
                    device.cmd_bind_index_buffer(command_buffer, index.handle(), 0, vk::IndexType::UINT16);
                    device.cmd_draw_indexed(command_buffer, statics.draw_count, 1, 0, 0, 0);
                }
                None => device.cmd_draw(command_buffer, statics.draw_count, 1, 0, 0),
            }

            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        let frame = self.slot(slot)?;
        let wait_semaphores = [self.acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [self.per_image(image)?.render_complete];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.queue, &[submit_info], frame.fence)
                .context("Failed to submit frame")
        }
    }

    fn present(&mut self, image: u32) -> Result<SurfaceStatus> {
        let wait_semaphores = [self.per_image(image)?.render_complete];
        let swapchains = [self.swapchain()?.handle];
        let image_indices = [image];
        let mut results = [vk::Result::SUCCESS];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices)
            .results(&mut results);

        let status = classify_present(unsafe {
            self.device
                .swapchain_loader
                .queue_present(self.device.queue, &present_info)
        })?;
        if status == SurfaceStatus::Optimal {
            check(results[0], "Swapchain rejected presented image")?;
        }
        Ok(status)
    }

    fn rebuild_swapchain(&mut self) -> Result<()> {
        // Presentation may still be waiting on render-complete semaphores.
        self.device.wait_idle()?;

        if let Some(old) = self.swapchain.take() {
            unsafe { old.destroy(&self.device, &self.allocator, &self.tracker) };
        }

        self.swapchain = Some(Swapchain::create(
            &self.instance,
            &self.device,
            &self.allocator,
            &self.tracker,
            self.surface_format,
            self.render_pass,
            self.preferred_image_count,
        )?);
        debug!("Swapchain rebuilt; {} live handles", self.tracker.total_live());
        Ok(())
    }
}

/// Lit shaders need normals; meshes always get a lighting block.
fn resolve_lighting(layout: VertexLayout, requested: Option<LightingBlock>) -> Result<Option<LightingBlock>> {
    match (layout, requested) {
        (VertexLayout::PositionNormal, lighting) => Ok(Some(lighting.unwrap_or_default())),
        (VertexLayout::PositionColor, None) => Ok(None),
        (VertexLayout::PositionColor, Some(_)) => Err(RenderError::Unsupported(
            "Lighting requires a vertex layout with normals".into(),
        )),
    }
}
