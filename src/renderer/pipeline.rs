use std::io::Cursor;
use std::path::{Path, PathBuf};

use ash::{vk, Device};
use log::info;

use super::config::{TransformDelivery, DEPTH_FORMAT};
use super::geometry::VertexLayout;
use super::scene::Transforms;
use super::tracker::{ResourceKind, ResourceTracker};
use crate::{RenderError, Result, VkContext};

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Colour (index 0) and depth (index 1) attachments of the single render pass.
pub fn attachment_descriptions(color_format: vk::Format) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ]
}

/// The depth image is shared by every frame in flight, so the previous frame's
/// depth writes must finish before this frame clears it.
pub fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
    let depth_stages =
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(depth_stages)
            .dst_stage_mask(depth_stages)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ]
}

pub fn create_render_pass(
    device: &Device,
    tracker: &ResourceTracker,
    color_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = attachment_descriptions(color_format);
    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];
    let dependencies = subpass_dependencies();

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe {
        device
            .create_render_pass(&create_info, None)
            .context("Failed to create render pass")?
    };
    tracker.created(ResourceKind::RenderPass);
    Ok(render_pass)
}

/// `main` for push-constant transforms, `main_ubo` for the per-frame uniform path.
pub fn shader_stem(layout: VertexLayout, transforms: TransformDelivery) -> String {
    match transforms {
        TransformDelivery::PushConstants => layout.shader_stem().to_owned(),
        TransformDelivery::FrameUniform => format!("{}_ubo", layout.shader_stem()),
    }
}

pub fn shader_paths(dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{stem}.vert.spv")),
        dir.join(format!("{stem}.frag.spv")),
    )
}

pub fn read_shader(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RenderError::Shader(format!("{}: {e}", path.display())))
}

/// Vertex and fragment modules loaded from pre-compiled SPIR-V.
pub struct ShaderModules {
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
}

impl ShaderModules {
    pub fn load(device: &Device, tracker: &ResourceTracker, dir: &Path, stem: &str) -> Result<Self> {
        let (vertex_path, fragment_path) = shader_paths(dir, stem);
        let vertex_code = read_shader(&vertex_path)?;
        let fragment_code = read_shader(&fragment_path)?;

        let vertex = create_module(device, tracker, &vertex_code)?;
        let fragment = create_module(device, tracker, &fragment_code)?;
        log::debug!("Loaded shaders '{stem}' from {}", dir.display());

        Ok(Self { vertex, fragment })
    }

    /// # Safety
    /// Modules may be destroyed once every pipeline using them has been created.
    pub unsafe fn destroy(&mut self, device: &Device, tracker: &ResourceTracker) {
        device.destroy_shader_module(self.vertex, None);
        device.destroy_shader_module(self.fragment, None);
        tracker.destroyed_n(ResourceKind::ShaderModule, 2);
    }
}

fn create_module(device: &Device, tracker: &ResourceTracker, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe {
        device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")?
    };
    tracker.created(ResourceKind::ShaderModule);
    Ok(module)
}

pub fn push_constant_ranges(transforms: TransformDelivery) -> Vec<vk::PushConstantRange> {
    match transforms {
        TransformDelivery::PushConstants => vec![vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(Transforms::SIZE)],
        TransformDelivery::FrameUniform => Vec::new(),
    }
}

pub fn create_pipeline_layout(
    device: &Device,
    tracker: &ResourceTracker,
    set_layout: Option<vk::DescriptorSetLayout>,
    transforms: TransformDelivery,
) -> Result<vk::PipelineLayout> {
    let set_layouts: Vec<_> = set_layout.into_iter().collect();
    let ranges = push_constant_ranges(transforms);
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&ranges);

    let layout = unsafe {
        device
            .create_pipeline_layout(&create_info, None)
            .context("Failed to create pipeline layout")?
    };
    tracker.created(ResourceKind::PipelineLayout);
    Ok(layout)
}

/// Everything the graphics pipeline is built from.
pub struct PipelineDesc<'a> {
    pub cache: vk::PipelineCache,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub shaders: &'a ShaderModules,
    pub vertex_layout: VertexLayout,
    pub creation_feedback: bool,
}

pub fn create_graphics_pipeline(
    device: &Device,
    tracker: &ResourceTracker,
    desc: &PipelineDesc<'_>,
) -> Result<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(desc.shaders.vertex)
            .name(ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(desc.shaders.fragment)
            .name(ENTRY_POINT),
    ];

    let bindings = [desc.vertex_layout.binding_description()];
    let attributes = desc.vertex_layout.attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut feedback = vk::PipelineCreationFeedback::default();
    let mut stage_feedback = [vk::PipelineCreationFeedback::default(); 2];

    let pipeline = {
        let mut feedback_info = vk::PipelineCreationFeedbackCreateInfo::default()
            .pipeline_creation_feedback(&mut feedback)
            .pipeline_stage_creation_feedbacks(&mut stage_feedback);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);
        if desc.creation_feedback {
            pipeline_info = pipeline_info.push_next(&mut feedback_info);
        }

        unsafe {
            device
                .create_graphics_pipelines(desc.cache, &[pipeline_info], None)
                .map_err(|(_, result)| result)
                .context("Failed to create graphics pipeline")?[0]
        }
    };
    tracker.created(ResourceKind::Pipeline);

    if desc.creation_feedback {
        log_creation_feedback(&feedback, &stage_feedback);
    }

    Ok(pipeline)
}

fn log_creation_feedback(feedback: &vk::PipelineCreationFeedback, stages: &[vk::PipelineCreationFeedback]) {
    if !feedback.flags.contains(vk::PipelineCreationFeedbackFlags::VALID) {
        return;
    }

    info!(
        "Pipeline created in {}ns (cache hit: {})",
        feedback.duration,
        cache_hit(feedback)
    );
    for (index, stage) in stages.iter().enumerate() {
        if stage.flags.contains(vk::PipelineCreationFeedbackFlags::VALID) {
            info!("  stage {index}: {}ns (cache hit: {})", stage.duration, cache_hit(stage));
        } else {
            info!("  stage {index}: no data");
        }
    }
}

fn cache_hit(feedback: &vk::PipelineCreationFeedback) -> bool {
    feedback
        .flags
        .contains(vk::PipelineCreationFeedbackFlags::APPLICATION_PIPELINE_CACHE_HIT)
}
