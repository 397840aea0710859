//! Render pass, graphics pipeline and framebuffers derived from a swapchain.

use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// Vertex layout consumed by the pipeline (binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Location 0.
    pub position: [f32; 2],
    /// Location 1.
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
        ]
    }
}

/// Size of the vertex-stage push constant block: one column-major 4x4 matrix.
pub const TRANSFORM_PUSH_CONSTANT_SIZE: u32 = size_of::<glam::Mat4>() as u32;

/// Compiled SPIR-V for the pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct PipelineShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Everything that depends on the swapchain format and extent.
///
/// `framebuffers` is index-aligned with the swapchain image views it was
/// built from. Rebuilt wholesale on every swapchain rebuild.
pub struct FrameResources {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl FrameResources {
    /// Build the render pass, pipeline and one framebuffer per view.
    ///
    /// # Safety
    /// The device and views must be valid and the shaders valid SPIR-V.
    pub unsafe fn build(
        device: &ash::Device,
        format: vk::Format,
        extent: vk::Extent2D,
        views: &[vk::ImageView],
        shaders: &PipelineShaders,
    ) -> Result<Self> {
        let mut resources = Self {
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::with_capacity(views.len()),
            format,
            extent,
        };

        // Partially built resources are released on failure.
        if let Err(e) = resources.create_all(device, views, shaders) {
            resources.destroy(device);
            return Err(e);
        }

        tracing::debug!(
            framebuffers = resources.framebuffers.len(),
            "Frame resources built for {}x{} {:?}",
            extent.width,
            extent.height,
            format
        );

        Ok(resources)
    }

    unsafe fn create_all(
        &mut self,
        device: &ash::Device,
        views: &[vk::ImageView],
        shaders: &PipelineShaders,
    ) -> Result<()> {
        self.render_pass = create_render_pass(device, self.format)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(TRANSFORM_PUSH_CONSTANT_SIZE)];
        let layout_info =
            vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&push_constant_ranges);
        self.layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        self.pipeline =
            create_graphics_pipeline(device, self.render_pass, self.layout, self.extent, shaders)?;

        for &view in views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            self.framebuffers
                .push(device.create_framebuffer(&framebuffer_info, None)?);
        }

        Ok(())
    }

    /// Destroy in reverse creation order.
    ///
    /// # Safety
    /// The device must be valid and nothing may be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline, None);
            self.pipeline = vk::Pipeline::null();
        }
        if self.layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.layout, None);
            self.layout = vk::PipelineLayout::null();
        }
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }
    }
}

/// Single color attachment: cleared on load, kept on store, handed to present.
unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    // The layout transition must wait for the acquire semaphore's stage.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device
        .create_render_pass(&create_info, None)
        .map_err(|e| GpuError::PipelineCreation(format!("Render pass: {e}")))
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&create_info, None)
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    shaders: &PipelineShaders,
) -> Result<vk::Pipeline> {
    let vert_module = create_shader_module(device, &shaders.vertex, "Vertex")?;
    let frag_module = match create_shader_module(device, &shaders.fragment, "Fragment") {
        Ok(module) => module,
        Err(e) => {
            device.destroy_shader_module(vert_module, None);
            return Err(e);
        }
    };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Baked into the pipeline; a new extent means a new pipeline.
    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let result =
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

    device.destroy_shader_module(vert_module, None);
    device.destroy_shader_module(frag_module, None);

    let pipelines = result.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("No pipeline returned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(size_of::<Vertex>(), 20);

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!((position.location, position.offset), (0, 0));
        assert_eq!(position.format, vk::Format::R32G32_SFLOAT);
        assert_eq!((color.location, color.offset), (1, 8));
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn transform_fits_minimum_push_constant_budget() {
        // Vulkan guarantees at least 128 bytes of push constants.
        assert_eq!(TRANSFORM_PUSH_CONSTANT_SIZE, 64);
        assert!(TRANSFORM_PUSH_CONSTANT_SIZE <= 128);
    }
}
