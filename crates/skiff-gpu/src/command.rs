//! Command buffer management and per-frame recording.

use crate::error::Result;
use crate::mesh::MeshBuffers;
use crate::overlay::UiOverlay;
use crate::pipeline::FrameResources;
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset one at a time.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool, queue_family })
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
    ) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(1);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers[0])
    }

    /// Destroy the pool, freeing every buffer allocated from it.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Draw state for one recorded frame.
pub struct FrameDraw<'a> {
    pub resources: &'a FrameResources,
    pub mesh: &'a MeshBuffers,
    pub clear_color: [f32; 4],
    pub transform: glam::Mat4,
}

/// Record the frame for `image_index` into `cmd`.
///
/// Depends only on `draw` and `image_index`. The caller must have waited for
/// the buffer's previous submission to retire.
///
/// # Safety
/// All handles must be valid and `image_index` must name one of the
/// resources' framebuffers.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image_index: u32,
    draw: &FrameDraw<'_>,
    overlay: Option<&mut dyn UiOverlay>,
) -> Result<()> {
    let resources = draw.resources;
    let extent = resources.extent;

    device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &begin_info)?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: draw.clear_color,
        },
    }];

    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(resources.render_pass)
        .framebuffer(resources.framebuffers[image_index as usize])
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, resources.pipeline);
    device.cmd_push_constants(
        cmd,
        resources.layout,
        vk::ShaderStageFlags::VERTEX,
        0,
        bytemuck::bytes_of(&draw.transform),
    );
    device.cmd_bind_vertex_buffers(cmd, 0, &[draw.mesh.vertex_buffer()], &[0]);
    device.cmd_bind_index_buffer(cmd, draw.mesh.index_buffer(), 0, vk::IndexType::UINT16);
    device.cmd_draw_indexed(cmd, draw.mesh.index_count(), 1, 0, 0, 0);

    if let Some(overlay) = overlay {
        overlay.record(device, cmd, extent);
    }

    device.cmd_end_render_pass(cmd);
    device.end_command_buffer(cmd)?;

    Ok(())
}

/// Submit a recorded frame.
///
/// Waits on `wait_semaphore` at color-attachment output and signals
/// `signal_semaphore` and `fence` on completion.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait_semaphore: vk::Semaphore,
    signal_semaphore: vk::Semaphore,
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let wait_semaphores = [wait_semaphore];
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let signal_semaphores = [signal_semaphore];

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(&signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}
