//! Per-window renderer: owns every swapchain-dependent object and the frame slots.

use crate::command::{record_frame, submit_frame, CommandPool, FrameDraw};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::frame::{AcquireOutcome, FrameBackend, FrameOutcome, FrameSynchronizer, PresentOutcome};
use crate::mesh::MeshBuffers;
use crate::overlay::{OverlayTarget, UiOverlay};
use crate::pipeline::{FrameResources, PipelineShaders};
use crate::surface::Surface;
use crate::swapchain::{PresentPreference, SwapchainManager, SwapchainState};
use crate::sync::{self, FrameSlot, FRAME_FENCE_TIMEOUT_NS};
use ash::vk;
use glam::Mat4;

/// Renderer settings for one window.
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    pub present: PresentPreference,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            present: PresentPreference::Vsync,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Renders one window.
///
/// Owns the surface and everything built on it. The [`GpuContext`] is passed
/// in on every call and must outlive the renderer; release it with
/// [`WindowRenderer::destroy`] before dropping the context.
pub struct WindowRenderer {
    surface: Surface,
    swapchains: SwapchainManager,
    resources: Option<FrameResources>,
    command_pool: CommandPool,
    sync: FrameSynchronizer<FrameSlot>,
    mesh: MeshBuffers,
    shaders: PipelineShaders,
    overlay: Option<Box<dyn UiOverlay>>,
    clear_color: [f32; 4],
    transform: Mat4,
}

impl WindowRenderer {
    /// Create the renderer and build the first swapchain.
    ///
    /// A zero-sized window is not an error: the first frame will retry.
    pub fn new(
        gpu: &GpuContext,
        surface: Surface,
        framebuffer_size: vk::Extent2D,
        shaders: PipelineShaders,
        config: RendererConfig,
        overlay: Option<Box<dyn UiOverlay>>,
    ) -> Result<Self> {
        let device = gpu.device();

        let mut mesh = match MeshBuffers::quad(gpu) {
            Ok(mesh) => mesh,
            Err(e) => {
                unsafe { surface.destroy() };
                return Err(e);
            }
        };

        let pool_and_slots = unsafe {
            CommandPool::new(device, gpu.queue_families().graphics).and_then(|pool| {
                match FrameSlot::create_all(device, &pool) {
                    Ok(slots) => Ok((pool, slots)),
                    Err(e) => {
                        pool.destroy(device);
                        Err(e)
                    }
                }
            })
        };
        let (command_pool, slots) = match pool_and_slots {
            Ok(created) => created,
            Err(e) => {
                unsafe {
                    let _ = mesh.destroy(gpu);
                    surface.destroy();
                }
                return Err(e);
            }
        };

        let overlay_min_images = overlay.as_ref().map_or(2, |o| o.min_image_count());

        let mut renderer = Self {
            surface,
            swapchains: SwapchainManager::new(config.present, overlay_min_images),
            resources: None,
            command_pool,
            sync: FrameSynchronizer::new(slots),
            mesh,
            shaders,
            overlay,
            clear_color: config.clear_color,
            transform: Mat4::IDENTITY,
        };

        let built = {
            let (sync, mut frame) = renderer.split(gpu, framebuffer_size);
            frame.rebuild_swapchain().map(|state| {
                if state == SwapchainState::Minimized {
                    sync.mark_stale();
                }
            })
        };
        if let Err(e) = built {
            if let Err(cleanup) = renderer.destroy(gpu) {
                tracing::warn!("Cleanup after failed renderer creation: {cleanup}");
            }
            return Err(e);
        }

        tracing::debug!(
            queue_family = renderer.command_pool.queue_family(),
            "Window renderer created"
        );

        Ok(renderer)
    }

    /// Set the transform pushed to the vertex stage on following frames.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Current swapchain extent, `None` while minimized.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchains.current().map(|s| s.extent)
    }

    /// Number of swapchains built so far.
    pub fn swapchain_generation(&self) -> u64 {
        self.swapchains.generation()
    }

    /// Run one tick of the frame protocol.
    ///
    /// `framebuffer_size` is the window's current size in pixels and `resized`
    /// its resize flag, which the caller clears afterwards. Any `Err` is fatal
    /// for the window.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        framebuffer_size: vk::Extent2D,
        resized: bool,
    ) -> Result<FrameOutcome> {
        let (sync, mut frame) = self.split(gpu, framebuffer_size);
        sync.tick(&mut frame, resized)
    }

    /// Borrow the synchronizer and a frame backend over the remaining fields.
    fn split<'a>(
        &'a mut self,
        gpu: &'a GpuContext,
        framebuffer_size: vk::Extent2D,
    ) -> (&'a mut FrameSynchronizer<FrameSlot>, VulkanFrame<'a>) {
        let frame = VulkanFrame {
            gpu,
            surface: &self.surface,
            swapchains: &mut self.swapchains,
            resources: &mut self.resources,
            shaders: &self.shaders,
            overlay: &mut self.overlay,
            mesh: &self.mesh,
            clear_color: self.clear_color,
            transform: self.transform,
            framebuffer_size,
        };
        (&mut self.sync, frame)
    }

    /// Tear everything down in dependency order.
    ///
    /// Waits for the device to go idle, then releases frame slots and the
    /// command pool, the overlay, frame resources, the swapchain, mesh buffers
    /// and finally the surface. The device itself belongs to `gpu`.
    pub fn destroy(mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        let mut first_error = None;

        if let Err(e) = gpu.wait_idle() {
            tracing::warn!("Device did not go idle before teardown: {e}");
            first_error.get_or_insert(e);
        }

        unsafe {
            for slot in self.sync.slots() {
                slot.destroy(device);
            }
            self.command_pool.destroy(device);

            if let Some(overlay) = self.overlay.as_mut() {
                overlay.destroy(device);
            }

            if let Some(mut resources) = self.resources.take() {
                resources.destroy(device);
            }
        }

        if let Err(e) = self.swapchains.destroy(gpu) {
            first_error.get_or_insert(e);
        }

        if let Err(e) = unsafe { self.mesh.destroy(gpu) } {
            first_error.get_or_insert(e);
        }

        unsafe { self.surface.destroy() };

        tracing::info!(
            frames = self.sync.frame(),
            rebuilds = self.sync.rebuilds(),
            "Window renderer destroyed"
        );

        first_error.map_or(Ok(()), Err)
    }
}

/// Borrowed view of a renderer that implements the frame protocol over Vulkan.
struct VulkanFrame<'a> {
    gpu: &'a GpuContext,
    surface: &'a Surface,
    swapchains: &'a mut SwapchainManager,
    resources: &'a mut Option<FrameResources>,
    shaders: &'a PipelineShaders,
    overlay: &'a mut Option<Box<dyn UiOverlay>>,
    mesh: &'a MeshBuffers,
    clear_color: [f32; 4],
    transform: Mat4,
    framebuffer_size: vk::Extent2D,
}

impl VulkanFrame<'_> {
    fn swapchain(&self) -> Result<&crate::swapchain::Swapchain> {
        self.swapchains
            .current()
            .ok_or_else(|| GpuError::InvalidState("No swapchain to render to".to_string()))
    }
}

impl FrameBackend for VulkanFrame<'_> {
    type Slot = FrameSlot;

    fn wait_for_fence(&mut self, slot: &FrameSlot) -> Result<()> {
        unsafe { sync::wait_for_fence(self.gpu.device(), slot.in_flight, FRAME_FENCE_TIMEOUT_NS) }
    }

    fn reset_fence(&mut self, slot: &FrameSlot) -> Result<()> {
        unsafe { sync::reset_fence(self.gpu.device(), slot.in_flight) }
    }

    fn acquire_next_image(&mut self, slot: &FrameSlot) -> Result<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        unsafe {
            swapchain.acquire_next_image(
                self.gpu.swapchain_loader(),
                slot.image_acquired,
                FRAME_FENCE_TIMEOUT_NS,
            )
        }
    }

    fn record_and_submit(&mut self, slot: &FrameSlot, image_index: u32) -> Result<()> {
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Frame resources missing".to_string()))?;

        let draw = FrameDraw {
            resources,
            mesh: self.mesh,
            clear_color: self.clear_color,
            transform: self.transform,
        };
        let overlay: Option<&mut dyn UiOverlay> = match self.overlay.as_mut() {
            Some(overlay) => Some(&mut **overlay),
            None => None,
        };

        let device = self.gpu.device();
        unsafe {
            record_frame(device, slot.command_buffer, image_index, &draw, overlay)?;
            submit_frame(
                device,
                self.gpu.graphics_queue(),
                slot.command_buffer,
                slot.image_acquired,
                slot.render_complete,
                slot.in_flight,
            )
        }
    }

    fn present(&mut self, slot: &FrameSlot, image_index: u32) -> Result<PresentOutcome> {
        let swapchain = self.swapchain()?;
        unsafe {
            swapchain.present(
                self.gpu.swapchain_loader(),
                self.gpu.present_queue(),
                image_index,
                &[slot.render_complete],
            )
        }
    }

    fn rebuild_swapchain(&mut self) -> Result<SwapchainState> {
        let gpu = self.gpu;
        let device = gpu.device();

        // Framebuffers reference the swapchain views; they go first.
        gpu.wait_idle()?;
        if let Some(mut resources) = self.resources.take() {
            unsafe { resources.destroy(device) };
        }

        let state = self
            .swapchains
            .rebuild(gpu, self.surface, self.framebuffer_size)?;
        if state == SwapchainState::Minimized {
            return Ok(state);
        }

        let swapchain = self.swapchain()?;
        let resources = unsafe {
            FrameResources::build(
                device,
                swapchain.format,
                swapchain.extent,
                &swapchain.image_views,
                self.shaders,
            )?
        };
        let target = OverlayTarget {
            render_pass: resources.render_pass,
            format: resources.format,
            extent: resources.extent,
            image_count: swapchain.image_count() as u32,
        };
        *self.resources = Some(resources);

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.swapchain_rebuilt(device, &target)?;
        }

        Ok(SwapchainState::Ready)
    }
}
