//! Per-window systems and the render system.

use anyhow::Context as _;
use ash::vk;
use skiff_gpu::{
    quad_transform, FrameOutcome, GpuContext, PipelineShaders, RendererConfig, Surface,
    UiOverlay, WindowRenderer,
};
use tracing::{debug, trace, warn};
use winit::window::Window;

/// What a system sees of its window on each call.
pub struct WindowContext<'a> {
    pub window: &'a Window,
    pub gpu: &'a GpuContext,
    /// Current framebuffer size in physical pixels.
    pub framebuffer_size: vk::Extent2D,
    /// The window was resized since the previous tick.
    pub resized: bool,
    /// Seconds since the window opened.
    pub elapsed: f32,
}

impl WindowContext<'_> {
    /// Framebuffer width over height, 1.0 while minimized.
    pub fn aspect_ratio(&self) -> f32 {
        aspect_ratio(self.framebuffer_size)
    }
}

fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.width == 0 || extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

/// A unit of per-window behavior driven by the window's tick.
///
/// Systems start in the order they were attached and stop in reverse. `stop`
/// runs exactly once, before the window's device is dropped, even when `start`
/// failed.
pub trait System {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called once after the window and its device exist.
    fn start(&mut self, ctx: &WindowContext) -> anyhow::Result<()>;

    /// Called once per tick. An error is fatal for the application.
    fn tick(&mut self, ctx: &WindowContext, dt: f32) -> anyhow::Result<()>;

    /// Release everything the system holds.
    fn stop(&mut self, ctx: &WindowContext);
}

enum RenderState {
    Pending {
        surface: Surface,
        shaders: PipelineShaders,
        overlay: Option<Box<dyn UiOverlay>>,
    },
    Running(WindowRenderer),
    Stopped,
}

/// Draws the spinning quad into the window's surface.
pub struct RenderSystem {
    state: RenderState,
    config: RendererConfig,
    last_outcome: Option<FrameOutcome>,
    swapchain_generation: u64,
}

impl RenderSystem {
    /// Take ownership of the window's surface. The renderer is built on `start`.
    pub fn new(
        surface: Surface,
        shaders: PipelineShaders,
        config: RendererConfig,
        overlay: Option<Box<dyn UiOverlay>>,
    ) -> Self {
        Self {
            state: RenderState::Pending {
                surface,
                shaders,
                overlay,
            },
            config,
            last_outcome: None,
            swapchain_generation: 0,
        }
    }
}

/// The tick moved between presenting and skipping frames.
fn presenting_changed(previous: Option<FrameOutcome>, current: FrameOutcome) -> bool {
    let presented = |outcome: FrameOutcome| matches!(outcome, FrameOutcome::Presented { .. });
    previous.is_some_and(|previous| presented(previous) != presented(current))
}

impl System for RenderSystem {
    fn name(&self) -> &'static str {
        "render"
    }

    fn start(&mut self, ctx: &WindowContext) -> anyhow::Result<()> {
        let RenderState::Pending {
            surface,
            shaders,
            overlay,
        } = std::mem::replace(&mut self.state, RenderState::Stopped)
        else {
            anyhow::bail!("Render system started twice");
        };

        let renderer = WindowRenderer::new(
            ctx.gpu,
            surface,
            ctx.framebuffer_size,
            shaders,
            self.config,
            overlay,
        )
        .context("Failed to create window renderer")?;

        self.state = RenderState::Running(renderer);
        Ok(())
    }

    fn tick(&mut self, ctx: &WindowContext, _dt: f32) -> anyhow::Result<()> {
        let RenderState::Running(renderer) = &mut self.state else {
            return Ok(());
        };

        let aspect = renderer
            .extent()
            .map_or_else(|| ctx.aspect_ratio(), aspect_ratio);
        renderer.set_transform(quad_transform(ctx.elapsed, aspect));

        let outcome = renderer
            .render(ctx.gpu, ctx.framebuffer_size, ctx.resized)
            .context("Frame failed")?;
        trace!(?outcome, "Frame");

        if presenting_changed(self.last_outcome, outcome) {
            debug!(?outcome, "Switched between presenting and skipping");
        }
        self.last_outcome = Some(outcome);

        let generation = renderer.swapchain_generation();
        if generation != self.swapchain_generation {
            debug!(generation, extent = ?renderer.extent(), "Render target rebuilt");
            self.swapchain_generation = generation;
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &WindowContext) {
        match std::mem::replace(&mut self.state, RenderState::Stopped) {
            RenderState::Running(renderer) => {
                if let Err(e) = renderer.destroy(ctx.gpu) {
                    warn!("Window renderer teardown reported: {e}");
                }
            }
            RenderState::Pending {
                surface,
                mut overlay,
                ..
            } => {
                if let Some(overlay) = overlay.as_mut() {
                    overlay.destroy(ctx.gpu.device());
                }
                // SAFETY: nothing was built on the surface and the window is still alive.
                unsafe { surface.destroy() };
            }
            RenderState::Stopped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_gpu::SkipReason;

    #[test]
    fn aspect_of_landscape_framebuffer() {
        let aspect = aspect_ratio(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert!((aspect - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn aspect_of_empty_framebuffer_is_one() {
        for (width, height) in [(0, 0), (800, 0), (0, 600)] {
            assert_eq!(aspect_ratio(vk::Extent2D { width, height }), 1.0);
        }
    }

    #[test]
    fn presenting_transitions() {
        let presented = FrameOutcome::Presented {
            frame: 0,
            slot: 0,
            image_index: 0,
        };
        let skipped = FrameOutcome::Skipped(SkipReason::Minimized);

        assert!(!presenting_changed(None, presented));
        assert!(!presenting_changed(None, skipped));
        assert!(!presenting_changed(Some(presented), presented));
        assert!(!presenting_changed(Some(skipped), skipped));
        assert!(presenting_changed(Some(presented), skipped));
        assert!(presenting_changed(Some(skipped), presented));
    }
}
