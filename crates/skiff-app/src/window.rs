//! A native window with its own device and systems.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use skiff_gpu::{
    GpuContext, GpuContextBuilder, GpuInstance, PipelineShaders, RendererConfig, Surface,
    UiOverlay,
};
use skiff_shaders::ShaderCache;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::config::WindowConfig;
use crate::system::{RenderSystem, System, WindowContext};

/// One open window.
///
/// Systems are stopped when the window drops, in reverse order, after the
/// device has gone idle and before the device itself is destroyed.
pub struct AppWindow {
    // Field order is drop order: systems, then the device, then the window.
    systems: Vec<Box<dyn System>>,
    gpu: GpuContext,
    window: Arc<Window>,
    resized: bool,
    opened: Instant,
    last_tick: Instant,
}

impl AppWindow {
    /// Open a window, select a device for it and start its systems.
    ///
    /// The render system comes first, followed by `extra_systems`.
    pub fn open(
        event_loop: &ActiveEventLoop,
        instance: &Arc<GpuInstance>,
        config: &WindowConfig,
        extra_systems: Vec<Box<dyn System>>,
        overlay: Option<Box<dyn UiOverlay>>,
    ) -> anyhow::Result<Self> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let shaders = ShaderCache::new(&config.cache_dir)
            .load_set(config.vertex_shader_path(), config.fragment_shader_path())
            .context("Failed to load shaders")?;

        // SAFETY: the surface is destroyed by the render system, which stops
        // before the window field drops.
        let surface = unsafe { Surface::from_window(Arc::clone(instance), window.as_ref())? };

        let gpu = match GpuContextBuilder::new(Arc::clone(instance)).build(&surface) {
            Ok(gpu) => gpu,
            Err(e) => {
                unsafe { surface.destroy() };
                return Err(e).context("Failed to create GPU context");
            }
        };

        let render = RenderSystem::new(
            surface,
            PipelineShaders {
                vertex: shaders.vertex,
                fragment: shaders.fragment,
            },
            RendererConfig {
                present: config.present,
                clear_color: config.clear_color,
            },
            overlay,
        );

        let mut systems: Vec<Box<dyn System>> = Vec::with_capacity(1 + extra_systems.len());
        systems.push(Box::new(render));
        systems.extend(extra_systems);

        let now = Instant::now();
        let mut app_window = Self {
            systems,
            gpu,
            window,
            resized: false,
            opened: now,
            last_tick: now,
        };

        // On failure the drop stops every system, started or not.
        app_window.start_systems()?;

        info!(
            title = %config.title,
            gpu = %app_window.gpu.capabilities().device_name,
            "Window opened"
        );

        Ok(app_window)
    }

    /// Winit id of the window.
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Native window.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Device owned by this window.
    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Record that the framebuffer changed size.
    pub fn mark_resized(&mut self) {
        self.resized = true;
    }

    /// Tick every system once and clear the resize flag.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        let ctx = WindowContext {
            window: &self.window,
            gpu: &self.gpu,
            framebuffer_size: framebuffer_size(&self.window),
            resized: self.resized,
            elapsed: now.duration_since(self.opened).as_secs_f32(),
        };

        for system in &mut self.systems {
            system
                .tick(&ctx, dt)
                .with_context(|| format!("System '{}' failed", system.name()))?;
        }

        self.resized = false;
        Ok(())
    }

    fn start_systems(&mut self) -> anyhow::Result<()> {
        let ctx = WindowContext {
            window: &self.window,
            gpu: &self.gpu,
            framebuffer_size: framebuffer_size(&self.window),
            resized: false,
            elapsed: 0.0,
        };

        for system in &mut self.systems {
            system
                .start(&ctx)
                .with_context(|| format!("Failed to start system '{}'", system.name()))?;
            debug!(system = system.name(), "System started");
        }
        Ok(())
    }
}

impl Drop for AppWindow {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            warn!("Device did not go idle before closing window: {e}");
        }

        let ctx = WindowContext {
            window: &self.window,
            gpu: &self.gpu,
            framebuffer_size: framebuffer_size(&self.window),
            resized: false,
            elapsed: self.opened.elapsed().as_secs_f32(),
        };
        for system in self.systems.iter_mut().rev() {
            system.stop(&ctx);
            debug!(system = system.name(), "System stopped");
        }

        info!(title = %self.window.title(), "Window closed");
    }
}

fn framebuffer_size(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
