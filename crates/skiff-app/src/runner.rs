//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use skiff_gpu::GpuInstance;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::raw_window_handle::HasDisplayHandle;
use winit::window::WindowId;

use crate::app::{AppCommand, AppContext, Application};
use crate::config::AppConfig;
use crate::window::AppWindow;

/// Initialize logging. `RUST_LOG` overrides the default `info` filter.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Run an application until its last window closes.
///
/// This function initializes logging, opens the configured windows and runs
/// the event loop. The first fatal error closes every window, ends the loop
/// and is returned.
pub fn run<A: Application + 'static>(config: AppConfig, app: A) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.name);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        app,
        ctx: AppContext::default(),
        instance: None,
        windows: Vec::new(),
        started: false,
        stopped: false,
        last_tick: Instant::now(),
        fatal: None,
    };

    event_loop.run_app(&mut runner).context("Event loop error")?;

    runner.fatal.map_or(Ok(()), Err)
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: Application> {
    config: AppConfig,
    app: A,
    ctx: AppContext,
    instance: Option<Arc<GpuInstance>>,
    windows: Vec<AppWindow>,
    started: bool,
    stopped: bool,
    last_tick: Instant,
    fatal: Option<anyhow::Error>,
}

impl<A: Application + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e.context("Failed to initialize application"));
            return;
        }
        self.apply_commands(event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.ctx.close_window(id);
                self.apply_commands(event_loop);
            }
            WindowEvent::Resized(_) => {
                if let Some(window) = self.window_mut(id) {
                    window.mark_resized();
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(window) = self.window_mut(id) else {
                    return;
                };
                if let Err(e) = window.tick() {
                    self.fail(event_loop, e);
                    return;
                }
                window.window().request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.started || self.stopped || self.fatal.is_some() {
            return;
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        if let Err(e) = self.app.tick(&mut self.ctx, dt) {
            self.fail(event_loop, e.context("Application tick failed"));
            return;
        }
        self.ctx.advance_frame();
        self.apply_commands(event_loop);

        for window in &self.windows {
            window.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

impl<A: Application + 'static> AppRunner<A> {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let display = event_loop
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let instance = GpuInstance::new(&self.config.name, display, self.config.validation)
            .context("Failed to create Vulkan instance")?;
        self.instance = Some(Arc::new(instance));

        for window in &self.config.windows {
            self.ctx.create_window(window.clone());
        }
        self.app.start(&mut self.ctx)?;
        self.last_tick = Instant::now();

        info!("Application ready!");
        Ok(())
    }

    /// Apply queued commands, then leave the loop if no window remains.
    fn apply_commands(&mut self, event_loop: &ActiveEventLoop) {
        for command in self.ctx.take_commands() {
            match command {
                AppCommand::CreateWindow(config) => {
                    let Some(instance) = self.instance.clone() else {
                        let err = anyhow::anyhow!("No Vulkan instance to open a window on");
                        self.fail(event_loop, err);
                        return;
                    };
                    let systems = self.app.window_systems(&config);
                    let overlay = self.app.window_overlay(&config);
                    match AppWindow::open(event_loop, &instance, &config, systems, overlay) {
                        Ok(window) => {
                            self.ctx.window_opened(window.id());
                            self.windows.push(window);
                        }
                        Err(e) => {
                            let err = e.context(format!("Failed to open window '{}'", config.title));
                            self.fail(event_loop, err);
                            return;
                        }
                    }
                }
                AppCommand::CloseWindow(id) => self.close_window(id),
                AppCommand::Exit => {
                    info!("Exit requested");
                    self.close_all();
                }
            }
        }

        if self.windows.is_empty() {
            info!("No windows open, exiting");
            event_loop.exit();
        }
    }

    fn window_mut(&mut self, id: WindowId) -> Option<&mut AppWindow> {
        self.windows.iter_mut().find(|window| window.id() == id)
    }

    fn close_window(&mut self, id: WindowId) {
        if let Some(index) = self.windows.iter().position(|window| window.id() == id) {
            // Dropping waits for the window's device to go idle.
            drop(self.windows.remove(index));
            self.ctx.window_closed(id);
        }
    }

    fn close_all(&mut self) {
        while let Some(window) = self.windows.pop() {
            let id = window.id();
            drop(window);
            self.ctx.window_closed(id);
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        if self.fatal.is_some() {
            warn!("Error after a fatal error, ignoring");
        } else {
            self.fatal = Some(err);
        }
        self.close_all();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.close_all();
        if self.started {
            self.app.stop();
        }
        self.instance = None;

        info!(ticks = self.ctx.frame(), "Application stopped");
    }
}
