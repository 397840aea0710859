//! Sandbox application: every window gets the frame-time bar and FPS title.

use skiff_app::{AppContext, Application, System, UiOverlay, WindowConfig};
use tracing::info;

use crate::overlay::FrameTimeBar;
use crate::stats::FrameStats;

pub struct Sandbox;

impl Application for Sandbox {
    fn start(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        info!(windows = ctx.pending().len(), "Sandbox starting");
        Ok(())
    }

    fn stop(&mut self) {
        info!("Sandbox stopped");
    }

    fn window_systems(&mut self, config: &WindowConfig) -> Vec<Box<dyn System>> {
        vec![Box::new(FrameStats::new(config.title.clone()))]
    }

    fn window_overlay(&mut self, _config: &WindowConfig) -> Option<Box<dyn UiOverlay>> {
        Some(Box::new(FrameTimeBar::default()))
    }
}
