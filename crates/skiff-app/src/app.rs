//! `Application` trait and the command context handed to it.

use skiff_gpu::UiOverlay;
use winit::window::WindowId;

use crate::config::WindowConfig;
use crate::system::System;

/// Trait for Skiff applications.
///
/// The runner owns the event loop, the windows and their devices; the
/// application steers them through [`AppContext`] commands, which are applied
/// after each callback returns.
#[allow(unused_variables)]
pub trait Application {
    /// Called once after the configured windows have been requested.
    fn start(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per loop iteration, before the windows tick.
    ///
    /// `dt` is the time in seconds since the previous call.
    fn tick(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the event loop is exiting. Every window is closed.
    fn stop(&mut self) {}

    /// Systems attached to a new window after its render system.
    fn window_systems(&mut self, config: &WindowConfig) -> Vec<Box<dyn System>> {
        Vec::new()
    }

    /// UI overlay drawn on top of a new window's frames.
    fn window_overlay(&mut self, config: &WindowConfig) -> Option<Box<dyn UiOverlay>> {
        None
    }
}

/// Deferred request from the application to the runner.
#[derive(Debug, Clone)]
pub enum AppCommand {
    CreateWindow(WindowConfig),
    CloseWindow(WindowId),
    Exit,
}

/// Command buffer and read-only view of the open windows.
#[derive(Debug, Default)]
pub struct AppContext {
    commands: Vec<AppCommand>,
    windows: Vec<WindowId>,
    frame: u64,
}

impl AppContext {
    /// Open another window.
    pub fn create_window(&mut self, config: WindowConfig) {
        self.commands.push(AppCommand::CreateWindow(config));
    }

    /// Close a window. Unknown ids are ignored.
    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(AppCommand::CloseWindow(id));
    }

    /// Close every window and leave the event loop.
    pub fn exit(&mut self) {
        self.commands.push(AppCommand::Exit);
    }

    /// Ids of the open windows, in the order they were opened.
    pub fn windows(&self) -> &[WindowId] {
        &self.windows
    }

    /// Number of completed application ticks.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Commands queued so far, without applying them.
    pub fn pending(&self) -> &[AppCommand] {
        &self.commands
    }

    pub(crate) fn take_commands(&mut self) -> Vec<AppCommand> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn window_opened(&mut self, id: WindowId) {
        self.windows.push(id);
    }

    pub(crate) fn window_closed(&mut self, id: WindowId) {
        self.windows.retain(|open| *open != id);
    }

    pub(crate) fn advance_frame(&mut self) {
        self.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> WindowId {
        WindowId::from(n)
    }

    #[test]
    fn commands_are_buffered_in_order() {
        let mut ctx = AppContext::default();
        ctx.create_window(WindowConfig::new("a"));
        ctx.close_window(id(7));
        ctx.exit();

        let commands = ctx.take_commands();
        assert!(matches!(&commands[0], AppCommand::CreateWindow(c) if c.title == "a"));
        assert!(matches!(commands[1], AppCommand::CloseWindow(w) if w == id(7)));
        assert!(matches!(commands[2], AppCommand::Exit));
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn taking_commands_drains_the_buffer() {
        let mut ctx = AppContext::default();
        ctx.exit();
        assert_eq!(ctx.pending().len(), 1);
        assert_eq!(ctx.take_commands().len(), 1);
        assert!(ctx.pending().is_empty());
        assert!(ctx.take_commands().is_empty());
    }

    #[test]
    fn open_windows_are_tracked() {
        let mut ctx = AppContext::default();
        ctx.window_opened(id(1));
        ctx.window_opened(id(2));
        ctx.window_opened(id(3));
        ctx.window_closed(id(2));
        ctx.window_closed(id(9));
        assert_eq!(ctx.windows(), [id(1), id(3)]);
    }

    #[test]
    fn frames_count_up() {
        let mut ctx = AppContext::default();
        assert_eq!(ctx.frame(), 0);
        ctx.advance_frame();
        ctx.advance_frame();
        assert_eq!(ctx.frame(), 2);
    }
}
