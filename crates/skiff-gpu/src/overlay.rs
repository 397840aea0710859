//! Hook for an immediate-mode UI drawn on top of each frame.

use crate::error::Result;
use ash::vk;

/// Render target handed to the overlay after each swapchain build.
#[derive(Debug, Clone, Copy)]
pub struct OverlayTarget {
    pub render_pass: vk::RenderPass,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// UI drawn inside the frame's render pass, after the scene.
pub trait UiOverlay {
    /// Minimum number of swapchain images the overlay needs.
    fn min_image_count(&self) -> u32 {
        2
    }

    /// Called after every swapchain build with the new render target.
    fn swapchain_rebuilt(&mut self, device: &ash::Device, target: &OverlayTarget) -> Result<()>;

    /// Append draw commands. The render pass is already begun on `command_buffer`.
    fn record(&mut self, device: &ash::Device, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);

    /// Release GPU objects. The device is idle.
    fn destroy(&mut self, _device: &ash::Device) {}
}
