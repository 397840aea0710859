//! Surface management for windowed rendering.
//!
//! Hides the raw-window-handle plumbing from application code.

use crate::error::{GpuError, Result};
use crate::instance::GpuInstance;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Presentation surface bound to one window.
pub struct Surface {
    surface: vk::SurfaceKHR,
    instance: Arc<GpuInstance>,
}

impl Surface {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The window must outlive the surface.
    pub unsafe fn from_window<W>(instance: Arc<GpuInstance>, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            instance.entry(),
            instance.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        Ok(Self { surface, instance })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Query a fresh capability snapshot for this surface.
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceCapabilities> {
        let loader = self.instance.surface_loader();
        unsafe {
            let capabilities =
                loader.get_physical_device_surface_capabilities(physical_device, self.surface)?;
            let formats = loader.get_physical_device_surface_formats(physical_device, self.surface)?;
            let present_modes =
                loader.get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain may still reference the surface.
    pub unsafe fn destroy(&self) {
        self.instance
            .surface_loader()
            .destroy_surface(self.surface, None);
    }
}

/// Surface capabilities query result.
///
/// Queried again on every swapchain build; never reused across builds.
#[derive(Debug, Clone)]
pub struct SurfaceCapabilities {
    /// Raw surface capabilities (extents, image counts, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
