//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Out-of-date and suboptimal surfaces are not errors: acquire and present
/// report them as values so the frame loop can recover. Anything that does
/// surface as a `GpuError` from the frame loop is fatal for the window.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or loaded.
    #[error("Failed to load Vulkan: {0}")]
    LoadVulkan(String),

    /// No physical device can render to and present on the surface.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The surface reports no FIFO present mode, which the driver must always offer.
    #[error("Surface does not support the FIFO present mode")]
    NoPresentMode,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A frame fence did not signal within the frame timeout.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
