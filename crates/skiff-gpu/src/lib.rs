//! Vulkan rendering core for the Skiff engine.
//!
//! This crate provides:
//! - Vulkan instance creation shared across windows
//! - Physical device selection and logical device creation
//! - Swapchain negotiation, build and rebuild
//! - Render pass, pipeline and framebuffers per swapchain
//! - Per-frame command recording
//! - The acquire / submit / present protocol over a fixed set of frame slots

pub mod capabilities;
pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod mesh;
pub mod overlay;
pub mod pipeline;
pub mod renderer;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use ash;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use frame::{
    AcquireOutcome, FrameBackend, FrameOutcome, FrameSynchronizer, PresentOutcome, SkipReason,
    SlotState,
};
pub use instance::GpuInstance;
pub use mesh::{quad_transform, MeshBuffers};
pub use overlay::{OverlayTarget, UiOverlay};
pub use pipeline::{FrameResources, PipelineShaders, Vertex};
pub use renderer::{RendererConfig, WindowRenderer};
pub use surface::{Surface, SurfaceCapabilities};
pub use swapchain::{PresentPreference, SwapchainManager, SwapchainPlan, SwapchainState};
pub use sync::{FrameSlot, FRAME_FENCE_TIMEOUT_NS, MAX_FRAMES_IN_FLIGHT};
