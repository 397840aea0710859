//! Application framework for the Skiff engine.
//!
//! Owns the winit event loop and one device per window. Each window runs a
//! list of [`System`]s, the first of which renders into it.

pub mod app;
pub mod config;
pub mod runner;
pub mod system;
pub mod window;

pub use app::{AppCommand, AppContext, Application};
pub use config::{AppConfig, WindowConfig};
pub use runner::{init_logging, run};
pub use system::{RenderSystem, System, WindowContext};
pub use window::AppWindow;

// Re-export commonly used types
pub use skiff_gpu::{FrameOutcome, OverlayTarget, PresentPreference, UiOverlay};
pub use winit;
