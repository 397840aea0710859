//! Shader loading for the Skiff engine.
//!
//! GLSL sources are compiled to SPIR-V with shaderc at runtime and cached on
//! disk under the hash of their contents.

pub mod cache;
pub mod error;
pub mod limits;
pub mod stage;

pub use cache::{source_hash, ShaderCache, ShaderSet, SPIRV_MAGIC};
pub use error::{Result, ShaderError};
pub use limits::DEFAULT_LIMITS;
pub use stage::ShaderStage;
