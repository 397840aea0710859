//! Shader loading errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading, compiling or caching a shader.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// Reading the source or touching the cache failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no known shader stage.
    #[error("Cannot determine shader stage of {0}")]
    UnknownStage(PathBuf),

    /// The source is not valid UTF-8.
    #[error("Shader source {0} is not valid UTF-8")]
    InvalidSource(PathBuf),

    /// The shaderc compiler could not be initialized.
    #[error("Shader compiler unavailable")]
    CompilerUnavailable,

    /// Compilation failed.
    #[error("Failed to compile {path}: {message}")]
    Compilation { path: PathBuf, message: String },
}

impl ShaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, ShaderError>;
