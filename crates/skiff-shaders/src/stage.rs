//! Shader stage detection from file extensions.

use crate::error::{Result, ShaderError};
use shaderc::ShaderKind;
use std::path::Path;

/// Pipeline stage a GLSL source file compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Detect the stage from the file extension (`vert`, `tesc`, `tese`,
    /// `geom`, `frag`, `comp`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let stage = match path.extension().and_then(|ext| ext.to_str()) {
            Some("vert") => Self::Vertex,
            Some("tesc") => Self::TessControl,
            Some("tese") => Self::TessEvaluation,
            Some("geom") => Self::Geometry,
            Some("frag") => Self::Fragment,
            Some("comp") => Self::Compute,
            _ => return Err(ShaderError::UnknownStage(path.to_path_buf())),
        };
        Ok(stage)
    }

    pub(crate) fn kind(self) -> ShaderKind {
        match self {
            Self::Vertex => ShaderKind::Vertex,
            Self::TessControl => ShaderKind::TessControl,
            Self::TessEvaluation => ShaderKind::TessEvaluation,
            Self::Geometry => ShaderKind::Geometry,
            Self::Fragment => ShaderKind::Fragment,
            Self::Compute => ShaderKind::Compute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_from_extension() {
        let cases = [
            ("shaders/quad.vert", ShaderStage::Vertex),
            ("quad.tesc", ShaderStage::TessControl),
            ("quad.tese", ShaderStage::TessEvaluation),
            ("quad.geom", ShaderStage::Geometry),
            ("/abs/path/quad.frag", ShaderStage::Fragment),
            ("cull.comp", ShaderStage::Compute),
        ];
        for (path, expected) in cases {
            assert_eq!(ShaderStage::from_path(Path::new(path)).unwrap(), expected, "{path}");
        }
    }

    #[test]
    fn unknown_or_missing_extension() {
        for path in ["quad.glsl", "quad", "quad.VERT", "shaders/.vert"] {
            assert!(
                matches!(
                    ShaderStage::from_path(Path::new(path)),
                    Err(ShaderError::UnknownStage(_))
                ),
                "{path}"
            );
        }
    }
}
