//! Default built-in resource limits handed to the GLSL front end.

use shaderc::Limit;

/// Resource limits applied to every compilation.
pub static DEFAULT_LIMITS: &[(Limit, i32)] = &[
    (Limit::MaxLights, 32),
    (Limit::MaxClipPlanes, 6),
    (Limit::MaxTextureUnits, 32),
    (Limit::MaxTextureCoords, 32),
    (Limit::MaxVertexAttribs, 64),
    (Limit::MaxVertexUniformComponents, 4096),
    (Limit::MaxVaryingFloats, 64),
    (Limit::MaxVertexTextureImageUnits, 32),
    (Limit::MaxCombinedTextureImageUnits, 80),
    (Limit::MaxTextureImageUnits, 32),
    (Limit::MaxFragmentUniformComponents, 4096),
    (Limit::MaxDrawBuffers, 32),
    (Limit::MaxVertexUniformVectors, 128),
    (Limit::MaxVaryingVectors, 8),
    (Limit::MaxFragmentUniformVectors, 16),
    (Limit::MaxVertexOutputVectors, 16),
    (Limit::MaxFragmentInputVectors, 15),
    (Limit::MinProgramTexelOffset, -8),
    (Limit::MaxProgramTexelOffset, 7),
    (Limit::MaxClipDistances, 8),
    (Limit::MaxComputeWorkGroupCountX, 65535),
    (Limit::MaxComputeWorkGroupCountY, 65535),
    (Limit::MaxComputeWorkGroupCountZ, 65535),
    (Limit::MaxComputeWorkGroupSizeX, 1024),
    (Limit::MaxComputeWorkGroupSizeY, 1024),
    (Limit::MaxComputeWorkGroupSizeZ, 64),
    (Limit::MaxComputeUniformComponents, 1024),
    (Limit::MaxComputeTextureImageUnits, 16),
    (Limit::MaxComputeImageUniforms, 8),
    (Limit::MaxComputeAtomicCounters, 8),
    (Limit::MaxComputeAtomicCounterBuffers, 1),
    (Limit::MaxVaryingComponents, 60),
    (Limit::MaxVertexOutputComponents, 64),
    (Limit::MaxGeometryInputComponents, 64),
    (Limit::MaxGeometryOutputComponents, 128),
    (Limit::MaxFragmentInputComponents, 128),
    (Limit::MaxImageUnits, 8),
    (Limit::MaxCombinedImageUnitsAndFragmentOutputs, 8),
    (Limit::MaxCombinedShaderOutputResources, 8),
    (Limit::MaxImageSamples, 0),
    (Limit::MaxVertexImageUniforms, 0),
    (Limit::MaxTessControlImageUniforms, 0),
    (Limit::MaxTessEvaluationImageUniforms, 0),
    (Limit::MaxGeometryImageUniforms, 0),
    (Limit::MaxFragmentImageUniforms, 8),
    (Limit::MaxCombinedImageUniforms, 8),
    (Limit::MaxGeometryTextureImageUnits, 16),
    (Limit::MaxGeometryOutputVertices, 256),
    (Limit::MaxGeometryTotalOutputComponents, 1024),
    (Limit::MaxGeometryUniformComponents, 1024),
    (Limit::MaxGeometryVaryingComponents, 64),
    (Limit::MaxTessControlInputComponents, 128),
    (Limit::MaxTessControlOutputComponents, 128),
    (Limit::MaxTessControlTextureImageUnits, 16),
    (Limit::MaxTessControlUniformComponents, 1024),
    (Limit::MaxTessControlTotalOutputComponents, 4096),
    (Limit::MaxTessEvaluationInputComponents, 128),
    (Limit::MaxTessEvaluationOutputComponents, 128),
    (Limit::MaxTessEvaluationTextureImageUnits, 16),
    (Limit::MaxTessEvaluationUniformComponents, 1024),
    (Limit::MaxTessPatchComponents, 120),
    (Limit::MaxPatchVertices, 32),
    (Limit::MaxTessGenLevel, 64),
    (Limit::MaxViewports, 16),
    (Limit::MaxVertexAtomicCounters, 0),
    (Limit::MaxTessControlAtomicCounters, 0),
    (Limit::MaxTessEvaluationAtomicCounters, 0),
    (Limit::MaxGeometryAtomicCounters, 0),
    (Limit::MaxFragmentAtomicCounters, 8),
    (Limit::MaxCombinedAtomicCounters, 8),
    (Limit::MaxAtomicCounterBindings, 1),
    (Limit::MaxVertexAtomicCounterBuffers, 0),
    (Limit::MaxTessControlAtomicCounterBuffers, 0),
    (Limit::MaxTessEvaluationAtomicCounterBuffers, 0),
    (Limit::MaxGeometryAtomicCounterBuffers, 0),
    (Limit::MaxFragmentAtomicCounterBuffers, 1),
    (Limit::MaxCombinedAtomicCounterBuffers, 1),
    (Limit::MaxAtomicCounterBufferSize, 16384),
    (Limit::MaxTransformFeedbackBuffers, 4),
    (Limit::MaxTransformFeedbackInterleavedComponents, 64),
    (Limit::MaxCullDistances, 8),
    (Limit::MaxCombinedClipAndCullDistances, 8),
    (Limit::MaxSamples, 4),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_limit_listed_once() {
        for (i, (limit, _)) in DEFAULT_LIMITS.iter().enumerate() {
            assert!(
                DEFAULT_LIMITS[i + 1..].iter().all(|(other, _)| other != limit),
                "{limit:?} listed twice"
            );
        }
    }

    #[test]
    fn texel_offsets_bracket_zero() {
        let value = |wanted: Limit| {
            DEFAULT_LIMITS
                .iter()
                .find(|(limit, _)| *limit == wanted)
                .map(|(_, value)| *value)
        };
        assert_eq!(value(Limit::MinProgramTexelOffset), Some(-8));
        assert_eq!(value(Limit::MaxProgramTexelOffset), Some(7));
    }
}
