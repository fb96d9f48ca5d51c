//! Parameter checks applied before a job graph is built.

use thiserror::Error;

use super::presets::{Adapter, GenerationParams, Preset};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("{dimension} {value} is not a multiple of {multiple} for {preset}")]
    Dimension {
        preset: Preset,
        dimension: &'static str,
        value: u32,
        multiple: u32,
    },

    #[error("frame count {0} must be of the form 8k+1 (e.g. 25, 49, 97)")]
    FrameCount(u32),

    #[error("steps must be at least 1")]
    Steps,

    #[error("frame rate must be positive, got {0}")]
    FrameRate(String),

    #[error("invalid adapter {0:?}, expected NAME or NAME:STRENGTH")]
    Adapter(String),
}

/// Rejects parameters the server would fail on late or silently resize.
pub fn check(preset: Preset, params: &GenerationParams) -> Result<(), ConstraintError> {
    if params.prompt.trim().is_empty() {
        return Err(ConstraintError::EmptyPrompt);
    }
    if params.steps == 0 {
        return Err(ConstraintError::Steps);
    }

    let multiple = preset.dimension_multiple();
    for (dimension, value) in [("width", params.width), ("height", params.height)] {
        if value == 0 || value % multiple != 0 {
            return Err(ConstraintError::Dimension {
                preset,
                dimension,
                value,
                multiple,
            });
        }
    }

    if preset == Preset::LtxVideo {
        check_frames(params.frames)?;
        if params.fps.is_nan() || params.fps <= 0.0 {
            return Err(ConstraintError::FrameRate(params.fps.to_string()));
        }
    }
    Ok(())
}

/// Parses a `--lora` argument.
pub fn parse_adapter(spec: &str) -> Result<Adapter, ConstraintError> {
    Adapter::parse(spec).ok_or_else(|| ConstraintError::Adapter(spec.to_string()))
}

pub fn check_frames(frames: u32) -> Result<(), ConstraintError> {
    if frames == 0 || (frames - 1) % 8 != 0 {
        return Err(ConstraintError::FrameCount(frames));
    }
    Ok(())
}
