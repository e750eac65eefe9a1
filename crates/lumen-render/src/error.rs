use std::path::PathBuf;

use lumen_ecs::EcsError;

/// Errors raised by the renderer and its GPU backends.
///
/// Everything here is fatal for the frame loop; the recoverable swapchain
/// cases (out of date, suboptimal) are reported through
/// [`Acquire`](crate::Acquire) and [`PresentStatus`](crate::PresentStatus)
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create device: {0}")]
    DeviceCreation(String),

    #[error("GPU allocation failed: {0}")]
    Allocation(String),

    #[error("command submission failed: {0}")]
    Submit(String),

    #[error("failed to load shader '{0}': {1}")]
    Shader(PathBuf, String),

    #[error("failed to create pipeline '{name}': {reason}")]
    Pipeline { name: String, reason: String },

    #[error("unknown {kind} id {id}")]
    UnknownResource { kind: &'static str, id: u64 },

    #[error("frame is {found}, expected {expected}")]
    InvalidFrameState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Ecs(#[from] EcsError),
}
