//! Built-in render pipelines

mod forward;
mod sky;

pub use forward::ForwardPipeline;
pub use sky::SkyPipeline;

use std::path::Path;

use crate::gpu::{ShaderSource, ShaderStage};

/// `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`
pub(crate) fn shader_pair(dir: &Path, name: &str) -> Vec<ShaderSource> {
    vec![
        ShaderSource {
            path: dir.join(format!("{name}.vert.spv")),
            stage: ShaderStage::Vertex,
        },
        ShaderSource {
            path: dir.join(format!("{name}.frag.spv")),
            stage: ShaderStage::Fragment,
        },
    ]
}
