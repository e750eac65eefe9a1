//! The seam between the frame logic and a graphics API.
//!
//! Backends hand out plain numeric ids for everything they create; the
//! renderer keeps ownership bookkeeping on its side (mesh library, pipelines,
//! swapchain resources), so the same lifecycle code drives Vulkan and the
//! headless recorder used in tests.

use std::fmt;
use std::path::PathBuf;
use std::thread::ThreadId;

use crate::error::RenderError;
use crate::pipeline::Stage;

macro_rules! gpu_ids {
    ($($(#[$meta:meta])* $name:ident => $label:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                pub const KIND: &'static str = $label;
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}#{}", $label, self.0)
                }
            }
        )*
    };
}

gpu_ids! {
    BufferId => "buffer",
    SwapchainId => "swapchain",
    /// Image attachment owned alongside the swapchain (depth)
    AttachmentId => "attachment",
    FramebufferId => "framebuffer",
    PipelineId => "pipeline",
    DescriptorSetId => "descriptor set",
    CommandPoolId => "command pool",
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// A compiled SPIR-V file for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub path: PathBuf,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    Float2,
    Float3,
    Float4,
}

impl AttributeFormat {
    pub fn size(self) -> u32 {
        match self {
            AttributeFormat::Float2 => 8,
            AttributeFormat::Float3 => 12,
            AttributeFormat::Float4 => 16,
        }
    }
}

/// One vertex shader input, matched by name.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub offset: u32,
    pub format: AttributeFormat,
}

/// Layout of the single interleaved vertex buffer a pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

/// A uniform buffer slot in the pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub set: u32,
    pub binding: u32,
}

/// Everything a backend needs to build a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub name: String,
    pub stage: Stage,
    pub shaders: Vec<ShaderSource>,
    pub vertex: VertexLayout,
    /// Bytes of push constant data, visible to both stages
    pub push_constant_size: u32,
    pub bindings: Vec<UniformBinding>,
    pub depth_test: bool,
}

/// Swapchain as created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub id: SwapchainId,
    pub extent: [u32; 2],
    pub image_count: u32,
}

/// Result of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Ok,
    Suboptimal,
    OutOfDate,
}

/// Reports the drawable size of the window. Windowing itself is the
/// application's business.
pub trait SurfaceProvider {
    fn framebuffer_size(&self) -> [u32; 2];
}

/// A graphics API behind the renderer.
///
/// Recording calls apply to the command buffer opened by
/// [`begin_commands`](Self::begin_commands). Destroying an id twice, or one
/// the backend never issued, is a no-op on the backend side.
pub trait GpuBackend {
    fn name(&self) -> &str;

    // ---- Buffers ----

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId, RenderError>;

    /// Overwrite the start of an existing buffer.
    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    // ---- Swapchain resources ----

    fn create_swapchain(&mut self, extent: [u32; 2]) -> Result<SwapchainInfo, RenderError>;

    fn destroy_swapchain(&mut self, swapchain: SwapchainId);

    fn create_depth_attachment(&mut self, extent: [u32; 2]) -> Result<AttachmentId, RenderError>;

    fn destroy_attachment(&mut self, attachment: AttachmentId);

    /// Framebuffer for swapchain image `image` used by render pass
    /// `render_pass`. Render pass 0 clears; later passes load.
    fn create_framebuffer(
        &mut self,
        render_pass: u32,
        swapchain: SwapchainId,
        image: u32,
        depth: AttachmentId,
    ) -> Result<FramebufferId, RenderError>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    // ---- Pipelines ----

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, RenderError>;

    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    /// Descriptor set `set` of `pipeline`, with `(binding, buffer)` uniform
    /// writes.
    fn create_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        set: u32,
        uniforms: &[(u32, BufferId)],
    ) -> Result<DescriptorSetId, RenderError>;

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId);

    // ---- Commands ----

    fn create_command_pool(&mut self, thread: ThreadId) -> Result<CommandPoolId, RenderError>;

    fn destroy_command_pool(&mut self, pool: CommandPoolId);

    fn begin_commands(&mut self, pool: CommandPoolId) -> Result<(), RenderError>;

    /// `clear` is `Some` for the pass that clears color and depth.
    fn begin_render_pass(
        &mut self,
        framebuffer: FramebufferId,
        clear: Option<[f32; 4]>,
    ) -> Result<(), RenderError>;

    fn next_subpass(&mut self) -> Result<(), RenderError>;

    fn end_render_pass(&mut self) -> Result<(), RenderError>;

    fn bind_pipeline(&mut self, pipeline: PipelineId) -> Result<(), RenderError>;

    fn bind_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        set: u32,
        descriptor_set: DescriptorSetId,
    ) -> Result<(), RenderError>;

    fn bind_vertex_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError>;

    /// Bind a buffer of `u32` indices.
    fn bind_index_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError>;

    fn push_constants(&mut self, pipeline: PipelineId, data: &[u8]) -> Result<(), RenderError>;

    fn draw_indexed(&mut self, index_count: u32) -> Result<(), RenderError>;

    fn end_commands(&mut self) -> Result<(), RenderError>;

    // ---- Frame ----

    fn acquire_next_image(&mut self, swapchain: SwapchainId) -> Result<Acquire, RenderError>;

    /// Queue the recorded commands for execution after the acquire.
    fn submit(&mut self) -> Result<(), RenderError>;

    fn present(&mut self, swapchain: SwapchainId, image: u32) -> Result<PresentStatus, RenderError>;

    fn wait_idle(&mut self) -> Result<(), RenderError>;

    /// Release the device. Every other resource must already be destroyed.
    fn destroy_device(&mut self);
}
