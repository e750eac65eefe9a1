//! Lumen Render - signature-driven render pipelines over a GPU backend
//!
//! Render pipelines subscribe to the ECS world by component signature and
//! record their entities into frames driven by the [`FrameManager`]. The GPU is
//! reached only through the object-safe [`GpuBackend`] trait: the `vulkan`
//! feature provides a vulkano implementation, and [`headless`] records calls
//! for tests and windowless runs.

pub mod arena;
pub mod engine;
mod error;
pub mod frame;
pub mod gpu;
pub mod headless;
pub mod mesh;
pub mod pipeline;
pub mod pipelines;
pub mod scene;
pub mod uniform;
pub mod vertex;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use arena::{Handle, ResourceArena};
pub use engine::{Engine, EngineConfig};
pub use error::RenderError;
pub use frame::{FrameConfig, FrameInfo, FrameManager, FrameOutcome, FrameState, FrameStatus};
pub use gpu::{Acquire, GpuBackend, PipelineDesc, PresentStatus, SurfaceProvider};
pub use headless::{BackendEvent, HeadlessBackend, HeadlessSurface};
pub use mesh::{GpuMesh, Mesh, MeshLibrary, SkyMesh};
pub use pipeline::{DrawContext, PipelineContext, PipelineRegistry, RenderPipeline, Stage};
pub use pipelines::{ForwardPipeline, SkyPipeline};
pub use scene::{ForwardPushConstants, SceneUniforms, SkyPushConstants};
pub use uniform::{UniformBuffer, UniformStatus};
pub use vertex::{MeshVertex, SkyVertex};
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;
