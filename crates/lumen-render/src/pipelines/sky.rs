use lumen_ecs::components::Skybox;
use lumen_ecs::systems::{ActiveCamera, SceneLighting};
use lumen_ecs::{ComponentMask, ComponentType, Entity, World};
use tracing::debug;

use super::shader_pair;
use crate::error::RenderError;
use crate::gpu::{GpuBackend, PipelineDesc, PipelineId};
use crate::pipeline::{DrawContext, PipelineContext, RenderPipeline, Stage};
use crate::scene::SkyPushConstants;
use crate::vertex::SkyVertex;

/// Draws the sky dome around the active camera.
///
/// Colors come from a [`Skybox`] on the camera entity, falling back to the
/// default sky. Runs without depth testing, so it belongs before any opaque
/// pipeline in the same stage.
pub struct SkyPipeline {
    stage: Stage,
    pipeline: Option<PipelineId>,
    enabled: bool,
}

impl SkyPipeline {
    pub fn new() -> Self {
        Self::with_stage(Stage::default())
    }

    pub fn with_stage(stage: Stage) -> Self {
        Self {
            stage,
            pipeline: None,
            enabled: true,
        }
    }
}

impl Default for SkyPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipeline for SkyPipeline {
    fn name(&self) -> &str {
        "sky"
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::of(&[ComponentType::Transform, ComponentType::Camera])
    }

    fn init(&mut self, ctx: &mut PipelineContext<'_>) -> Result<(), RenderError> {
        let desc = PipelineDesc {
            name: self.name().to_string(),
            stage: self.stage,
            shaders: shader_pair(ctx.shader_dir, "sky"),
            vertex: SkyVertex::layout(),
            push_constant_size: std::mem::size_of::<SkyPushConstants>() as u32,
            bindings: Vec::new(),
            depth_test: false,
        };
        self.pipeline = Some(ctx.backend.create_pipeline(&desc)?);
        ctx.meshes.ensure_sky(ctx.backend)?;
        Ok(())
    }

    fn draw(
        &mut self,
        ctx: &mut DrawContext<'_>,
        world: &World,
        entities: &[Entity],
    ) -> Result<(), RenderError> {
        let Some(pipeline) = self.pipeline else {
            return Ok(());
        };
        let Some(camera) = world.resource::<ActiveCamera>() else {
            return Ok(());
        };
        if !entities.contains(&camera.entity) {
            return Ok(());
        }
        let Some(mesh) = ctx.meshes.sky() else {
            debug!("sky dome not resident, skipping");
            return Ok(());
        };

        let skybox = world.get::<Skybox>(camera.entity).cloned().unwrap_or_default();
        let sun_direction = world
            .resource::<SceneLighting>()
            .map(|lighting| lighting.sun_direction)
            .unwrap_or_else(|| SceneLighting::default().sun_direction);
        let push = SkyPushConstants::new(camera, sun_direction, &skybox);

        ctx.backend.bind_pipeline(pipeline)?;
        ctx.backend.push_constants(pipeline, bytemuck::bytes_of(&push))?;
        ctx.backend.bind_vertex_buffer(mesh.vertex_buffer)?;
        ctx.backend.bind_index_buffer(mesh.index_buffer)?;
        ctx.backend.draw_indexed(mesh.index_count)
    }

    fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(pipeline) = self.pipeline.take() {
            backend.destroy_pipeline(pipeline);
        }
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
