use lumen_ecs::components::{Material, MeshRenderer, MeshSource, Transform};
use lumen_ecs::systems::{ActiveCamera, SceneLighting};
use lumen_ecs::{ComponentMask, ComponentType, Entity, World};
use tracing::trace;

use super::shader_pair;
use crate::error::RenderError;
use crate::gpu::{BufferId, DescriptorSetId, GpuBackend, PipelineDesc, PipelineId, UniformBinding};
use crate::pipeline::{DrawContext, PipelineContext, RenderPipeline, Stage};
use crate::scene::{ForwardPushConstants, SceneUniforms};
use crate::uniform::UniformBuffer;
use crate::vertex::MeshVertex;

const SCENE_SET: u32 = 0;
const SCENE_BINDING: u32 = 0;

/// Lit, depth-tested mesh rendering for every visible [`MeshRenderer`].
///
/// Scene-wide data (camera, lights) lives in one uniform buffer bound at set 0;
/// the model matrix and [`Material`] go through push constants per draw.
pub struct ForwardPipeline {
    stage: Stage,
    pipeline: Option<PipelineId>,
    scene: UniformBuffer<SceneUniforms>,
    descriptor_set: Option<(DescriptorSetId, BufferId)>,
    enabled: bool,
}

impl ForwardPipeline {
    pub fn new() -> Self {
        Self::with_stage(Stage::default())
    }

    pub fn with_stage(stage: Stage) -> Self {
        Self {
            stage,
            pipeline: None,
            scene: UniformBuffer::new(SceneUniforms::default()),
            descriptor_set: None,
            enabled: true,
        }
    }

    /// Upload the scene uniforms and make sure the descriptor set points at
    /// the current buffer.
    fn sync_scene(&mut self, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        let Some(pipeline) = self.pipeline else {
            return Ok(());
        };
        self.scene.flush(backend)?;
        let buffer = self
            .scene
            .buffer()
            .ok_or_else(|| RenderError::Backend("scene uniforms not resident".into()))?;
        if let Some((set, bound)) = self.descriptor_set {
            if bound == buffer {
                return Ok(());
            }
            backend.destroy_descriptor_set(set);
            self.descriptor_set = None;
        }
        let set = backend.create_descriptor_set(pipeline, SCENE_SET, &[(SCENE_BINDING, buffer)])?;
        self.descriptor_set = Some((set, buffer));
        Ok(())
    }
}

impl Default for ForwardPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipeline for ForwardPipeline {
    fn name(&self) -> &str {
        "forward"
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::of(&[ComponentType::Transform, ComponentType::MeshRenderer])
    }

    fn init(&mut self, ctx: &mut PipelineContext<'_>) -> Result<(), RenderError> {
        let desc = PipelineDesc {
            name: self.name().to_string(),
            stage: self.stage,
            shaders: shader_pair(ctx.shader_dir, "forward"),
            vertex: MeshVertex::layout(),
            push_constant_size: std::mem::size_of::<ForwardPushConstants>() as u32,
            bindings: vec![UniformBinding {
                set: SCENE_SET,
                binding: SCENE_BINDING,
            }],
            depth_test: true,
        };
        self.pipeline = Some(ctx.backend.create_pipeline(&desc)?);
        for source in MeshSource::ALL {
            ctx.meshes.ensure(ctx.backend, source)?;
        }
        self.sync_scene(ctx.backend)
    }

    fn update(
        &mut self,
        backend: &mut dyn GpuBackend,
        world: &World,
        _entities: &[Entity],
    ) -> Result<(), RenderError> {
        let lighting = world.resource::<SceneLighting>().cloned().unwrap_or_default();
        self.scene
            .set(SceneUniforms::new(world.resource::<ActiveCamera>(), &lighting));
        self.sync_scene(backend)
    }

    fn draw(
        &mut self,
        ctx: &mut DrawContext<'_>,
        world: &World,
        entities: &[Entity],
    ) -> Result<(), RenderError> {
        let (Some(pipeline), Some((set, _))) = (self.pipeline, self.descriptor_set) else {
            return Ok(());
        };
        if entities.is_empty() || world.resource::<ActiveCamera>().is_none() {
            return Ok(());
        }

        ctx.backend.bind_pipeline(pipeline)?;
        ctx.backend.bind_descriptor_set(pipeline, SCENE_SET, set)?;

        let mut draws = 0;
        for &entity in entities {
            let (Some(renderer), Some(transform)) =
                (world.get::<MeshRenderer>(entity), world.get::<Transform>(entity))
            else {
                continue;
            };
            if !renderer.visible {
                continue;
            }
            let Some(mesh) = ctx.meshes.get(renderer.mesh) else {
                continue;
            };
            let material = world.get::<Material>(entity).cloned().unwrap_or_default();
            let push = ForwardPushConstants::new(transform.matrix(), &material);

            ctx.backend.push_constants(pipeline, bytemuck::bytes_of(&push))?;
            ctx.backend.bind_vertex_buffer(mesh.vertex_buffer)?;
            ctx.backend.bind_index_buffer(mesh.index_buffer)?;
            ctx.backend.draw_indexed(mesh.index_count)?;
            draws += 1;
        }
        trace!("forward pass recorded {draws} draws");
        Ok(())
    }

    fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        if let Some((set, _)) = self.descriptor_set.take() {
            backend.destroy_descriptor_set(set);
        }
        self.scene.destroy(backend);
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
