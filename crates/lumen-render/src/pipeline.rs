//! Render pipelines as signature subscribers
//!
//! A pipeline declares the components it draws and the render pass and
//! subpass it draws in. The registry subscribes it with the world's
//! [`SignatureRegistry`](lumen_ecs::SignatureRegistry) and hands it the
//! matching entities every frame, in stage order.

use std::path::Path;

use lumen_ecs::{ComponentMask, Entity, SubscriberId, World};
use tracing::{info, warn};

use crate::error::RenderError;
use crate::frame::{FrameInfo, FrameManager};
use crate::gpu::GpuBackend;
use crate::mesh::MeshLibrary;

/// Where in the frame a pipeline records: render pass, then subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Stage {
    pub render_pass: u32,
    pub subpass: u32,
}

impl Stage {
    pub const fn new(render_pass: u32, subpass: u32) -> Self {
        Self {
            render_pass,
            subpass,
        }
    }
}

/// Everything a pipeline may touch while creating its GPU objects.
pub struct PipelineContext<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub meshes: &'a mut MeshLibrary,
    /// Directory holding the compiled `.spv` files
    pub shader_dir: &'a Path,
}

/// Everything a pipeline may touch while recording.
pub struct DrawContext<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub meshes: &'a MeshLibrary,
    pub frame: FrameInfo,
}

pub trait RenderPipeline {
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    /// Components an entity needs to be drawn by this pipeline.
    fn signature(&self) -> ComponentMask;

    /// Create GPU objects. On error the registry calls
    /// [`destroy`](Self::destroy) to release whatever was created.
    fn init(&mut self, ctx: &mut PipelineContext<'_>) -> Result<(), RenderError>;

    /// Per-frame work before recording starts (uniform uploads).
    fn update(
        &mut self,
        _backend: &mut dyn GpuBackend,
        _world: &World,
        _entities: &[Entity],
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn draw(
        &mut self,
        ctx: &mut DrawContext<'_>,
        world: &World,
        entities: &[Entity],
    ) -> Result<(), RenderError>;

    fn on_swapchain_rebuilt(
        &mut self,
        _backend: &mut dyn GpuBackend,
        _extent: [u32; 2],
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Release GPU objects. Must tolerate being called more than once.
    fn destroy(&mut self, backend: &mut dyn GpuBackend);

    fn enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);
}

struct Entry {
    pipeline: Box<dyn RenderPipeline>,
    subscriber: SubscriberId,
    stage: Stage,
}

/// Pipelines in draw order: ascending [`Stage`], registration order within a
/// stage.
#[derive(Default)]
pub struct PipelineRegistry {
    entries: Vec<Entry>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `pipeline` and subscribe it for its signature.
    pub fn add<P: RenderPipeline + 'static>(
        &mut self,
        world: &mut World,
        ctx: &mut PipelineContext<'_>,
        mut pipeline: P,
    ) -> Result<SubscriberId, RenderError> {
        if let Err(e) = pipeline.init(ctx) {
            warn!("pipeline '{}' failed to initialize: {e}", pipeline.name());
            pipeline.destroy(ctx.backend);
            return Err(e);
        }

        let stage = pipeline.stage();
        let subscriber = world.subscribe(pipeline.name(), pipeline.signature());
        info!(
            "pipeline '{}' added at pass {} subpass {} ({} entities)",
            pipeline.name(),
            stage.render_pass,
            stage.subpass,
            world.members(subscriber).len()
        );

        let index = self.entries.partition_point(|e| e.stage <= stage);
        self.entries.insert(
            index,
            Entry {
                pipeline: Box::new(pipeline),
                subscriber,
                stage,
            },
        );
        Ok(subscriber)
    }

    /// Destroy and unsubscribe the pipeline called `name`.
    pub fn remove(&mut self, world: &mut World, backend: &mut dyn GpuBackend, name: &str) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.pipeline.name() == name) else {
            return false;
        };
        let mut entry = self.entries.remove(index);
        entry.pipeline.destroy(backend);
        world.unsubscribe(entry.subscriber);
        true
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.pipeline.name() == name) {
            Some(entry) => {
                entry.pipeline.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn update_all(&mut self, world: &World, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        for entry in self.entries.iter_mut().filter(|e| e.pipeline.enabled()) {
            entry
                .pipeline
                .update(backend, world, world.members(entry.subscriber))?;
        }
        Ok(())
    }

    /// Record every enabled pipeline into the current frame, moving the frame
    /// to each pipeline's stage first.
    pub fn draw_all(
        &mut self,
        frame: &mut FrameManager,
        world: &World,
        meshes: &MeshLibrary,
    ) -> Result<(), RenderError> {
        let info = frame.current().ok_or(RenderError::InvalidFrameState {
            expected: "recording",
            found: "no frame in flight",
        })?;
        for entry in self.entries.iter_mut().filter(|e| e.pipeline.enabled()) {
            frame.advance_to(entry.stage)?;
            let mut ctx = DrawContext {
                backend: frame.backend_mut(),
                meshes,
                frame: info,
            };
            entry
                .pipeline
                .draw(&mut ctx, world, world.members(entry.subscriber))?;
        }
        Ok(())
    }

    pub fn on_swapchain_rebuilt(
        &mut self,
        backend: &mut dyn GpuBackend,
        extent: [u32; 2],
    ) -> Result<(), RenderError> {
        for entry in &mut self.entries {
            entry.pipeline.on_swapchain_rebuilt(backend, extent)?;
        }
        Ok(())
    }

    /// Destroy every pipeline, last stage first, and drop the subscriptions.
    pub fn destroy_all(&mut self, world: &mut World, backend: &mut dyn GpuBackend) {
        while let Some(mut entry) = self.entries.pop() {
            entry.pipeline.destroy(backend);
            world.unsubscribe(entry.subscriber);
        }
    }

    /// Pipeline names in draw order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pipeline.name())
    }

    pub fn subscriber(&self, name: &str) -> Option<SubscriberId> {
        self.entries
            .iter()
            .find(|e| e.pipeline.name() == name)
            .map(|e| e.subscriber)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameConfig;
    use crate::headless::{HeadlessBackend, HeadlessSurface};
    use lumen_ecs::ComponentType;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records which entities it saw into a shared list.
    struct Probe {
        name: &'static str,
        stage: Stage,
        signature: ComponentMask,
        seen: Arc<Mutex<Vec<(&'static str, Vec<Entity>)>>>,
        fail_init: bool,
        enabled: bool,
        destroyed: bool,
    }

    impl Probe {
        fn new(
            name: &'static str,
            stage: Stage,
            seen: &Arc<Mutex<Vec<(&'static str, Vec<Entity>)>>>,
        ) -> Self {
            Self {
                name,
                stage,
                signature: ComponentMask::of(&[ComponentType::Transform]),
                seen: Arc::clone(seen),
                fail_init: false,
                enabled: true,
                destroyed: false,
            }
        }
    }

    impl RenderPipeline for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn stage(&self) -> Stage {
            self.stage
        }

        fn signature(&self) -> ComponentMask {
            self.signature
        }

        fn init(&mut self, _ctx: &mut PipelineContext<'_>) -> Result<(), RenderError> {
            if self.fail_init {
                return Err(RenderError::Pipeline {
                    name: self.name.into(),
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }

        fn draw(
            &mut self,
            _ctx: &mut DrawContext<'_>,
            _world: &World,
            entities: &[Entity],
        ) -> Result<(), RenderError> {
            self.seen.lock().push((self.name, entities.to_vec()));
            Ok(())
        }

        fn destroy(&mut self, _backend: &mut dyn GpuBackend) {
            self.destroyed = true;
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    struct Fixture {
        world: World,
        frame: FrameManager,
        meshes: MeshLibrary,
        surface: HeadlessSurface,
        registry: PipelineRegistry,
    }

    impl Fixture {
        fn new(passes: u32) -> Self {
            let surface = HeadlessSurface::new(320, 240);
            let frame = FrameManager::new(
                Box::new(HeadlessBackend::new()),
                FrameConfig {
                    render_pass_count: passes,
                    ..Default::default()
                },
                &surface,
            )
            .unwrap();
            Self {
                world: World::new(),
                frame,
                meshes: MeshLibrary::new(),
                surface,
                registry: PipelineRegistry::new(),
            }
        }

        fn add(&mut self, pipeline: Probe) -> Result<SubscriberId, RenderError> {
            let mut ctx = PipelineContext {
                backend: self.frame.backend_mut(),
                meshes: &mut self.meshes,
                shader_dir: Path::new("shaders"),
            };
            self.registry.add(&mut self.world, &mut ctx, pipeline)
        }

        fn draw_frame(&mut self) {
            self.frame.begin_frame(&self.surface).unwrap();
            self.registry
                .draw_all(&mut self.frame, &self.world, &self.meshes)
                .unwrap();
            self.frame.end_frame(&self.surface).unwrap();
        }
    }

    #[test]
    fn draws_in_stage_order_then_registration_order() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(2);
        fixture.add(Probe::new("late", Stage::new(1, 0), &seen)).unwrap();
        fixture.add(Probe::new("first", Stage::new(0, 0), &seen)).unwrap();
        fixture.add(Probe::new("second", Stage::new(0, 0), &seen)).unwrap();
        fixture.add(Probe::new("sub", Stage::new(0, 1), &seen)).unwrap();

        assert_eq!(
            fixture.registry.names().collect::<Vec<_>>(),
            vec!["first", "second", "sub", "late"]
        );
        fixture.draw_frame();
        let order: Vec<_> = seen.lock().iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["first", "second", "sub", "late"]);
    }

    #[test]
    fn pipelines_see_matching_entities() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(1);
        let e1 = fixture.world.create_entity();
        fixture
            .world
            .create_component(e1, ComponentType::Transform)
            .unwrap();
        let e2 = fixture.world.create_entity();
        fixture.add(Probe::new("probe", Stage::default(), &seen)).unwrap();
        fixture
            .world
            .create_component(e2, ComponentType::Transform)
            .unwrap();

        fixture.draw_frame();
        assert_eq!(seen.lock()[0].1, vec![e1, e2]);
    }

    #[test]
    fn disabled_pipelines_are_skipped() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(1);
        fixture.add(Probe::new("a", Stage::default(), &seen)).unwrap();
        fixture.add(Probe::new("b", Stage::default(), &seen)).unwrap();
        assert!(fixture.registry.set_enabled("a", false));
        assert!(!fixture.registry.set_enabled("missing", false));

        fixture.draw_frame();
        let order: Vec<_> = seen.lock().iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["b"]);
    }

    #[test]
    fn failed_init_is_not_registered() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(1);
        let mut probe = Probe::new("broken", Stage::default(), &seen);
        probe.fail_init = true;
        assert!(fixture.add(probe).is_err());
        assert!(fixture.registry.is_empty());
        assert_eq!(fixture.world.signatures().len(), 0);
    }

    #[test]
    fn remove_unsubscribes() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(1);
        fixture.add(Probe::new("probe", Stage::default(), &seen)).unwrap();
        let backend = fixture.frame.backend_mut();
        assert!(fixture.registry.remove(&mut fixture.world, backend, "probe"));
        assert!(fixture.registry.subscriber("probe").is_none());
        assert_eq!(fixture.world.signatures().len(), 0);
    }

    #[test]
    fn stage_beyond_configured_passes_fails_the_draw() {
        let seen = Arc::default();
        let mut fixture = Fixture::new(1);
        fixture.add(Probe::new("far", Stage::new(3, 0), &seen)).unwrap();
        fixture.frame.begin_frame(&fixture.surface).unwrap();
        let result = fixture
            .registry
            .draw_all(&mut fixture.frame, &fixture.world, &fixture.meshes);
        assert!(result.is_err());
    }

    #[test]
    fn draw_outside_a_frame_is_rejected() {
        let mut fixture = Fixture::new(1);
        let result = fixture
            .registry
            .draw_all(&mut fixture.frame, &fixture.world, &fixture.meshes);
        assert!(matches!(result, Err(RenderError::InvalidFrameState { .. })));
    }
}
