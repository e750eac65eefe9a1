//! Ties the world, logic systems, render pipelines and frame lifecycle into
//! one tick.

use std::path::PathBuf;

use lumen_core::{ClockConfig, FrameClock};
use lumen_ecs::systems::{CameraSystem, LightingSystem, MotionSystem, SpinSystem, Viewport};
use lumen_ecs::{System, SystemSchedule, World};
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::frame::{FrameConfig, FrameManager, FrameOutcome, FrameStatus};
use crate::gpu::{GpuBackend, SurfaceProvider};
use crate::mesh::MeshLibrary;
use crate::pipeline::{PipelineContext, PipelineRegistry, RenderPipeline};
use crate::pipelines::{ForwardPipeline, SkyPipeline};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub render_pass_count: u32,
    pub clear_color: [f32; 4],
    /// Directory holding the compiled `.spv` shaders
    pub shader_dir: PathBuf,
    pub clock: ClockConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_pass_count: 1,
            clear_color: [0.02, 0.02, 0.03, 1.0],
            shader_dir: PathBuf::from("assets/shaders"),
            clock: ClockConfig::default(),
        }
    }
}

/// Owns everything needed to turn the world into frames.
///
/// One [`tick`](Self::tick) applies deferred commands, runs the logic systems,
/// updates and draws every render pipeline and presents. GPU objects are torn
/// down in reverse dependency order by [`shutdown`](Self::shutdown), which
/// also runs on drop.
pub struct Engine {
    world: World,
    systems: SystemSchedule,
    pipelines: PipelineRegistry,
    meshes: MeshLibrary,
    frame: FrameManager,
    clock: FrameClock,
    shader_dir: PathBuf,
    seen_generation: u64,
    shut_down: bool,
}

impl Engine {
    pub fn new(
        backend: Box<dyn GpuBackend>,
        surface: &dyn SurfaceProvider,
        config: EngineConfig,
    ) -> Result<Self, RenderError> {
        let frame = FrameManager::new(
            backend,
            FrameConfig {
                render_pass_count: config.render_pass_count,
                clear_color: config.clear_color,
            },
            surface,
        )?;
        let [width, height] = surface.framebuffer_size();
        let mut world = World::new();
        world.insert_resource(Viewport { width, height });

        Ok(Self {
            world,
            systems: SystemSchedule::new(),
            pipelines: PipelineRegistry::new(),
            meshes: MeshLibrary::new(),
            seen_generation: frame.generation(),
            frame,
            clock: FrameClock::new(config.clock),
            shader_dir: config.shader_dir,
            shut_down: false,
        })
    }

    /// Register the built-in camera, lighting, motion and spin systems and the
    /// sky and forward pipelines.
    pub fn with_builtins(mut self) -> Result<Self, RenderError> {
        self.add_system(CameraSystem)?;
        self.add_system(LightingSystem)?;
        self.add_system(MotionSystem::default())?;
        self.add_system(SpinSystem)?;
        self.add_pipeline(SkyPipeline::new())?;
        self.add_pipeline(ForwardPipeline::new())?;
        Ok(self)
    }

    pub fn add_system<S: System + 'static>(&mut self, system: S) -> Result<(), RenderError> {
        self.systems.add_system(&mut self.world, system)?;
        Ok(())
    }

    pub fn add_pipeline<P: RenderPipeline + 'static>(&mut self, pipeline: P) -> Result<(), RenderError> {
        let mut ctx = PipelineContext {
            backend: self.frame.backend_mut(),
            meshes: &mut self.meshes,
            shader_dir: &self.shader_dir,
        };
        self.pipelines.add(&mut self.world, &mut ctx, pipeline)?;
        Ok(())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn systems(&self) -> &SystemSchedule {
        &self.systems
    }

    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    pub fn set_pipeline_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.pipelines.set_enabled(name, enabled)
    }

    pub fn frame(&self) -> &FrameManager {
        &self.frame
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    /// The window was resized; rebuild the swapchain before the next frame.
    pub fn request_resize(&mut self) {
        self.frame.request_rebuild();
    }

    /// Run one frame: commands, systems, pipeline updates, draw, present.
    pub fn tick(
        &mut self,
        surface: &dyn SurfaceProvider,
        raw_delta: f32,
    ) -> Result<FrameOutcome, RenderError> {
        if self.shut_down {
            return Err(RenderError::InvalidFrameState {
                expected: "running",
                found: "shut down",
            });
        }

        let dt = self.clock.tick(raw_delta);
        let [width, height] = surface.framebuffer_size();
        self.world.insert_resource(Viewport { width, height });

        let applied = self.world.apply_commands();
        if applied > 0 {
            debug!("applied {applied} deferred commands");
        }
        self.systems.run_all(&mut self.world, dt);
        self.pipelines
            .update_all(&self.world, self.frame.backend_mut())?;

        let outcome = match self.frame.begin_frame(surface)? {
            FrameStatus::Skipped => FrameOutcome::Skipped,
            FrameStatus::Ready(_) => {
                self.pipelines
                    .draw_all(&mut self.frame, &self.world, &self.meshes)?;
                self.frame.end_frame(surface)?
            }
        };

        if self.frame.generation() != self.seen_generation {
            self.seen_generation = self.frame.generation();
            if let Some(extent) = self.frame.extent() {
                self.pipelines
                    .on_swapchain_rebuilt(self.frame.backend_mut(), extent)?;
            }
        }
        Ok(outcome)
    }

    /// Release every GPU object: pipelines, swapchain resources, meshes,
    /// command pools and finally the device. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.frame.wait_idle() {
            warn!("wait for idle failed during shutdown: {e}");
        }
        self.pipelines
            .destroy_all(&mut self.world, self.frame.backend_mut());
        self.frame.release_swapchain();
        self.meshes.destroy(self.frame.backend_mut());
        self.frame.release_command_pools();
        self.frame.destroy_device();
        info!("renderer shut down after {} frames", self.clock.frame_count);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{BackendEvent, EventLog, HeadlessBackend, HeadlessSurface};
    use glam::Vec3;
    use lumen_ecs::components::{Camera, MeshRenderer, Transform};

    fn engine() -> (Engine, HeadlessSurface, EventLog) {
        let backend = HeadlessBackend::new();
        let log = backend.log();
        let surface = HeadlessSurface::new(1280, 720);
        let engine = Engine::new(Box::new(backend), &surface, EngineConfig::default())
            .unwrap()
            .with_builtins()
            .unwrap();
        (engine, surface, log)
    }

    fn draw_count(log: &EventLog) -> usize {
        log.lock()
            .iter()
            .filter(|e| matches!(e, BackendEvent::DrawIndexed(_)))
            .count()
    }

    #[test]
    fn camera_entity_joins_the_sky_pipeline_and_is_drawn() {
        let (mut engine, surface, log) = engine();
        let world = engine.world_mut();
        let e1 = world.create_entity();
        world
            .insert(e1, Transform::from_position(Vec3::new(0.0, 2.0, 8.0)))
            .unwrap();
        world.insert(e1, Camera::default()).unwrap();

        let sky = engine.pipelines().subscriber("sky").unwrap();
        let forward = engine.pipelines().subscriber("forward").unwrap();
        assert_eq!(engine.world().members(sky), &[e1]);
        assert!(engine.world().members(forward).is_empty());

        log.lock().clear();
        assert_eq!(engine.tick(&surface, 0.016).unwrap(), FrameOutcome::Presented);
        assert_eq!(draw_count(&log), 1);

        engine.world_mut().remove::<Camera>(e1).unwrap();
        assert!(engine.world().members(sky).is_empty());
    }

    #[test]
    fn meshes_spawned_through_commands_are_drawn_next_tick() {
        let (mut engine, surface, log) = engine();
        let world = engine.world_mut();
        let camera = world.create_entity();
        world.insert(camera, Transform::default()).unwrap();
        world.insert(camera, Camera::default()).unwrap();
        world.commands().spawn([
            Transform::from_position(Vec3::new(0.0, 0.0, -5.0)).into(),
            MeshRenderer::default().into(),
        ]);
        world.commands().spawn([
            Transform::default().into(),
            MeshRenderer {
                visible: false,
                ..Default::default()
            }
            .into(),
        ]);

        log.lock().clear();
        engine.tick(&surface, 0.016).unwrap();
        // Sky plus the one visible cube.
        assert_eq!(draw_count(&log), 2);
    }

    #[test]
    fn nothing_is_drawn_without_a_camera() {
        let (mut engine, surface, log) = engine();
        engine
            .world_mut()
            .spawn([Transform::default().into(), MeshRenderer::default().into()])
            .unwrap();
        log.lock().clear();
        engine.tick(&surface, 0.016).unwrap();
        assert_eq!(draw_count(&log), 0);
    }

    #[test]
    fn resize_rebuilds_the_swapchain() {
        let (mut engine, surface, log) = engine();
        engine.tick(&surface, 0.016).unwrap();
        let before = engine.frame().framebuffers();

        surface.resize(640, 360);
        engine.request_resize();
        log.lock().clear();
        assert_eq!(engine.tick(&surface, 0.016).unwrap(), FrameOutcome::Presented);

        assert_eq!(engine.frame().extent(), Some([640, 360]));
        assert_eq!(engine.frame().generation(), 1);
        let after = engine.frame().framebuffers();
        assert!(after[0].iter().all(|fb| !before[0].contains(fb)));
        assert_eq!(
            engine.world().resource::<Viewport>(),
            Some(&Viewport {
                width: 640,
                height: 360
            })
        );
        assert!(log
            .lock()
            .iter()
            .any(|e| matches!(e, BackendEvent::CreateSwapchain { extent: [640, 360], .. })));
    }

    #[test]
    fn shutdown_releases_in_dependency_order() {
        let (mut engine, surface, log) = engine();
        engine
            .world_mut()
            .spawn([Transform::default().into(), Camera::default().into()])
            .unwrap();
        engine.tick(&surface, 0.016).unwrap();

        log.lock().clear();
        engine.shutdown();
        engine.shutdown();

        let events = log.lock().clone();
        let first = |pred: fn(&BackendEvent) -> bool| events.iter().position(pred).unwrap();
        let last = |pred: fn(&BackendEvent) -> bool| events.iter().rposition(pred).unwrap();

        assert_eq!(events.first(), Some(&BackendEvent::WaitIdle));
        let pipelines_done = last(|e| matches!(e, BackendEvent::DestroyPipeline(_)));
        let attachment = first(|e| matches!(e, BackendEvent::DestroyAttachment(_)));
        let framebuffers = first(|e| matches!(e, BackendEvent::DestroyFramebuffer(_)));
        let swapchain = first(|e| matches!(e, BackendEvent::DestroySwapchain(_)));
        let meshes_done = last(|e| matches!(e, BackendEvent::DestroyBuffer(_)));
        let pools = first(|e| matches!(e, BackendEvent::DestroyCommandPool(_)));

        assert!(pipelines_done < attachment);
        assert!(attachment < framebuffers);
        assert!(framebuffers < swapchain);
        assert!(swapchain < meshes_done);
        assert!(meshes_done < pools);
        assert_eq!(events.last(), Some(&BackendEvent::DestroyDevice));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, BackendEvent::DestroyDevice))
                .count(),
            1
        );
        assert!(engine.tick(&surface, 0.016).is_err());
    }

    #[test]
    fn every_created_resource_is_destroyed() {
        let (mut engine, surface, log) = engine();
        for _ in 0..4 {
            engine.tick(&surface, 0.016).unwrap();
        }
        drop(engine);

        let events = log.lock();
        let created = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BackendEvent::CreateBuffer { .. }
                        | BackendEvent::CreateSwapchain { .. }
                        | BackendEvent::CreateAttachment(_)
                        | BackendEvent::CreateFramebuffer { .. }
                        | BackendEvent::CreatePipeline { .. }
                        | BackendEvent::CreateDescriptorSet(_)
                        | BackendEvent::CreateCommandPool(_)
                )
            })
            .count();
        let destroyed = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BackendEvent::DestroyBuffer(_)
                        | BackendEvent::DestroySwapchain(_)
                        | BackendEvent::DestroyAttachment(_)
                        | BackendEvent::DestroyFramebuffer(_)
                        | BackendEvent::DestroyPipeline(_)
                        | BackendEvent::DestroyDescriptorSet(_)
                        | BackendEvent::DestroyCommandPool(_)
                )
            })
            .count();
        assert_eq!(created, destroyed);
        assert_eq!(events.last(), Some(&BackendEvent::DestroyDevice));
    }
}
