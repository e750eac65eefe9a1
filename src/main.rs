//! Lumen - an ECS-driven Vulkan renderer
//!
//! Opens a window, loads the configured scene (or a built-in demo scene) and
//! renders it until the window closes. `--headless <frames>` runs the same
//! tick against the recording backend without a GPU.

mod scene_file;
mod settings;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use lumen_render::{Engine, GpuBackend, HeadlessBackend, HeadlessSurface, SurfaceProvider, VulkanBackend};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vulkano::{
    instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
    swapchain::Surface,
    VulkanLibrary,
};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::settings::EngineSettings;

/// Reports the window's drawable size to the frame manager.
struct WindowSurface(Arc<Window>);

impl SurfaceProvider for WindowSurface {
    fn framebuffer_size(&self) -> [u32; 2] {
        let size = self.0.inner_size();
        [size.width, size.height]
    }
}

struct Running {
    window: Arc<Window>,
    surface: WindowSurface,
    engine: Engine,
}

/// Application state
struct LumenApp {
    settings: EngineSettings,
    instance: Arc<Instance>,
    running: Option<Running>,
    last_frame: Instant,
    failure: Option<anyhow::Error>,
}

impl LumenApp {
    fn new(settings: EngineSettings, instance: Arc<Instance>) -> Self {
        Self {
            settings,
            instance,
            running: None,
            last_frame: Instant::now(),
            failure: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let video = &self.settings.video;
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(video.title.clone())
                        .with_inner_size(LogicalSize::new(video.width, video.height)),
                )
                .context("Failed to create window")?,
        );
        let surface = Surface::from_window(self.instance.clone(), window.clone())
            .context("Failed to create surface")?;

        let backend = VulkanBackend::new(self.instance.clone(), surface, video.vsync)
            .context("Failed to initialize Vulkan")?;
        let surface = WindowSurface(window.clone());
        let engine = build_engine(Box::new(backend), &surface, &self.settings)?;

        Ok(Running {
            window,
            surface,
            engine,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{error:#}");
        self.failure = Some(error);
        event_loop.exit();
    }

    /// Autosave and release the GPU. Runs once, on exit.
    fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        autosave(running.engine.world(), &self.settings);
        running.engine.shutdown();
    }

    fn finish(mut self) -> Result<()> {
        self.stop();
        match self.failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ApplicationHandler for LumenApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                info!("Lumen started");
                self.last_frame = Instant::now();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                running.engine.request_resize();
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let delta = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                if let Err(e) = running.engine.tick(&running.surface, delta) {
                    self.fail(event_loop, anyhow::Error::new(e).context("Frame failed"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.stop();
    }
}

fn build_engine(
    backend: Box<dyn GpuBackend>,
    surface: &dyn SurfaceProvider,
    settings: &EngineSettings,
) -> Result<Engine> {
    let mut engine = Engine::new(backend, surface, settings.engine_config())
        .context("Failed to create renderer")?
        .with_builtins()
        .context("Failed to register built-in systems and pipelines")?;

    let path = &settings.scene.path;
    if path.exists() {
        scene_file::load_scene(engine.world_mut(), path)?;
    } else {
        info!("No scene at {:?}, using the demo scene", path);
        scene_file::populate_default_scene(engine.world_mut())?;
    }
    Ok(engine)
}

fn autosave(world: &lumen_ecs::World, settings: &EngineSettings) {
    if !settings.scene.autosave {
        return;
    }
    if let Err(e) = scene_file::save_scene(world, &settings.scene.path) {
        error!("Autosave failed: {e:#}");
    }
}

fn run_headless(settings: &EngineSettings, frames: u32) -> Result<()> {
    let backend = HeadlessBackend::new();
    let log = backend.log();
    let surface = HeadlessSurface::new(settings.video.width, settings.video.height);
    let mut engine = build_engine(Box::new(backend), &surface, settings)?;

    for _ in 0..frames {
        engine.tick(&surface, 1.0 / 60.0)?;
    }
    autosave(engine.world(), settings);
    engine.shutdown();

    info!(
        "Headless run finished: {} frames, {} entities, {} backend calls",
        frames,
        engine.world().entity_count(),
        log.lock().len()
    );
    Ok(())
}

/// `--headless [frames]` selects the recording backend.
fn headless_frames() -> Option<u32> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--headless" {
            return Some(args.next().and_then(|n| n.parse().ok()).unwrap_or(120));
        }
    }
    None
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting Lumen...");
    let settings = EngineSettings::load();

    if let Some(frames) = headless_frames() {
        return run_headless(&settings, frames);
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    // Load Vulkan library
    let library = VulkanLibrary::new().context("Failed to load Vulkan library")?;

    // Get required extensions for windowing
    let required_extensions =
        Surface::required_extensions(&event_loop).context("Failed to query surface extensions")?;

    let instance = Instance::new(
        library,
        InstanceCreateInfo {
            flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
            enabled_extensions: required_extensions,
            ..Default::default()
        },
    )
    .context("Failed to create Vulkan instance")?;

    let mut app = LumenApp::new(settings, instance);
    event_loop.run_app(&mut app).context("Event loop failed")?;
    app.finish()
}
