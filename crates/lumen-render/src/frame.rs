use std::collections::HashMap;
use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::gpu::{
    Acquire, AttachmentId, CommandPoolId, FramebufferId, GpuBackend, PresentStatus,
    SurfaceProvider, SwapchainInfo,
};
use crate::pipeline::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Presented,
    /// Swapchain no longer matches the surface and is being rebuilt
    Invalidated,
}

impl FrameState {
    fn name(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::Recording => "recording",
            FrameState::Submitted => "submitted",
            FrameState::Presented => "presented",
            FrameState::Invalidated => "invalidated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    /// Render passes per frame; pass 0 clears, later passes load
    pub render_pass_count: u32,
    pub clear_color: [f32; 4],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            render_pass_count: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// The frame being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub image_index: u32,
    pub extent: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ready(FrameInfo),
    /// Nothing to draw into this tick (minimized window or a swapchain that
    /// had to be rebuilt first)
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, then the swapchain was rebuilt
    Rebuilt,
    Skipped,
}

/// Resources whose lifetime is tied to one swapchain.
struct SwapchainResources {
    info: SwapchainInfo,
    depth: AttachmentId,
    /// Indexed by render pass, then by swapchain image
    framebuffers: Vec<Vec<FramebufferId>>,
}

/// Drives acquire, record, submit and present against a [`GpuBackend`] and
/// rebuilds the swapchain when it stops matching the surface.
///
/// The manager owns the backend; everything else borrows it through
/// [`backend_mut`](Self::backend_mut) for the duration of a call.
pub struct FrameManager {
    backend: Box<dyn GpuBackend>,
    config: FrameConfig,
    state: FrameState,
    swapchain: Option<SwapchainResources>,
    pools: HashMap<ThreadId, CommandPoolId>,
    image: Option<u32>,
    /// Render pass and subpass currently open
    pass: Option<Stage>,
    rebuild_pending: bool,
    generation: u64,
    /// States entered since the last `begin_frame`
    transitions: Vec<FrameState>,
}

impl FrameManager {
    pub fn new(
        backend: Box<dyn GpuBackend>,
        config: FrameConfig,
        surface: &dyn SurfaceProvider,
    ) -> Result<Self, RenderError> {
        let config = FrameConfig {
            render_pass_count: config.render_pass_count.max(1),
            ..config
        };
        let mut frame = Self {
            backend,
            config,
            state: FrameState::Idle,
            swapchain: None,
            pools: HashMap::new(),
            image: None,
            pass: None,
            rebuild_pending: false,
            generation: 0,
            transitions: Vec::new(),
        };
        let size = surface.framebuffer_size();
        if size[0] == 0 || size[1] == 0 {
            frame.rebuild_pending = true;
        } else {
            frame.create_swapchain_resources(size)?;
        }
        info!(
            "frame manager ready on {} ({} render passes)",
            frame.backend.name(),
            frame.config.render_pass_count
        );
        Ok(frame)
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        &*self.backend
    }

    pub fn backend_mut(&mut self) -> &mut dyn GpuBackend {
        &mut *self.backend
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Every state the latest frame passed through, in order.
    pub fn last_transitions(&self) -> &[FrameState] {
        &self.transitions
    }

    fn set_state(&mut self, state: FrameState) {
        self.state = state;
        self.transitions.push(state);
    }

    /// Bumped every time the swapchain is rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn extent(&self) -> Option<[u32; 2]> {
        self.swapchain.as_ref().map(|s| s.info.extent)
    }

    pub fn image_count(&self) -> u32 {
        self.swapchain.as_ref().map_or(0, |s| s.info.image_count)
    }

    pub fn render_pass_count(&self) -> u32 {
        self.config.render_pass_count
    }

    /// Framebuffers currently in use, by render pass then image.
    pub fn framebuffers(&self) -> Vec<Vec<FramebufferId>> {
        self.swapchain
            .as_ref()
            .map(|s| s.framebuffers.clone())
            .unwrap_or_default()
    }

    /// Rebuild the swapchain before the next frame (window resized).
    pub fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    fn expect_state(&self, expected: FrameState) -> Result<(), RenderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::InvalidFrameState {
                expected: expected.name(),
                found: self.state.name(),
            })
        }
    }

    /// Acquire an image and open render pass 0 for recording.
    pub fn begin_frame(&mut self, surface: &dyn SurfaceProvider) -> Result<FrameStatus, RenderError> {
        self.expect_state(FrameState::Idle)?;
        self.transitions.clear();

        let size = surface.framebuffer_size();
        if size[0] == 0 || size[1] == 0 {
            return Ok(FrameStatus::Skipped);
        }
        if self.rebuild_pending || self.extent() != Some(size) {
            self.rebuild(size)?;
        }
        let Some(swapchain) = self.swapchain.as_ref().map(|s| s.info) else {
            return Ok(FrameStatus::Skipped);
        };

        let index = match self.backend.acquire_next_image(swapchain.id)? {
            Acquire::OutOfDate => {
                debug!("swapchain out of date on acquire");
                self.set_state(FrameState::Invalidated);
                self.rebuild(size)?;
                return Ok(FrameStatus::Skipped);
            }
            Acquire::Image { index, suboptimal } => {
                if suboptimal {
                    self.rebuild_pending = true;
                }
                index
            }
        };

        let pool = self.command_pool()?;
        self.backend.begin_commands(pool)?;
        self.set_state(FrameState::Recording);
        self.image = Some(index);
        self.pass = None;
        self.advance_to(Stage::default())?;

        Ok(FrameStatus::Ready(FrameInfo {
            image_index: index,
            extent: swapchain.extent,
        }))
    }

    /// The frame being recorded, if any.
    pub fn current(&self) -> Option<FrameInfo> {
        if self.state != FrameState::Recording {
            return None;
        }
        Some(FrameInfo {
            image_index: self.image?,
            extent: self.extent()?,
        })
    }

    /// Move recording forward to `stage`, ending and beginning render passes
    /// and stepping subpasses as needed. Stages must be visited in ascending
    /// order.
    pub fn advance_to(&mut self, stage: Stage) -> Result<(), RenderError> {
        self.expect_state(FrameState::Recording)?;
        if stage.render_pass >= self.config.render_pass_count {
            return Err(RenderError::Backend(format!(
                "render pass {} requested, {} configured",
                stage.render_pass, self.config.render_pass_count
            )));
        }
        debug_assert!(
            self.pass.map_or(true, |current| current <= stage),
            "stages visited out of order"
        );

        let mut current = match self.pass {
            Some(current) if current.render_pass == stage.render_pass => current,
            open => {
                if open.is_some() {
                    self.backend.end_render_pass()?;
                }
                let framebuffer = self.framebuffer(stage.render_pass)?;
                let clear = (stage.render_pass == 0).then_some(self.config.clear_color);
                self.backend.begin_render_pass(framebuffer, clear)?;
                Stage::new(stage.render_pass, 0)
            }
        };
        while current.subpass < stage.subpass {
            self.backend.next_subpass()?;
            current.subpass += 1;
        }
        self.pass = Some(current);
        Ok(())
    }

    fn framebuffer(&self, render_pass: u32) -> Result<FramebufferId, RenderError> {
        let image = self.image.unwrap_or(0);
        self.swapchain
            .as_ref()
            .and_then(|s| s.framebuffers.get(render_pass as usize))
            .and_then(|per_image| per_image.get(image as usize))
            .copied()
            .ok_or_else(|| {
                RenderError::Backend(format!(
                    "no framebuffer for render pass {render_pass}, image {image}"
                ))
            })
    }

    /// Close recording, submit and present. Rebuilds the swapchain when the
    /// present reports it stale or a resize is pending.
    pub fn end_frame(&mut self, surface: &dyn SurfaceProvider) -> Result<FrameOutcome, RenderError> {
        self.expect_state(FrameState::Recording)?;
        if self.pass.take().is_some() {
            self.backend.end_render_pass()?;
        }
        self.backend.end_commands()?;
        self.backend.submit()?;
        self.set_state(FrameState::Submitted);

        let (swapchain, image) = match (self.swapchain.as_ref(), self.image.take()) {
            (Some(s), Some(image)) => (s.info.id, image),
            _ => {
                return Err(RenderError::InvalidFrameState {
                    expected: "an acquired image",
                    found: "none",
                })
            }
        };
        let status = self.backend.present(swapchain, image)?;
        self.set_state(FrameState::Presented);

        if status == PresentStatus::Ok && !self.rebuild_pending {
            self.set_state(FrameState::Idle);
            return Ok(FrameOutcome::Presented);
        }

        debug!("swapchain invalidated after present ({status:?})");
        self.set_state(FrameState::Invalidated);
        let size = surface.framebuffer_size();
        if size[0] == 0 || size[1] == 0 {
            self.rebuild_pending = true;
            self.set_state(FrameState::Idle);
            return Ok(FrameOutcome::Presented);
        }
        self.rebuild(size)?;
        Ok(FrameOutcome::Rebuilt)
    }

    /// Tear the swapchain resources down and recreate them at `size`.
    pub fn rebuild(&mut self, size: [u32; 2]) -> Result<(), RenderError> {
        self.backend.wait_idle()?;
        self.release_swapchain();
        self.create_swapchain_resources(size)?;
        self.generation += 1;
        self.rebuild_pending = false;
        self.set_state(FrameState::Idle);
        info!(
            "swapchain rebuilt at {}x{} (generation {})",
            size[0], size[1], self.generation
        );
        Ok(())
    }

    fn create_swapchain_resources(&mut self, size: [u32; 2]) -> Result<(), RenderError> {
        let info = self.backend.create_swapchain(size)?;
        let depth = self.backend.create_depth_attachment(info.extent)?;
        let mut resources = SwapchainResources {
            info,
            depth,
            framebuffers: Vec::with_capacity(self.config.render_pass_count as usize),
        };
        for render_pass in 0..self.config.render_pass_count {
            let mut per_image = Vec::with_capacity(info.image_count as usize);
            for image in 0..info.image_count {
                match self
                    .backend
                    .create_framebuffer(render_pass, info.id, image, depth)
                {
                    Ok(framebuffer) => per_image.push(framebuffer),
                    Err(e) => {
                        resources.framebuffers.push(per_image);
                        self.swapchain = Some(resources);
                        self.release_swapchain();
                        return Err(e);
                    }
                }
            }
            resources.framebuffers.push(per_image);
        }
        debug!(
            "created swapchain {:?} with {} images",
            info.id, info.image_count
        );
        self.swapchain = Some(resources);
        Ok(())
    }

    /// Destroy the image attachments, then the framebuffers, then the
    /// swapchain itself.
    pub fn release_swapchain(&mut self) {
        let Some(resources) = self.swapchain.take() else {
            return;
        };
        self.backend.destroy_attachment(resources.depth);
        for framebuffer in resources.framebuffers.into_iter().flatten() {
            self.backend.destroy_framebuffer(framebuffer);
        }
        self.backend.destroy_swapchain(resources.info.id);
    }

    /// Command pool of the calling thread, created on first use.
    fn command_pool(&mut self) -> Result<CommandPoolId, RenderError> {
        let thread = thread::current().id();
        if let Some(pool) = self.pools.get(&thread) {
            return Ok(*pool);
        }
        let pool = self.backend.create_command_pool(thread)?;
        debug!("created command pool {pool:?} for {thread:?}");
        self.pools.insert(thread, pool);
        Ok(pool)
    }

    pub fn release_command_pools(&mut self) {
        for (_, pool) in self.pools.drain() {
            self.backend.destroy_command_pool(pool);
        }
    }

    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.backend.wait_idle()
    }

    /// Release the device. Everything created through the backend must be
    /// destroyed first.
    pub fn destroy_device(&mut self) {
        if self.swapchain.is_some() || !self.pools.is_empty() {
            warn!("destroying device with live swapchain resources or command pools");
        }
        self.backend.destroy_device();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{BackendEvent, HeadlessBackend, HeadlessSurface};

    fn manager(passes: u32) -> (FrameManager, HeadlessSurface, crate::headless::EventLog) {
        let backend = HeadlessBackend::new();
        let log = backend.log();
        let surface = HeadlessSurface::new(800, 600);
        let frame = FrameManager::new(
            Box::new(backend),
            FrameConfig {
                render_pass_count: passes,
                ..Default::default()
            },
            &surface,
        )
        .unwrap();
        (frame, surface, log)
    }

    #[test]
    fn one_frame_walks_the_states() {
        let (mut frame, surface, log) = manager(1);
        log.lock().clear();

        let status = frame.begin_frame(&surface).unwrap();
        assert!(matches!(status, FrameStatus::Ready(FrameInfo { extent: [800, 600], .. })));
        assert_eq!(frame.state(), FrameState::Recording);
        assert_eq!(frame.end_frame(&surface).unwrap(), FrameOutcome::Presented);
        assert_eq!(frame.state(), FrameState::Idle);
        assert_eq!(
            frame.last_transitions(),
            &[
                FrameState::Recording,
                FrameState::Submitted,
                FrameState::Presented,
                FrameState::Idle
            ]
        );

        let events = log.lock().clone();
        let kinds: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, BackendEvent::CreateCommandPool(_)))
            .map(std::mem::discriminant)
            .collect();
        let expected = [
            BackendEvent::Acquire(0),
            BackendEvent::BeginCommands,
            BackendEvent::BeginRenderPass {
                framebuffer: crate::gpu::FramebufferId(0),
                clear: true,
            },
            BackendEvent::EndRenderPass,
            BackendEvent::EndCommands,
            BackendEvent::Submit,
            BackendEvent::Present(0),
        ]
        .iter()
        .map(std::mem::discriminant)
        .collect::<Vec<_>>();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn end_without_begin_is_rejected() {
        let (mut frame, surface, _) = manager(1);
        assert!(matches!(
            frame.end_frame(&surface),
            Err(RenderError::InvalidFrameState { .. })
        ));
    }

    #[test]
    fn later_passes_load_instead_of_clear() {
        let (mut frame, surface, log) = manager(2);
        frame.begin_frame(&surface).unwrap();
        frame.advance_to(Stage::new(0, 1)).unwrap();
        frame.advance_to(Stage::new(1, 0)).unwrap();
        assert!(frame.advance_to(Stage::new(2, 0)).is_err());
        frame.end_frame(&surface).unwrap();

        let passes: Vec<_> = log
            .lock()
            .iter()
            .filter_map(|e| match e {
                BackendEvent::BeginRenderPass { clear, .. } => Some(Some(*clear)),
                BackendEvent::NextSubpass => Some(None),
                _ => None,
            })
            .collect();
        assert_eq!(passes, vec![Some(true), None, Some(false)]);
    }

    #[test]
    fn resize_rebuilds_with_fresh_framebuffers() {
        let (mut frame, surface, log) = manager(1);
        let before = frame.framebuffers();
        let generation = frame.generation();

        frame.begin_frame(&surface).unwrap();
        surface.resize(1024, 768);
        frame.request_rebuild();
        assert_eq!(frame.end_frame(&surface).unwrap(), FrameOutcome::Rebuilt);

        assert_eq!(
            frame.last_transitions(),
            &[
                FrameState::Recording,
                FrameState::Submitted,
                FrameState::Presented,
                FrameState::Invalidated,
                FrameState::Idle
            ]
        );
        assert_eq!(frame.state(), FrameState::Idle);
        assert_eq!(frame.extent(), Some([1024, 768]));
        assert_eq!(frame.generation(), generation + 1);
        let after = frame.framebuffers();
        assert_eq!(after[0].len(), before[0].len());
        assert!(after[0].iter().all(|fb| !before[0].contains(fb)));

        // Old attachments go before old framebuffers, which go before the
        // old swapchain.
        let events = log.lock().clone();
        let position = |pred: &dyn Fn(&BackendEvent) -> bool| events.iter().position(pred).unwrap();
        let attachment = position(&|e| matches!(e, BackendEvent::DestroyAttachment(_)));
        let framebuffer = position(&|e| matches!(e, BackendEvent::DestroyFramebuffer(_)));
        let swapchain = position(&|e| matches!(e, BackendEvent::DestroySwapchain(_)));
        assert!(attachment < framebuffer && framebuffer < swapchain);
    }

    #[test]
    fn out_of_date_acquire_skips_and_rebuilds() {
        let mut backend = HeadlessBackend::new();
        backend.script_acquire(Acquire::OutOfDate);
        let surface = HeadlessSurface::new(640, 480);
        let mut frame =
            FrameManager::new(Box::new(backend), FrameConfig::default(), &surface).unwrap();

        assert_eq!(frame.begin_frame(&surface).unwrap(), FrameStatus::Skipped);
        assert_eq!(
            frame.last_transitions(),
            &[FrameState::Invalidated, FrameState::Idle]
        );
        assert_eq!(frame.state(), FrameState::Idle);
        assert_eq!(frame.generation(), 1);
        assert!(matches!(frame.begin_frame(&surface).unwrap(), FrameStatus::Ready(_)));
    }

    #[test]
    fn suboptimal_present_rebuilds() {
        let mut backend = HeadlessBackend::new();
        backend.script_present(PresentStatus::Suboptimal);
        let surface = HeadlessSurface::new(640, 480);
        let mut frame =
            FrameManager::new(Box::new(backend), FrameConfig::default(), &surface).unwrap();
        frame.begin_frame(&surface).unwrap();
        assert_eq!(frame.end_frame(&surface).unwrap(), FrameOutcome::Rebuilt);
        assert!(frame.last_transitions().contains(&FrameState::Invalidated));
        assert_eq!(frame.generation(), 1);
    }

    #[test]
    fn minimized_surface_skips() {
        let (mut frame, surface, _) = manager(1);
        surface.resize(0, 0);
        assert_eq!(frame.begin_frame(&surface).unwrap(), FrameStatus::Skipped);
        assert_eq!(frame.state(), FrameState::Idle);
    }

    #[test]
    fn one_command_pool_per_thread() {
        let (mut frame, surface, log) = manager(1);
        for _ in 0..3 {
            frame.begin_frame(&surface).unwrap();
            frame.end_frame(&surface).unwrap();
        }
        let pools = log
            .lock()
            .iter()
            .filter(|e| matches!(e, BackendEvent::CreateCommandPool(_)))
            .count();
        assert_eq!(pools, 1);
    }
}
