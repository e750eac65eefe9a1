//! A [`GpuBackend`] that records calls instead of talking to a GPU.
//!
//! Used by the test suite and by `--headless` runs. Every call is appended to a
//! shared [`EventLog`] and ids are checked against what is still alive, so
//! lifecycle mistakes surface as errors instead of validation-layer noise.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::error::RenderError;
use crate::gpu::{
    Acquire, AttachmentId, BufferId, BufferUsage, CommandPoolId, DescriptorSetId, FramebufferId,
    GpuBackend, PipelineDesc, PipelineId, PresentStatus, SurfaceProvider, SwapchainId,
    SwapchainInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateBuffer {
        id: BufferId,
        usage: BufferUsage,
        size: usize,
    },
    WriteBuffer(BufferId),
    DestroyBuffer(BufferId),
    CreateSwapchain {
        id: SwapchainId,
        extent: [u32; 2],
    },
    DestroySwapchain(SwapchainId),
    CreateAttachment(AttachmentId),
    DestroyAttachment(AttachmentId),
    CreateFramebuffer {
        id: FramebufferId,
        render_pass: u32,
        image: u32,
    },
    DestroyFramebuffer(FramebufferId),
    CreatePipeline {
        id: PipelineId,
        name: String,
    },
    DestroyPipeline(PipelineId),
    CreateDescriptorSet(DescriptorSetId),
    DestroyDescriptorSet(DescriptorSetId),
    CreateCommandPool(CommandPoolId),
    DestroyCommandPool(CommandPoolId),
    BeginCommands,
    BeginRenderPass {
        framebuffer: FramebufferId,
        clear: bool,
    },
    NextSubpass,
    EndRenderPass,
    BindPipeline(PipelineId),
    BindDescriptorSet(DescriptorSetId),
    BindVertexBuffer(BufferId),
    BindIndexBuffer(BufferId),
    PushConstants(usize),
    DrawIndexed(u32),
    EndCommands,
    Acquire(u32),
    AcquireOutOfDate,
    Submit,
    Present(u32),
    WaitIdle,
    DestroyDevice,
}

pub type EventLog = Arc<Mutex<Vec<BackendEvent>>>;

pub struct HeadlessBackend {
    log: EventLog,
    next_id: u64,
    image_count: u32,
    next_image: u32,
    buffers: HashMap<BufferId, usize>,
    /// Every other live resource, keyed by kind and id
    live: HashSet<(&'static str, u64)>,
    acquire_script: VecDeque<Acquire>,
    present_script: VecDeque<PresentStatus>,
    recording: bool,
    device_lost: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
            next_id: 0,
            image_count: 3,
            next_image: 0,
            buffers: HashMap::new(),
            live: HashSet::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            recording: false,
            device_lost: false,
        }
    }

    /// Swapchain images per swapchain (at least 1)
    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count.max(1);
        self
    }

    /// Shared handle to the event log; stays valid after the backend is boxed.
    pub fn log(&self) -> EventLog {
        Arc::clone(&self.log)
    }

    /// Result for an upcoming acquire, consumed in order.
    pub fn script_acquire(&mut self, result: Acquire) {
        self.acquire_script.push_back(result);
    }

    /// Result for an upcoming present, consumed in order.
    pub fn script_present(&mut self, status: PresentStatus) {
        self.present_script.push_back(status);
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Live resources of every kind, buffers included.
    pub fn live_resources(&self) -> usize {
        self.buffers.len() + self.live.len()
    }

    fn record(&self, event: BackendEvent) {
        self.log.lock().push(event);
    }

    fn allocate(&mut self) -> Result<u64, RenderError> {
        if self.device_lost {
            return Err(RenderError::Backend("device already destroyed".into()));
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    fn track(&mut self, kind: &'static str, id: u64) {
        self.live.insert((kind, id));
    }

    fn release(&mut self, kind: &'static str, id: u64) -> bool {
        self.live.remove(&(kind, id))
    }

    fn check(&self, kind: &'static str, id: u64) -> Result<(), RenderError> {
        if self.live.contains(&(kind, id)) {
            Ok(())
        } else {
            Err(RenderError::UnknownResource { kind, id })
        }
    }

    fn check_buffer(&self, buffer: BufferId) -> Result<(), RenderError> {
        if self.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            Err(RenderError::UnknownResource {
                kind: BufferId::KIND,
                id: buffer.0,
            })
        }
    }

    fn check_recording(&self) -> Result<(), RenderError> {
        if self.recording {
            Ok(())
        } else {
            Err(RenderError::InvalidFrameState {
                expected: "recording",
                found: "no open command buffer",
            })
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId, RenderError> {
        let id = BufferId(self.allocate()?);
        self.buffers.insert(id, data.len());
        self.record(BackendEvent::CreateBuffer {
            id,
            usage,
            size: data.len(),
        });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError> {
        self.check_buffer(buffer)?;
        let size = self.buffers[&buffer];
        if data.len() > size {
            return Err(RenderError::Allocation(format!(
                "{} byte write into {size} byte {buffer:?}",
                data.len()
            )));
        }
        self.record(BackendEvent::WriteBuffer(buffer));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.record(BackendEvent::DestroyBuffer(buffer));
        }
    }

    fn create_swapchain(&mut self, extent: [u32; 2]) -> Result<SwapchainInfo, RenderError> {
        let id = SwapchainId(self.allocate()?);
        self.track(SwapchainId::KIND, id.0);
        self.next_image = 0;
        self.record(BackendEvent::CreateSwapchain { id, extent });
        Ok(SwapchainInfo {
            id,
            extent,
            image_count: self.image_count,
        })
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) {
        if self.release(SwapchainId::KIND, swapchain.0) {
            self.record(BackendEvent::DestroySwapchain(swapchain));
        }
    }

    fn create_depth_attachment(&mut self, _extent: [u32; 2]) -> Result<AttachmentId, RenderError> {
        let id = AttachmentId(self.allocate()?);
        self.track(AttachmentId::KIND, id.0);
        self.record(BackendEvent::CreateAttachment(id));
        Ok(id)
    }

    fn destroy_attachment(&mut self, attachment: AttachmentId) {
        if self.release(AttachmentId::KIND, attachment.0) {
            self.record(BackendEvent::DestroyAttachment(attachment));
        }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: u32,
        swapchain: SwapchainId,
        image: u32,
        depth: AttachmentId,
    ) -> Result<FramebufferId, RenderError> {
        self.check(SwapchainId::KIND, swapchain.0)?;
        self.check(AttachmentId::KIND, depth.0)?;
        let id = FramebufferId(self.allocate()?);
        self.track(FramebufferId::KIND, id.0);
        self.record(BackendEvent::CreateFramebuffer {
            id,
            render_pass,
            image,
        });
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.release(FramebufferId::KIND, framebuffer.0) {
            self.record(BackendEvent::DestroyFramebuffer(framebuffer));
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, RenderError> {
        if desc.shaders.is_empty() {
            return Err(RenderError::Pipeline {
                name: desc.name.clone(),
                reason: "no shader stages".into(),
            });
        }
        let id = PipelineId(self.allocate()?);
        self.track(PipelineId::KIND, id.0);
        self.record(BackendEvent::CreatePipeline {
            id,
            name: desc.name.clone(),
        });
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if self.release(PipelineId::KIND, pipeline.0) {
            self.record(BackendEvent::DestroyPipeline(pipeline));
        }
    }

    fn create_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        _set: u32,
        uniforms: &[(u32, BufferId)],
    ) -> Result<DescriptorSetId, RenderError> {
        self.check(PipelineId::KIND, pipeline.0)?;
        for (_, buffer) in uniforms {
            self.check_buffer(*buffer)?;
        }
        let id = DescriptorSetId(self.allocate()?);
        self.track(DescriptorSetId::KIND, id.0);
        self.record(BackendEvent::CreateDescriptorSet(id));
        Ok(id)
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId) {
        if self.release(DescriptorSetId::KIND, set.0) {
            self.record(BackendEvent::DestroyDescriptorSet(set));
        }
    }

    fn create_command_pool(&mut self, _thread: ThreadId) -> Result<CommandPoolId, RenderError> {
        let id = CommandPoolId(self.allocate()?);
        self.track(CommandPoolId::KIND, id.0);
        self.record(BackendEvent::CreateCommandPool(id));
        Ok(id)
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolId) {
        if self.release(CommandPoolId::KIND, pool.0) {
            self.record(BackendEvent::DestroyCommandPool(pool));
        }
    }

    fn begin_commands(&mut self, pool: CommandPoolId) -> Result<(), RenderError> {
        self.check(CommandPoolId::KIND, pool.0)?;
        if self.recording {
            return Err(RenderError::InvalidFrameState {
                expected: "no open command buffer",
                found: "recording",
            });
        }
        self.recording = true;
        self.record(BackendEvent::BeginCommands);
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        framebuffer: FramebufferId,
        clear: Option<[f32; 4]>,
    ) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check(FramebufferId::KIND, framebuffer.0)?;
        self.record(BackendEvent::BeginRenderPass {
            framebuffer,
            clear: clear.is_some(),
        });
        Ok(())
    }

    fn next_subpass(&mut self) -> Result<(), RenderError> {
        self.check_recording()?;
        self.record(BackendEvent::NextSubpass);
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<(), RenderError> {
        self.check_recording()?;
        self.record(BackendEvent::EndRenderPass);
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineId) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check(PipelineId::KIND, pipeline.0)?;
        self.record(BackendEvent::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        _set: u32,
        descriptor_set: DescriptorSetId,
    ) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check(PipelineId::KIND, pipeline.0)?;
        self.check(DescriptorSetId::KIND, descriptor_set.0)?;
        self.record(BackendEvent::BindDescriptorSet(descriptor_set));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check_buffer(buffer)?;
        self.record(BackendEvent::BindVertexBuffer(buffer));
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check_buffer(buffer)?;
        self.record(BackendEvent::BindIndexBuffer(buffer));
        Ok(())
    }

    fn push_constants(&mut self, pipeline: PipelineId, data: &[u8]) -> Result<(), RenderError> {
        self.check_recording()?;
        self.check(PipelineId::KIND, pipeline.0)?;
        self.record(BackendEvent::PushConstants(data.len()));
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32) -> Result<(), RenderError> {
        self.check_recording()?;
        self.record(BackendEvent::DrawIndexed(index_count));
        Ok(())
    }

    fn end_commands(&mut self) -> Result<(), RenderError> {
        self.check_recording()?;
        self.recording = false;
        self.record(BackendEvent::EndCommands);
        Ok(())
    }

    fn acquire_next_image(&mut self, swapchain: SwapchainId) -> Result<Acquire, RenderError> {
        self.check(SwapchainId::KIND, swapchain.0)?;
        let result = self.acquire_script.pop_front().unwrap_or_else(|| {
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Acquire::Image {
                index,
                suboptimal: false,
            }
        });
        match result {
            Acquire::Image { index, .. } => self.record(BackendEvent::Acquire(index)),
            Acquire::OutOfDate => self.record(BackendEvent::AcquireOutOfDate),
        }
        Ok(result)
    }

    fn submit(&mut self) -> Result<(), RenderError> {
        if self.recording {
            return Err(RenderError::Submit("command buffer still recording".into()));
        }
        self.record(BackendEvent::Submit);
        Ok(())
    }

    fn present(&mut self, swapchain: SwapchainId, image: u32) -> Result<PresentStatus, RenderError> {
        self.check(SwapchainId::KIND, swapchain.0)?;
        self.record(BackendEvent::Present(image));
        Ok(self.present_script.pop_front().unwrap_or(PresentStatus::Ok))
    }

    fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.record(BackendEvent::WaitIdle);
        Ok(())
    }

    fn destroy_device(&mut self) {
        if !self.device_lost {
            self.device_lost = true;
            self.record(BackendEvent::DestroyDevice);
        }
    }
}

/// A window stand-in whose size tests can change between frames.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    size: Arc<Mutex<[u32; 2]>>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Arc::new(Mutex::new([width, height])),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = [width, height];
    }
}

impl SurfaceProvider for HeadlessSurface {
    fn framebuffer_size(&self) -> [u32; 2] {
        *self.size.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_ids_are_rejected() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(BufferUsage::Vertex, &[0; 12]).unwrap();
        backend.destroy_buffer(buffer);
        backend.destroy_buffer(buffer);
        assert!(matches!(
            backend.write_buffer(buffer, &[0; 4]),
            Err(RenderError::UnknownResource { kind: "buffer", .. })
        ));
        let destroys = backend
            .log()
            .lock()
            .iter()
            .filter(|e| matches!(e, BackendEvent::DestroyBuffer(_)))
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn recording_calls_need_an_open_command_buffer() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.draw_indexed(3).is_err());
        let pool = backend
            .create_command_pool(std::thread::current().id())
            .unwrap();
        backend.begin_commands(pool).unwrap();
        backend.draw_indexed(3).unwrap();
        assert!(backend.submit().is_err());
        backend.end_commands().unwrap();
        backend.submit().unwrap();
    }

    #[test]
    fn acquire_cycles_images_until_scripted() {
        let mut backend = HeadlessBackend::new().with_image_count(2);
        let swapchain = backend.create_swapchain([4, 4]).unwrap();
        backend.script_acquire(Acquire::Image {
            index: 1,
            suboptimal: true,
        });
        let results: Vec<_> = (0..3)
            .map(|_| backend.acquire_next_image(swapchain.id).unwrap())
            .collect();
        assert_eq!(
            results,
            vec![
                Acquire::Image {
                    index: 1,
                    suboptimal: true
                },
                Acquire::Image {
                    index: 0,
                    suboptimal: false
                },
                Acquire::Image {
                    index: 1,
                    suboptimal: false
                },
            ]
        );
    }

    #[test]
    fn nothing_is_created_after_device_destroy() {
        let mut backend = HeadlessBackend::new();
        backend.destroy_device();
        assert!(backend.create_buffer(BufferUsage::Index, &[]).is_err());
    }
}
