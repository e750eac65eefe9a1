//! [`GpuBackend`] on top of vulkano.
//!
//! Every pipeline draws in subpass 0 of its render pass. Render pass 0 clears
//! color and depth; later passes load them, so several passes can layer onto
//! the same swapchain image.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::ThreadId;

use tracing::{debug, info, warn};
use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage as VkBufferUsage, Subbuffer},
    command_buffer::{
        allocator::StandardCommandBufferAllocator, AutoCommandBufferBuilder, CommandBufferUsage,
        PrimaryAutoCommandBuffer, RenderPassBeginInfo, SubpassBeginInfo, SubpassContents,
        SubpassEndInfo,
    },
    descriptor_set::{
        allocator::StandardDescriptorSetAllocator, DescriptorSet, WriteDescriptorSet,
    },
    device::{
        physical::PhysicalDeviceType, Device, DeviceCreateInfo, DeviceExtensions, Queue,
        QueueCreateInfo, QueueFlags,
    },
    format::Format,
    image::{view::ImageView, Image, ImageCreateInfo, ImageType, ImageUsage},
    instance::Instance,
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter, StandardMemoryAllocator},
    pipeline::{
        graphics::{
            color_blend::{ColorBlendAttachmentState, ColorBlendState},
            depth_stencil::{DepthState, DepthStencilState},
            input_assembly::InputAssemblyState,
            multisample::MultisampleState,
            rasterization::RasterizationState,
            vertex_input::{
                VertexBufferDescription, VertexDefinition, VertexInputRate, VertexMemberInfo,
            },
            viewport::{Viewport, ViewportState},
            GraphicsPipelineCreateInfo,
        },
        layout::PipelineDescriptorSetLayoutCreateInfo,
        DynamicState, GraphicsPipeline, Pipeline, PipelineBindPoint, PipelineLayout,
        PipelineShaderStageCreateInfo,
    },
    render_pass::{Framebuffer, FramebufferCreateInfo, RenderPass, Subpass},
    shader::{ShaderModule, ShaderModuleCreateInfo},
    swapchain::{
        self, PresentMode, Surface, Swapchain, SwapchainAcquireFuture, SwapchainCreateInfo,
        SwapchainPresentInfo,
    },
    sync::{self, GpuFuture},
    Validated, VulkanError,
};

use crate::error::RenderError;
use crate::gpu::{
    Acquire, AttachmentId, AttributeFormat, BufferId, BufferUsage, CommandPoolId,
    DescriptorSetId, FramebufferId, GpuBackend, PipelineDesc, PipelineId, PresentStatus,
    ShaderSource, ShaderStage, SwapchainId, SwapchainInfo, VertexLayout,
};

const DEPTH_FORMAT: Format = Format::D16_UNORM;

fn backend_err<E: fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> RenderError {
    move |e| RenderError::Backend(format!("{what}: {e:?}"))
}

fn allocation_err<E: fmt::Debug>(e: E) -> RenderError {
    RenderError::Allocation(format!("{e:?}"))
}

/// GLSL from `assets/shaders`, compiled into the binary.
mod builtin {
    pub mod forward_vs {
        vulkano_shaders::shader! { ty: "vertex", path: "../../assets/shaders/forward.vert" }
    }
    pub mod forward_fs {
        vulkano_shaders::shader! { ty: "fragment", path: "../../assets/shaders/forward.frag" }
    }
    pub mod sky_vs {
        vulkano_shaders::shader! { ty: "vertex", path: "../../assets/shaders/sky.vert" }
    }
    pub mod sky_fs {
        vulkano_shaders::shader! { ty: "fragment", path: "../../assets/shaders/sky.frag" }
    }
}

type ShaderLoader = fn(Arc<Device>) -> Result<Arc<ShaderModule>, Validated<VulkanError>>;

/// Built-in module standing in for a missing `.spv` file of the same name.
fn builtin_shader(path: &Path) -> Option<ShaderLoader> {
    let loader: ShaderLoader = match path.file_name()?.to_str()? {
        "forward.vert.spv" => builtin::forward_vs::load,
        "forward.frag.spv" => builtin::forward_fs::load,
        "sky.vert.spv" => builtin::sky_vs::load,
        "sky.frag.spv" => builtin::sky_fs::load,
        _ => return None,
    };
    Some(loader)
}

fn pipeline_err(name: &str, reason: impl fmt::Display) -> RenderError {
    RenderError::Pipeline {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

enum GpuBuffer {
    Bytes(Subbuffer<[u8]>),
    Indices(Subbuffer<[u32]>),
}

pub struct VulkanBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    surface: Arc<Surface>,
    memory_allocator: Arc<StandardMemoryAllocator>,
    command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
    descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
    color_format: Format,
    present_mode: PresentMode,
    /// Clears color and depth
    clear_pass: Arc<RenderPass>,
    /// Loads what earlier passes drew
    load_pass: Arc<RenderPass>,

    next_id: u64,
    buffers: HashMap<BufferId, GpuBuffer>,
    swapchains: HashMap<SwapchainId, (Arc<Swapchain>, Vec<Arc<Image>>)>,
    attachments: HashMap<AttachmentId, Arc<ImageView>>,
    framebuffers: HashMap<FramebufferId, Arc<Framebuffer>>,
    pipelines: HashMap<PipelineId, Arc<GraphicsPipeline>>,
    descriptor_sets: HashMap<DescriptorSetId, Arc<DescriptorSet>>,
    pools: HashSet<CommandPoolId>,

    builder: Option<AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>>,
    recorded: Option<Arc<PrimaryAutoCommandBuffer>>,
    acquire_future: Option<SwapchainAcquireFuture>,
    in_flight: Option<Box<dyn GpuFuture>>,
    previous_frame_end: Option<Box<dyn GpuFuture>>,
    device_lost: bool,
}

impl VulkanBackend {
    /// Pick a GPU that can present to `surface`, create the device and the
    /// render passes.
    pub fn new(instance: Arc<Instance>, surface: Arc<Surface>, vsync: bool) -> Result<Self, RenderError> {
        let device_extensions = DeviceExtensions {
            khr_swapchain: true,
            ..DeviceExtensions::empty()
        };

        let (physical_device, queue_family_index) = instance
            .enumerate_physical_devices()
            .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?
            .filter(|p| p.supported_extensions().contains(&device_extensions))
            .filter_map(|p| {
                p.queue_family_properties()
                    .iter()
                    .enumerate()
                    .position(|(i, q)| {
                        q.queue_flags.contains(QueueFlags::GRAPHICS)
                            && p.surface_support(i as u32, &surface).unwrap_or(false)
                    })
                    .map(|i| (p, i as u32))
            })
            .min_by_key(|(p, _)| match p.properties().device_type {
                PhysicalDeviceType::DiscreteGpu => 0,
                PhysicalDeviceType::IntegratedGpu => 1,
                PhysicalDeviceType::VirtualGpu => 2,
                PhysicalDeviceType::Cpu => 3,
                _ => 4,
            })
            .ok_or_else(|| RenderError::DeviceCreation("no suitable GPU found".into()))?;

        info!(
            "using GPU: {} ({:?})",
            physical_device.properties().device_name,
            physical_device.properties().device_type
        );

        let color_format = physical_device
            .surface_formats(&surface, Default::default())
            .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?
            .into_iter()
            .map(|(format, _)| format)
            .min_by_key(|format| match format {
                Format::B8G8R8A8_SRGB => 0,
                Format::R8G8B8A8_SRGB => 1,
                _ => 2,
            })
            .ok_or_else(|| RenderError::DeviceCreation("surface reports no formats".into()))?;

        let immediate_supported = physical_device
            .surface_present_modes(&surface, Default::default())
            .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?
            .into_iter()
            .any(|mode| mode == PresentMode::Immediate);
        let present_mode = if !vsync && immediate_supported {
            PresentMode::Immediate
        } else {
            PresentMode::Fifo
        };

        let (device, mut queues) = Device::new(
            physical_device,
            DeviceCreateInfo {
                queue_create_infos: vec![QueueCreateInfo {
                    queue_family_index,
                    ..Default::default()
                }],
                enabled_extensions: device_extensions,
                ..Default::default()
            },
        )
        .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?;
        let queue = queues
            .next()
            .ok_or_else(|| RenderError::DeviceCreation("device created without a queue".into()))?;

        let clear_pass = vulkano::single_pass_renderpass!(
            device.clone(),
            attachments: {
                color: {
                    format: color_format,
                    samples: 1,
                    load_op: Clear,
                    store_op: Store,
                },
                depth: {
                    format: DEPTH_FORMAT,
                    samples: 1,
                    load_op: Clear,
                    store_op: Store,
                },
            },
            pass: {
                color: [color],
                depth_stencil: {depth},
            },
        )
        .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?;

        let load_pass = vulkano::single_pass_renderpass!(
            device.clone(),
            attachments: {
                color: {
                    format: color_format,
                    samples: 1,
                    load_op: Load,
                    store_op: Store,
                },
                depth: {
                    format: DEPTH_FORMAT,
                    samples: 1,
                    load_op: Load,
                    store_op: Store,
                },
            },
            pass: {
                color: [color],
                depth_stencil: {depth},
            },
        )
        .map_err(|e| RenderError::DeviceCreation(format!("{e:?}")))?;

        debug!("swapchain format {color_format:?}, present mode {present_mode:?}");

        Ok(Self {
            memory_allocator: Arc::new(StandardMemoryAllocator::new_default(device.clone())),
            command_buffer_allocator: Arc::new(StandardCommandBufferAllocator::new(
                device.clone(),
                Default::default(),
            )),
            descriptor_set_allocator: Arc::new(StandardDescriptorSetAllocator::new(
                device.clone(),
                Default::default(),
            )),
            previous_frame_end: Some(sync::now(device.clone()).boxed()),
            device,
            queue,
            surface,
            color_format,
            present_mode,
            clear_pass,
            load_pass,
            next_id: 0,
            buffers: HashMap::new(),
            swapchains: HashMap::new(),
            attachments: HashMap::new(),
            framebuffers: HashMap::new(),
            pipelines: HashMap::new(),
            descriptor_sets: HashMap::new(),
            pools: HashSet::new(),
            builder: None,
            recorded: None,
            acquire_future: None,
            in_flight: None,
            device_lost: false,
        })
    }

    fn allocate_id(&mut self) -> Result<u64, RenderError> {
        if self.device_lost {
            return Err(RenderError::Backend("device already destroyed".into()));
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    /// Load the SPIR-V at `shader.path`, falling back to the built-in module
    /// of the same file name when the file does not exist.
    fn shader_module(&self, shader: &ShaderSource) -> Result<Arc<ShaderModule>, RenderError> {
        let path = &shader.path;
        if !path.exists() {
            let load = builtin_shader(path).ok_or_else(|| {
                RenderError::Shader(path.clone(), "file not found and no built-in shader".into())
            })?;
            debug!("using built-in shader for {}", path.display());
            return load(self.device.clone())
                .map_err(|e| RenderError::Shader(path.clone(), format!("{e:?}")));
        }

        let bytes =
            std::fs::read(path).map_err(|e| RenderError::Shader(path.clone(), e.to_string()))?;
        if bytes.len() % 4 != 0 {
            return Err(RenderError::Shader(path.clone(), "not a SPIR-V binary".into()));
        }
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        unsafe { ShaderModule::new(self.device.clone(), ShaderModuleCreateInfo::new(&words)) }
            .map_err(|e| RenderError::Shader(path.clone(), format!("{e:?}")))
    }

    fn render_pass(&self, index: u32) -> &Arc<RenderPass> {
        if index == 0 {
            &self.clear_pass
        } else {
            &self.load_pass
        }
    }

    fn builder(&mut self) -> Result<&mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>, RenderError> {
        self.builder.as_mut().ok_or(RenderError::InvalidFrameState {
            expected: "recording",
            found: "no open command buffer",
        })
    }

    fn pipeline(&self, id: PipelineId) -> Result<Arc<GraphicsPipeline>, RenderError> {
        self.pipelines
            .get(&id)
            .cloned()
            .ok_or(RenderError::UnknownResource {
                kind: PipelineId::KIND,
                id: id.0,
            })
    }

    fn unknown_buffer(id: BufferId) -> RenderError {
        RenderError::UnknownResource {
            kind: BufferId::KIND,
            id: id.0,
        }
    }

    /// Block until the last presented frame has finished on the GPU.
    fn wait_for_previous_frame(&mut self) -> Result<(), RenderError> {
        if let Some(previous) = self.previous_frame_end.take() {
            previous
                .then_signal_fence_and_flush()
                .map_err(backend_err("failed to flush previous frame"))?
                .wait(None)
                .map_err(backend_err("failed to wait for previous frame"))?;
        }
        self.previous_frame_end = Some(sync::now(self.device.clone()).boxed());
        Ok(())
    }
}

fn vertex_description(layout: &VertexLayout) -> VertexBufferDescription {
    VertexBufferDescription {
        stride: layout.stride,
        input_rate: VertexInputRate::Vertex,
        members: layout
            .attributes
            .iter()
            .map(|attribute| {
                let format = match attribute.format {
                    AttributeFormat::Float2 => Format::R32G32_SFLOAT,
                    AttributeFormat::Float3 => Format::R32G32B32_SFLOAT,
                    AttributeFormat::Float4 => Format::R32G32B32A32_SFLOAT,
                };
                (
                    attribute.name.to_string(),
                    VertexMemberInfo {
                        offset: attribute.offset,
                        format,
                        num_elements: 1,
                        stride: layout.stride,
                    },
                )
            })
            .collect(),
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId, RenderError> {
        if data.is_empty() {
            return Err(RenderError::Allocation("zero-sized buffer".into()));
        }
        let id = BufferId(self.allocate_id()?);
        let usage_flags = match usage {
            BufferUsage::Vertex => VkBufferUsage::VERTEX_BUFFER,
            BufferUsage::Index => VkBufferUsage::INDEX_BUFFER,
            BufferUsage::Uniform => VkBufferUsage::UNIFORM_BUFFER,
        };
        let create_info = BufferCreateInfo {
            usage: usage_flags,
            ..Default::default()
        };
        let allocation_info = AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
            ..Default::default()
        };

        let buffer = match usage {
            BufferUsage::Index => {
                let indices: Vec<u32> = bytemuck::pod_collect_to_vec(data);
                GpuBuffer::Indices(
                    Buffer::from_iter(
                        self.memory_allocator.clone(),
                        create_info,
                        allocation_info,
                        indices,
                    )
                    .map_err(allocation_err)?,
                )
            }
            _ => GpuBuffer::Bytes(
                Buffer::from_iter(
                    self.memory_allocator.clone(),
                    create_info,
                    allocation_info,
                    data.iter().copied(),
                )
                .map_err(allocation_err)?,
            ),
        };
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError> {
        let bytes = match self.buffers.get(&buffer) {
            Some(GpuBuffer::Bytes(bytes)) => bytes.clone(),
            Some(GpuBuffer::Indices(indices)) => indices.clone().into_bytes(),
            None => return Err(Self::unknown_buffer(buffer)),
        };
        if data.len() as u64 > bytes.len() {
            return Err(RenderError::Allocation(format!(
                "{} byte write into {} byte {buffer:?}",
                data.len(),
                bytes.len()
            )));
        }

        // The GPU may still be reading the buffer for the previous frame.
        let mut guard = match bytes.write() {
            Ok(guard) => guard,
            Err(_) => {
                self.wait_for_previous_frame()?;
                bytes.write().map_err(allocation_err)?
            }
        };
        guard[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_swapchain(&mut self, extent: [u32; 2]) -> Result<SwapchainInfo, RenderError> {
        let id = SwapchainId(self.allocate_id()?);
        let capabilities = self
            .device
            .physical_device()
            .surface_capabilities(&self.surface, Default::default())
            .map_err(backend_err("failed to query surface"))?;
        let image_extent = capabilities.current_extent.unwrap_or(extent);
        let min_image_count = (capabilities.min_image_count + 1)
            .min(capabilities.max_image_count.unwrap_or(u32::MAX));
        let composite_alpha = capabilities
            .supported_composite_alpha
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::Backend("surface supports no composite alpha".into()))?;

        let (swapchain, images) = Swapchain::new(
            self.device.clone(),
            self.surface.clone(),
            SwapchainCreateInfo {
                min_image_count,
                image_format: self.color_format,
                image_extent,
                image_usage: ImageUsage::COLOR_ATTACHMENT,
                composite_alpha,
                present_mode: self.present_mode,
                ..Default::default()
            },
        )
        .map_err(backend_err("failed to create swapchain"))?;

        let info = SwapchainInfo {
            id,
            extent: image_extent,
            image_count: images.len() as u32,
        };
        self.swapchains.insert(id, (swapchain, images));
        Ok(info)
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) {
        self.swapchains.remove(&swapchain);
    }

    fn create_depth_attachment(&mut self, extent: [u32; 2]) -> Result<AttachmentId, RenderError> {
        let id = AttachmentId(self.allocate_id()?);
        let image = Image::new(
            self.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: DEPTH_FORMAT,
                extent: [extent[0], extent[1], 1],
                usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            AllocationCreateInfo::default(),
        )
        .map_err(allocation_err)?;
        let view = ImageView::new_default(image).map_err(allocation_err)?;
        self.attachments.insert(id, view);
        Ok(id)
    }

    fn destroy_attachment(&mut self, attachment: AttachmentId) {
        self.attachments.remove(&attachment);
    }

    fn create_framebuffer(
        &mut self,
        render_pass: u32,
        swapchain: SwapchainId,
        image: u32,
        depth: AttachmentId,
    ) -> Result<FramebufferId, RenderError> {
        let image = self
            .swapchains
            .get(&swapchain)
            .ok_or(RenderError::UnknownResource {
                kind: SwapchainId::KIND,
                id: swapchain.0,
            })?
            .1
            .get(image as usize)
            .cloned()
            .ok_or_else(|| RenderError::Backend(format!("swapchain has no image {image}")))?;
        let depth = self
            .attachments
            .get(&depth)
            .cloned()
            .ok_or(RenderError::UnknownResource {
                kind: AttachmentId::KIND,
                id: depth.0,
            })?;
        let color = ImageView::new_default(image).map_err(allocation_err)?;

        let framebuffer = Framebuffer::new(
            self.render_pass(render_pass).clone(),
            FramebufferCreateInfo {
                attachments: vec![color, depth],
                ..Default::default()
            },
        )
        .map_err(backend_err("failed to create framebuffer"))?;

        let id = FramebufferId(self.allocate_id()?);
        self.framebuffers.insert(id, framebuffer);
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, RenderError> {
        let name = desc.name.as_str();
        if desc.stage.subpass != 0 {
            return Err(pipeline_err(name, "only subpass 0 is supported"));
        }

        let mut stages = Vec::with_capacity(desc.shaders.len());
        let mut vertex_entry = None;
        for shader in &desc.shaders {
            let module = self.shader_module(shader)?;
            let entry = module.entry_point("main").ok_or_else(|| {
                RenderError::Shader(shader.path.clone(), "no `main` entry point".into())
            })?;
            if shader.stage == ShaderStage::Vertex {
                vertex_entry = Some(entry.clone());
            }
            stages.push(PipelineShaderStageCreateInfo::new(entry));
        }
        let vertex_entry = vertex_entry.ok_or_else(|| pipeline_err(name, "no vertex shader"))?;

        let vertex_input_state = vertex_description(&desc.vertex)
            .definition(&vertex_entry)
            .map_err(|e| pipeline_err(name, e))?;
        let layout = PipelineLayout::new(
            self.device.clone(),
            PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages)
                .into_pipeline_layout_create_info(self.device.clone())
                .map_err(|e| pipeline_err(name, e))?,
        )
        .map_err(|e| pipeline_err(name, e))?;
        for binding in &desc.bindings {
            let declared = layout
                .set_layouts()
                .get(binding.set as usize)
                .is_some_and(|set| set.bindings().contains_key(&binding.binding));
            if !declared {
                warn!(
                    "pipeline '{name}': shaders do not declare set {} binding {}",
                    binding.set, binding.binding
                );
            }
        }

        let subpass = Subpass::from(self.render_pass(desc.stage.render_pass).clone(), 0)
            .ok_or_else(|| pipeline_err(name, "render pass has no subpass 0"))?;
        let depth_stencil_state = if desc.depth_test {
            DepthStencilState {
                depth: Some(DepthState::simple()),
                ..Default::default()
            }
        } else {
            DepthStencilState::default()
        };

        let pipeline = GraphicsPipeline::new(
            self.device.clone(),
            None,
            GraphicsPipelineCreateInfo {
                stages: stages.into_iter().collect(),
                vertex_input_state: Some(vertex_input_state),
                input_assembly_state: Some(InputAssemblyState::default()),
                viewport_state: Some(ViewportState::default()),
                rasterization_state: Some(RasterizationState::default()),
                depth_stencil_state: Some(depth_stencil_state),
                multisample_state: Some(MultisampleState::default()),
                color_blend_state: Some(ColorBlendState::with_attachment_states(
                    subpass.num_color_attachments(),
                    ColorBlendAttachmentState::default(),
                )),
                dynamic_state: [DynamicState::Viewport].into_iter().collect(),
                subpass: Some(subpass.into()),
                ..GraphicsPipelineCreateInfo::layout(layout)
            },
        )
        .map_err(|e| pipeline_err(name, e))?;

        let id = PipelineId(self.allocate_id()?);
        self.pipelines.insert(id, pipeline);
        debug!("created pipeline '{name}' as {id:?}");
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline);
    }

    fn create_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        set: u32,
        uniforms: &[(u32, BufferId)],
    ) -> Result<DescriptorSetId, RenderError> {
        let pipeline = self.pipeline(pipeline)?;
        let layout = pipeline
            .layout()
            .set_layouts()
            .get(set as usize)
            .cloned()
            .ok_or_else(|| RenderError::Backend(format!("pipeline has no descriptor set {set}")))?;

        let mut writes = Vec::with_capacity(uniforms.len());
        for &(binding, buffer) in uniforms {
            let bytes = match self.buffers.get(&buffer) {
                Some(GpuBuffer::Bytes(bytes)) => bytes.clone(),
                Some(GpuBuffer::Indices(indices)) => indices.clone().into_bytes(),
                None => return Err(Self::unknown_buffer(buffer)),
            };
            writes.push(WriteDescriptorSet::buffer(binding, bytes));
        }

        let descriptor_set = DescriptorSet::new(
            self.descriptor_set_allocator.clone(),
            layout,
            writes,
            [],
        )
        .map_err(allocation_err)?;
        let id = DescriptorSetId(self.allocate_id()?);
        self.descriptor_sets.insert(id, descriptor_set);
        Ok(id)
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetId) {
        self.descriptor_sets.remove(&set);
    }

    /// vulkano's command buffer allocator already keeps a pool per thread, so
    /// a pool here is only a token the frame manager hands back.
    fn create_command_pool(&mut self, thread: ThreadId) -> Result<CommandPoolId, RenderError> {
        let id = CommandPoolId(self.allocate_id()?);
        self.pools.insert(id);
        debug!("command pool {id:?} for {thread:?}");
        Ok(id)
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolId) {
        self.pools.remove(&pool);
    }

    fn begin_commands(&mut self, pool: CommandPoolId) -> Result<(), RenderError> {
        if !self.pools.contains(&pool) {
            return Err(RenderError::UnknownResource {
                kind: CommandPoolId::KIND,
                id: pool.0,
            });
        }
        if let Some(previous) = self.previous_frame_end.as_mut() {
            previous.cleanup_finished();
        }
        let builder = AutoCommandBufferBuilder::primary(
            self.command_buffer_allocator.clone(),
            self.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .map_err(allocation_err)?;
        self.builder = Some(builder);
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        framebuffer: FramebufferId,
        clear: Option<[f32; 4]>,
    ) -> Result<(), RenderError> {
        let framebuffer = self
            .framebuffers
            .get(&framebuffer)
            .cloned()
            .ok_or(RenderError::UnknownResource {
                kind: FramebufferId::KIND,
                id: framebuffer.0,
            })?;
        let [width, height] = framebuffer.extent();
        let clear_values = match clear {
            Some(color) => vec![Some(color.into()), Some(1.0f32.into())],
            None => vec![None, None],
        };

        let builder = self.builder()?;
        builder
            .begin_render_pass(
                RenderPassBeginInfo {
                    clear_values,
                    ..RenderPassBeginInfo::framebuffer(framebuffer)
                },
                SubpassBeginInfo {
                    contents: SubpassContents::Inline,
                    ..Default::default()
                },
            )
            .map_err(backend_err("failed to begin render pass"))?;
        builder
            .set_viewport(
                0,
                [Viewport {
                    offset: [0.0, 0.0],
                    extent: [width as f32, height as f32],
                    depth_range: 0.0..=1.0,
                }]
                .into_iter()
                .collect(),
            )
            .map_err(backend_err("failed to set viewport"))?;
        Ok(())
    }

    fn next_subpass(&mut self) -> Result<(), RenderError> {
        Err(RenderError::Backend(
            "render passes have a single subpass".into(),
        ))
    }

    fn end_render_pass(&mut self) -> Result<(), RenderError> {
        self.builder()?
            .end_render_pass(SubpassEndInfo::default())
            .map_err(backend_err("failed to end render pass"))?;
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineId) -> Result<(), RenderError> {
        let pipeline = self.pipeline(pipeline)?;
        self.builder()?
            .bind_pipeline_graphics(pipeline)
            .map_err(backend_err("failed to bind pipeline"))?;
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline: PipelineId,
        set: u32,
        descriptor_set: DescriptorSetId,
    ) -> Result<(), RenderError> {
        let layout = self.pipeline(pipeline)?.layout().clone();
        let descriptor_set = self
            .descriptor_sets
            .get(&descriptor_set)
            .cloned()
            .ok_or(RenderError::UnknownResource {
                kind: DescriptorSetId::KIND,
                id: descriptor_set.0,
            })?;
        self.builder()?
            .bind_descriptor_sets(PipelineBindPoint::Graphics, layout, set, descriptor_set)
            .map_err(backend_err("failed to bind descriptor set"))?;
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError> {
        let bytes = match self.buffers.get(&buffer) {
            Some(GpuBuffer::Bytes(bytes)) => bytes.clone(),
            _ => return Err(Self::unknown_buffer(buffer)),
        };
        self.builder()?
            .bind_vertex_buffers(0, bytes)
            .map_err(backend_err("failed to bind vertex buffer"))?;
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) -> Result<(), RenderError> {
        let indices = match self.buffers.get(&buffer) {
            Some(GpuBuffer::Indices(indices)) => indices.clone(),
            _ => return Err(Self::unknown_buffer(buffer)),
        };
        self.builder()?
            .bind_index_buffer(indices)
            .map_err(backend_err("failed to bind index buffer"))?;
        Ok(())
    }

    fn push_constants(&mut self, pipeline: PipelineId, data: &[u8]) -> Result<(), RenderError> {
        if data.len() % 4 != 0 {
            return Err(RenderError::Backend(format!(
                "push constant data of {} bytes is not word aligned",
                data.len()
            )));
        }
        let layout = self.pipeline(pipeline)?.layout().clone();
        let builder = self.builder()?;
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            builder
                .push_constants(layout.clone(), (i * 4) as u32, word)
                .map_err(backend_err("failed to push constants"))?;
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32) -> Result<(), RenderError> {
        let builder = self.builder()?;
        unsafe { builder.draw_indexed(index_count, 1, 0, 0, 0) }
            .map_err(backend_err("failed to record draw"))?;
        Ok(())
    }

    fn end_commands(&mut self) -> Result<(), RenderError> {
        let builder = self.builder.take().ok_or(RenderError::InvalidFrameState {
            expected: "recording",
            found: "no open command buffer",
        })?;
        self.recorded = Some(builder.build().map_err(backend_err("failed to build command buffer"))?);
        Ok(())
    }

    fn acquire_next_image(&mut self, swapchain: SwapchainId) -> Result<Acquire, RenderError> {
        let swapchain = self
            .swapchains
            .get(&swapchain)
            .map(|(swapchain, _)| swapchain.clone())
            .ok_or(RenderError::UnknownResource {
                kind: SwapchainId::KIND,
                id: swapchain.0,
            })?;
        if let Some(previous) = self.previous_frame_end.as_mut() {
            previous.cleanup_finished();
        }

        match swapchain::acquire_next_image(swapchain, None).map_err(Validated::unwrap) {
            Ok((index, suboptimal, future)) => {
                self.acquire_future = Some(future);
                Ok(Acquire::Image { index, suboptimal })
            }
            Err(VulkanError::OutOfDate) => Ok(Acquire::OutOfDate),
            Err(e) => Err(RenderError::Backend(format!(
                "failed to acquire next image: {e}"
            ))),
        }
    }

    fn submit(&mut self) -> Result<(), RenderError> {
        let command_buffer = self
            .recorded
            .take()
            .ok_or_else(|| RenderError::Submit("no recorded command buffer".into()))?;
        let acquire = self
            .acquire_future
            .take()
            .ok_or_else(|| RenderError::Submit("no acquired image".into()))?;
        let previous = self
            .previous_frame_end
            .take()
            .unwrap_or_else(|| sync::now(self.device.clone()).boxed());

        let future = previous
            .join(acquire)
            .then_execute(self.queue.clone(), command_buffer)
            .map_err(|e| RenderError::Submit(format!("{e:?}")))?;
        self.in_flight = Some(future.boxed());
        Ok(())
    }

    fn present(&mut self, swapchain: SwapchainId, image: u32) -> Result<PresentStatus, RenderError> {
        let swapchain = self
            .swapchains
            .get(&swapchain)
            .map(|(swapchain, _)| swapchain.clone())
            .ok_or(RenderError::UnknownResource {
                kind: SwapchainId::KIND,
                id: swapchain.0,
            })?;
        let in_flight = self
            .in_flight
            .take()
            .ok_or_else(|| RenderError::Submit("nothing submitted".into()))?;

        let result = in_flight
            .then_swapchain_present(
                self.queue.clone(),
                SwapchainPresentInfo::swapchain_image_index(swapchain, image),
            )
            .then_signal_fence_and_flush()
            .map_err(Validated::unwrap);

        match result {
            Ok(future) => {
                self.previous_frame_end = Some(future.boxed());
                Ok(PresentStatus::Ok)
            }
            Err(VulkanError::OutOfDate) => {
                self.previous_frame_end = Some(sync::now(self.device.clone()).boxed());
                Ok(PresentStatus::OutOfDate)
            }
            Err(e) => {
                self.previous_frame_end = Some(sync::now(self.device.clone()).boxed());
                Err(RenderError::Submit(format!("failed to flush frame: {e}")))
            }
        }
    }

    fn wait_idle(&mut self) -> Result<(), RenderError> {
        if self.device_lost {
            return Ok(());
        }
        unsafe { self.device.wait_idle() }.map_err(backend_err("failed to wait for device"))?;
        if let Some(previous) = self.previous_frame_end.as_mut() {
            previous.cleanup_finished();
        }
        Ok(())
    }

    fn destroy_device(&mut self) {
        if self.device_lost {
            return;
        }
        if let Err(e) = self.wait_idle() {
            warn!("{e}");
        }
        let leaked = self.buffers.len()
            + self.swapchains.len()
            + self.attachments.len()
            + self.framebuffers.len()
            + self.pipelines.len()
            + self.descriptor_sets.len()
            + self.pools.len();
        if leaked > 0 {
            warn!("{leaked} GPU resources still alive at device teardown");
        }
        self.builder = None;
        self.recorded = None;
        self.acquire_future = None;
        self.in_flight = None;
        self.previous_frame_end = None;
        self.descriptor_sets.clear();
        self.pipelines.clear();
        self.framebuffers.clear();
        self.attachments.clear();
        self.swapchains.clear();
        self.buffers.clear();
        self.pools.clear();
        self.device_lost = true;
        info!("vulkan device released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::shader_pair;

    #[test]
    fn builtin_pipelines_have_compiled_shaders() {
        let dir = Path::new("/nonexistent/shaders");
        for name in ["sky", "forward"] {
            for shader in shader_pair(dir, name) {
                assert!(
                    builtin_shader(&shader.path).is_some(),
                    "no built-in module for {}",
                    shader.path.display()
                );
            }
        }
        assert!(builtin_shader(Path::new("bloom.frag.spv")).is_none());
    }
}
