//! The Vulkan implementation of the device seam
//!
//! Owns the context, swapchain, per-frame synchronization, and all
//! GPU resource tables. Handles crossing the seam are plain ids into
//! those tables.
//!
//! The device is constructed on the thread that owns the window
//! (surface creation requires it) and may then be moved to the render
//! thread before the first frame.

use std::collections::HashMap;

use ash::vk;

use crate::assets::ImageData;
use crate::render::device::{
    DescriptorLayoutHandle, DescriptorPoolHandle, DescriptorSetHandle, DeviceError, DeviceResult,
    GraphicsDevice, MeshHandle, PipelineDesc, PipelineHandle, PipelineLayoutHandle,
    PushConstantRange, ShaderModuleHandle, ShaderStages, TextureHandle, UniformBufferHandle,
};
use crate::render::mesh::MeshData;
use crate::render::vulkan::buffer::{IndexBuffer, MappedUniformBuffer, VertexBuffer};
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::framebuffer::{DepthBuffer, Framebuffer};
use crate::render::vulkan::pipeline::{push_constant_ranges, stage_flags, PipelinePair};
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::{FrameSync, Semaphore};
use crate::render::vulkan::texture::TextureImage;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Capacity of the shared combined-image-sampler pool; bounds the
/// number of live textures
const MAX_TEXTURES: u32 = 64;

struct VulkanMesh {
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
}

#[derive(Clone, Copy)]
struct BoundPipeline {
    id: u64,
    wireframe: bool,
}

/// Explicit Vulkan device
pub struct VulkanDevice {
    // Resource tables; dropped before the context below
    meshes: HashMap<u64, VulkanMesh>,
    textures: HashMap<u64, TextureImage>,
    shader_modules: HashMap<u64, ShaderModule>,
    set_layouts: HashMap<u64, vk::DescriptorSetLayout>,
    descriptor_pools: HashMap<u64, vk::DescriptorPool>,
    descriptor_sets: HashMap<u64, vk::DescriptorSet>,
    uniform_buffers: HashMap<u64, MappedUniformBuffer>,
    pipeline_layouts: HashMap<u64, vk::PipelineLayout>,
    pipelines: HashMap<u64, PipelinePair>,
    next_id: u64,

    texture_set_layout: vk::DescriptorSetLayout,
    texture_pool: vk::DescriptorPool,

    frames: Vec<FrameSync>,
    // Keyed by swapchain image, not frame slot: the in-flight fence
    // does not cover presentation, so a per-frame semaphore could be
    // re-signaled while a previous present still waits on it
    render_finished: Vec<Semaphore>,
    command_buffers: Vec<vk::CommandBuffer>,
    submitted: Vec<bool>,
    current_frame: usize,
    max_frames: usize,

    image_index: u32,
    recording: bool,
    bound: Option<BoundPipeline>,
    window_extent: vk::Extent2D,
    needs_recreate: bool,
    wireframe_warned: bool,

    framebuffers: Vec<Framebuffer>,
    depth_buffer: DepthBuffer,
    render_pass: RenderPass,
    swapchain: Swapchain,
    context: VulkanContext,
}

impl VulkanDevice {
    /// Create the device over a GLFW window configured with
    /// `ClientApiHint::NoApi`
    pub fn new(
        glfw: &glfw::Glfw,
        window: &mut glfw::PWindow,
        app_name: &str,
        max_frames: usize,
    ) -> VulkanResult<Self> {
        let context = VulkanContext::new(glfw, window, app_name)?;
        let device = context.device().clone();

        let (width, height) = window.get_framebuffer_size();
        let window_extent = vk::Extent2D {
            width: width as u32,
            height: height as u32,
        };

        let swapchain = Swapchain::new(&context, window_extent, vk::SwapchainKHR::null())?;
        let render_pass = RenderPass::new_forward_pass(device.clone(), swapchain.format().format)?;
        let depth_buffer = DepthBuffer::new(
            device.clone(),
            context.instance(),
            context.physical().device,
            swapchain.extent(),
        )?;
        let framebuffers = Self::create_framebuffers(
            &device,
            &swapchain,
            &render_pass,
            &depth_buffer,
        )?;

        let frames: VulkanResult<Vec<FrameSync>> = (0..max_frames)
            .map(|_| FrameSync::new(device.clone()))
            .collect();
        let frames = frames?;
        let render_finished = Self::create_render_finished(&device, &swapchain)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(max_frames as u32);
        let command_buffers = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        // Shared set layout and pool for per-texture samplers (set 1)
        let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build();
        let bindings = [sampler_binding];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let texture_set_layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_TEXTURES,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(MAX_TEXTURES);
        let texture_pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        if !context.physical().fill_mode_non_solid {
            log::warn!("GPU lacks fillModeNonSolid; wireframe draws fall back to filled");
        }
        if context.extended_dynamic_state().is_none() {
            log::warn!(
                "VK_EXT_extended_dynamic_state unavailable; depth write toggling is disabled"
            );
        }

        Ok(Self {
            meshes: HashMap::new(),
            textures: HashMap::new(),
            shader_modules: HashMap::new(),
            set_layouts: HashMap::new(),
            descriptor_pools: HashMap::new(),
            descriptor_sets: HashMap::new(),
            uniform_buffers: HashMap::new(),
            pipeline_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            texture_set_layout,
            texture_pool,
            frames,
            render_finished,
            command_buffers,
            submitted: vec![false; max_frames],
            current_frame: 0,
            max_frames,
            image_index: 0,
            recording: false,
            bound: None,
            window_extent,
            needs_recreate: false,
            wireframe_warned: false,
            framebuffers,
            depth_buffer,
            render_pass,
            swapchain,
            context,
        })
    }

    fn create_framebuffers(
        device: &ash::Device,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
        depth_buffer: &DepthBuffer,
    ) -> VulkanResult<Vec<Framebuffer>> {
        swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass.handle(),
                    &[view, depth_buffer.image_view()],
                    swapchain.extent(),
                )
            })
            .collect()
    }

    fn create_render_finished(
        device: &ash::Device,
        swapchain: &Swapchain,
    ) -> VulkanResult<Vec<Semaphore>> {
        swapchain
            .image_views()
            .iter()
            .map(|_| Semaphore::new(device.clone()))
            .collect()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        unsafe {
            self.context
                .device()
                .device_wait_idle()
                .map_err(VulkanError::Api)?;
        }

        // Framebuffers reference the old image views; drop them first
        self.framebuffers.clear();

        let new_swapchain =
            Swapchain::new(&self.context, self.window_extent, self.swapchain.handle())?;
        self.swapchain = new_swapchain;

        self.depth_buffer = DepthBuffer::new(
            self.context.device().clone(),
            self.context.instance(),
            self.context.physical().device,
            self.swapchain.extent(),
        )?;
        self.framebuffers = Self::create_framebuffers(
            self.context.device(),
            &self.swapchain,
            &self.render_pass,
            &self.depth_buffer,
        )?;
        // Image count may change with the extent
        self.render_finished =
            Self::create_render_finished(self.context.device(), &self.swapchain)?;

        self.needs_recreate = false;
        log::debug!("swapchain recreated at {:?}", self.swapchain.extent());
        Ok(())
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffers[self.current_frame]
    }
}

impl GraphicsDevice for VulkanDevice {
    fn backend_name(&self) -> &'static str {
        "vulkan"
    }

    fn max_frames_in_flight(&self) -> usize {
        self.max_frames
    }

    fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> DeviceResult<()> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Err(DeviceError::SwapchainOutOfDate);
        }
        if self.needs_recreate {
            self.recreate_swapchain()?;
        }

        let frame = &self.frames[self.current_frame];
        if self.submitted[self.current_frame] {
            frame.in_flight.wait(u64::MAX)?;
        }

        let acquire = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                frame.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let (image_index, _suboptimal) = match acquire {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
                return Err(DeviceError::SwapchainOutOfDate);
            }
            Err(e) => return Err(VulkanError::Api(e).into()),
        };
        self.image_index = image_index;

        // Only reset once we know this frame will submit
        if self.submitted[self.current_frame] {
            self.frames[self.current_frame].in_flight.reset()?;
            self.submitted[self.current_frame] = false;
        }

        let device = self.context.device();
        let cmd = self.command_buffer();

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[image_index as usize].handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent(),
            })
            .clear_values(&clear_values);

        let extent = self.swapchain.extent();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
        if let Some(ext) = self.context.extended_dynamic_state() {
            unsafe { ext.cmd_set_depth_write_enable(cmd, true) };
        }

        self.recording = true;
        self.bound = None;
        Ok(())
    }

    fn end_frame(&mut self) -> DeviceResult<()> {
        if !self.recording {
            return Err(DeviceError::Api("end_frame without begin_frame".to_string()));
        }
        self.recording = false;

        let device = self.context.device();
        let cmd = self.command_buffer();
        unsafe {
            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .map_err(VulkanError::Api)?;
        }

        let frame = &self.frames[self.current_frame];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [self.render_finished[self.image_index as usize].handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info.build()],
                    frame.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }
        self.submitted[self.current_frame] = true;

        let swapchains = [self.swapchain.handle()];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.context.present_queue(), &present_info)
        };
        match present {
            Ok(suboptimal) => {
                if suboptimal {
                    self.needs_recreate = true;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_recreate = true;
            }
            Err(e) => return Err(VulkanError::Api(e).into()),
        }

        self.current_frame = (self.current_frame + 1) % self.max_frames;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent.width != self.swapchain.extent().width
            || extent.height != self.swapchain.extent().height
        {
            self.needs_recreate = true;
        }
        self.window_extent = extent;
    }

    fn wait_idle(&mut self) {
        if let Err(e) = unsafe { self.context.device().device_wait_idle() } {
            log::error!("device_wait_idle failed: {e:?}");
        }
    }

    fn create_shader_module(&mut self, code: &[u8]) -> DeviceResult<ShaderModuleHandle> {
        let module = ShaderModule::new(self.context.device().clone(), code)?;
        let id = self.alloc_id();
        self.shader_modules.insert(id, module);
        Ok(ShaderModuleHandle(id))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) {
        self.shader_modules.remove(&module.0);
    }

    fn create_mesh(&mut self, data: &MeshData) -> DeviceResult<MeshHandle> {
        let device = self.context.device().clone();
        let vertex_buffer = VertexBuffer::new(
            device.clone(),
            self.context.instance(),
            self.context.physical().device,
            &data.vertices,
        )?;
        let index_buffer = IndexBuffer::new(
            device,
            self.context.instance(),
            self.context.physical().device,
            &data.indices,
        )?;
        let id = self.alloc_id();
        self.meshes.insert(
            id,
            VulkanMesh {
                vertex_buffer,
                index_buffer,
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn create_texture_2d(&mut self, image: &ImageData) -> DeviceResult<TextureHandle> {
        let descriptor_set = self.allocate_texture_set()?;
        let texture = TextureImage::new_2d(&self.context, image, descriptor_set)?;
        let id = self.alloc_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn create_texture_cube(&mut self, faces: &[ImageData; 6]) -> DeviceResult<TextureHandle> {
        let descriptor_set = self.allocate_texture_set()?;
        let texture = TextureImage::new_cube(&self.context, faces, descriptor_set)?;
        let id = self.alloc_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = self.textures.remove(&texture.0) {
            unsafe {
                if let Err(e) = self
                    .context
                    .device()
                    .free_descriptor_sets(self.texture_pool, &[texture.descriptor_set()])
                {
                    log::error!("freeing texture descriptor set failed: {e:?}");
                }
            }
        }
    }

    fn create_descriptor_set_layout(&mut self) -> DeviceResult<DescriptorLayoutHandle> {
        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build();
        let bindings = [binding];
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe {
            self.context
                .device()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let id = self.alloc_id();
        self.set_layouts.insert(id, layout);
        Ok(DescriptorLayoutHandle(id))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorLayoutHandle) {
        if let Some(layout) = self.set_layouts.remove(&layout.0) {
            unsafe {
                self.context
                    .device()
                    .destroy_descriptor_set_layout(layout, None);
            }
        }
    }

    fn create_descriptor_pool(&mut self, max_sets: u32) -> DeviceResult<DescriptorPoolHandle> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets,
        }];
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);
        let pool = unsafe {
            self.context
                .device()
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let id = self.alloc_id();
        self.descriptor_pools.insert(id, pool);
        Ok(DescriptorPoolHandle(id))
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if let Some(pool) = self.descriptor_pools.remove(&pool.0) {
            unsafe {
                self.context.device().destroy_descriptor_pool(pool, None);
            }
        }
    }

    fn create_uniform_buffer(&mut self, size: u64) -> DeviceResult<UniformBufferHandle> {
        let buffer = MappedUniformBuffer::new(
            self.context.device().clone(),
            self.context.instance(),
            self.context.physical().device,
            size,
        )?;
        let id = self.alloc_id();
        self.uniform_buffers.insert(id, buffer);
        Ok(UniformBufferHandle(id))
    }

    fn destroy_uniform_buffer(&mut self, buffer: UniformBufferHandle) {
        self.uniform_buffers.remove(&buffer.0);
    }

    fn write_uniform_bytes(&mut self, buffer: UniformBufferHandle, offset: u64, data: &[u8]) {
        match self.uniform_buffers.get_mut(&buffer.0) {
            Some(buffer) => buffer.write_bytes(offset, data),
            None => log::error!("uniform write to unknown buffer {}", buffer.0),
        }
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorLayoutHandle,
        buffers: &[UniformBufferHandle],
        range: u64,
    ) -> DeviceResult<Vec<DescriptorSetHandle>> {
        let vk_pool = *self
            .descriptor_pools
            .get(&pool.0)
            .ok_or(VulkanError::UnknownHandle(pool.0))?;
        let vk_layout = *self
            .set_layouts
            .get(&layout.0)
            .ok_or(VulkanError::UnknownHandle(layout.0))?;

        let layouts = vec![vk_layout; buffers.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(vk_pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.context
                .device()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        for (set, buffer) in sets.iter().zip(buffers) {
            let vk_buffer = self
                .uniform_buffers
                .get(&buffer.0)
                .ok_or(VulkanError::UnknownHandle(buffer.0))?;
            let buffer_info = vk::DescriptorBufferInfo::builder()
                .buffer(vk_buffer.handle())
                .offset(0)
                .range(range)
                .build();
            let buffer_infos = [buffer_info];
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos)
                .build();
            unsafe {
                self.context.device().update_descriptor_sets(&[write], &[]);
            }
        }

        Ok(sets
            .into_iter()
            .map(|set| {
                let id = self.alloc_id();
                self.descriptor_sets.insert(id, set);
                DescriptorSetHandle(id)
            })
            .collect())
    }

    fn create_pipeline_layout(
        &mut self,
        set_layout: DescriptorLayoutHandle,
        ranges: &[PushConstantRange],
    ) -> DeviceResult<PipelineLayoutHandle> {
        let vk_set_layout = *self
            .set_layouts
            .get(&set_layout.0)
            .ok_or(VulkanError::UnknownHandle(set_layout.0))?;

        // Set 0: per-frame uniforms; set 1: the texture sampler
        let layouts = [vk_set_layout, self.texture_set_layout];
        let vk_ranges = push_constant_ranges(ranges);
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&layouts)
            .push_constant_ranges(&vk_ranges);
        let layout = unsafe {
            self.context
                .device()
                .create_pipeline_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let id = self.alloc_id();
        self.pipeline_layouts.insert(id, layout);
        Ok(PipelineLayoutHandle(id))
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) {
        if let Some(layout) = self.pipeline_layouts.remove(&layout.0) {
            unsafe {
                self.context.device().destroy_pipeline_layout(layout, None);
            }
        }
    }

    fn create_graphics_pipeline(
        &mut self,
        layout: PipelineLayoutHandle,
        desc: &PipelineDesc,
    ) -> DeviceResult<PipelineHandle> {
        let vk_layout = *self
            .pipeline_layouts
            .get(&layout.0)
            .ok_or(VulkanError::UnknownHandle(layout.0))?;
        let vert_module = self
            .shader_modules
            .get(&desc.vert_shader.0)
            .ok_or(VulkanError::UnknownHandle(desc.vert_shader.0))?
            .handle();
        let frag_module = self
            .shader_modules
            .get(&desc.frag_shader.0)
            .ok_or(VulkanError::UnknownHandle(desc.frag_shader.0))?
            .handle();

        let pair = PipelinePair::new(
            self.context.device().clone(),
            self.render_pass.handle(),
            vk_layout,
            vert_module,
            frag_module,
            desc,
            self.context.physical().fill_mode_non_solid,
            self.context.extended_dynamic_state().is_some(),
        )?;
        let id = self.alloc_id();
        self.pipelines.insert(id, pair);
        Ok(PipelineHandle(id))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines.remove(&pipeline.0);
    }

    fn bind_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        layout: PipelineLayoutHandle,
        descriptor_set: DescriptorSetHandle,
    ) {
        let (Some(pair), Some(&vk_layout), Some(&vk_set)) = (
            self.pipelines.get(&pipeline.0),
            self.pipeline_layouts.get(&layout.0),
            self.descriptor_sets.get(&descriptor_set.0),
        ) else {
            log::error!("bind_pipeline with unknown handle");
            return;
        };

        let cmd = self.command_buffer();
        unsafe {
            self.context
                .device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pair.fill);
            self.context.device().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                vk_layout,
                0,
                &[vk_set],
                &[],
            );
        }
        self.bound = Some(BoundPipeline {
            id: pipeline.0,
            wireframe: false,
        });
    }

    fn bind_texture(&mut self, layout: PipelineLayoutHandle, texture: TextureHandle) {
        let (Some(&vk_layout), Some(texture)) = (
            self.pipeline_layouts.get(&layout.0),
            self.textures.get(&texture.0),
        ) else {
            log::error!("bind_texture with unknown handle");
            return;
        };

        let cmd = self.command_buffer();
        unsafe {
            self.context.device().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                vk_layout,
                1,
                &[texture.descriptor_set()],
                &[],
            );
        }
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        let Some(&vk_layout) = self.pipeline_layouts.get(&layout.0) else {
            log::error!("push_constants with unknown layout");
            return;
        };
        let cmd = self.command_buffer();
        unsafe {
            self.context
                .device()
                .cmd_push_constants(cmd, vk_layout, stage_flags(stages), offset, data);
        }
    }

    fn set_depth_write(&mut self, enabled: bool) {
        let Some(ext) = self.context.extended_dynamic_state() else {
            return;
        };
        if self.recording {
            unsafe { ext.cmd_set_depth_write_enable(self.command_buffer(), enabled) };
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, wireframe: bool) {
        let Some(vk_mesh) = self.meshes.get(&mesh.0) else {
            log::error!("draw_mesh with unknown mesh {}", mesh.0);
            return;
        };
        let Some(bound) = self.bound else {
            log::error!("draw_mesh with no bound pipeline");
            return;
        };

        let cmd = self.command_buffer();
        let device = self.context.device();

        // Switch rasterization variant when the wireframe flag changes
        if wireframe != bound.wireframe {
            if let Some(pair) = self.pipelines.get(&bound.id) {
                let target = if wireframe {
                    match pair.line {
                        Some(line) => Some(line),
                        None => {
                            if !self.wireframe_warned {
                                log::warn!("wireframe requested but unsupported; drawing filled");
                            }
                            self.wireframe_warned = true;
                            None
                        }
                    }
                } else {
                    Some(pair.fill)
                };
                if let Some(target) = target {
                    unsafe {
                        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target);
                    }
                    self.bound = Some(BoundPipeline {
                        id: bound.id,
                        wireframe,
                    });
                }
            }
        }

        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[vk_mesh.vertex_buffer.handle()], &[0]);
            device.cmd_bind_index_buffer(
                cmd,
                vk_mesh.index_buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_draw_indexed(cmd, vk_mesh.index_buffer.index_count(), 1, 0, 0, 0);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl VulkanDevice {
    fn allocate_texture_set(&mut self) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [self.texture_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.texture_pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.context
                .device()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        Ok(sets[0])
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.wait_idle();
        let device = self.context.device().clone();
        unsafe {
            for (_, layout) in self.set_layouts.drain() {
                device.destroy_descriptor_set_layout(layout, None);
            }
            for (_, pool) in self.descriptor_pools.drain() {
                device.destroy_descriptor_pool(pool, None);
            }
            for (_, layout) in self.pipeline_layouts.drain() {
                device.destroy_pipeline_layout(layout, None);
            }
            device.destroy_descriptor_pool(self.texture_pool, None);
            device.destroy_descriptor_set_layout(self.texture_set_layout, None);
        }
        // RAII tables (meshes, textures, pipelines, buffers, frames)
        // drop in field order, before the context
    }
}
