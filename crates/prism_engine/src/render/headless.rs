//! Headless immediate-mode backend
//!
//! The legacy-style counterpart to the Vulkan backend: there is no
//! frame orchestrator, no command buffers, and no swapchain — every
//! [`GraphicsDevice`] call takes effect synchronously and state
//! toggles (depth write, bound pipeline/texture) are plain mutable
//! fields, the way an immediate-mode API works.
//!
//! The device keeps a full account of what it did: live-handle tables,
//! an operation log, uniform write records, and per-draw records that
//! capture the state in force at draw time. That makes it the test
//! suite's instrumented double as well as a backend for running the
//! engine without a GPU. `fail_next` injects a single failure at a
//! chosen point.

use std::collections::{HashMap, HashSet};

use crate::assets::ImageData;
use crate::render::device::{
    DescriptorLayoutHandle, DescriptorPoolHandle, DescriptorSetHandle, DeviceError, DeviceResult,
    GraphicsDevice, MeshHandle, PipelineDesc, PipelineHandle, PipelineLayoutHandle,
    PushConstantRange, ShaderModuleHandle, ShaderStages, TextureHandle, UniformBufferHandle,
};
use crate::render::mesh::MeshData;

/// Device calls where a forced failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// `begin_frame` (reports the swapchain out of date)
    BeginFrame,
    /// `create_mesh`
    Mesh,
    /// `create_texture_2d` / `create_texture_cube`
    Texture,
    /// `create_descriptor_set_layout`
    DescriptorSetLayout,
    /// `create_descriptor_pool`
    DescriptorPool,
    /// `create_uniform_buffer`
    UniformBuffer,
    /// `allocate_descriptor_sets`
    DescriptorSets,
    /// `create_pipeline_layout`
    PipelineLayout,
    /// `create_graphics_pipeline`
    Pipeline,
}

/// One recorded draw with the state in force when it was issued
#[derive(Debug, Clone)]
pub struct DrawRecord {
    /// Mesh that was drawn
    pub mesh: MeshHandle,
    /// Wireframe flag passed to the draw
    pub wireframe: bool,
    /// Whether depth writes were enabled at draw time
    pub depth_write: bool,
    /// Frame slot the draw landed in
    pub frame_index: usize,
    /// Pipeline bound at draw time
    pub pipeline: PipelineHandle,
    /// Texture bound at draw time, if any
    pub texture: Option<TextureHandle>,
}

/// One recorded uniform buffer write
#[derive(Debug, Clone)]
pub struct UniformWrite {
    /// Target buffer
    pub buffer: UniformBufferHandle,
    /// Byte offset
    pub offset: u64,
    /// Byte length
    pub len: usize,
}

/// Immediate-mode device executing commands synchronously
pub struct HeadlessDevice {
    max_frames_in_flight: usize,
    current_frame: usize,
    next_handle: u64,

    meshes: HashSet<u64>,
    textures: HashSet<u64>,
    shader_modules: HashSet<u64>,
    descriptor_layouts: HashSet<u64>,
    descriptor_pools: HashSet<u64>,
    pipeline_layouts: HashSet<u64>,
    pipelines: HashSet<u64>,
    uniform_buffers: HashMap<u64, Vec<u8>>,

    bound_pipeline: PipelineHandle,
    bound_texture: Option<TextureHandle>,
    depth_write: bool,
    in_frame: bool,
    viewport: (u32, u32),

    fail_next: Option<FailPoint>,
    ops: Vec<String>,
    draws: Vec<DrawRecord>,
    writes: Vec<UniformWrite>,
}

impl HeadlessDevice {
    /// Create a device with the given frames-in-flight count.
    ///
    /// The count only drives the rotating frame index; there is no
    /// real frame pipelining here.
    pub fn new(max_frames_in_flight: usize) -> Self {
        assert!(max_frames_in_flight > 0);
        Self {
            max_frames_in_flight,
            current_frame: 0,
            next_handle: 1,
            meshes: HashSet::new(),
            textures: HashSet::new(),
            shader_modules: HashSet::new(),
            descriptor_layouts: HashSet::new(),
            descriptor_pools: HashSet::new(),
            pipeline_layouts: HashSet::new(),
            pipelines: HashSet::new(),
            uniform_buffers: HashMap::new(),
            bound_pipeline: PipelineHandle::NULL,
            bound_texture: None,
            depth_write: true,
            in_frame: false,
            viewport: (0, 0),
            fail_next: None,
            ops: Vec::new(),
            draws: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Inject a single failure at the given point
    pub fn fail_next(&mut self, point: FailPoint) {
        self.fail_next = Some(point);
    }

    fn should_fail(&mut self, point: FailPoint) -> bool {
        if self.fail_next == Some(point) {
            self.fail_next = None;
            return true;
        }
        false
    }

    fn alloc(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn record(&mut self, op: &str) {
        self.ops.push(op.to_string());
    }

    /// Recorded operation names, in call order
    pub fn op_log(&self) -> &[String] {
        &self.ops
    }

    /// Clear the operation log (handles stay live)
    pub fn clear_op_log(&mut self) {
        self.ops.clear();
    }

    /// Recorded draws, in issue order
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Recorded uniform buffer writes
    pub fn uniform_writes(&self) -> &[UniformWrite] {
        &self.writes
    }

    /// Number of meshes with live GPU buffers
    pub fn live_mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of live textures
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live descriptor set layouts
    pub fn live_descriptor_layout_count(&self) -> usize {
        self.descriptor_layouts.len()
    }

    /// Number of live pipelines
    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Total number of live GPU objects of any kind
    pub fn live_object_count(&self) -> usize {
        self.meshes.len()
            + self.textures.len()
            + self.shader_modules.len()
            + self.descriptor_layouts.len()
            + self.descriptor_pools.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
            + self.uniform_buffers.len()
    }

    /// Current viewport dimensions
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    fn begin_frame(&mut self, _clear_color: [f32; 4]) -> DeviceResult<()> {
        self.record("begin_frame");
        if self.should_fail(FailPoint::BeginFrame) {
            return Err(DeviceError::SwapchainOutOfDate);
        }
        self.in_frame = true;
        self.bound_pipeline = PipelineHandle::NULL;
        self.bound_texture = None;
        self.depth_write = true;
        Ok(())
    }

    fn end_frame(&mut self) -> DeviceResult<()> {
        self.record("end_frame");
        self.in_frame = false;
        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn wait_idle(&mut self) {}

    fn create_shader_module(&mut self, _code: &[u8]) -> DeviceResult<ShaderModuleHandle> {
        self.record("create_shader_module");
        let handle = self.alloc();
        self.shader_modules.insert(handle);
        Ok(ShaderModuleHandle(handle))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) {
        self.record("destroy_shader_module");
        self.shader_modules.remove(&module.0);
    }

    fn create_mesh(&mut self, data: &MeshData) -> DeviceResult<MeshHandle> {
        self.record("create_mesh");
        if self.should_fail(FailPoint::Mesh) {
            return Err(DeviceError::Allocation("forced mesh failure".into()));
        }
        if data.vertices.is_empty() {
            return Err(DeviceError::Allocation("mesh with zero vertices".into()));
        }
        let handle = self.alloc();
        self.meshes.insert(handle);
        Ok(MeshHandle(handle))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.record("destroy_mesh");
        self.meshes.remove(&mesh.0);
    }

    fn create_texture_2d(&mut self, _image: &ImageData) -> DeviceResult<TextureHandle> {
        self.record("create_texture_2d");
        if self.should_fail(FailPoint::Texture) {
            return Err(DeviceError::Allocation("forced texture failure".into()));
        }
        let handle = self.alloc();
        self.textures.insert(handle);
        Ok(TextureHandle(handle))
    }

    fn create_texture_cube(&mut self, _faces: &[ImageData; 6]) -> DeviceResult<TextureHandle> {
        self.record("create_texture_cube");
        if self.should_fail(FailPoint::Texture) {
            return Err(DeviceError::Allocation("forced texture failure".into()));
        }
        let handle = self.alloc();
        self.textures.insert(handle);
        Ok(TextureHandle(handle))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.record("destroy_texture");
        self.textures.remove(&texture.0);
    }

    fn create_descriptor_set_layout(&mut self) -> DeviceResult<DescriptorLayoutHandle> {
        self.record("create_descriptor_set_layout");
        if self.should_fail(FailPoint::DescriptorSetLayout) {
            return Err(DeviceError::Allocation("forced layout failure".into()));
        }
        let handle = self.alloc();
        self.descriptor_layouts.insert(handle);
        Ok(DescriptorLayoutHandle(handle))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorLayoutHandle) {
        self.record("destroy_descriptor_set_layout");
        self.descriptor_layouts.remove(&layout.0);
    }

    fn create_descriptor_pool(&mut self, _max_sets: u32) -> DeviceResult<DescriptorPoolHandle> {
        self.record("create_descriptor_pool");
        if self.should_fail(FailPoint::DescriptorPool) {
            return Err(DeviceError::Allocation("forced pool failure".into()));
        }
        let handle = self.alloc();
        self.descriptor_pools.insert(handle);
        Ok(DescriptorPoolHandle(handle))
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        self.record("destroy_descriptor_pool");
        self.descriptor_pools.remove(&pool.0);
    }

    fn create_uniform_buffer(&mut self, size: u64) -> DeviceResult<UniformBufferHandle> {
        self.record("create_uniform_buffer");
        if self.should_fail(FailPoint::UniformBuffer) {
            return Err(DeviceError::Allocation("forced buffer failure".into()));
        }
        let handle = self.alloc();
        self.uniform_buffers.insert(handle, vec![0; size as usize]);
        Ok(UniformBufferHandle(handle))
    }

    fn destroy_uniform_buffer(&mut self, buffer: UniformBufferHandle) {
        self.record("destroy_uniform_buffer");
        self.uniform_buffers.remove(&buffer.0);
    }

    fn write_uniform_bytes(&mut self, buffer: UniformBufferHandle, offset: u64, data: &[u8]) {
        if let Some(contents) = self.uniform_buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = start + data.len();
            if end <= contents.len() {
                contents[start..end].copy_from_slice(data);
            } else {
                log::error!(
                    "uniform write of {} bytes at offset {} overruns {}-byte buffer",
                    data.len(),
                    offset,
                    contents.len()
                );
            }
        }
        self.writes.push(UniformWrite {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        _layout: DescriptorLayoutHandle,
        buffers: &[UniformBufferHandle],
        _range: u64,
    ) -> DeviceResult<Vec<DescriptorSetHandle>> {
        self.record("allocate_descriptor_sets");
        if self.should_fail(FailPoint::DescriptorSets) {
            return Err(DeviceError::Allocation("forced set failure".into()));
        }
        if !self.descriptor_pools.contains(&pool.0) {
            return Err(DeviceError::Allocation("descriptor pool not live".into()));
        }
        Ok(buffers
            .iter()
            .map(|_| DescriptorSetHandle(self.alloc()))
            .collect())
    }

    fn create_pipeline_layout(
        &mut self,
        _set_layout: DescriptorLayoutHandle,
        _push_constant_ranges: &[PushConstantRange],
    ) -> DeviceResult<PipelineLayoutHandle> {
        self.record("create_pipeline_layout");
        if self.should_fail(FailPoint::PipelineLayout) {
            return Err(DeviceError::Allocation("forced layout failure".into()));
        }
        let handle = self.alloc();
        self.pipeline_layouts.insert(handle);
        Ok(PipelineLayoutHandle(handle))
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) {
        self.record("destroy_pipeline_layout");
        self.pipeline_layouts.remove(&layout.0);
    }

    fn create_graphics_pipeline(
        &mut self,
        _layout: PipelineLayoutHandle,
        _desc: &PipelineDesc,
    ) -> DeviceResult<PipelineHandle> {
        self.record("create_graphics_pipeline");
        if self.should_fail(FailPoint::Pipeline) {
            return Err(DeviceError::Allocation("forced pipeline failure".into()));
        }
        let handle = self.alloc();
        self.pipelines.insert(handle);
        Ok(PipelineHandle(handle))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.record("destroy_pipeline");
        self.pipelines.remove(&pipeline.0);
    }

    fn bind_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        _layout: PipelineLayoutHandle,
        _descriptor_set: DescriptorSetHandle,
    ) {
        self.record("bind_pipeline");
        self.bound_pipeline = pipeline;
        self.bound_texture = None;
    }

    fn bind_texture(&mut self, _layout: PipelineLayoutHandle, texture: TextureHandle) {
        self.record("bind_texture");
        self.bound_texture = Some(texture);
    }

    fn push_constants(
        &mut self,
        _layout: PipelineLayoutHandle,
        _stages: ShaderStages,
        _offset: u32,
        _data: &[u8],
    ) {
        self.record("push_constants");
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.record("set_depth_write");
        self.depth_write = enabled;
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, wireframe: bool) {
        self.record("draw_mesh");
        self.draws.push(DrawRecord {
            mesh,
            wireframe,
            depth_write: self.depth_write,
            frame_index: self.current_frame,
            pipeline: self.bound_pipeline,
            texture: self.bound_texture,
        });
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_rotates_modulo_flight_count() {
        let mut device = HeadlessDevice::new(3);
        for expected in [0usize, 1, 2, 0, 1] {
            assert_eq!(device.current_frame_index(), expected);
            device.begin_frame([0.0; 4]).unwrap();
            device.end_frame().unwrap();
        }
    }

    #[test]
    fn draw_records_capture_depth_write_state() {
        let mut device = HeadlessDevice::new(2);
        let mesh = device
            .create_mesh(&MeshData {
                vertices: vec![crate::render::mesh::Vertex::new(
                    [0.0; 3],
                    [0.0, 0.0, 1.0],
                    [0.0; 2],
                )],
                indices: vec![0],
            })
            .unwrap();

        device.begin_frame([0.0; 4]).unwrap();
        device.set_depth_write(false);
        device.draw_mesh(mesh, false);
        device.set_depth_write(true);
        device.draw_mesh(mesh, true);
        device.end_frame().unwrap();

        let draws = device.draws();
        assert!(!draws[0].depth_write);
        assert!(draws[1].depth_write);
        assert!(draws[1].wireframe);
    }

    #[test]
    fn begin_frame_resets_transient_binding_state() {
        let mut device = HeadlessDevice::new(2);
        device.begin_frame([0.0; 4]).unwrap();
        device.set_depth_write(false);
        device.end_frame().unwrap();

        device.begin_frame([0.0; 4]).unwrap();
        assert!(device.depth_write);
    }
}
