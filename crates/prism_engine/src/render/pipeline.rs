//! Shader pipeline objects
//!
//! A [`ShaderPipeline`] bundles a compiled shader pair with its fixed
//! pipeline state, descriptor layout/pool, and one uniform buffer +
//! descriptor set per in-flight frame. Uniform contents are produced
//! by a caller-supplied [`UniformWriter`] strategy so the byte layout
//! contract stays explicit and testable.

use bytemuck::Pod;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::device::{
    DescriptorLayoutHandle, DescriptorPoolHandle, DescriptorSetHandle, GraphicsDevice,
    PipelineDesc, PipelineHandle, PipelineLayoutHandle, ShaderStages, UniformBufferHandle,
};
use crate::render::lighting::Lights;
use crate::scene::RenderObject;

/// Shared per-frame state handed to uniform writers
pub struct FrameContext<'a> {
    /// View matrix (translation already stripped for skybox passes)
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// World-space camera position, cached for lighting
    pub camera_pos: Vec3,
    /// The renderer's light state
    pub lights: &'a Lights,
}

/// Write access to the current frame's constants.
///
/// Uniform writes land in the frame's persistently mapped uniform
/// buffer; push constants are recorded into the active command buffer
/// for per-draw data.
pub struct UniformScope<'a> {
    device: &'a mut dyn GraphicsDevice,
    buffer: UniformBufferHandle,
    layout: PipelineLayoutHandle,
}

impl UniformScope<'_> {
    /// Write a value into the frame's uniform buffer at `offset`
    pub fn write_uniform<T: Pod>(&mut self, offset: u64, value: &T) {
        self.device
            .write_uniform_bytes(self.buffer, offset, bytemuck::bytes_of(value));
    }

    /// Record push constant bytes for the next draw
    pub fn push_constants<T: Pod>(&mut self, stages: ShaderStages, offset: u32, value: &T) {
        self.device
            .push_constants(self.layout, stages, offset, bytemuck::bytes_of(value));
    }
}

/// Strategy producing shader constants.
///
/// Both methods are plain synchronous calls made on the render thread:
/// `write_per_frame` once per frame before any object draw,
/// `write_per_object` once per draw.
pub trait UniformWriter {
    /// Write view/projection/camera/light constants for the frame
    fn write_per_frame(&self, frame: &FrameContext<'_>, scope: &mut UniformScope<'_>);

    /// Write constants for a single object (world transform, color)
    fn write_per_object(&self, object: &RenderObject, scope: &mut UniformScope<'_>);
}

/// A complete shader pipeline with per-frame uniform resources.
///
/// Construction never panics: if any GPU allocation fails, what was
/// already created is released and every handle is left at its null
/// sentinel. Callers must check [`ShaderPipeline::is_valid`] before
/// relying on draws.
pub struct ShaderPipeline {
    descriptor_set_layout: DescriptorLayoutHandle,
    descriptor_pool: DescriptorPoolHandle,
    uniform_buffers: Vec<UniformBufferHandle>,
    descriptor_sets: Vec<DescriptorSetHandle>,
    pipeline_layout: PipelineLayoutHandle,
    pipeline: PipelineHandle,
    writer: Box<dyn UniformWriter>,
}

impl ShaderPipeline {
    /// Build the pipeline and its per-frame resources.
    ///
    /// Allocation order: descriptor set layout, descriptor pool (sized
    /// to the device's frames-in-flight count), one uniform buffer per
    /// frame slot, descriptor sets, pipeline layout, pipeline.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        desc: &PipelineDesc,
        writer: Box<dyn UniformWriter>,
    ) -> Self {
        let frame_count = device.max_frames_in_flight();

        let descriptor_set_layout = match device.create_descriptor_set_layout() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("shader pipeline: descriptor set layout creation failed: {e}");
                return Self::invalid(writer);
            }
        };

        let descriptor_pool = match device.create_descriptor_pool(frame_count as u32) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("shader pipeline: descriptor pool creation failed: {e}");
                device.destroy_descriptor_set_layout(descriptor_set_layout);
                return Self::invalid(writer);
            }
        };

        let mut uniform_buffers = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            match device.create_uniform_buffer(desc.uniform_size) {
                Ok(handle) => uniform_buffers.push(handle),
                Err(e) => {
                    log::error!("shader pipeline: uniform buffer creation failed: {e}");
                    Self::release_partial(device, &uniform_buffers, descriptor_pool, descriptor_set_layout);
                    return Self::invalid(writer);
                }
            }
        }

        let descriptor_sets = match device.allocate_descriptor_sets(
            descriptor_pool,
            descriptor_set_layout,
            &uniform_buffers,
            desc.uniform_size,
        ) {
            Ok(sets) => sets,
            Err(e) => {
                log::error!("shader pipeline: descriptor set allocation failed: {e}");
                Self::release_partial(device, &uniform_buffers, descriptor_pool, descriptor_set_layout);
                return Self::invalid(writer);
            }
        };
        debug_assert_eq!(descriptor_sets.len(), frame_count);

        let pipeline_layout =
            match device.create_pipeline_layout(descriptor_set_layout, &desc.push_constant_ranges) {
                Ok(handle) => handle,
                Err(e) => {
                    log::error!("shader pipeline: pipeline layout creation failed: {e}");
                    Self::release_partial(device, &uniform_buffers, descriptor_pool, descriptor_set_layout);
                    return Self::invalid(writer);
                }
            };

        let pipeline = match device.create_graphics_pipeline(pipeline_layout, desc) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("shader pipeline: graphics pipeline creation failed: {e}");
                Self::release_partial(device, &uniform_buffers, descriptor_pool, descriptor_set_layout);
                device.destroy_pipeline_layout(pipeline_layout);
                return Self::invalid(writer);
            }
        };

        Self {
            descriptor_set_layout,
            descriptor_pool,
            uniform_buffers,
            descriptor_sets,
            pipeline_layout,
            pipeline,
            writer,
        }
    }

    fn invalid(writer: Box<dyn UniformWriter>) -> Self {
        Self {
            descriptor_set_layout: DescriptorLayoutHandle::NULL,
            descriptor_pool: DescriptorPoolHandle::NULL,
            uniform_buffers: Vec::new(),
            descriptor_sets: Vec::new(),
            pipeline_layout: PipelineLayoutHandle::NULL,
            pipeline: PipelineHandle::NULL,
            writer,
        }
    }

    fn release_partial(
        device: &mut dyn GraphicsDevice,
        uniform_buffers: &[UniformBufferHandle],
        pool: DescriptorPoolHandle,
        layout: DescriptorLayoutHandle,
    ) {
        for &buffer in uniform_buffers {
            device.destroy_uniform_buffer(buffer);
        }
        device.destroy_descriptor_pool(pool);
        device.destroy_descriptor_set_layout(layout);
    }

    /// Whether construction fully succeeded
    pub fn is_valid(&self) -> bool {
        !self.pipeline.is_null()
    }

    /// The pipeline layout, needed for texture binds against this
    /// pipeline
    pub fn pipeline_layout(&self) -> PipelineLayoutHandle {
        self.pipeline_layout
    }

    /// Bind the pipeline and the descriptor set for the device's
    /// current frame index. No-op with a diagnostic when invalid.
    pub fn activate(&self, device: &mut dyn GraphicsDevice) {
        if self.pipeline.is_null() {
            log::warn!("activating invalid shader pipeline");
            return;
        }
        let frame = device.current_frame_index();
        device.bind_pipeline(self.pipeline, self.pipeline_layout, self.descriptor_sets[frame]);
    }

    /// Run the writer's per-frame pass against the current frame's
    /// uniform buffer
    pub fn update_per_frame_constants(
        &self,
        device: &mut dyn GraphicsDevice,
        frame: &FrameContext<'_>,
    ) {
        if self.pipeline.is_null() {
            return;
        }
        let buffer = self.uniform_buffers[device.current_frame_index()];
        let mut scope = UniformScope {
            device,
            buffer,
            layout: self.pipeline_layout,
        };
        self.writer.write_per_frame(frame, &mut scope);
    }

    /// Run the writer's per-object pass for one draw
    pub fn update_per_object_constants(
        &self,
        device: &mut dyn GraphicsDevice,
        object: &RenderObject,
    ) {
        if self.pipeline.is_null() {
            return;
        }
        let buffer = self.uniform_buffers[device.current_frame_index()];
        let mut scope = UniformScope {
            device,
            buffer,
            layout: self.pipeline_layout,
        };
        self.writer.write_per_object(object, &mut scope);
    }

    /// Release all GPU objects in exactly the reverse of allocation
    /// order: uniform buffers, descriptor pool, descriptor set layout,
    /// pipeline, pipeline layout. All handles are nulled afterwards.
    ///
    /// Must run on the render thread before the device is torn down.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for buffer in self.uniform_buffers.drain(..) {
            device.destroy_uniform_buffer(buffer);
        }
        self.descriptor_sets.clear();
        if !self.descriptor_pool.is_null() {
            device.destroy_descriptor_pool(self.descriptor_pool);
            self.descriptor_pool = DescriptorPoolHandle::NULL;
        }
        if !self.descriptor_set_layout.is_null() {
            device.destroy_descriptor_set_layout(self.descriptor_set_layout);
            self.descriptor_set_layout = DescriptorLayoutHandle::NULL;
        }
        if !self.pipeline.is_null() {
            device.destroy_pipeline(self.pipeline);
            self.pipeline = PipelineHandle::NULL;
        }
        if !self.pipeline_layout.is_null() {
            device.destroy_pipeline_layout(self.pipeline_layout);
            self.pipeline_layout = PipelineLayoutHandle::NULL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{FailPoint, HeadlessDevice};
    use crate::render::mesh::Vertex;

    struct NullWriter;

    impl UniformWriter for NullWriter {
        fn write_per_frame(&self, frame: &FrameContext<'_>, scope: &mut UniformScope<'_>) {
            let view: [[f32; 4]; 4] = frame.view.into();
            scope.write_uniform(0, &view);
        }

        fn write_per_object(&self, object: &RenderObject, scope: &mut UniformScope<'_>) {
            let transform: [[f32; 4]; 4] = (*object.model_transform()).into();
            scope.push_constants(ShaderStages::Vertex, 0, &transform);
        }
    }

    fn test_desc(device: &mut HeadlessDevice) -> PipelineDesc {
        let vert = device.create_shader_module(&[0u8; 4]).unwrap();
        let frag = device.create_shader_module(&[0u8; 4]).unwrap();
        PipelineDesc {
            vert_shader: vert,
            frag_shader: frag,
            vertex_layout: Vertex::layout(),
            push_constant_ranges: vec![],
            uniform_size: 256,
            depth: None,
        }
    }

    #[test]
    fn construction_sizes_per_frame_arrays_to_the_flight_count() {
        let mut device = HeadlessDevice::new(3);
        let desc = test_desc(&mut device);
        let pipeline = ShaderPipeline::new(&mut device, &desc, Box::new(NullWriter));

        assert!(pipeline.is_valid());
        assert_eq!(pipeline.uniform_buffers.len(), 3);
        assert_eq!(pipeline.descriptor_sets.len(), 3);
    }

    #[test]
    fn forced_descriptor_pool_failure_leaves_all_handles_null() {
        let mut device = HeadlessDevice::new(2);
        let desc = test_desc(&mut device);
        device.fail_next(FailPoint::DescriptorPool);

        let pipeline = ShaderPipeline::new(&mut device, &desc, Box::new(NullWriter));

        assert!(!pipeline.is_valid());
        assert!(pipeline.pipeline.is_null());
        assert!(pipeline.pipeline_layout.is_null());
        assert!(pipeline.descriptor_pool.is_null());
        assert!(pipeline.descriptor_set_layout.is_null());
        assert!(pipeline.uniform_buffers.is_empty());
        assert!(pipeline.descriptor_sets.is_empty());
        // The layout created before the failing pool was released.
        assert_eq!(device.live_descriptor_layout_count(), 0);
    }

    #[test]
    fn destroy_releases_in_reverse_allocation_order() {
        let mut device = HeadlessDevice::new(2);
        let desc = test_desc(&mut device);
        let mut pipeline = ShaderPipeline::new(&mut device, &desc, Box::new(NullWriter));
        assert!(pipeline.is_valid());

        device.clear_op_log();
        pipeline.destroy(&mut device);

        let destroys: Vec<&str> = device
            .op_log()
            .iter()
            .filter(|op| op.starts_with("destroy_"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            destroys,
            [
                "destroy_uniform_buffer",
                "destroy_uniform_buffer",
                "destroy_descriptor_pool",
                "destroy_descriptor_set_layout",
                "destroy_pipeline",
                "destroy_pipeline_layout",
            ]
        );
        assert!(!pipeline.is_valid());
    }

    #[test]
    fn activate_on_invalid_pipeline_records_nothing() {
        let mut device = HeadlessDevice::new(2);
        let desc = test_desc(&mut device);
        device.fail_next(FailPoint::Pipeline);
        let pipeline = ShaderPipeline::new(&mut device, &desc, Box::new(NullWriter));

        device.clear_op_log();
        pipeline.activate(&mut device);
        assert!(device.op_log().iter().all(|op| !op.starts_with("bind_")));
    }

    #[test]
    fn per_frame_writes_target_the_current_frame_buffer() {
        let mut device = HeadlessDevice::new(2);
        let desc = test_desc(&mut device);
        let pipeline = ShaderPipeline::new(&mut device, &desc, Box::new(NullWriter));
        let lights = Lights::default();

        // Advance to frame slot 1.
        device.begin_frame([0.0; 4]).unwrap();
        device.end_frame().unwrap();
        assert_eq!(device.current_frame_index(), 1);

        let frame = FrameContext {
            view: Mat4::identity(),
            projection: Mat4::identity(),
            camera_pos: Vec3::zeros(),
            lights: &lights,
        };
        pipeline.update_per_frame_constants(&mut device, &frame);

        let writes = device.uniform_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].buffer, pipeline.uniform_buffers[1]);
        assert_eq!(writes[0].len, 64);
    }
}
