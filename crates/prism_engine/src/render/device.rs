//! Graphics device abstraction
//!
//! The trait seam between the backend-agnostic renderer and the two
//! device implementations (explicit Vulkan, immediate headless). All
//! GPU work funnels through this trait; a device is bound to a single
//! thread for its entire post-construction lifetime.

use thiserror::Error;

use crate::assets::ImageData;
use crate::render::mesh::MeshData;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Device-level errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A GPU object allocation failed
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The swapchain no longer matches the surface; the frame was
    /// skipped and the swapchain recreated
    #[error("swapchain out of date")]
    SwapchainOutOfDate,

    /// Any other graphics API failure
    #[error("graphics API error: {0}")]
    Api(String),
}

macro_rules! device_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl $name {
            /// Null sentinel handle
            pub const NULL: Self = Self(0);

            /// Whether this handle is the null sentinel
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }
    };
}

device_handle!(
    /// Handle to GPU vertex/index buffers for one mesh
    MeshHandle
);
device_handle!(
    /// Handle to a GPU image (2D or cube map)
    TextureHandle
);
device_handle!(
    /// Handle to a compiled shader module
    ShaderModuleHandle
);
device_handle!(
    /// Handle to a descriptor set layout
    DescriptorLayoutHandle
);
device_handle!(
    /// Handle to a descriptor pool
    DescriptorPoolHandle
);
device_handle!(
    /// Handle to an allocated descriptor set
    DescriptorSetHandle
);
device_handle!(
    /// Handle to a uniform buffer with a persistent write mapping
    UniformBufferHandle
);
device_handle!(
    /// Handle to a pipeline layout
    PipelineLayoutHandle
);
device_handle!(
    /// Handle to a graphics pipeline
    PipelineHandle
);

/// Shader stages addressed by push constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStages {
    /// Vertex stage only
    Vertex,
    /// Fragment stage only
    Fragment,
    /// Both vertex and fragment stages
    VertexAndFragment,
}

/// A push constant range declared at pipeline creation
#[derive(Debug, Clone, Copy)]
pub struct PushConstantRange {
    /// Stages that read the range
    pub stages: ShaderStages,
    /// Byte offset within the push constant block
    pub offset: u32,
    /// Byte size of the range
    pub size: u32,
}

/// Per-attribute vertex input format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// Two 32-bit floats
    Float2,
    /// Three 32-bit floats
    Float3,
}

/// One vertex attribute within the vertex layout
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Attribute format
    pub format: VertexFormat,
    /// Byte offset from the start of the vertex
    pub offset: u32,
}

/// Vertex buffer layout description
#[derive(Debug, Clone)]
pub struct VertexLayout {
    /// Byte stride between consecutive vertices
    pub stride: u32,
    /// Attribute list
    pub attributes: Vec<VertexAttribute>,
}

/// Depth test/write state baked into a pipeline
#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    /// Enable the depth test
    pub test: bool,
    /// Enable depth writes (toggleable at record time where the
    /// backend supports it)
    pub write: bool,
}

/// Everything needed to build one graphics pipeline.
///
/// Fixed-function state not listed here is constant across the engine:
/// triangle-list topology, back-face culling, counter-clockwise front
/// face, dynamic viewport/scissor, blending disabled, one color
/// attachment.
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    /// Compiled vertex shader
    pub vert_shader: ShaderModuleHandle,
    /// Compiled fragment shader
    pub frag_shader: ShaderModuleHandle,
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
    /// Push constant ranges available to the pipeline
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// Byte size of the per-frame uniform block
    pub uniform_size: u64,
    /// Depth state; `None` means no depth-stencil state at all
    pub depth: Option<DepthState>,
}

/// The device seam.
///
/// Creation/destruction calls manage GPU object lifetime; recording
/// calls (`bind_*`, `push_constants`, `set_depth_write`, `draw_mesh`)
/// are only valid between `begin_frame` and `end_frame`. Handles are
/// plain ids: using a destroyed handle is a contract violation and is
/// not defended at runtime.
pub trait GraphicsDevice {
    /// Short backend name for diagnostics
    fn backend_name(&self) -> &'static str;

    /// The frames-in-flight count every per-frame resource array is
    /// sized to
    fn max_frames_in_flight(&self) -> usize;

    /// Rotating frame index in `[0, max_frames_in_flight)`
    fn current_frame_index(&self) -> usize;

    /// Start a frame: synchronize with the GPU, acquire a target
    /// image, begin command recording
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> DeviceResult<()>;

    /// Finish a frame: submit recorded commands and present
    fn end_frame(&mut self) -> DeviceResult<()>;

    /// Update the drawable surface dimensions
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Block until the GPU has finished all submitted work
    fn wait_idle(&mut self);

    /// Wrap compiled SPIR-V (or backend-equivalent) bytes into an
    /// opaque shader module
    fn create_shader_module(&mut self, code: &[u8]) -> DeviceResult<ShaderModuleHandle>;
    /// Destroy a shader module (safe once pipelines using it exist)
    fn destroy_shader_module(&mut self, module: ShaderModuleHandle);

    /// Upload vertex/index data into GPU buffers
    fn create_mesh(&mut self, data: &MeshData) -> DeviceResult<MeshHandle>;
    /// Release a mesh's GPU buffers
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Upload a 2D RGBA image
    fn create_texture_2d(&mut self, image: &ImageData) -> DeviceResult<TextureHandle>;
    /// Upload six RGBA faces as a cube map (+X, -X, +Y, -Y, +Z, -Z)
    fn create_texture_cube(&mut self, faces: &[ImageData; 6]) -> DeviceResult<TextureHandle>;
    /// Release a texture's GPU image
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create the single-uniform-buffer descriptor set layout used by
    /// every shader pipeline
    fn create_descriptor_set_layout(&mut self) -> DeviceResult<DescriptorLayoutHandle>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorLayoutHandle);

    /// Create a descriptor pool sized for `max_sets` uniform-buffer
    /// sets
    fn create_descriptor_pool(&mut self, max_sets: u32) -> DeviceResult<DescriptorPoolHandle>;
    /// Destroy a descriptor pool (frees its sets)
    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle);

    /// Allocate a uniform buffer with a persistent CPU write mapping
    fn create_uniform_buffer(&mut self, size: u64) -> DeviceResult<UniformBufferHandle>;
    /// Destroy a uniform buffer and its memory
    fn destroy_uniform_buffer(&mut self, buffer: UniformBufferHandle);
    /// Write bytes through the buffer's persistent mapping
    fn write_uniform_bytes(&mut self, buffer: UniformBufferHandle, offset: u64, data: &[u8]);

    /// Allocate one descriptor set per uniform buffer, each bound to
    /// its own buffer over `range` bytes
    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorLayoutHandle,
        buffers: &[UniformBufferHandle],
        range: u64,
    ) -> DeviceResult<Vec<DescriptorSetHandle>>;

    /// Create a pipeline layout from the descriptor set layout and
    /// push constant ranges
    fn create_pipeline_layout(
        &mut self,
        set_layout: DescriptorLayoutHandle,
        push_constant_ranges: &[PushConstantRange],
    ) -> DeviceResult<PipelineLayoutHandle>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle);

    /// Create a graphics pipeline with the engine's fixed-function
    /// state and the description's shaders/vertex layout/depth state
    fn create_graphics_pipeline(
        &mut self,
        layout: PipelineLayoutHandle,
        desc: &PipelineDesc,
    ) -> DeviceResult<PipelineHandle>;
    /// Destroy a graphics pipeline
    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind a pipeline and the descriptor set for the current frame
    fn bind_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        layout: PipelineLayoutHandle,
        descriptor_set: DescriptorSetHandle,
    );

    /// Bind a texture for the following draws
    fn bind_texture(&mut self, layout: PipelineLayoutHandle, texture: TextureHandle);

    /// Record push constant bytes
    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    /// Toggle depth writes for the following draws
    fn set_depth_write(&mut self, enabled: bool);

    /// Draw a mesh, filled or as wireframe
    fn draw_mesh(&mut self, mesh: MeshHandle, wireframe: bool);

    /// Downcast to the concrete device type
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to the concrete device type, mutably
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
