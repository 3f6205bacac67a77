//! Rendering system
//!
//! Backend-agnostic renderer, resource types, and the device seam,
//! plus the two device implementations: the explicit Vulkan backend
//! and the immediate-mode headless backend.

pub mod device;
pub mod headless;
pub mod lighting;
pub mod mesh;
pub mod pipeline;
pub mod renderer;
pub mod texture;
pub mod vulkan;

pub use device::{
    DepthState, DeviceError, DeviceResult, GraphicsDevice, PipelineDesc, PushConstantRange,
    ShaderStages, VertexAttribute, VertexFormat, VertexLayout,
};
pub use headless::HeadlessDevice;
pub use lighting::{Lights, PointLight, SpotLight};
pub use mesh::{Mesh, MeshData, Vertex};
pub use pipeline::{FrameContext, ShaderPipeline, UniformScope, UniformWriter};
pub use renderer::{PipelineSettings, Renderer};
pub use texture::{Texture, TextureKind};

/// Index into one of the renderer's append-only resource tables.
///
/// Tables never compact, so indices returned at load time stay stable
/// for the table's lifetime. [`ResourceId::UNSET`] (-1) marks an
/// unset/failed resource; operations referencing it are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub i32);

impl ResourceId {
    /// Sentinel for "unset" / "load failed"
    pub const UNSET: Self = Self(-1);

    /// Whether this id carries no resource
    pub fn is_unset(self) -> bool {
        self.0 < 0
    }

    /// Table index, or `None` for the unset sentinel
    pub fn index(self) -> Option<usize> {
        (self.0 >= 0).then_some(self.0 as usize)
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as i32)
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::UNSET
    }
}
