//! Mesh data and GPU mesh resources

use crate::render::device::{
    GraphicsDevice, MeshHandle, VertexAttribute, VertexFormat, VertexLayout,
};

/// A single vertex with position, normal, and texture coordinates.
///
/// `#[repr(C)]` keeps the layout stable for GPU upload; the struct is
/// 32 bytes with no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

unsafe impl bytemuck::Zeroable for Vertex {}
unsafe impl bytemuck::Pod for Vertex {}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// The vertex layout matching this struct
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Vertex>() as u32,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float2,
                    offset: 24,
                },
            ],
        }
    }
}

/// CPU-side mesh geometry as returned by the loader collaborators
#[derive(Debug, Clone)]
pub struct MeshData {
    /// Vertex list
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`
    pub indices: Vec<u32>,
}

/// A mesh with GPU buffers.
///
/// Buffers are allocated lazily by [`Mesh::init_buffers`], which must
/// be called exactly once before any draw. [`Mesh::destroy`] releases
/// the GPU buffers and nulls the handle; drawing after destroy is a
/// contract violation. Single-owner: the type is move-only.
#[derive(Debug)]
pub struct Mesh {
    data: Option<MeshData>,
    gpu: MeshHandle,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    /// Create a mesh from loaded geometry; no GPU work happens yet
    pub fn new(data: MeshData) -> Self {
        let vertex_count = data.vertices.len() as u32;
        let index_count = data.indices.len() as u32;
        Self {
            data: Some(data),
            gpu: MeshHandle::NULL,
            vertex_count,
            index_count,
        }
    }

    /// Upload the CPU geometry to GPU buffers.
    ///
    /// Must be called once, before any draw. The CPU copy is released
    /// after a successful upload.
    pub fn init_buffers(&mut self, device: &mut dyn GraphicsDevice) {
        debug_assert!(self.gpu.is_null(), "init_buffers called twice");
        let Some(data) = self.data.take() else {
            log::warn!("Mesh::init_buffers with no geometry data");
            return;
        };
        match device.create_mesh(&data) {
            Ok(handle) => self.gpu = handle,
            Err(e) => log::error!("Mesh buffer upload failed: {e}"),
        }
    }

    /// Whether GPU buffers exist
    pub fn is_valid(&self) -> bool {
        !self.gpu.is_null()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Record a draw of this mesh
    pub fn render(&self, device: &mut dyn GraphicsDevice, wireframe: bool) {
        if self.gpu.is_null() {
            return;
        }
        device.draw_mesh(self.gpu, wireframe);
    }

    /// Release the GPU buffers and null the handle.
    ///
    /// Must run before the owning device is torn down.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.gpu.is_null() {
            device.destroy_mesh(self.gpu);
            self.gpu = MeshHandle::NULL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessDevice;

    fn triangle() -> MeshData {
        MeshData {
            vertices: vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
                Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
                Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn vertex_layout_matches_struct_size() {
        let layout = Vertex::layout();
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[2].offset, 24);
    }

    #[test]
    fn init_buffers_uploads_once_and_destroy_nulls() {
        let mut device = HeadlessDevice::new(2);
        let mut mesh = Mesh::new(triangle());
        assert!(!mesh.is_valid());

        mesh.init_buffers(&mut device);
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);

        mesh.destroy(&mut device);
        assert!(!mesh.is_valid());
        // Destroy again is a no-op thanks to the nulled handle.
        mesh.destroy(&mut device);
        assert_eq!(device.live_mesh_count(), 0);
    }
}
