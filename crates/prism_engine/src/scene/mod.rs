//! Scene-side render objects
//!
//! Scene logic owns [`RenderObject`]s through shared handles; the
//! renderer keeps only weak references, so dropping the last strong
//! handle removes an object from rendering without unregistration.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::foundation::math::{Mat4, Vec3};
use crate::render::ResourceId;

/// A drawable object: resource indices plus per-object draw state.
///
/// Indices left at [`ResourceId::UNSET`] mean "unset — skip this
/// object" and are normal, not an error.
#[derive(Debug)]
pub struct RenderObject {
    mesh_id: ResourceId,
    pipeline_id: ResourceId,
    texture_id: ResourceId,
    model_transform: Mat4,
    color: Vec3,
    draw_wireframe: bool,
}

impl Default for RenderObject {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderObject {
    /// Create an object with every resource index unset
    pub fn new() -> Self {
        Self {
            mesh_id: ResourceId::UNSET,
            pipeline_id: ResourceId::UNSET,
            texture_id: ResourceId::UNSET,
            model_transform: Mat4::identity(),
            color: Vec3::new(1.0, 1.0, 1.0),
            draw_wireframe: false,
        }
    }

    /// Mesh table index
    pub fn mesh_id(&self) -> ResourceId {
        self.mesh_id
    }

    /// Shader pipeline table index
    pub fn pipeline_id(&self) -> ResourceId {
        self.pipeline_id
    }

    /// Texture table index
    pub fn texture_id(&self) -> ResourceId {
        self.texture_id
    }

    /// World transform
    pub fn model_transform(&self) -> &Mat4 {
        &self.model_transform
    }

    /// Object color
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Whether to draw as wireframe
    pub fn draw_wireframe(&self) -> bool {
        self.draw_wireframe
    }

    /// Set the mesh table index
    pub fn set_mesh_id(&mut self, id: ResourceId) {
        self.mesh_id = id;
    }

    /// Set the shader pipeline table index
    pub fn set_pipeline_id(&mut self, id: ResourceId) {
        self.pipeline_id = id;
    }

    /// Set the texture table index
    pub fn set_texture_id(&mut self, id: ResourceId) {
        self.texture_id = id;
    }

    /// Set the world transform
    pub fn set_model_transform(&mut self, transform: Mat4) {
        self.model_transform = transform;
    }

    /// Set the object color
    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Set wireframe drawing
    pub fn set_draw_wireframe(&mut self, wireframe: bool) {
        self.draw_wireframe = wireframe;
    }
}

/// Owning handle held by scene logic
pub type SharedRenderObject = Rc<RefCell<RenderObject>>;

/// Non-owning handle held by the renderer
pub type WeakRenderObject = Weak<RefCell<RenderObject>>;

/// Create a new shared render object
pub fn shared_render_object() -> SharedRenderObject {
    Rc::new(RefCell::new(RenderObject::new()))
}
