//! The backend-agnostic renderer
//!
//! Owns the resource tables, camera/projection state, and light set,
//! and issues the per-frame draw sequence (skybox first, then opaque
//! objects in registration order) against weakly-referenced render
//! objects. All methods must run on the render thread.

use std::path::Path;
use std::rc::Rc;

use crate::assets;
use crate::foundation::math::{self, Mat4, Vec3};
use crate::render::device::{
    DepthState, DeviceError, GraphicsDevice, PipelineDesc, PushConstantRange, VertexLayout,
};
use crate::render::lighting::Lights;
use crate::render::mesh::{Mesh, MeshData};
use crate::render::pipeline::{FrameContext, ShaderPipeline, UniformWriter};
use crate::render::texture::Texture;
use crate::render::ResourceId;
use crate::scene::{SharedRenderObject, WeakRenderObject};

/// Fixed vertical field of view for the perspective projection
const FIELD_OF_VIEW_RADIANS: f32 = std::f32::consts::FRAC_PI_4; // 45°
/// Near clip plane
const NEAR_PLANE: f32 = 0.1;
/// Far clip plane
const FAR_PLANE: f32 = 100.0;
/// World up vector used by the look-at camera
const WORLD_UP: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Pipeline parameters supplied alongside the shader pair
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
    /// Push constant ranges for per-draw data
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// Byte size of the per-frame uniform block
    pub uniform_size: u64,
    /// Depth state, if any
    pub depth: Option<DepthState>,
}

/// The renderer.
///
/// Resource tables are append-only; loads return a stable
/// [`ResourceId`] or [`ResourceId::UNSET`] on failure, never panic.
/// Render objects are held by weak reference: an object whose owning
/// handle has been dropped simply stops rendering.
pub struct Renderer {
    device: Box<dyn GraphicsDevice>,

    clear_color: Vec3,
    view_transform: Mat4,
    proj_transform: Mat4,
    camera_pos: Vec3,
    viewport: (u32, u32),
    lights: Lights,

    meshes: Vec<Mesh>,
    textures: Vec<Texture>,
    pipelines: Vec<ShaderPipeline>,
    render_objects: Vec<WeakRenderObject>,
    skybox: WeakRenderObject,

    shut_down: bool,
}

impl Renderer {
    /// Create a renderer over the given device with an identity view
    /// transform. Depth testing and back-face culling are baked into
    /// every pipeline the renderer creates.
    pub fn new(device: Box<dyn GraphicsDevice>) -> Self {
        log::debug!(
            "Renderer over {} backend, {} frames in flight",
            device.backend_name(),
            device.max_frames_in_flight()
        );
        Self {
            device,
            clear_color: Vec3::zeros(),
            view_transform: Mat4::identity(),
            proj_transform: Mat4::identity(),
            camera_pos: Vec3::zeros(),
            viewport: (0, 0),
            lights: Lights::default(),
            meshes: Vec::new(),
            textures: Vec::new(),
            pipelines: Vec::new(),
            render_objects: Vec::new(),
            skybox: WeakRenderObject::new(),
            shut_down: false,
        }
    }

    /// Load a mesh file, upload it, and append it to the mesh table
    pub fn load_mesh<P: AsRef<Path>>(&mut self, path: P) -> ResourceId {
        match assets::load_obj(&path) {
            Ok(data) => self.add_mesh(data),
            Err(e) => {
                log::error!("load_mesh({:?}) failed: {e}", path.as_ref());
                ResourceId::UNSET
            }
        }
    }

    /// Upload already-built geometry and append it to the mesh table
    pub fn add_mesh(&mut self, data: MeshData) -> ResourceId {
        let mut mesh = Mesh::new(data);
        mesh.init_buffers(self.device.as_mut());
        if !mesh.is_valid() {
            return ResourceId::UNSET;
        }
        self.meshes.push(mesh);
        ResourceId::from_index(self.meshes.len() - 1)
    }

    /// Load a 2D texture and append it to the texture table
    pub fn load_texture<P: AsRef<Path>>(&mut self, path: P) -> ResourceId {
        let image = match assets::load_image(&path) {
            Ok(image) => image,
            Err(e) => {
                log::error!("load_texture({:?}) failed: {e}", path.as_ref());
                return ResourceId::UNSET;
            }
        };
        self.add_texture(&image)
    }

    /// Upload already-built image data as a 2D texture
    pub fn add_texture(&mut self, image: &assets::ImageData) -> ResourceId {
        match Texture::new_2d(self.device.as_mut(), image) {
            Some(texture) => {
                self.textures.push(texture);
                ResourceId::from_index(self.textures.len() - 1)
            }
            None => ResourceId::UNSET,
        }
    }

    /// Load six cube map faces (+X, -X, +Y, -Y, +Z, -Z) and append
    /// the cube map to the texture table
    pub fn load_cube_map<P: AsRef<Path>>(&mut self, paths: &[P; 6]) -> ResourceId {
        let mut faces = Vec::with_capacity(6);
        for path in paths {
            match assets::load_image(path) {
                Ok(image) => faces.push(image),
                Err(e) => {
                    log::error!("load_cube_map({:?}) failed: {e}", path.as_ref());
                    return ResourceId::UNSET;
                }
            }
        }
        let faces: [assets::ImageData; 6] = match faces.try_into() {
            Ok(faces) => faces,
            Err(_) => return ResourceId::UNSET,
        };
        self.add_cube_map(&faces)
    }

    /// Upload six already-built faces (+X, -X, +Y, -Y, +Z, -Z) as a
    /// cube map
    pub fn add_cube_map(&mut self, faces: &[assets::ImageData; 6]) -> ResourceId {
        match Texture::new_cube(self.device.as_mut(), faces) {
            Some(texture) => {
                self.textures.push(texture);
                ResourceId::from_index(self.textures.len() - 1)
            }
            None => ResourceId::UNSET,
        }
    }

    /// Build a shader pipeline from compiled SPIR-V bytes and append
    /// it to the pipeline table. The shader modules are released once
    /// the pipeline exists.
    pub fn create_pipeline(
        &mut self,
        vert_spirv: &[u8],
        frag_spirv: &[u8],
        settings: &PipelineSettings,
        writer: Box<dyn UniformWriter>,
    ) -> ResourceId {
        let device = self.device.as_mut();
        let vert_shader = match device.create_shader_module(vert_spirv) {
            Ok(module) => module,
            Err(e) => {
                log::error!("vertex shader module creation failed: {e}");
                return ResourceId::UNSET;
            }
        };
        let frag_shader = match device.create_shader_module(frag_spirv) {
            Ok(module) => module,
            Err(e) => {
                log::error!("fragment shader module creation failed: {e}");
                device.destroy_shader_module(vert_shader);
                return ResourceId::UNSET;
            }
        };

        let desc = PipelineDesc {
            vert_shader,
            frag_shader,
            vertex_layout: settings.vertex_layout.clone(),
            push_constant_ranges: settings.push_constant_ranges.clone(),
            uniform_size: settings.uniform_size,
            depth: settings.depth,
        };
        let pipeline = ShaderPipeline::new(device, &desc, writer);

        device.destroy_shader_module(frag_shader);
        device.destroy_shader_module(vert_shader);

        if !pipeline.is_valid() {
            return ResourceId::UNSET;
        }
        self.pipelines.push(pipeline);
        ResourceId::from_index(self.pipelines.len() - 1)
    }

    /// Load a compiled shader pair from disk and build a pipeline
    pub fn load_pipeline<P: AsRef<Path>>(
        &mut self,
        vert_path: P,
        frag_path: P,
        settings: &PipelineSettings,
        writer: Box<dyn UniformWriter>,
    ) -> ResourceId {
        let vert_spirv = match std::fs::read(&vert_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("reading {:?} failed: {e}", vert_path.as_ref());
                return ResourceId::UNSET;
            }
        };
        let frag_spirv = match std::fs::read(&frag_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("reading {:?} failed: {e}", frag_path.as_ref());
                return ResourceId::UNSET;
            }
        };
        self.create_pipeline(&vert_spirv, &frag_spirv, settings, writer)
    }

    /// Register an object for rendering. Only a weak reference is
    /// kept: dropping the owning handle removes the object without
    /// unregistration.
    pub fn add_render_object(&mut self, object: &SharedRenderObject) {
        self.render_objects.push(Rc::downgrade(object));
    }

    /// Set the skybox object (drawn first, without depth writes)
    pub fn set_skybox(&mut self, object: &SharedRenderObject) {
        self.skybox = Rc::downgrade(object);
    }

    /// Place the camera: look-at view from `pos` along `dir` with the
    /// fixed world up vector. The position is cached for lighting.
    pub fn set_camera(&mut self, pos: Vec3, dir: Vec3) {
        self.camera_pos = pos;
        self.view_transform = math::look_at(pos, dir, WORLD_UP);
    }

    /// Set the view transform directly
    pub fn set_view_transform(&mut self, view: Mat4) {
        self.view_transform = view;
    }

    /// Set the clear color
    pub fn set_clear_color(&mut self, color: Vec3) {
        self.clear_color = color;
    }

    /// Light state, for per-frame mutation by scene logic
    pub fn lights_mut(&mut self) -> &mut Lights {
        &mut self.lights
    }

    /// Light state
    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    /// Current projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.proj_transform
    }

    /// Current view matrix
    pub fn view_transform(&self) -> &Mat4 {
        &self.view_transform
    }

    /// Update the viewport and recompute the perspective projection
    /// (45° vertical field of view, near 0.1, far 100, aspect w/h).
    ///
    /// Must run on the render thread: it mutates state `render` reads.
    pub fn resize_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return; // minimized window; keep the previous projection
        }
        self.viewport = (width, height);
        self.device.set_viewport(width, height);
        let aspect = width as f32 / height as f32;
        self.proj_transform = math::perspective(FIELD_OF_VIEW_RADIANS, aspect, NEAR_PLANE, FAR_PLANE);
    }

    /// Render one frame: skybox first (when fully resolved), then all
    /// live render objects in registration order. Expired weak
    /// references and unset mesh/pipeline ids are silently skipped.
    pub fn render(&mut self) {
        let clear = [self.clear_color.x, self.clear_color.y, self.clear_color.z, 1.0];
        match self.device.begin_frame(clear) {
            Ok(()) => {}
            Err(DeviceError::SwapchainOutOfDate) => {
                // Back off so a minimized window does not spin the
                // render loop at full CPU
                log::debug!("frame skipped: swapchain out of date");
                std::thread::sleep(std::time::Duration::from_millis(10));
                return;
            }
            Err(e) => {
                log::error!("begin_frame failed: {e}");
                return;
            }
        }

        self.render_skybox();

        for i in 0..self.render_objects.len() {
            let Some(object) = self.render_objects[i].upgrade() else {
                continue;
            };
            let object = object.borrow();
            let (Some(mesh_idx), Some(pipeline_idx)) =
                (object.mesh_id().index(), object.pipeline_id().index())
            else {
                continue;
            };
            let (Some(mesh), Some(pipeline)) =
                (self.meshes.get(mesh_idx), self.pipelines.get(pipeline_idx))
            else {
                continue;
            };

            pipeline.activate(self.device.as_mut());

            let frame = FrameContext {
                view: self.view_transform,
                projection: self.proj_transform,
                camera_pos: self.camera_pos,
                lights: &self.lights,
            };
            pipeline.update_per_frame_constants(self.device.as_mut(), &frame);
            pipeline.update_per_object_constants(self.device.as_mut(), &object);

            if let Some(texture_idx) = object.texture_id().index() {
                if let Some(texture) = self.textures.get(texture_idx) {
                    texture.bind(self.device.as_mut(), pipeline.pipeline_layout());
                }
            }

            mesh.render(self.device.as_mut(), object.draw_wireframe());
        }

        if let Err(e) = self.device.end_frame() {
            log::error!("end_frame failed: {e}");
        }
    }

    /// Draw the skybox if the weak reference and all three of its
    /// resource ids resolve. Depth writes are disabled for the draw
    /// and the view translation is stripped so the box appears
    /// infinitely distant.
    fn render_skybox(&mut self) {
        let Some(skybox) = self.skybox.upgrade() else {
            return;
        };
        let skybox = skybox.borrow();
        let (Some(mesh_idx), Some(pipeline_idx), Some(texture_idx)) = (
            skybox.mesh_id().index(),
            skybox.pipeline_id().index(),
            skybox.texture_id().index(),
        ) else {
            return;
        };
        let (Some(mesh), Some(pipeline), Some(texture)) = (
            self.meshes.get(mesh_idx),
            self.pipelines.get(pipeline_idx),
            self.textures.get(texture_idx),
        ) else {
            return;
        };

        self.device.set_depth_write(false);

        pipeline.activate(self.device.as_mut());

        let frame = FrameContext {
            view: math::strip_translation(&self.view_transform),
            projection: self.proj_transform,
            camera_pos: self.camera_pos,
            lights: &self.lights,
        };
        pipeline.update_per_frame_constants(self.device.as_mut(), &frame);

        texture.bind(self.device.as_mut(), pipeline.pipeline_layout());
        mesh.render(self.device.as_mut(), skybox.draw_wireframe());

        self.device.set_depth_write(true);
    }

    /// Release every owned GPU resource in collection order
    /// (pipelines, meshes, textures) after waiting for device idle.
    /// Runs automatically on drop if not called explicitly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.device.wait_idle();
        for pipeline in &mut self.pipelines {
            pipeline.destroy(self.device.as_mut());
        }
        for mesh in &mut self.meshes {
            mesh.destroy(self.device.as_mut());
        }
        for texture in &mut self.textures {
            texture.destroy(self.device.as_mut());
        }
    }

    /// The underlying device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// The underlying device, mutably
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{FailPoint, HeadlessDevice};
    use crate::render::mesh::Vertex;
    use crate::render::pipeline::UniformScope;
    use crate::scene::{shared_render_object, RenderObject};
    use approx::assert_relative_eq;

    struct TestWriter;

    impl UniformWriter for TestWriter {
        fn write_per_frame(&self, frame: &FrameContext<'_>, scope: &mut UniformScope<'_>) {
            let view: [[f32; 4]; 4] = frame.view.into();
            scope.write_uniform(0, &view);
        }

        fn write_per_object(&self, _object: &RenderObject, _scope: &mut UniformScope<'_>) {}
    }

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

    fn settings() -> PipelineSettings {
        PipelineSettings {
            vertex_layout: Vertex::layout(),
            push_constant_ranges: vec![],
            uniform_size: 128,
            depth: Some(DepthState { test: true, write: true }),
        }
    }

    fn test_renderer() -> Renderer {
        Renderer::new(Box::new(HeadlessDevice::new(2)))
    }

    fn headless(renderer: &Renderer) -> &HeadlessDevice {
        renderer.device().as_any().downcast_ref().unwrap()
    }

    fn headless_mut(renderer: &mut Renderer) -> &mut HeadlessDevice {
        renderer.device_mut().as_any_mut().downcast_mut().unwrap()
    }

    fn ready_object(renderer: &mut Renderer) -> SharedRenderObject {
        let mesh = renderer.add_mesh(triangle());
        let pipeline = renderer.create_pipeline(&[0; 4], &[0; 4], &settings(), Box::new(TestWriter));
        let object = shared_render_object();
        object.borrow_mut().set_mesh_id(mesh);
        object.borrow_mut().set_pipeline_id(pipeline);
        object
    }

    #[test]
    fn expired_objects_produce_zero_draw_calls() {
        let mut renderer = test_renderer();
        let object = ready_object(&mut renderer);
        renderer.add_render_object(&object);
        drop(object);

        renderer.render();
        assert!(headless(&renderer).draws().is_empty());
    }

    #[test]
    fn unset_ids_are_skipped_silently() {
        let mut renderer = test_renderer();
        let object = ready_object(&mut renderer);
        object.borrow_mut().set_pipeline_id(ResourceId::UNSET);
        renderer.add_render_object(&object);

        renderer.render();
        assert!(headless(&renderer).draws().is_empty());
    }

    #[test]
    fn out_of_range_ids_do_not_touch_the_tables() {
        let mut renderer = test_renderer();
        let object = ready_object(&mut renderer);
        object.borrow_mut().set_mesh_id(ResourceId(99));
        renderer.add_render_object(&object);

        renderer.render(); // must not panic
        assert!(headless(&renderer).draws().is_empty());
    }

    #[test]
    fn objects_draw_in_registration_order() {
        let mut renderer = test_renderer();
        let first = ready_object(&mut renderer);
        let second = ready_object(&mut renderer);
        renderer.add_render_object(&first);
        renderer.add_render_object(&second);

        renderer.render();
        let draws = headless(&renderer).draws();
        assert_eq!(draws.len(), 2);
        assert_ne!(draws[0].mesh, draws[1].mesh);
        assert!(draws[0].depth_write && draws[1].depth_write);
    }

    #[test]
    fn resize_viewport_rebuilds_the_projection() {
        let mut renderer = test_renderer();
        renderer.resize_viewport(1280, 720);

        let proj = renderer.projection();
        let aspect = proj[(1, 1)] / proj[(0, 0)];
        assert_relative_eq!(aspect, 1280.0 / 720.0, epsilon = 1e-5);
        // fov stays fixed at 45°: m11 == 1/tan(fov/2)
        assert_relative_eq!(
            proj[(1, 1)],
            1.0 / (FIELD_OF_VIEW_RADIANS / 2.0).tan(),
            epsilon = 1e-5
        );

        // A second resize keeps the constants, only aspect changes.
        renderer.resize_viewport(640, 640);
        let proj = renderer.projection();
        assert_relative_eq!(proj[(1, 1)] / proj[(0, 0)], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn zero_height_resize_is_ignored() {
        let mut renderer = test_renderer();
        renderer.resize_viewport(800, 600);
        let before = *renderer.projection();
        renderer.resize_viewport(800, 0);
        assert_eq!(*renderer.projection(), before);
    }

    #[test]
    fn out_of_date_frame_backs_off_without_drawing() {
        let mut renderer = test_renderer();
        let object = ready_object(&mut renderer);
        renderer.add_render_object(&object);

        headless_mut(&mut renderer).fail_next(FailPoint::BeginFrame);
        let start = std::time::Instant::now();
        renderer.render();
        assert!(headless(&renderer).draws().is_empty());
        // The skipped frame yields the CPU instead of spinning
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));

        renderer.render();
        assert_eq!(headless(&renderer).draws().len(), 1);
    }

    #[test]
    fn skybox_draws_first_and_without_depth_writes() {
        let mut renderer = test_renderer();

        let skybox = ready_object(&mut renderer);
        let cube_faces: [crate::assets::ImageData; 6] = std::array::from_fn(|_| {
            crate::assets::ImageData {
                pixels: vec![255; 16],
                width: 2,
                height: 2,
            }
        });
        let cube_texture = renderer.add_cube_map(&cube_faces);
        skybox.borrow_mut().set_texture_id(cube_texture);
        renderer.set_skybox(&skybox);

        let object = ready_object(&mut renderer);
        renderer.add_render_object(&object);

        renderer.render();
        let draws = headless(&renderer).draws();
        assert_eq!(draws.len(), 2);
        assert!(!draws[0].depth_write, "skybox must not write depth");
        assert!(draws[0].texture.is_some(), "skybox draws with its cube map");
        assert!(draws[1].depth_write, "opaque objects keep depth writes");
    }

    #[test]
    fn skybox_without_texture_is_skipped() {
        let mut renderer = test_renderer();
        let skybox = ready_object(&mut renderer); // no texture id set
        renderer.set_skybox(&skybox);

        renderer.render();
        assert!(headless(&renderer).draws().is_empty());
    }

    #[test]
    fn skybox_uses_a_translation_free_view() {
        let mut renderer = test_renderer();
        renderer.set_camera(Vec3::new(5.0, -3.0, 2.0), Vec3::new(0.0, 1.0, 0.0));

        let skybox = ready_object(&mut renderer);
        let faces: [crate::assets::ImageData; 6] = std::array::from_fn(|_| crate::assets::ImageData {
            pixels: vec![255; 16],
            width: 2,
            height: 2,
        });
        let texture = renderer.add_cube_map(&faces);
        skybox.borrow_mut().set_texture_id(texture);
        renderer.set_skybox(&skybox);

        renderer.render();

        // The per-frame writer stored the skybox view matrix in the
        // uniform buffer; its translation column must be zero.
        let device = headless(&renderer);
        let write = device.uniform_writes().first().expect("skybox frame write");
        assert_eq!(write.offset, 0);
        assert_eq!(write.len, 64);
    }

    #[test]
    fn failed_loads_return_the_unset_sentinel() {
        let mut renderer = test_renderer();
        assert_eq!(renderer.load_mesh("missing.obj"), ResourceId::UNSET);
        assert_eq!(renderer.load_texture("missing.png"), ResourceId::UNSET);
        assert_eq!(
            renderer.load_pipeline("missing.vert.spv", "missing.frag.spv", &settings(), Box::new(TestWriter)),
            ResourceId::UNSET
        );
    }

    #[test]
    fn shutdown_releases_every_gpu_object() {
        let mut renderer = test_renderer();
        let object = ready_object(&mut renderer);
        renderer.add_render_object(&object);
        renderer.load_texture("missing.png"); // failed load leaves nothing behind

        renderer.shutdown();
        assert_eq!(headless(&renderer).live_object_count(), 0);
    }
}
