//! Skybox demo
//!
//! Draws a pair of textured, lit meshes beneath a cube-mapped skybox.
//! Geometry and textures are generated in code so the demo runs
//! without an asset directory; shaders are compiled by the build
//! script when the Vulkan SDK is available.

use prism_engine::assets::ImageData;
use prism_engine::prelude::*;

/// Per-frame uniform block for the lit pipeline (std140 layout)
#[repr(C)]
#[derive(Clone, Copy)]
struct SceneUniform {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    ambient: [f32; 4],
    point_positions: [[f32; 4]; 3], // xyz position, w radius
    point_colors: [[f32; 4]; 3],
    spot_position: [f32; 4],  // xyz position, w cos(inner angle)
    spot_direction: [f32; 4], // xyz direction, w cos(outer angle)
    spot_color: [f32; 4],
}

unsafe impl bytemuck::Zeroable for SceneUniform {}
unsafe impl bytemuck::Pod for SceneUniform {}

/// Per-draw push constant block for the lit pipeline
#[repr(C)]
#[derive(Clone, Copy)]
struct ObjectPush {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

unsafe impl bytemuck::Zeroable for ObjectPush {}
unsafe impl bytemuck::Pod for ObjectPush {}

/// Per-frame uniform block for the skybox pipeline
#[repr(C)]
#[derive(Clone, Copy)]
struct SkyUniform {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
}

unsafe impl bytemuck::Zeroable for SkyUniform {}
unsafe impl bytemuck::Pod for SkyUniform {}

struct LitWriter;

impl UniformWriter for LitWriter {
    fn write_per_frame(&self, frame: &FrameContext<'_>, scope: &mut UniformScope<'_>) {
        let lights = frame.lights;
        let mut point_positions = [[0.0f32; 4]; 3];
        let mut point_colors = [[0.0f32; 4]; 3];
        for (i, light) in lights.point_lights.iter().enumerate() {
            point_positions[i] = [
                light.position.x,
                light.position.y,
                light.position.z,
                light.radius,
            ];
            point_colors[i] = [light.color.x, light.color.y, light.color.z, 0.0];
        }
        let spot = &lights.spotlight;

        let uniform = SceneUniform {
            view: frame.view.into(),
            proj: frame.projection.into(),
            camera_pos: [frame.camera_pos.x, frame.camera_pos.y, frame.camera_pos.z, 0.0],
            ambient: [
                lights.ambient_color.x,
                lights.ambient_color.y,
                lights.ambient_color.z,
                0.0,
            ],
            point_positions,
            point_colors,
            spot_position: [
                spot.position.x,
                spot.position.y,
                spot.position.z,
                spot.inner_radius.cos(),
            ],
            spot_direction: [
                spot.direction.x,
                spot.direction.y,
                spot.direction.z,
                spot.outer_radius.cos(),
            ],
            spot_color: [spot.color.x, spot.color.y, spot.color.z, 0.0],
        };
        scope.write_uniform(0, &uniform);
    }

    fn write_per_object(&self, object: &RenderObject, scope: &mut UniformScope<'_>) {
        let color = object.color();
        let push = ObjectPush {
            model: (*object.model_transform()).into(),
            color: [color.x, color.y, color.z, 1.0],
        };
        scope.push_constants(ShaderStages::VertexAndFragment, 0, &push);
    }
}

struct SkyboxWriter;

impl UniformWriter for SkyboxWriter {
    fn write_per_frame(&self, frame: &FrameContext<'_>, scope: &mut UniformScope<'_>) {
        let uniform = SkyUniform {
            view: frame.view.into(),
            proj: frame.projection.into(),
        };
        scope.write_uniform(0, &uniform);
    }

    fn write_per_object(&self, _object: &RenderObject, _scope: &mut UniformScope<'_>) {}
}

/// Axis-aligned unit cube centered at the origin. Inward winding puts
/// the visible side on the interior, which the skybox needs under
/// back-face culling.
fn cube_mesh(half: f32, inward: bool) -> MeshData {
    // face: (normal, tangent u, tangent v)
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (du, dv, tex) in [
            (-1.0, -1.0, [0.0, 0.0]),
            (1.0, -1.0, [1.0, 0.0]),
            (1.0, 1.0, [1.0, 1.0]),
            (-1.0, 1.0, [0.0, 1.0]),
        ] {
            let position = [
                (n[0] + u[0] * du + v[0] * dv) * half,
                (n[1] + u[1] * du + v[1] * dv) * half,
                (n[2] + u[2] * du + v[2] * dv) * half,
            ];
            let normal = if inward { [-n[0], -n[1], -n[2]] } else { n };
            vertices.push(Vertex::new(position, normal, tex));
        }
        if inward {
            indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        } else {
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }

    MeshData { vertices, indices }
}

/// Flat ground quad in the XY plane
fn ground_mesh(half: f32) -> MeshData {
    let vertices = vec![
        Vertex::new([-half, -half, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        Vertex::new([half, -half, 0.0], [0.0, 0.0, 1.0], [4.0, 0.0]),
        Vertex::new([half, half, 0.0], [0.0, 0.0, 1.0], [4.0, 4.0]),
        Vertex::new([-half, half, 0.0], [0.0, 0.0, 1.0], [0.0, 4.0]),
    ];
    let indices = vec![0, 1, 2, 0, 2, 3];
    MeshData { vertices, indices }
}

fn checkerboard_texture(size: u32) -> ImageData {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let cell = ((x / 8) + (y / 8)) % 2 == 0;
            let value = if cell { 220 } else { 80 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    ImageData {
        pixels,
        width: size,
        height: size,
    }
}

/// Vertical gradient faces standing in for a real sky
fn sky_faces(size: u32) -> [ImageData; 6] {
    let horizon = [170u8, 200, 230];
    let zenith = [60u8, 110, 200];
    let gradient = |t: f32| {
        [
            (horizon[0] as f32 + (zenith[0] as f32 - horizon[0] as f32) * t) as u8,
            (horizon[1] as f32 + (zenith[1] as f32 - horizon[1] as f32) * t) as u8,
            (horizon[2] as f32 + (zenith[2] as f32 - horizon[2] as f32) * t) as u8,
        ]
    };

    // +X, -X, +Y, -Y faces grade from horizon to zenith; +Z is all
    // zenith, -Z all horizon
    std::array::from_fn(|face| {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for _x in 0..size {
                let rgb = match face {
                    4 => gradient(1.0),
                    5 => gradient(0.0),
                    _ => gradient(1.0 - y as f32 / (size - 1) as f32),
                };
                pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }
        ImageData {
            pixels,
            width: size,
            height: size,
        }
    })
}

struct DemoScene {
    cube: SharedRenderObject,
    _ground: SharedRenderObject,
    _skybox: SharedRenderObject,
    angle: f32,
}

impl Scene for DemoScene {
    fn update(&mut self, dt: f32, renderer: &mut Renderer) {
        self.angle += dt * 0.6;

        let spin = Mat4::new_rotation(Vec3::z() * self.angle)
            * Mat4::new_rotation(Vec3::x() * self.angle * 0.4);
        let model = Mat4::new_translation(&Vec3::new(0.0, 0.0, 1.2)) * spin;
        self.cube.borrow_mut().set_model_transform(model);

        // Swing one point light in a circle around the cube
        let orbit = self.angle * 1.5;
        renderer.lights_mut().point_lights[0].position =
            Vec3::new(3.0 * orbit.cos(), 3.0 * orbit.sin(), 2.5);
    }
}

fn build_scene(renderer: &mut Renderer) -> Result<DemoScene, AppError> {
    let lit_settings = PipelineSettings {
        vertex_layout: Vertex::layout(),
        push_constant_ranges: vec![PushConstantRange {
            stages: ShaderStages::VertexAndFragment,
            offset: 0,
            size: std::mem::size_of::<ObjectPush>() as u32,
        }],
        uniform_size: std::mem::size_of::<SceneUniform>() as u64,
        depth: Some(DepthState {
            test: true,
            write: true,
        }),
    };
    let lit_pipeline = renderer.load_pipeline(
        "shaders/lit.vert.spv",
        "shaders/lit.frag.spv",
        &lit_settings,
        Box::new(LitWriter),
    );

    let skybox_settings = PipelineSettings {
        vertex_layout: Vertex::layout(),
        push_constant_ranges: vec![],
        uniform_size: std::mem::size_of::<SkyUniform>() as u64,
        depth: Some(DepthState {
            test: false,
            write: false,
        }),
    };
    let skybox_pipeline = renderer.load_pipeline(
        "shaders/skybox.vert.spv",
        "shaders/skybox.frag.spv",
        &skybox_settings,
        Box::new(SkyboxWriter),
    );

    if lit_pipeline.is_unset() || skybox_pipeline.is_unset() {
        return Err(AppError::Scene(
            "pipeline creation failed; were the shaders compiled?".to_string(),
        ));
    }

    let cube_mesh_id = renderer.add_mesh(cube_mesh(1.0, false));
    let ground_mesh_id = renderer.add_mesh(ground_mesh(8.0));
    let skybox_mesh_id = renderer.add_mesh(cube_mesh(1.0, true));
    let checker = renderer.add_texture(&checkerboard_texture(64));
    let sky = renderer.add_cube_map(&sky_faces(64));

    let cube = shared_render_object();
    {
        let mut object = cube.borrow_mut();
        object.set_mesh_id(cube_mesh_id);
        object.set_pipeline_id(lit_pipeline);
        object.set_texture_id(checker);
        object.set_color(Vec3::new(0.9, 0.6, 0.3));
    }
    renderer.add_render_object(&cube);

    let ground = shared_render_object();
    {
        let mut object = ground.borrow_mut();
        object.set_mesh_id(ground_mesh_id);
        object.set_pipeline_id(lit_pipeline);
        object.set_texture_id(checker);
        object.set_color(Vec3::new(0.5, 0.7, 0.5));
    }
    renderer.add_render_object(&ground);

    let skybox = shared_render_object();
    {
        let mut object = skybox.borrow_mut();
        object.set_mesh_id(skybox_mesh_id);
        object.set_pipeline_id(skybox_pipeline);
        object.set_texture_id(sky);
    }
    renderer.set_skybox(&skybox);

    let camera_pos = Vec3::new(5.0, -5.0, 3.0);
    renderer.set_camera(camera_pos, -camera_pos);

    let lights = renderer.lights_mut();
    lights.ambient_color = Vec3::new(0.12, 0.12, 0.15);
    lights.point_lights[0] = PointLight {
        position: Vec3::new(3.0, 0.0, 2.5),
        color: Vec3::new(1.0, 0.9, 0.8),
        radius: 10.0,
    };
    lights.point_lights[1] = PointLight {
        position: Vec3::new(-4.0, 2.0, 2.0),
        color: Vec3::new(0.3, 0.4, 0.9),
        radius: 12.0,
    };
    lights.point_lights[2] = PointLight {
        position: Vec3::new(0.0, -5.0, 4.0),
        color: Vec3::new(0.5, 0.9, 0.5),
        radius: 15.0,
    };
    lights.spotlight = SpotLight {
        position: Vec3::new(0.0, 0.0, 6.0),
        direction: Vec3::new(0.0, 0.0, -1.0),
        color: Vec3::new(1.0, 1.0, 0.9),
        inner_radius: 0.3,
        outer_radius: 0.5,
    };

    Ok(DemoScene {
        cube,
        _ground: ground,
        _skybox: skybox,
        angle: 0.0,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut config = AppConfig::load_or_default("skybox_demo.toml");
    if config.window.title == AppConfig::default().window.title {
        config.window.title = "skybox demo".to_string();
    }
    config.renderer.clear_color = [0.05, 0.05, 0.08];

    let app = Application::new(config)?;
    app.run(build_scene)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skybox_cube_winds_inward() {
        let outward = cube_mesh(1.0, false);
        let inward = cube_mesh(1.0, true);
        assert_eq!(outward.vertices.len(), 24);
        assert_eq!(outward.indices.len(), 36);
        // Same triangle, opposite winding
        assert_eq!(outward.indices[1], inward.indices[2]);
    }

    #[test]
    fn uniform_blocks_have_std140_sizes() {
        assert_eq!(std::mem::size_of::<SceneUniform>(), 304);
        assert_eq!(std::mem::size_of::<ObjectPush>(), 80);
        assert_eq!(std::mem::size_of::<SkyUniform>(), 128);
    }

    #[test]
    fn sky_faces_share_dimensions() {
        let faces = sky_faces(16);
        assert!(faces.iter().all(|f| f.width == 16 && f.height == 16));
        assert!(faces.iter().all(|f| f.is_valid()));
    }
}
