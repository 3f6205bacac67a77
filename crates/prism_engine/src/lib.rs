//! # Prism Engine
//!
//! A small real-time 3D rendering engine with an explicit Vulkan
//! backend behind a backend-agnostic device seam.
//!
//! ## Features
//!
//! - **Two-thread loop**: window events on the main thread, scene
//!   update and drawing on a dedicated render thread
//! - **Backend seam**: the renderer speaks to a [`render::GraphicsDevice`]
//!   trait; Vulkan and a headless immediate-mode device implement it
//! - **Weak scene graph**: render objects are registered by weak
//!   reference and drop out of rendering when their owner drops them
//! - **Skybox pass**: cube-mapped skybox drawn first with depth
//!   writes disabled
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prism_engine::prelude::*;
//!
//! struct Empty;
//!
//! impl Scene for Empty {
//!     fn update(&mut self, _dt: f32, _renderer: &mut Renderer) {}
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     env_logger::init();
//!     let app = Application::new(AppConfig::default())?;
//!     app.run(|_renderer| Ok(Empty))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod application;
pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Commonly used types, re-exported for application crates
pub mod prelude {
    pub use crate::application::{AppError, Application, Scene};
    pub use crate::config::AppConfig;
    pub use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};
    pub use crate::render::{
        DepthState, FrameContext, Lights, MeshData, PipelineSettings, PointLight,
        PushConstantRange, Renderer, ShaderStages, SpotLight, UniformScope, UniformWriter, Vertex,
    };
    pub use crate::scene::{shared_render_object, RenderObject, SharedRenderObject};
}
