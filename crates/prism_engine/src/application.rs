//! Application lifecycle and the two-thread render loop
//!
//! The main thread owns the GLFW window and pumps the event loop; a
//! dedicated render thread owns the renderer and the scene. The two
//! communicate through a lossy latest-value slot for resize events
//! and an atomic stop flag, so neither thread ever blocks on the
//! other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use glfw::{Action, Key, WindowEvent};
use thiserror::Error;

use crate::config::AppConfig;
use crate::foundation::channel::LatestSlot;
use crate::foundation::math::Vec3;
use crate::foundation::time::Timer;
use crate::render::vulkan::{VulkanDevice, VulkanError};
use crate::render::Renderer;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Window system failure
    #[error("window error: {0}")]
    Window(String),

    /// Graphics device failure
    #[error(transparent)]
    Device(#[from] VulkanError),

    /// Scene construction failure
    #[error("scene error: {0}")]
    Scene(String),

    /// The render thread terminated abnormally
    #[error("render thread error: {0}")]
    RenderThread(String),
}

/// A scene drives per-frame logic on the render thread
pub trait Scene {
    /// Advance the scene by `dt` seconds. Runs once per frame, before
    /// the renderer draws.
    fn update(&mut self, dt: f32, renderer: &mut Renderer);
}

/// Owns the window and runs the event/render loop pair
pub struct Application {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    config: AppConfig,
}

impl Application {
    /// Initialize GLFW and create the window (no client API; the
    /// Vulkan device brings its own surface)
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| AppError::Window(format!("GLFW initialization failed: {e}")))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(
                config.window.width,
                config.window.height,
                &config.window.title,
                glfw::WindowMode::Windowed,
            )
            .ok_or_else(|| AppError::Window("window creation failed".to_string()))?;

        window.set_key_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_close_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            config,
        })
    }

    /// Run until the window closes or the render thread stops.
    ///
    /// The Vulkan device is created here, on the main thread, because
    /// surface creation needs the window; it is then moved to the
    /// render thread along with the scene factory. The factory runs
    /// on the render thread so scenes are free to use non-`Send`
    /// state.
    pub fn run<S, F>(mut self, scene_factory: F) -> Result<(), AppError>
    where
        S: Scene,
        F: FnOnce(&mut Renderer) -> Result<S, AppError> + Send + 'static,
    {
        let device = VulkanDevice::new(
            &self.glfw,
            &mut self.window,
            &self.config.window.title,
            self.config.renderer.frames_in_flight,
        )?;

        let resize_slot: Arc<LatestSlot<(u32, u32)>> = Arc::new(LatestSlot::new());
        let stop = Arc::new(AtomicBool::new(false));

        let (fb_width, fb_height) = self.window.get_framebuffer_size();
        let clear = self.config.renderer.clear_color;

        let thread_slot = Arc::clone(&resize_slot);
        let thread_stop = Arc::clone(&stop);
        let render_thread = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || -> Result<(), AppError> {
                let mut renderer = Renderer::new(Box::new(device));
                renderer.set_clear_color(Vec3::new(clear[0], clear[1], clear[2]));
                renderer.resize_viewport(fb_width as u32, fb_height as u32);

                let mut scene = scene_factory(&mut renderer)?;
                let mut timer = Timer::new();

                while !thread_stop.load(Ordering::Relaxed) {
                    if let Some((width, height)) = thread_slot.take() {
                        renderer.resize_viewport(width, height);
                    }
                    timer.update();
                    scene.update(timer.delta_time(), &mut renderer);
                    renderer.render();
                }

                renderer.shutdown();
                Ok(())
            })
            .map_err(|e| AppError::RenderThread(format!("spawn failed: {e}")))?;

        while !self.window.should_close() && !render_thread.is_finished() {
            // Timeout so a dead render thread still ends the loop
            self.glfw.wait_events_timeout(0.1);
            for (_, event) in glfw::flush_messages(&self.events) {
                match event {
                    WindowEvent::FramebufferSize(width, height) => {
                        resize_slot.store((width as u32, height as u32));
                    }
                    WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                        self.window.set_should_close(true);
                    }
                    _ => {}
                }
            }
        }

        stop.store(true, Ordering::Relaxed);
        match render_thread.join() {
            Ok(result) => result,
            Err(_) => Err(AppError::RenderThread("render thread panicked".to_string())),
        }
    }
}
