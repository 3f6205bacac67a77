//! Foundation module - core utilities shared across the engine
//!
//! Math types, frame timing, and the lossy single-slot channel used to
//! hand resize events from the event thread to the render thread.

pub mod channel;
pub mod math;
pub mod time;

pub use channel::LatestSlot;
pub use math::{Mat3, Mat4, Vec2, Vec3, Vec4};
pub use time::Timer;
