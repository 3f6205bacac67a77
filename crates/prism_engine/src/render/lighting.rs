//! Light state owned by the renderer
//!
//! A fixed small set: ambient color, three point lights, one
//! spotlight. Mutated between frames by scene logic, read once per
//! object per frame when uniform buffers are filled.

use crate::foundation::math::Vec3;

/// A point light with radial falloff
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    /// World-space position
    pub position: Vec3,
    /// Light color
    pub color: Vec3,
    /// Falloff radius
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            color: Vec3::zeros(),
            radius: 1.0,
        }
    }
}

/// A spotlight with an inner/outer cone
#[derive(Debug, Clone, Copy)]
pub struct SpotLight {
    /// World-space position
    pub position: Vec3,
    /// Normalized direction
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Inner cone radius (full intensity)
    pub inner_radius: f32,
    /// Outer cone radius (falls to zero)
    pub outer_radius: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
            color: Vec3::zeros(),
            inner_radius: 0.5,
            outer_radius: 1.0,
        }
    }
}

/// The renderer's complete light state
#[derive(Debug, Clone, Default)]
pub struct Lights {
    /// Global ambient color
    pub ambient_color: Vec3,
    /// Fixed set of point lights
    pub point_lights: [PointLight; 3],
    /// Single spotlight
    pub spotlight: SpotLight,
}
