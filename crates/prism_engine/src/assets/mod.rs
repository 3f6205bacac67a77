//! Asset loading collaborators
//!
//! External services returning CPU-side mesh and image data. All
//! failures surface as [`AssetError`] values; callers decide whether
//! to proceed without the resource.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::{load_image, ImageData};
pub use obj_loader::load_obj;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// File parsed but produced no usable data
    #[error("Invalid asset: {0}")]
    Invalid(String),
}
