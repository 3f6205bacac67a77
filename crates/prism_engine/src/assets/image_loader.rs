//! Image loading for texture data
//!
//! PNG decoding through the `image` crate, normalized to RGBA8 for
//! GPU upload.

use std::path::Path;

use crate::assets::AssetError;

/// Loaded image data ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major, 4 bytes per pixel
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Whether the image holds at least one pixel and the pixel
    /// buffer matches the stated dimensions (4 bytes per pixel).
    /// Uploads size GPU staging memory from width and height, so a
    /// short or oversized buffer must never pass.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// Size of the pixel data in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Load an image file and convert it to RGBA8.
///
/// Missing or corrupt files and zero-dimension images are reported as
/// errors, never panics.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageData, AssetError> {
    let path = path.as_ref();
    log::debug!("Loading image from {:?}", path);

    let img = image::open(path).map_err(|e| AssetError::Parse(format!("{path:?}: {e}")))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let data = ImageData {
        pixels: rgba.into_raw(),
        width,
        height,
    };
    if !data.is_valid() {
        return Err(AssetError::Invalid(format!(
            "{path:?}: zero-dimension image"
        )));
    }

    log::debug!("Loaded image {}x{} from {:?}", width, height, path);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_pixel_buffer_is_invalid() {
        let data = ImageData {
            pixels: vec![255; 8],
            width: 4,
            height: 4,
        };
        assert!(!data.is_valid());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_image("definitely/not/a/real/file.png");
        assert!(result.is_err());
    }

    #[test]
    fn png_round_trips_to_rgba() {
        let dir = std::env::temp_dir().join("prism_image_loader_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pixel.png");

        let mut img = image::RgbaImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 1, image::Rgba([0, 0, 255, 255]));
        img.save(&path).unwrap();

        let data = load_image(&path).unwrap();
        assert_eq!(data.width, 2);
        assert_eq!(data.height, 2);
        assert_eq!(data.byte_size(), 2 * 2 * 4);
        assert_eq!(&data.pixels[0..4], &[255, 0, 0, 255]);
    }
}
