//! GPU texture resources

use crate::assets::ImageData;
use crate::render::device::{GraphicsDevice, PipelineLayoutHandle, TextureHandle};

/// Kind tag distinguishing 2D textures from cube maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Plain 2D texture
    TwoD,
    /// Six-face cube map
    CubeMap,
}

/// A GPU texture.
///
/// Move-only: GPU handles cannot be silently duplicated, so the type
/// deliberately does not implement `Clone`. Moving transfers exclusive
/// ownership; [`Texture::destroy`] releases the image and nulls the
/// handle, after which the value is safely droppable but must not be
/// bound.
#[derive(Debug)]
pub struct Texture {
    handle: TextureHandle,
    kind: TextureKind,
}

impl Texture {
    /// Upload a 2D texture; fails on invalid image data
    pub fn new_2d(device: &mut dyn GraphicsDevice, image: &ImageData) -> Option<Self> {
        if !image.is_valid() {
            log::error!("Texture::new_2d with invalid image data");
            return None;
        }
        match device.create_texture_2d(image) {
            Ok(handle) => Some(Self {
                handle,
                kind: TextureKind::TwoD,
            }),
            Err(e) => {
                log::error!("2D texture upload failed: {e}");
                None
            }
        }
    }

    /// Upload a cube map from six faces (+X, -X, +Y, -Y, +Z, -Z); all
    /// faces must be valid and share the same dimensions
    pub fn new_cube(device: &mut dyn GraphicsDevice, faces: &[ImageData; 6]) -> Option<Self> {
        if faces.iter().any(|face| !face.is_valid()) {
            log::error!("Texture::new_cube with an invalid face image");
            return None;
        }
        let (width, height) = (faces[0].width, faces[0].height);
        if faces[1..]
            .iter()
            .any(|face| face.width != width || face.height != height)
        {
            log::error!("Texture::new_cube with mismatched face dimensions");
            return None;
        }
        match device.create_texture_cube(faces) {
            Ok(handle) => Some(Self {
                handle,
                kind: TextureKind::CubeMap,
            }),
            Err(e) => {
                log::error!("cube map upload failed: {e}");
                None
            }
        }
    }

    /// Whether the texture still owns a GPU image
    pub fn is_valid(&self) -> bool {
        !self.handle.is_null()
    }

    /// The texture kind tag
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Bind the texture for the following draws
    pub fn bind(&self, device: &mut dyn GraphicsDevice, layout: PipelineLayoutHandle) {
        if self.handle.is_null() {
            return;
        }
        device.bind_texture(layout, self.handle);
    }

    /// Release the GPU image and null the handle
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.handle.is_null() {
            device.destroy_texture(self.handle);
            self.handle = TextureHandle::NULL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessDevice;

    fn pixel(width: u32, height: u32) -> ImageData {
        ImageData {
            pixels: vec![255; (width * height * 4) as usize],
            width,
            height,
        }
    }

    #[test]
    fn invalid_image_is_rejected() {
        let mut device = HeadlessDevice::new(2);
        let empty = ImageData {
            pixels: Vec::new(),
            width: 0,
            height: 0,
        };
        assert!(Texture::new_2d(&mut device, &empty).is_none());
    }

    #[test]
    fn destroy_nulls_the_handle() {
        let mut device = HeadlessDevice::new(2);
        let mut texture = Texture::new_2d(&mut device, &pixel(2, 2)).unwrap();
        assert!(texture.is_valid());
        assert_eq!(texture.kind(), TextureKind::TwoD);

        texture.destroy(&mut device);
        assert!(!texture.is_valid());
        texture.destroy(&mut device); // safe no-op after nulling
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn cube_map_requires_all_faces_valid() {
        let mut device = HeadlessDevice::new(2);
        let mut faces: [ImageData; 6] = std::array::from_fn(|_| pixel(4, 4));
        faces[3] = ImageData {
            pixels: Vec::new(),
            width: 0,
            height: 0,
        };
        assert!(Texture::new_cube(&mut device, &faces).is_none());

        let faces: [ImageData; 6] = std::array::from_fn(|_| pixel(4, 4));
        let cube = Texture::new_cube(&mut device, &faces).unwrap();
        assert_eq!(cube.kind(), TextureKind::CubeMap);
    }

    #[test]
    fn mismatched_cube_face_dimensions_are_rejected() {
        // Six individually valid faces; one odd-sized face would
        // overflow a staging buffer sized from face zero.
        let mut device = HeadlessDevice::new(2);
        let mut faces: [ImageData; 6] = std::array::from_fn(|_| pixel(2, 2));
        faces[4] = pixel(64, 64);
        assert!(Texture::new_cube(&mut device, &faces).is_none());
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn truncated_face_buffer_is_rejected() {
        let mut device = HeadlessDevice::new(2);
        let mut faces: [ImageData; 6] = std::array::from_fn(|_| pixel(4, 4));
        faces[2].pixels.truncate(8);
        assert!(Texture::new_cube(&mut device, &faces).is_none());
    }
}
