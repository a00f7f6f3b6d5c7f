//! The four-slot photo buffer and its preview mapping

use image::RgbImage;

use crate::camera::encode::{decode_jpeg, encode_jpeg, thumbnail};
use crate::camera::Frame;
use crate::error::CameraError;

/// Photos required for a registration
pub const PHOTO_COUNT: usize = 4;

/// One captured photo, ready for upload
#[derive(Debug, Clone)]
pub struct CapturedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    thumbnail: RgbImage,
}

impl CapturedImage {
    /// Encode a live frame at its native resolution
    pub fn from_frame(frame: &Frame, quality: u8) -> Result<Self, CameraError> {
        let jpeg = encode_jpeg(&frame.image, quality)?;
        Ok(Self {
            jpeg,
            width: frame.width(),
            height: frame.height(),
            thumbnail: thumbnail(&frame.image),
        })
    }

    /// Wrap an existing JPEG file's bytes
    pub fn from_jpeg(jpeg: Vec<u8>) -> Result<Self, CameraError> {
        let decoded = decode_jpeg(&jpeg)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            thumbnail: thumbnail(&decoded),
            jpeg,
        })
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn thumbnail(&self) -> &RgbImage {
        &self.thumbnail
    }
}

/// Upload file name for the photo at `index` (0-based)
pub fn upload_name(index: usize) -> String {
    format!("photo{}.jpg", index + 1)
}

/// Ordered photos, never more than [`PHOTO_COUNT`]
#[derive(Debug, Clone, Default)]
pub struct CapturedImageList {
    images: Vec<CapturedImage>,
}

impl CapturedImageList {
    pub fn new() -> Self {
        Self {
            images: Vec::with_capacity(PHOTO_COUNT),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.images.len() >= PHOTO_COUNT
    }

    /// Append a photo. Returns false, leaving the list as is, when full.
    pub fn push(&mut self, image: CapturedImage) -> bool {
        if self.is_full() {
            return false;
        }
        self.images.push(image);
        true
    }

    /// Remove the photo at `index`; later photos shift down one slot
    pub fn remove(&mut self, index: usize) -> Option<CapturedImage> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedImage> {
        self.images.iter()
    }

    /// (file name, JPEG bytes) pairs in upload order
    pub fn upload_parts(&self) -> Vec<PhotoPart> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, img)| PhotoPart {
                file_name: upload_name(i),
                bytes: img.jpeg.clone(),
            })
            .collect()
    }
}

/// A multipart `photos` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything the UI needs to draw one preview and its remove control
#[derive(Debug, Clone)]
pub struct PreviewTile<'a> {
    /// Current position; removing this tile removes this index
    pub index: usize,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub thumbnail: &'a RgbImage,
}

/// Map the list to preview tiles in list order. Recomputed on every draw,
/// so each tile's index always matches the list as it is now.
pub fn render_previews(list: &CapturedImageList) -> Vec<PreviewTile<'_>> {
    list.images
        .iter()
        .enumerate()
        .map(|(index, img)| PreviewTile {
            index,
            file_name: upload_name(index),
            width: img.width,
            height: img.height,
            size_bytes: img.jpeg.len(),
            thumbnail: &img.thumbnail,
        })
        .collect()
}
