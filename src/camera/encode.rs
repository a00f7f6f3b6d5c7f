//! JPEG encoding and thumbnail helpers

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};

use crate::error::CameraError;

/// Longest edge of preview thumbnails, in pixels
pub const THUMBNAIL_EDGE: u32 = 64;

/// Encode an RGB frame as JPEG at its own resolution
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CameraError::Encode(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer)
}

/// Decode JPEG bytes, e.g. a photo loaded from disk
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, CameraError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| CameraError::Encode(format!("not a readable JPEG: {}", e)))
}

/// Downscale so the longest edge is at most [`THUMBNAIL_EDGE`], keeping aspect
pub fn thumbnail(image: &RgbImage) -> RgbImage {
    let (w, h) = (image.width().max(1), image.height().max(1));
    if w <= THUMBNAIL_EDGE && h <= THUMBNAIL_EDGE {
        return image.clone();
    }

    let (tw, th) = if w >= h {
        (THUMBNAIL_EDGE, (h * THUMBNAIL_EDGE / w).max(1))
    } else {
        ((w * THUMBNAIL_EDGE / h).max(1), THUMBNAIL_EDGE)
    };
    image::imageops::thumbnail(image, tw, th)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_jpeg_keeps_native_resolution() {
        let frame = RgbImage::from_pixel(320, 240, Rgb([30, 120, 200]));
        let jpeg = encode_jpeg(&frame, 90).unwrap();

        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_jpeg(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_jpeg(b"definitely not a jpeg"),
            Err(CameraError::Encode(_))
        ));
    }

    #[test]
    fn test_thumbnail_fits_edge() {
        let wide = RgbImage::new(640, 480);
        assert_eq!(thumbnail(&wide).dimensions(), (64, 48));

        let tall = RgbImage::new(480, 640);
        assert_eq!(thumbnail(&tall).dimensions(), (48, 64));

        let small = RgbImage::new(32, 16);
        assert_eq!(thumbnail(&small).dimensions(), (32, 16));
    }
}
