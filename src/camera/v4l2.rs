//! V4L2 webcam capture
//!
//! Opens the device synchronously (so permission problems surface to the
//! caller), negotiates MJPEG or YUYV, then streams from a memory-mapped buffer
//! ring on the session's worker thread.

use std::time::Duration;

use image::{ImageFormat, RgbImage};
use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use super::{CameraBackend, CameraSession, Frame, FrameSource};
use crate::error::CameraError;

/// Number of memory-mapped capture buffers
const BUFFER_COUNT: u32 = 4;

/// Longest a dequeue may block, so a stalled camera can still be stopped
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Formats we can decode, in order of preference
const PREFERRED_FOURCCS: [&[u8; 4]; 2] = [b"MJPG", b"YUYV"];

/// Opens V4L2 devices such as `/dev/video0`
#[derive(Debug, Clone)]
pub struct V4lBackend {
    device_path: String,
    width: u32,
    height: u32,
}

impl V4lBackend {
    pub fn new(device_path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            device_path: device_path.into(),
            width,
            height,
        }
    }
}

impl CameraBackend for V4lBackend {
    fn open(&self) -> Result<CameraSession, CameraError> {
        let path = self.device_path.as_str();
        let device = Device::with_path(path).map_err(|e| CameraError::from_io(path, e))?;

        let label = device
            .query_caps()
            .map(|caps| caps.card)
            .unwrap_or_else(|_| path.to_string());

        let format = negotiate_format(&device, self.width, self.height)?;

        info!(
            device = path,
            card = %label,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "Opened V4L2 device"
        );

        CameraSession::spawn(label, move || V4lSource::start(device, format))
    }
}

/// Ask the driver for each decodable format in turn and keep the first one it accepts
fn negotiate_format(device: &Device, width: u32, height: u32) -> Result<Format, CameraError> {
    let current = device
        .format()
        .map_err(|e| CameraError::Backend(format!("failed to query format: {}", e)))?;

    for fourcc in PREFERRED_FOURCCS {
        let wanted = FourCC::new(fourcc);
        let mut requested = current;
        requested.width = width;
        requested.height = height;
        requested.fourcc = wanted;

        match device.set_format(&requested) {
            Ok(applied) if applied.fourcc == wanted => return Ok(applied),
            Ok(applied) => {
                warn!(wanted = %wanted, got = %applied.fourcc, "Driver substituted pixel format");
            }
            Err(e) => warn!(fourcc = %wanted, error = %e, "Could not set format"),
        }
    }

    if is_decodable(current.fourcc) {
        return Ok(current);
    }
    Err(CameraError::UnsupportedFormat(current.fourcc.to_string()))
}

fn is_decodable(fourcc: FourCC) -> bool {
    PREFERRED_FOURCCS.iter().any(|f| FourCC::new(f) == fourcc)
}

struct V4lSource {
    // Declared before the device so buffers are unmapped first
    stream: MmapStream<'static>,
    format: Format,
    _device: Device,
}

impl V4lSource {
    fn start(device: Device, format: Format) -> Result<Self, CameraError> {
        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::Backend(format!("failed to create buffer stream: {}", e)))?;
        stream.set_timeout(DEQUEUE_TIMEOUT);
        info!("V4L2 capture stream started");
        Ok(Self {
            stream,
            format,
            _device: device,
        })
    }
}

impl FrameSource for V4lSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Backend(format!("dequeue failed: {}", e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        let image = if self.format.fourcc == FourCC::new(b"MJPG") {
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| CameraError::Backend(format!("corrupt MJPEG frame: {}", e)))?
                .to_rgb8()
        } else if self.format.fourcc == FourCC::new(b"YUYV") {
            yuyv_to_rgb(data, self.format.width, self.format.height, self.format.stride)?
        } else {
            return Err(CameraError::UnsupportedFormat(self.format.fourcc.to_string()));
        };

        Ok(Frame {
            image,
            sequence: meta.sequence,
        })
    }
}

/// Convert packed YUYV 4:2:2 to RGB. Two pixels share one chroma pair:
/// `Y0 U Y1 V`.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Result<RgbImage, CameraError> {
    let stride = (if stride == 0 { width * 2 } else { stride }) as usize;
    let needed = stride * height.saturating_sub(1) as usize + width as usize * 2;
    if data.len() < needed {
        return Err(CameraError::Backend(format!(
            "short YUYV frame: {} bytes, expected {}",
            data.len(),
            needed
        )));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + width as usize * 2];
        for x in 0..width as usize {
            let base = (x & !1) * 2;
            let luma = if x & 1 == 0 { row[base] } else { row[base + 2] };
            let (r, g, b) = yuv_to_rgb(luma, row[base + 1], row[base + 3]);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CameraError::Backend("YUYV buffer size mismatch".to_string()))
}

/// Convert YUV (BT.601) to RGB
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

    (r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequeue_timeout_is_bounded() {
        // Stopping a session waits out at most one dequeue
        assert!(DEQUEUE_TIMEOUT > Duration::ZERO);
        assert!(DEQUEUE_TIMEOUT <= Duration::from_secs(1));
    }

    #[test]
    fn test_neutral_chroma_is_gray() {
        assert_eq!(yuv_to_rgb(128, 128, 128), (128, 128, 128));
        assert_eq!(yuv_to_rgb(0, 128, 128), (0, 0, 0));
        assert_eq!(yuv_to_rgb(255, 128, 128), (255, 255, 255));
    }

    #[test]
    fn test_yuyv_frame_conversion() {
        // 2x2 frame: top row white, bottom row black, neutral chroma
        let data = [255, 128, 255, 128, 0, 128, 0, 128];
        let img = yuyv_to_rgb(&data, 2, 2, 4).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_yuyv_honors_padded_stride() {
        // 2x2 frame with 2 bytes of row padding
        let data = [10, 128, 10, 128, 99, 99, 20, 128, 20, 128, 99, 99];
        let img = yuyv_to_rgb(&data, 2, 2, 6).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [10, 10, 10]);
        assert_eq!(img.get_pixel(0, 1).0, [20, 20, 20]);
    }

    #[test]
    fn test_short_yuyv_frame_is_rejected() {
        let data = [0u8; 6];
        assert!(yuyv_to_rgb(&data, 2, 2, 4).is_err());
    }

    #[test]
    fn test_decodable_formats() {
        assert!(is_decodable(FourCC::new(b"MJPG")));
        assert!(is_decodable(FourCC::new(b"YUYV")));
        assert!(!is_decodable(FourCC::new(b"NV12")));
    }
}
