//! Camera sessions
//!
//! A session owns a capture worker thread that keeps publishing the most
//! recent decoded frame. The UI samples the latest frame for the live view and
//! the capture action encodes it on demand.

pub mod encode;
pub mod v4l2;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbImage;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::CameraError;

pub use v4l2::V4lBackend;

/// One decoded video frame at the device's native resolution
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Driver sequence number
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Something that produces frames, one blocking call at a time
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Opens camera sessions
pub trait CameraBackend {
    /// Acquire the device and start streaming.
    ///
    /// Fails synchronously when the device cannot be opened, so callers can
    /// surface permission problems right away.
    fn open(&self) -> Result<CameraSession, CameraError>;
}

/// A live capture stream
pub struct CameraSession {
    label: String,
    frames: watch::Receiver<Option<Arc<Frame>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CameraSession {
    /// Start a worker thread that builds its source with `open_source` and
    /// then publishes frames until the session is stopped.
    ///
    /// Returns once the source is built. If building it fails, the worker has
    /// already exited and the error is returned here.
    pub fn spawn<S, F>(label: impl Into<String>, open_source: F) -> Result<Self, CameraError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, CameraError> + Send + 'static,
    {
        let label = label.into();
        let (sender, frames) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));

        let (started_tx, started_rx) = mpsc::sync_channel(1);

        let worker_running = running.clone();
        let worker_label = label.clone();
        let worker = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || match open_source() {
                Ok(source) => {
                    let _ = started_tx.send(Ok(()));
                    capture_loop(&worker_label, source, sender, worker_running);
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                }
            })
            .map_err(|e| CameraError::Backend(format!("could not spawn capture thread: {}", e)))?;

        let started = started_rx
            .recv()
            .unwrap_or_else(|_| Err(CameraError::Backend("capture thread exited during startup".to_string())));
        if let Err(e) = started {
            error!(camera = %label, error = %e, "Failed to start capture stream");
            let _ = worker.join();
            return Err(e);
        }

        info!(camera = %label, "Camera session started");
        Ok(Self {
            label,
            frames,
            running,
            worker: Some(worker),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The most recent frame, if the worker has delivered one
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    /// Stop the worker and wait for it to release the device
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(()) => info!(camera = %self.label, "Camera session stopped"),
                Err(_) => warn!(camera = %self.label, "Capture thread panicked"),
            }
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        // Don't wait for the thread in drop; it exits on its next frame
        self.running.store(false, Ordering::SeqCst);
    }
}

fn capture_loop<S: FrameSource>(
    label: &str,
    mut source: S,
    sender: watch::Sender<Option<Arc<Frame>>>,
    running: Arc<AtomicBool>,
) {
    let mut failures: u32 = 0;

    while running.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                if frame.sequence % 120 == 0 {
                    debug!(
                        camera = label,
                        sequence = frame.sequence,
                        width = frame.width(),
                        height = frame.height(),
                        "Frame captured"
                    );
                }
                sender.send_replace(Some(Arc::new(frame)));
            }
            Err(e) => {
                failures += 1;
                if failures % 30 == 1 {
                    warn!(camera = label, error = %e, failures, "Failed to capture frame");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    debug!(camera = label, "Capture loop ended");
}
