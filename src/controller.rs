//! Capture-and-register controller
//!
//! Owns the camera session, the four captured photos, the username field and
//! the user table. Every user action is a method here; the terminal front-end
//! only maps keys to these methods and draws what they expose.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::{Registration, Registry, UserRecord};
use crate::camera::{CameraBackend, CameraSession, Frame};
use crate::capture::{render_previews, CapturedImage, CapturedImageList, PreviewTile, PHOTO_COUNT};
use crate::error::{ApiError, CameraError, RegisterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Success,
    Error,
}

/// A message the user has to acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    fn success(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            message: message.into(),
        }
    }
}

/// Which actions are currently available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub open_camera: bool,
    pub capture: bool,
    pub submit: bool,
}

/// One row of the registered-users table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub username: String,
    /// Display label per image URL (its last path segment)
    pub images: Vec<String>,
}

/// A registration that passed validation and is ready to be sent.
///
/// Owns its data so it can be sent from a background task while the
/// controller keeps serving the UI.
#[derive(Debug)]
pub struct PendingSubmission {
    registration: Registration,
}

impl PendingSubmission {
    pub fn username(&self) -> &str {
        &self.registration.username
    }

    pub async fn send<R: Registry>(self, registry: R) -> Result<(), RegisterError> {
        registry
            .register(self.registration)
            .await
            .map_err(RegisterError::from)
    }
}

pub struct CaptureAndRegisterController<R: Registry, B: CameraBackend> {
    registry: R,
    backend: B,
    camera: Option<CameraSession>,
    images: CapturedImageList,
    username: String,
    jpeg_quality: u8,
    submitting: bool,
    users: Vec<UserRecord>,
    alert: Option<Alert>,
}

impl<R: Registry, B: CameraBackend> CaptureAndRegisterController<R, B> {
    pub fn new(registry: R, backend: B, jpeg_quality: u8) -> Self {
        Self {
            registry,
            backend,
            camera: None,
            images: CapturedImageList::new(),
            username: String::new(),
            jpeg_quality,
            submitting: false,
            users: Vec::new(),
            alert: None,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    // ----- camera -----

    /// Start the camera. Does nothing if a session is already live.
    pub fn open_camera(&mut self) -> Result<(), CameraError> {
        if self.camera.is_some() {
            return Ok(());
        }

        match self.backend.open() {
            Ok(session) => {
                info!(camera = session.label(), "Camera opened");
                self.camera = Some(session);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error accessing camera");
                self.alert = Some(Alert::error("Could not access webcam."));
                Err(e)
            }
        }
    }

    /// Release the camera if one is open
    pub fn stop_camera(&mut self) {
        if let Some(session) = self.camera.take() {
            session.stop();
        }
    }

    pub fn camera_live(&self) -> bool {
        self.camera.is_some()
    }

    pub fn camera_label(&self) -> Option<&str> {
        self.camera.as_ref().map(|s| s.label())
    }

    /// Latest frame for the live view
    pub fn live_frame(&self) -> Option<Arc<Frame>> {
        self.camera.as_ref().and_then(|s| s.latest_frame())
    }

    // ----- capture -----

    /// Grab the current live frame as the next photo.
    ///
    /// Returns `Ok(false)` when four photos are already held. Taking the
    /// fourth photo releases the camera.
    pub fn capture_frame(&mut self) -> Result<bool, CameraError> {
        if self.images.is_full() {
            return Ok(false);
        }

        let Some(frame) = self.live_frame() else {
            let message = if self.camera.is_some() {
                "Camera is not ready yet."
            } else {
                "Open the camera first."
            };
            self.alert = Some(Alert::error(message));
            return Err(CameraError::NotReady);
        };

        let image = match CapturedImage::from_frame(&frame, self.jpeg_quality) {
            Ok(image) => image,
            Err(e) => {
                error!(error = %e, "Failed to encode captured frame");
                self.alert = Some(Alert::error("Could not capture photo."));
                return Err(e);
            }
        };

        info!(
            sequence = frame.sequence,
            width = frame.width(),
            height = frame.height(),
            bytes = image.jpeg().len(),
            "Photo captured"
        );
        Ok(self.add_image(image))
    }

    /// Append an already encoded photo under the same rules as a capture
    pub fn add_image(&mut self, image: CapturedImage) -> bool {
        if !self.images.push(image) {
            return false;
        }
        if self.images.is_full() {
            self.stop_camera();
        }
        true
    }

    /// Drop the photo at `index`. Out-of-range indices are ignored.
    pub fn remove_frame(&mut self, index: usize) -> bool {
        let removed = self.images.remove(index).is_some();
        if removed {
            info!(index, remaining = self.images.len(), "Photo removed");
        }
        removed
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn render_previews(&self) -> Vec<PreviewTile<'_>> {
        render_previews(&self.images)
    }

    pub fn controls(&self) -> Controls {
        Controls {
            open_camera: self.camera.is_none(),
            capture: self.camera.is_some() && !self.images.is_full(),
            submit: self.images.len() == PHOTO_COUNT && !self.submitting,
        }
    }

    // ----- form -----

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn push_username_char(&mut self, c: char) {
        self.username.push(c);
    }

    pub fn pop_username_char(&mut self) {
        self.username.pop();
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Validate the form and snapshot it for sending. Disables submit until
    /// [`finish_submit`](Self::finish_submit) runs.
    pub fn begin_submit(&mut self) -> Result<PendingSubmission, RegisterError> {
        if self.submitting {
            self.alert = Some(Alert::error("A registration is already in progress."));
            return Err(RegisterError::SubmitInFlight);
        }

        let username = self.username.trim();
        if username.is_empty() {
            self.alert = Some(Alert::error("Please enter a username."));
            return Err(RegisterError::Validation);
        }

        if self.images.len() != PHOTO_COUNT {
            self.alert = Some(Alert::error(format!(
                "Capture {} photos before registering.",
                PHOTO_COUNT
            )));
            return Err(RegisterError::IncompletePhotos {
                expected: PHOTO_COUNT,
                actual: self.images.len(),
            });
        }

        let registration = Registration {
            username: username.to_string(),
            photos: self.images.upload_parts(),
        };
        self.submitting = true;
        info!(username = %registration.username, "Submitting registration");
        Ok(PendingSubmission { registration })
    }

    /// Apply the outcome of a sent registration.
    ///
    /// On success the form and photos are reset; the caller is expected to
    /// reload the user table. On failure nothing but the submit control
    /// changes, so the user can retry without re-capturing.
    pub fn finish_submit(&mut self, outcome: Result<(), RegisterError>) -> Result<(), RegisterError> {
        self.submitting = false;

        match outcome {
            Ok(()) => {
                self.alert = Some(Alert::success("User registered successfully!"));
                self.username.clear();
                self.images.clear();
                self.stop_camera();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                self.alert = Some(Alert::error("Error submitting form."));
                Err(e)
            }
        }
    }

    /// Validate, send and apply in one go, then refresh the user table
    pub async fn submit(&mut self) -> Result<(), RegisterError> {
        let pending = self.begin_submit()?;
        let outcome = pending.send(self.registry.clone()).await;
        self.finish_submit(outcome)?;
        self.load_user_table().await;
        Ok(())
    }

    // ----- user table -----

    /// Fetch the user list; returns whether the table was replaced
    pub async fn load_user_table(&mut self) -> bool {
        let result = self.registry.fetch_users().await;
        self.apply_user_table(result)
    }

    /// Replace the table on success. Failures are logged and leave the
    /// current table in place.
    pub fn apply_user_table(&mut self, result: Result<Vec<UserRecord>, ApiError>) -> bool {
        match result {
            Ok(users) => {
                info!(count = users.len(), "User table loaded");
                self.users = users;
                true
            }
            Err(e) => {
                warn!(error = %e, "Error fetching users");
                false
            }
        }
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn user_rows(&self) -> Vec<UserRow> {
        user_rows(&self.users)
    }

    // ----- alerts -----

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    /// Release the camera before exit
    pub fn shutdown(&mut self) {
        self.stop_camera();
    }
}

/// One row per user, one label per image URL
pub fn user_rows(users: &[UserRecord]) -> Vec<UserRow> {
    users
        .iter()
        .map(|user| UserRow {
            username: user.username.clone(),
            images: user.images.iter().map(|url| image_label(url)).collect(),
        })
        .collect()
}

fn image_label(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{FakeRegistry, Reply};
    use crate::camera::testing::{wait_for_frame, FakeBackend};
    use crate::capture::testing::tagged_image;

    type Controller = CaptureAndRegisterController<FakeRegistry, FakeBackend>;

    fn controller() -> Controller {
        CaptureAndRegisterController::new(FakeRegistry::default(), FakeBackend::default(), 90)
    }

    /// Open the camera and wait for its first frame
    fn open_ready(c: &mut Controller) {
        c.open_camera().unwrap();
        wait_for_frame(c.camera.as_ref().unwrap());
    }

    fn with_four_photos(c: &mut Controller) {
        for tag in 1..=4 {
            assert!(c.add_image(tagged_image(tag)));
        }
    }

    #[test]
    fn test_initial_controls() {
        let c = controller();
        assert_eq!(
            c.controls(),
            Controls {
                open_camera: true,
                capture: false,
                submit: false
            }
        );
        assert!(c.alert().is_none());
    }

    #[test]
    fn test_open_camera_enables_capture() {
        let mut c = controller();
        c.open_camera().unwrap();
        assert!(c.camera_live());
        assert_eq!(
            c.controls(),
            Controls {
                open_camera: false,
                capture: true,
                submit: false
            }
        );

        // A second open keeps the same session
        c.open_camera().unwrap();
        assert_eq!(c.backend.opened.load(std::sync::atomic::Ordering::SeqCst), 1);
        c.shutdown();
    }

    #[test]
    fn test_denied_camera_alerts_and_keeps_state() {
        let mut c = CaptureAndRegisterController::new(FakeRegistry::default(), FakeBackend::denying(), 90);
        let err = c.open_camera().unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(!c.camera_live());
        assert!(c.controls().open_camera);
        assert_eq!(c.alert().unwrap().message, "Could not access webcam.");

        // Retry after the user grants access
        c.backend.deny.store(false, std::sync::atomic::Ordering::SeqCst);
        c.dismiss_alert();
        c.open_camera().unwrap();
        assert!(c.camera_live());
        c.shutdown();
    }

    #[test]
    fn test_busy_camera_stream_alerts_and_keeps_state() {
        let mut c = CaptureAndRegisterController::new(FakeRegistry::default(), FakeBackend::busy(), 90);
        let err = c.open_camera().unwrap_err();
        assert!(matches!(err, CameraError::Backend(_)));
        assert!(!c.camera_live());
        assert!(c.controls().open_camera);
        assert!(!c.controls().capture);
        assert_eq!(c.alert().unwrap().message, "Could not access webcam.");

        // The other app lets go of the device
        c.backend.stream_fails.store(false, std::sync::atomic::Ordering::SeqCst);
        c.dismiss_alert();
        c.open_camera().unwrap();
        assert!(c.camera_live());
        c.shutdown();
    }

    #[test]
    fn test_stop_camera_without_session_is_noop() {
        let mut c = controller();
        c.stop_camera();
        assert!(c.controls().open_camera);
    }

    #[test]
    fn test_fourth_capture_stops_camera_and_enables_submit() {
        let mut c = controller();
        open_ready(&mut c);

        for n in 1..=3 {
            assert!(c.capture_frame().unwrap());
            assert_eq!(c.image_count(), n);
            assert!(c.controls().capture);
            assert!(!c.controls().submit);
        }

        assert!(c.capture_frame().unwrap());
        assert_eq!(c.image_count(), 4);
        assert!(!c.camera_live());
        assert_eq!(
            c.controls(),
            Controls {
                open_camera: true,
                capture: false,
                submit: true
            }
        );

        let (w, h) = c.images.iter().next().unwrap().dimensions();
        assert_eq!((w, h), (64, 48));
    }

    #[test]
    fn test_fifth_capture_is_noop() {
        let mut c = controller();
        with_four_photos(&mut c);
        open_ready(&mut c);

        assert!(!c.capture_frame().unwrap());
        assert_eq!(c.image_count(), 4);
        assert!(c.alert().is_none());
        c.shutdown();
    }

    #[test]
    fn test_capture_without_camera_alerts() {
        let mut c = controller();
        assert!(matches!(c.capture_frame(), Err(CameraError::NotReady)));
        assert_eq!(c.image_count(), 0);
        assert_eq!(c.alert().unwrap().kind, AlertKind::Error);
    }

    #[test]
    fn test_remove_recomputes_controls_and_order() {
        let mut c = controller();
        with_four_photos(&mut c);
        assert!(c.controls().submit);

        assert!(c.remove_frame(0));
        assert_eq!(c.image_count(), 3);
        assert!(!c.controls().submit);

        let tiles = c.render_previews();
        let names: Vec<_> = tiles.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, ["photo1.jpg", "photo2.jpg", "photo3.jpg"]);
        let shades: Vec<_> = tiles.iter().map(|t| t.thumbnail.get_pixel(0, 0).0[0]).collect();
        assert_eq!(shades, [2, 3, 4]);

        assert!(!c.remove_frame(7));
        assert_eq!(c.image_count(), 3);

        // Capture needs a live camera again; removal does not reopen it
        assert!(!c.controls().capture);
        open_ready(&mut c);
        assert!(c.controls().capture);
        c.shutdown();
    }

    #[tokio::test]
    async fn test_blank_username_is_rejected_without_request() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("   \t ");

        let err = c.submit().await.unwrap_err();
        assert!(matches!(err, RegisterError::Validation));
        assert_eq!(c.registry().register_calls(), 0);
        assert_eq!(c.alert().unwrap().message, "Please enter a username.");
        assert_eq!(c.image_count(), 4);
        assert!(c.controls().submit);
    }

    #[tokio::test]
    async fn test_incomplete_photos_are_rejected() {
        let mut c = controller();
        c.add_image(tagged_image(1));
        c.set_username("ada");

        let err = c.submit().await.unwrap_err();
        assert!(matches!(
            err,
            RegisterError::IncompletePhotos {
                expected: 4,
                actual: 1
            }
        ));
        assert_eq!(c.registry().register_calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_registration_resets_form() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("  ada  ");

        c.submit().await.unwrap();

        let sent = c.registry().registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].username, "ada");
        assert_eq!(sent[0].photos.len(), 4);
        assert_eq!(sent[0].photos[0].file_name, "photo1.jpg");

        assert_eq!(c.image_count(), 0);
        assert!(c.render_previews().is_empty());
        assert_eq!(c.username(), "");
        assert_eq!(
            c.controls(),
            Controls {
                open_camera: true,
                capture: false,
                submit: false
            }
        );
        assert_eq!(c.alert().unwrap().kind, AlertKind::Success);

        // Table was refreshed and shows the new user
        assert_eq!(c.registry().fetch_calls(), 1);
        assert_eq!(c.users().len(), 1);
        assert_eq!(c.user_rows()[0].username, "ada");
        assert_eq!(c.user_rows()[0].images[3], "photo4.jpg");
    }

    #[tokio::test]
    async fn test_server_error_keeps_captures() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("ada");
        c.registry().set_register_reply(Reply::Status(500));

        let err = c.submit().await.unwrap_err();
        assert!(matches!(err, RegisterError::Server { status: 500 }));
        assert_eq!(c.image_count(), 4);
        assert_eq!(c.username(), "ada");
        assert_eq!(c.alert().unwrap().kind, AlertKind::Error);
        assert!(c.controls().submit);
        assert_eq!(c.registry().fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_network_error_keeps_captures() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("ada");
        c.registry().set_register_reply(Reply::Malformed);

        let err = c.submit().await.unwrap_err();
        assert!(matches!(err, RegisterError::Network(_)));
        assert_eq!(c.image_count(), 4);
        assert_eq!(c.alert().unwrap().message, "Error submitting form.");
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("ada");

        let pending = c.begin_submit().unwrap();
        assert!(!c.controls().submit);
        assert!(matches!(c.begin_submit(), Err(RegisterError::SubmitInFlight)));

        let outcome = pending.send(c.registry().clone()).await;
        c.finish_submit(outcome).unwrap();
        assert_eq!(c.registry().register_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_submit_reenables_submit() {
        let mut c = controller();
        with_four_photos(&mut c);
        c.set_username("ada");
        c.registry().set_register_reply(Reply::Status(503));

        let pending = c.begin_submit().unwrap();
        let outcome = pending.send(c.registry().clone()).await;
        assert!(c.finish_submit(outcome).is_err());
        assert!(c.controls().submit);

        c.registry().set_register_reply(Reply::Ok);
        c.dismiss_alert();
        c.submit().await.unwrap();
        assert_eq!(c.registry().register_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_table_load_keeps_previous_rows() {
        let registry = FakeRegistry::with_users(vec![UserRecord {
            username: "grace".to_string(),
            images: vec!["http://host/photos/grace/photo1.jpg?v=2".to_string()],
        }]);
        let mut c = CaptureAndRegisterController::new(registry, FakeBackend::default(), 90);

        assert!(c.load_user_table().await);
        assert_eq!(c.user_rows()[0].images, vec!["photo1.jpg".to_string()]);

        c.registry().set_fetch_reply(Reply::Status(502));
        assert!(!c.load_user_table().await);
        assert_eq!(c.users().len(), 1);
        assert!(c.alert().is_none());
    }

    #[test]
    fn test_image_labels() {
        assert_eq!(image_label("/photos/ada/photo2.jpg"), "photo2.jpg");
        assert_eq!(image_label("photo.jpg"), "photo.jpg");
        assert_eq!(image_label("http://h/a/b.jpg#frag"), "b.jpg");
        assert_eq!(image_label("http://h/a/"), "a");
    }
}
