use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{Registry, UserRecord};
use crate::camera::CameraBackend;
use crate::controller::{AlertKind, CaptureAndRegisterController};
use crate::error::{ApiError, RegisterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Form,    // Username input
    Photos,  // Camera + captured photos
    Users,   // Registered users table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    Help,
    Alert,
}

/// Results of background requests, applied on the UI loop
#[derive(Debug)]
pub enum TaskEvent {
    Registered(Result<(), RegisterError>),
    UsersLoaded(Result<Vec<UserRecord>, ApiError>),
}

pub struct App<R: Registry, B: CameraBackend> {
    pub section: Section,
    pub popup: Popup,

    pub controller: CaptureAndRegisterController<R, B>,

    // Selection state
    pub selected_photo: usize,
    pub user_scroll: usize,

    // Status message (shown in info line, auto-clears after timeout)
    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,

    // A user table request is in flight
    pub users_loading: bool,
    // Another reload was asked for while one was in flight
    reload_queued: bool,

    notifications: bool,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    events_rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl<R: Registry, B: CameraBackend> App<R, B> {
    /// Create the app and kick off the initial user table load.
    /// Must be called from within a tokio runtime.
    pub fn new(controller: CaptureAndRegisterController<R, B>, notifications: bool) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut app = Self {
            section: Section::Form,
            popup: Popup::None,
            controller,
            selected_photo: 0,
            user_scroll: 0,
            status_message: None,
            status_message_time: None,
            users_loading: false,
            reload_queued: false,
            notifications,
            events_tx,
            events_rx,
        };
        app.refresh_users();
        app
    }

    /// Set a status message (auto-clears after 3 seconds)
    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Typing goes to the username field rather than to shortcuts
    pub fn wants_text_input(&self) -> bool {
        self.popup == Popup::None && self.section == Section::Form
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.popup != Popup::None {
            self.handle_popup_key(key);
        } else if self.section == Section::Form {
            self.handle_form_key(key);
        } else {
            self.handle_normal_key(key);
        }
        self.sync_popup();
    }

    fn handle_popup_key(&mut self, key: KeyEvent) {
        match self.popup {
            Popup::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter | KeyCode::Char('q')) {
                    self.popup = Popup::None;
                }
            }
            Popup::Alert => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ')) {
                    self.controller.dismiss_alert();
                    self.popup = Popup::None;
                }
            }
            Popup::None => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => self.section = Section::Photos,
            KeyCode::BackTab => self.section = Section::Users,
            KeyCode::Esc => self.section = Section::Photos,
            KeyCode::Enter => self.start_submit(),
            KeyCode::Backspace => self.controller.pop_username_char(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.controller.push_username_char(c);
            }
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => {
                self.section = match self.section {
                    Section::Form => Section::Photos,
                    Section::Photos => Section::Users,
                    Section::Users => Section::Form,
                };
            }
            KeyCode::BackTab => {
                self.section = match self.section {
                    Section::Form => Section::Users,
                    Section::Photos => Section::Form,
                    Section::Users => Section::Photos,
                };
            }
            KeyCode::Char('u') | KeyCode::Char('i') => self.section = Section::Form,

            // Camera
            KeyCode::Char('o') => {
                if self.controller.controls().open_camera && self.controller.open_camera().is_ok() {
                    self.set_status("Camera on");
                }
            }
            KeyCode::Char('x') => {
                if self.controller.camera_live() {
                    self.controller.stop_camera();
                    self.set_status("Camera off");
                }
            }
            KeyCode::Char('c') | KeyCode::Char(' ') => self.capture(),

            // Photo selection and removal
            KeyCode::Left => self.selected_photo = self.selected_photo.saturating_sub(1),
            KeyCode::Right => {
                let count = self.controller.image_count();
                if count > 0 {
                    self.selected_photo = (self.selected_photo + 1).min(count - 1);
                }
            }
            KeyCode::Char('d') | KeyCode::Delete | KeyCode::Backspace => self.remove_selected(),
            KeyCode::Char(n @ '1'..='4') => {
                let index = n as usize - '1' as usize;
                if index < self.controller.image_count() {
                    self.selected_photo = index;
                }
            }

            // Users table
            KeyCode::Down | KeyCode::Char('j') => {
                let rows = self.controller.users().len();
                if rows > 0 {
                    self.user_scroll = (self.user_scroll + 1).min(rows - 1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.user_scroll = self.user_scroll.saturating_sub(1),
            KeyCode::Char('r') => {
                self.refresh_users();
                self.set_status("Refreshing users...");
            }

            KeyCode::Enter | KeyCode::Char('s') => self.start_submit(),
            KeyCode::Char('?') => self.popup = Popup::Help,
            _ => {}
        }
    }

    fn capture(&mut self) {
        if !self.controller.controls().capture && self.controller.camera_live() {
            return;
        }
        match self.controller.capture_frame() {
            Ok(true) => {
                let count = self.controller.image_count();
                self.selected_photo = count.saturating_sub(1);
                if count == crate::capture::PHOTO_COUNT {
                    self.set_status("All photos captured, camera off. Enter a username and press Enter");
                } else {
                    self.set_status(format!("Captured photo {}", count));
                }
            }
            Ok(false) => {}
            Err(e) => debug!(error = %e, "Capture rejected"),
        }
    }

    fn remove_selected(&mut self) {
        if self.controller.remove_frame(self.selected_photo) {
            self.set_status(format!("Removed photo {}", self.selected_photo + 1));
            self.clamp_selection();
        }
    }

    fn clamp_selection(&mut self) {
        let count = self.controller.image_count();
        self.selected_photo = self.selected_photo.min(count.saturating_sub(1));
        let rows = self.controller.users().len();
        self.user_scroll = self.user_scroll.min(rows.saturating_sub(1));
    }

    /// Validate and send the registration without blocking the UI
    fn start_submit(&mut self) {
        let pending = match self.controller.begin_submit() {
            Ok(pending) => pending,
            Err(e) => {
                debug!(error = %e, "Submit rejected");
                return;
            }
        };

        self.set_status(format!("Registering {}...", pending.username()));
        let registry = self.controller.registry().clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = pending.send(registry).await;
            let _ = tx.send(TaskEvent::Registered(outcome));
        });
    }

    /// Reload the user table in the background. A request made while one is
    /// in flight runs after it, since the earlier answer may predate it.
    fn refresh_users(&mut self) {
        if self.users_loading {
            self.reload_queued = true;
            return;
        }
        self.users_loading = true;
        let registry = self.controller.registry().clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = registry.fetch_users().await;
            let _ = tx.send(TaskEvent::UsersLoaded(result));
        });
    }

    fn apply_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Registered(outcome) => {
                if self.controller.finish_submit(outcome).is_ok() {
                    self.selected_photo = 0;
                    self.set_status("Registered");
                    if self.notifications {
                        notify("facecap", "User registered successfully");
                    }
                    self.refresh_users();
                }
            }
            TaskEvent::UsersLoaded(result) => {
                self.users_loading = false;
                self.controller.apply_user_table(result);
                if std::mem::take(&mut self.reload_queued) {
                    self.refresh_users();
                }
            }
        }
        self.clamp_selection();
    }

    /// Show the controller's pending alert, if any
    fn sync_popup(&mut self) {
        if self.controller.alert().is_some() {
            self.popup = Popup::Alert;
        } else if self.popup == Popup::Alert {
            self.popup = Popup::None;
        }
    }

    pub fn alert_is_error(&self) -> bool {
        self.controller
            .alert()
            .map(|a| a.kind == AlertKind::Error)
            .unwrap_or(false)
    }

    /// Apply finished background work and expire the status line
    pub fn tick(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }

        // Clear status message after 3 seconds
        if let Some(time) = self.status_message_time {
            if time.elapsed().as_secs() >= 3 {
                self.status_message = None;
                self.status_message_time = None;
            }
        }

        self.sync_popup();
    }

    /// Release the camera before the terminal is restored
    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }
}

fn notify(summary: &str, body: &str) {
    if let Err(e) = notify_rust::Notification::new()
        .summary(summary)
        .body(body)
        .icon("camera-photo")
        .show()
    {
        warn!(error = %e, "Desktop notification failed");
    }
}
