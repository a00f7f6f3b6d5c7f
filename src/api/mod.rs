//! Registration backend client
//!
//! Two endpoints: a multipart `POST` that registers a user with their photos,
//! and a `GET` returning the registered users as JSON.

use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::PhotoPart;
use crate::config::AppConfig;
use crate::error::ApiError;

/// A registered user as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One registration upload
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub photos: Vec<PhotoPart>,
}

/// The backend as seen by the controller
pub trait Registry: Clone + Send + Sync + 'static {
    /// Upload a registration. Any non-2xx answer is an error.
    fn register(&self, registration: Registration) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn fetch_users(&self) -> impl Future<Output = Result<Vec<UserRecord>, ApiError>> + Send;
}

/// [`Registry`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    register_url: String,
    users_url: String,
}

impl HttpRegistry {
    pub fn new(
        register_url: impl Into<String>,
        users_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("facecap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            register_url: register_url.into(),
            users_url: users_url.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        Self::new(
            config.register_url(),
            config.users_url(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

impl Registry for HttpRegistry {
    async fn register(&self, registration: Registration) -> Result<(), ApiError> {
        let photo_count = registration.photos.len();
        let mut form = Form::new().text("username", registration.username.clone());
        for photo in registration.photos {
            let part = Part::bytes(photo.bytes)
                .file_name(photo.file_name)
                .mime_str("image/jpeg")?;
            form = form.part("photos", part);
        }

        debug!(url = %self.register_url, photos = photo_count, "Posting registration");
        let response = self.client.post(&self.register_url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        info!(username = %registration.username, status = status.as_u16(), "Registration accepted");
        Ok(())
    }

    async fn fetch_users(&self) -> Result<Vec<UserRecord>, ApiError> {
        let response = self.client.get(&self.users_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let users: Vec<UserRecord> = serde_json::from_slice(&body)?;
        debug!(count = users.len(), "Fetched user list");
        Ok(users)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the in-memory registry should answer with
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Reply {
        Ok,
        Status(u16),
        /// A body that does not parse, standing in for a broken connection
        Malformed,
    }

    #[derive(Debug, Default)]
    struct State {
        users: Vec<UserRecord>,
        registrations: Vec<Registration>,
        register_calls: usize,
        fetch_calls: usize,
    }

    /// In-memory backend: stores registrations as users
    #[derive(Debug, Clone)]
    pub struct FakeRegistry {
        state: Arc<Mutex<State>>,
        register_reply: Arc<Mutex<Reply>>,
        fetch_reply: Arc<Mutex<Reply>>,
        fetch_delay: Arc<Mutex<Duration>>,
    }

    impl Default for FakeRegistry {
        fn default() -> Self {
            Self {
                state: Arc::default(),
                register_reply: Arc::new(Mutex::new(Reply::Ok)),
                fetch_reply: Arc::new(Mutex::new(Reply::Ok)),
                fetch_delay: Arc::default(),
            }
        }
    }

    fn failure(reply: Reply) -> Option<ApiError> {
        match reply {
            Reply::Ok => None,
            Reply::Status(status) => Some(ApiError::Status { status }),
            Reply::Malformed => Some(ApiError::Decode(
                serde_json::from_str::<UserRecord>("connection reset").unwrap_err(),
            )),
        }
    }

    impl FakeRegistry {
        pub fn with_users(users: Vec<UserRecord>) -> Self {
            let registry = Self::default();
            registry.state.lock().unwrap().users = users;
            registry
        }

        pub fn set_register_reply(&self, reply: Reply) {
            *self.register_reply.lock().unwrap() = reply;
        }

        pub fn set_fetch_reply(&self, reply: Reply) {
            *self.fetch_reply.lock().unwrap() = reply;
        }

        /// Answer user list requests with the list as it was when the
        /// request arrived, after `delay`
        pub fn set_fetch_delay(&self, delay: Duration) {
            *self.fetch_delay.lock().unwrap() = delay;
        }

        pub fn register_calls(&self) -> usize {
            self.state.lock().unwrap().register_calls
        }

        pub fn fetch_calls(&self) -> usize {
            self.state.lock().unwrap().fetch_calls
        }

        pub fn registrations(&self) -> Vec<Registration> {
            self.state.lock().unwrap().registrations.clone()
        }
    }

    impl Registry for FakeRegistry {
        async fn register(&self, registration: Registration) -> Result<(), ApiError> {
            let mut state = self.state.lock().unwrap();
            state.register_calls += 1;
            if let Some(err) = failure(*self.register_reply.lock().unwrap()) {
                return Err(err);
            }
            state.users.push(UserRecord {
                username: registration.username.clone(),
                images: registration
                    .photos
                    .iter()
                    .map(|p| format!("/photos/{}/{}", registration.username, p.file_name))
                    .collect(),
            });
            state.registrations.push(registration);
            Ok(())
        }

        async fn fetch_users(&self) -> Result<Vec<UserRecord>, ApiError> {
            let snapshot = {
                let mut state = self.state.lock().unwrap();
                state.fetch_calls += 1;
                match failure(*self.fetch_reply.lock().unwrap()) {
                    Some(err) => Err(err),
                    None => Ok(state.users.clone()),
                }
            };
            let delay = *self.fetch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            snapshot
        }
    }
}
