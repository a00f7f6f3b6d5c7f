use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_REGISTER_PATH: &str = "/register_user";
const DEFAULT_USERS_PATH: &str = "/users";
const DEFAULT_DEVICE: &str = "/dev/video0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the registration backend
    pub server_url: String,

    /// Path of the multipart registration endpoint
    pub register_path: String,

    /// Path of the JSON user list endpoint
    pub users_path: String,

    /// V4L2 capture device
    pub device: String,

    /// Requested capture resolution (the driver may pick the nearest one)
    pub capture_width: u32,
    pub capture_height: u32,

    /// JPEG quality for captured photos (1-100)
    pub jpeg_quality: u8,

    /// Per-request timeout for backend calls
    pub request_timeout_secs: u64,

    /// Desktop notification after a successful registration
    pub notifications: bool,

    /// Optional color overrides, "#rrggbb"
    #[serde(skip_serializing_if = "ThemeConfig::is_empty")]
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub danger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ThemeConfig {
    fn is_empty(&self) -> bool {
        self.accent.is_none() && self.danger.is_none() && self.success.is_none() && self.text.is_none()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            register_path: DEFAULT_REGISTER_PATH.to_string(),
            users_path: DEFAULT_USERS_PATH.to_string(),
            device: DEFAULT_DEVICE.to_string(),
            capture_width: 640,
            capture_height: 480,
            jpeg_quality: 90,
            request_timeout_secs: 30,
            notifications: false,
            theme: ThemeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("facecap");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        let path = match Self::config_path() {
            Ok(p) => p,
            Err(_) => return Ok(AppConfig::default()),
        };

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => return Ok(config.sanitized()),
                    Err(e) => tracing::warn!("Failed to parse config: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
            // Keep the user's broken file around for them to fix
            return Ok(AppConfig::default());
        }

        let config = AppConfig::default();
        let _ = config.save();
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(&self.clone().sanitized())?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Clamp values the rest of the app relies on
    fn sanitized(mut self) -> Self {
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = 1;
        }
        if self.server_url.trim().is_empty() {
            self.server_url = DEFAULT_SERVER_URL.to_string();
        }
        self
    }

    pub fn register_url(&self) -> String {
        join_url(&self.server_url, &self.register_path)
    }

    pub fn users_url(&self) -> String {
        join_url(&self.server_url, &self.users_path)
    }
}

/// Join a base URL and a path with exactly one slash between them.
/// An absolute `path` wins over the base.
fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            server_url: "http://10.0.0.2:9000".to_string(),
            device: "/dev/video2".to_string(),
            jpeg_quality: 75,
            notifications: true,
            theme: ThemeConfig {
                accent: Some("#ffc107".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.server_url, deserialized.server_url);
        assert_eq!(config.device, deserialized.device);
        assert_eq!(deserialized.jpeg_quality, 75);
        assert_eq!(deserialized.theme.accent.as_deref(), Some("#ffc107"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("server_url = \"http://example.com\"\n").unwrap();
        assert_eq!(config.register_path, "/register_user");
        assert_eq!(config.users_path, "/users");
        assert_eq!(config.device, "/dev/video0");
        assert_eq!(config.jpeg_quality, 90);
    }

    #[test]
    fn test_endpoint_urls() {
        let config = AppConfig {
            server_url: "http://127.0.0.1:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.register_url(), "http://127.0.0.1:8000/register_user");
        assert_eq!(config.users_url(), "http://127.0.0.1:8000/users");

        let config = AppConfig {
            users_path: "https://api.example.com/users".to_string(),
            ..Default::default()
        };
        assert_eq!(config.users_url(), "https://api.example.com/users");
    }

    #[test]
    fn test_sanitize_clamps_quality() {
        let config = AppConfig {
            jpeg_quality: 0,
            request_timeout_secs: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.request_timeout_secs, 1);
    }
}
