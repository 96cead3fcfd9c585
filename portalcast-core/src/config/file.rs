//! Configuration file loading and saving
//!
//! Loads user configuration from `~/.config/portalcast/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{PortalcastError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Capture stream negotiation
    #[serde(default)]
    pub negotiation: NegotiationSettings,

    /// Compositor connection lifecycle
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Fake input authorization
    #[serde(default)]
    pub input: InputSettings,

    /// Failure notifications
    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// Capture stream negotiation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationSettings {
    /// Bound on waiting for a stream to be created, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Connection lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Bound on waiting for the connection thread at teardown, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub join_timeout_ms: u64,
}

/// Identity sent with the fake input authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default = "default_application")]
    pub application: String,

    #[serde(default = "default_reason")]
    pub reason: String,
}

/// Notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Show desktop notifications (otherwise failures are only logged)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Application name shown by the notification daemon
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

// Default value functions
fn default_timeout_ms() -> u64 {
    3000
}

fn default_application() -> String {
    "xdg-desktop-portals-kde".to_string()
}

fn default_reason() -> String {
    "Remote desktop".to_string()
}

fn default_true() -> bool {
    true
}

fn default_app_name() -> String {
    "xdg-desktop-portal-kde".to_string()
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            application: default_application(),
            reason: default_reason(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: default_app_name(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("portalcast").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("portalcast")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/portalcast/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PortalcastError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| PortalcastError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PortalcastError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PortalcastError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| PortalcastError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        Self::default().save_to(path)?;
        Ok(true)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Portalcast Configuration

[negotiation]
# How long to wait for KWin to create a screencast stream (milliseconds)
timeout_ms = 3000

[connection]
# How long to wait for the Wayland thread to exit on teardown (milliseconds)
join_timeout_ms = 3000

[input]
# Identity shown by KWin when asking to allow remote input
application = "xdg-desktop-portals-kde"
reason = "Remote desktop"

[notifications]
# Show a desktop notification when a screencast fails to start
enabled = true
app_name = "xdg-desktop-portal-kde"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.negotiation.timeout_ms, 3000);
        assert_eq!(config.connection.join_timeout_ms, 3000);
        assert_eq!(config.input.application, "xdg-desktop-portals-kde");
        assert!(config.notifications.enabled);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = sample_config();
        let config: ConfigFile = toml::from_str(&sample).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ConfigFile = toml::from_str("[negotiation]\ntimeout_ms = 500\n").unwrap();
        assert_eq!(config.negotiation.timeout_ms, 500);
        assert_eq!(config.input.reason, "Remote desktop");
    }
}
