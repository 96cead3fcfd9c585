//! Error types for Portalcast

use std::time::Duration;

use thiserror::Error;

use crate::types::Capability;

/// Result type alias using PortalcastError
pub type Result<T> = std::result::Result<T, PortalcastError>;

/// Main error type for Portalcast operations
#[derive(Debug, Error)]
pub enum PortalcastError {
    /// The compositor explicitly rejected a capture request
    #[error("Screencast negotiation failed: {0}")]
    NegotiationFailed(String),

    /// No terminal event arrived for a capture request in time
    #[error("Screencast negotiation timed out after {}ms", .0.as_millis())]
    NegotiationTimeout(Duration),

    /// The compositor connection went away
    #[error("Compositor connection lost: {0}")]
    ConnectionLost(String),

    /// Capture requested for an output the registry does not know
    #[error("Unknown output: {0}")]
    UnknownOutput(u32),

    /// A protocol capability was never announced (or was retracted)
    #[error("Capability not bound: {0}")]
    CapabilityUnbound(Capability),

    /// No compositor connection has been established yet
    #[error("Not connected to the compositor")]
    NotConnected,

    /// Wayland protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// D-Bus / variant encoding error
    #[error("D-Bus error: {0}")]
    Dbus(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PortalcastError>,
    },
}

impl PortalcastError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a D-Bus error
    pub fn dbus(msg: impl Into<String>) -> Self {
        Self::Dbus(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &PortalcastError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// A short hint the user can act on, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::NegotiationFailed(_) => {
                Some("KWin refused the screencast request; check the compositor log")
            }
            Self::NegotiationTimeout(_) => {
                Some("KWin did not answer in time; is the screencast protocol enabled?")
            }
            Self::ConnectionLost(_) | Self::NotConnected => {
                Some("Make sure a Wayland session is running and WAYLAND_DISPLAY is set")
            }
            Self::UnknownOutput(_) => Some("Run 'portalcast screens' to list known outputs"),
            Self::CapabilityUnbound(_) => {
                Some("The compositor does not advertise this protocol; KWin 5.24+ is required")
            }
            Self::Dbus(_) => Some("Check that a notification daemon is running on the session bus"),
            Self::Config(_) => Some("Check ~/.config/portalcast/config.toml for typos"),
            Self::Protocol(_) | Self::Io(_) | Self::WithContext { .. } => None,
        }
    }

    /// Whether the user can fix this without a code change
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::NegotiationFailed(_)
                | Self::NegotiationTimeout(_)
                | Self::ConnectionLost(_)
                | Self::NotConnected
                | Self::UnknownOutput(_)
                | Self::Config(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<zbus::Error> for PortalcastError {
    fn from(err: zbus::Error) -> Self {
        Self::Dbus(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for PortalcastError {
    fn from(err: zbus::zvariant::Error) -> Self {
        Self::Dbus(format!("variant encoding: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = PortalcastError::NegotiationTimeout(Duration::from_millis(3000));
        assert_eq!(
            err.to_string(),
            "Screencast negotiation timed out after 3000ms"
        );
    }

    #[test]
    fn test_root_unwraps_context() {
        let err = PortalcastError::UnknownOutput(7)
            .with_context("starting capture")
            .with_context("cast command");
        assert!(matches!(err.root(), PortalcastError::UnknownOutput(7)));
        assert!(err.is_user_recoverable());
    }
}
