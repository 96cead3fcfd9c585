//! Configuration for Portalcast
//!
//! [`ConfigFile`] is what lives on disk; [`IntegrationConfig`] is the
//! resolved runtime view handed to the integration.

mod file;

pub use file::{
    ConfigFile, ConnectionSettings, InputSettings, NegotiationSettings, NotificationSettings,
    sample_config,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration of the integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Bound on a capture negotiation
    pub negotiation_timeout: Duration,

    /// Bound on joining the connection thread
    pub join_timeout: Duration,

    /// Application identity for fake input authorization
    pub application: String,

    /// Purpose string for fake input authorization
    pub reason: String,

    /// Deliver failure notifications to the desktop
    pub notifications: bool,

    /// Application name used for notifications
    pub notification_app_name: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self::from(&ConfigFile::default())
    }
}

impl From<&ConfigFile> for IntegrationConfig {
    fn from(file: &ConfigFile) -> Self {
        Self {
            negotiation_timeout: Duration::from_millis(file.negotiation.timeout_ms),
            join_timeout: Duration::from_millis(file.connection.join_timeout_ms),
            application: file.input.application.clone(),
            reason: file.input.reason.clone(),
            notifications: file.notifications.enabled,
            notification_app_name: file.notifications.app_name.clone(),
        }
    }
}

impl IntegrationConfig {
    /// Set the negotiation bound
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set the teardown bound
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set the authorization identity
    pub fn with_authorization(
        mut self,
        application: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.application = application.into();
        self.reason = reason.into();
        self
    }

    /// Enable or disable desktop notifications
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DEFAULT_NEGOTIATION_TIMEOUT;
    use crate::connection::DEFAULT_JOIN_TIMEOUT;

    #[test]
    fn test_defaults_match_built_in_bounds() {
        let config = IntegrationConfig::default();
        assert_eq!(config.negotiation_timeout, DEFAULT_NEGOTIATION_TIMEOUT);
        assert_eq!(config.join_timeout, DEFAULT_JOIN_TIMEOUT);
        assert_eq!(config.reason, "Remote desktop");
    }

    #[test]
    fn test_builder() {
        let config = IntegrationConfig::default()
            .with_negotiation_timeout(Duration::from_millis(250))
            .with_authorization("krdp", "Remote support")
            .with_notifications(false);
        assert_eq!(config.negotiation_timeout, Duration::from_millis(250));
        assert_eq!(config.application, "krdp");
        assert!(!config.notifications);
    }
}
