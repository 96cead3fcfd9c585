//! User-visible failure notifications
//!
//! Notifications are a side effect: [`Notifier::notify`] returns
//! immediately and delivery happens in the background.

use std::collections::HashMap;

use tracing::{debug, warn};
use zbus::Connection;
use zbus::zvariant::Value;

/// Event id of a failed screencast negotiation
pub const SCREENCAST_FAILURE_EVENT: &str = "screencastfailure";

/// `urgency` hint value for normal priority
const NORMAL_URGENCY: u8 = 1;

/// D-Bus interface of the desktop notification daemon.
#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// Show a notification; returns its id.
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// A single user-facing alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_id: String,
    pub title: String,
    pub body: String,
    /// Freedesktop icon name
    pub icon: String,
}

impl Notification {
    /// Alert for a capture request the compositor rejected
    pub fn screencast_failure(reason: &str) -> Self {
        Self {
            event_id: SCREENCAST_FAILURE_EVENT.to_string(),
            title: "Failed to start screencasting".to_string(),
            body: reason.to_string(),
            icon: "dialog-error".to_string(),
        }
    }
}

/// Sink for user-visible alerts; must never block the caller
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        warn!(
            event = %notification.event_id,
            "{}: {}", notification.title, notification.body
        );
    }
}

/// Sends notifications to the session bus notification daemon
#[derive(Debug, Clone)]
pub struct DbusNotifier {
    app_name: String,
}

impl DbusNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Normal urgency, so the daemon expires the alert on its own
    fn hints(notification: &Notification) -> HashMap<&'static str, Value<'_>> {
        let mut hints = HashMap::new();
        hints.insert("urgency", Value::U8(NORMAL_URGENCY));
        hints.insert("category", Value::from(notification.event_id.as_str()));
        hints
    }

    async fn send(app_name: &str, notification: &Notification) -> zbus::Result<u32> {
        let connection = Connection::session().await?;
        let proxy = NotificationsProxy::new(&connection).await?;

        proxy
            .notify(
                app_name,
                0,
                &notification.icon,
                &notification.title,
                &notification.body,
                &[],
                Self::hints(notification),
                -1,
            )
            .await
    }
}

impl Notifier for DbusNotifier {
    fn notify(&self, notification: Notification) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime to deliver on
            LogNotifier.notify(notification);
            return;
        };

        let app_name = self.app_name.clone();
        runtime.spawn(async move {
            match Self::send(&app_name, &notification).await {
                Ok(id) => debug!(id, event = %notification.event_id, "Notification shown"),
                Err(e) => {
                    warn!("Failed to show notification: {}", e);
                    LogNotifier.notify(notification);
                }
            }
        });
    }
}
