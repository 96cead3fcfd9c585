//! CLI command implementations

mod cast;
mod config;
mod info;
mod screens;

pub use cast::{CastArgs, cast};
pub use config::{ConfigArgs, config};
pub use info::info;
pub use screens::screens;

use std::time::Duration;

use anyhow::{Context, Result};
use portalcast_core::protocol::wayland::WaylandTransport;
use portalcast_core::{ConfigFile, Integration, IntegrationConfig};

/// How long to wait for the compositor to announce its globals
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to the compositor with the user's configuration
pub(crate) async fn connect() -> Result<Integration> {
    let file = ConfigFile::load_or_default();
    let integration = Integration::new(IntegrationConfig::from(&file));

    integration
        .init(WaylandTransport::new())
        .context("Failed to start the compositor connection")?;
    integration
        .wait_until_settled(SETTLE_TIMEOUT)
        .await
        .context("Compositor did not finish announcing its interfaces")?;

    Ok(integration)
}

/// Truncate a string to max length with ellipsis
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
