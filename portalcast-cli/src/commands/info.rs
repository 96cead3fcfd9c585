//! Info command - show compositor capabilities

use anyhow::Result;
use portalcast_core::ConfigFile;

/// Show connection state and which capabilities the compositor offers
pub async fn info() -> Result<()> {
    println!("Portalcast - Compositor Information\n");

    let integration = super::connect().await?;

    println!("Connection:");
    println!("  Connected:          {}", yes_no(integration.is_connected()));
    println!("  Registry ready:     {}", yes_no(integration.is_registry_ready()));
    println!();

    println!("Capabilities:");
    println!("  Screencast:         {}", yes_no(integration.is_capture_available()));
    println!(
        "  Window management:  {}",
        yes_no(integration.is_window_management_available())
    );
    println!("  Outputs:            {}", integration.screens().len());
    println!();

    let config = integration.config();
    println!("Configuration ({}):", ConfigFile::default_path().display());
    println!("  Negotiation timeout: {} ms", config.negotiation_timeout.as_millis());
    println!("  Join timeout:        {} ms", config.join_timeout.as_millis());
    println!("  Input application:   {}", config.application);
    println!("  Notifications:       {}", yes_no(config.notifications));

    integration.shutdown();

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
