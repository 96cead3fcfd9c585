//! Screens command - list outputs the compositor announces

use anyhow::Result;

use super::{connect, truncate};

/// List outputs available for capture
pub async fn screens() -> Result<()> {
    println!("Portalcast - Available Outputs\n");

    let integration = connect().await?;
    let screens = integration.screens();
    integration.shutdown();

    if screens.is_empty() {
        println!("No outputs found.");
        println!("\nThe compositor announced no wl_output globals, or none has described itself yet.");
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:<11} {:<28} {:<11} {}",
        "Name", "Connector", "Type", "Make / Model", "Resolution", "Position"
    );
    println!("{}", "-".repeat(84));

    for (name, output) in &screens {
        let make_model = format!("{} {}", output.manufacturer, output.model);
        println!(
            "{:<6} {:<12} {:<11} {:<28} {:<11} {}",
            name,
            truncate(&output.connector, 12),
            output.output_type.to_string(),
            truncate(make_model.trim(), 28),
            output.pixel_size.to_string(),
            output.global_position
        );
    }

    println!("\nCapture one with 'portalcast cast --output <name>'.");

    Ok(())
}
