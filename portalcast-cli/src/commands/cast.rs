//! Cast command - negotiate a capture stream and hold it

use anyhow::{Context, Result};
use clap::Args;
use portalcast_core::{CursorMode, IntegrationEvent};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Arguments for the cast command
#[derive(Args)]
pub struct CastArgs {
    /// Registry name of the output to capture (see `portalcast screens`)
    #[arg(short, long, conflicts_with = "window", required_unless_present = "window")]
    output: Option<u32>,

    /// UUID of the window to capture
    #[arg(short, long)]
    window: Option<String>,

    /// Cursor handling for output capture (hidden, embedded, metadata)
    #[arg(short, long, default_value = "hidden")]
    cursor: CursorMode,

    /// Print the stream list as JSON
    #[arg(long)]
    json: bool,
}

/// Start a capture session and keep it alive until interrupted
pub async fn cast(args: CastArgs) -> Result<()> {
    let integration = super::connect().await?;
    let mut events = integration.subscribe();

    let node_id = match (&args.output, &args.window) {
        (Some(output), _) => integration
            .start_output_capture(*output, args.cursor)
            .await
            .with_context(|| format!("Failed to capture output {}", output))?,
        (None, Some(window)) => integration
            .start_window_capture(window)
            .await
            .with_context(|| format!("Failed to capture window {}", window))?,
        (None, None) => anyhow::bail!("Either --output or --window is required"),
    };

    let descriptors = integration.stream_descriptors();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
    } else {
        println!("Capture started on PipeWire node {}\n", node_id);
        for descriptor in &descriptors {
            println!("  {}", descriptor);
        }
        println!("\nPress Ctrl+C to stop...");
    }

    let closed = async {
        loop {
            match events.recv().await {
                Ok(IntegrationEvent::StreamClosed(node)) if node == node_id => {
                    info!("Compositor closed stream {}", node);
                    break;
                }
                Ok(IntegrationEvent::ConnectionLost(reason)) => {
                    warn!("Connection lost: {}", reason);
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            if !args.json {
                println!("\nReceived interrupt signal...");
            }
        }
        _ = closed => {}
    }

    integration.stop_all_capture();
    integration.shutdown();

    if !args.json {
        println!("Capture stopped.");
    }

    Ok(())
}
