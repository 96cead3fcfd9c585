//! Portalcast Core Library
//!
//! KWin integration layer for the desktop screencast and remote desktop portal.
//!
//! This library provides:
//! - Output discovery that follows hot-plugged displays
//! - Bounded negotiation of output and window capture streams
//! - Synthetic input forwarding gated on active streams
//! - The `a(ua{sv})` stream list exposed to portal callers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  events  ┌──────────────┐  start/stop  ┌──────────────┐
//! │ Connection      │─────────▶│ Integration  │◀─────────────│ Portal       │
//! │ (Wayland thread)│◀─────────│ (router)     │─────────────▶│ (D-Bus side) │
//! └─────────────────┘ requests └──────────────┘   streams    └──────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod connection;
pub mod error;
pub mod input;
pub mod integration;
pub mod notify;
pub mod outputs;
pub mod protocol;
pub mod streams;
pub mod types;

pub use config::{ConfigFile, IntegrationConfig};
pub use error::{PortalcastError, Result};
pub use integration::{Integration, IntegrationEvent};
pub use outputs::{Output, OutputType};
pub use streams::{StreamDescriptor, StreamMetadata};
pub use types::{CursorMode, Orientation, SourceType};
