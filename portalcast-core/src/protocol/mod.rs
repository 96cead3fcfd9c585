//! Compositor protocol seam
//!
//! The integration never talks to the wire directly. A [`Transport`] owns
//! the connection on the worker thread and turns protocol traffic into
//! [`ProtocolEvent`]s; the [`ProtocolClient`] it hands back issues requests
//! from the consumer side.
//!
//! ```text
//! ┌──────────────┐  ProtocolEvent   ┌─────────────┐
//! │ Transport    │─────────────────▶│ Integration │
//! │ (worker)     │                  │ (consumer)  │
//! └──────────────┘◀─────────────────└─────────────┘
//!                   ProtocolClient
//! ```

#[cfg(feature = "wayland")]
pub mod wayland;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{CursorMode, Orientation, Point, Size};

/// Channel the transport publishes protocol events on
pub type EventSink = mpsc::UnboundedSender<ProtocolEvent>;

/// Receiving side of [`EventSink`]
pub type EventSource = mpsc::UnboundedReceiver<ProtocolEvent>;

/// Global counter for stream handles
static STREAM_HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a pending or established capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// Mint a new process-unique handle
    pub fn new() -> Self {
        Self(STREAM_HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamHandle({})", self.0)
    }
}

/// Registry interfaces the integration cares about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Interface {
    Output,
    FakeInput,
    Screencast,
    WindowManagement,
    Other(String),
}

impl Interface {
    pub const OUTPUT: &'static str = "wl_output";
    pub const FAKE_INPUT: &'static str = "org_kde_kwin_fake_input";
    pub const SCREENCAST: &'static str = "zkde_screencast_unstable_v1";
    pub const WINDOW_MANAGEMENT: &'static str = "org_kde_plasma_window_management";

    /// Classify an interface name announced by the registry
    pub fn from_name(name: &str) -> Self {
        match name {
            Self::OUTPUT => Self::Output,
            Self::FAKE_INPUT => Self::FakeInput,
            Self::SCREENCAST => Self::Screencast,
            Self::WINDOW_MANAGEMENT => Self::WindowManagement,
            other => Self::Other(other.to_string()),
        }
    }

    /// Protocol interface name
    pub fn name(&self) -> &str {
        match self {
            Self::Output => Self::OUTPUT,
            Self::FakeInput => Self::FAKE_INPUT,
            Self::Screencast => Self::SCREENCAST,
            Self::WindowManagement => Self::WINDOW_MANAGEMENT,
            Self::Other(name) => name,
        }
    }
}

/// Output metadata as reported by the compositor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputInfo {
    /// Registry name of the output global
    pub name: u32,
    /// Connector name, e.g. "eDP-1" or "HDMI-A-1"
    pub connector: String,
    pub manufacturer: String,
    pub model: String,
    /// Current mode size
    pub pixel_size: Size,
    /// Position in the compositor-global space
    pub global_position: Point,
}

/// Everything the worker thread reports back to the consumer
pub enum ProtocolEvent {
    /// Handshake completed
    Connected(Arc<dyn ProtocolClient>),
    /// Handshake failed; the worker has stopped
    ConnectFailed(String),
    /// An established connection went away
    ConnectionDied(String),
    /// A registry global was announced
    Global {
        interface: Interface,
        name: u32,
        version: u32,
    },
    /// A registry global was retracted
    GlobalRemoved { name: u32 },
    /// The initial burst of globals is complete
    InterfacesAnnounced,
    /// An output finished (re)describing itself
    OutputChanged(OutputInfo),
    /// A capture stream is live on the given PipeWire node
    StreamCreated { handle: StreamHandle, node_id: u32 },
    /// The compositor rejected a capture request
    StreamFailed { handle: StreamHandle, error: String },
    /// The compositor ended a capture stream
    StreamClosed { handle: StreamHandle },
}

impl std::fmt::Debug for ProtocolEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(_) => write!(f, "Connected"),
            Self::ConnectFailed(reason) => write!(f, "ConnectFailed({reason})"),
            Self::ConnectionDied(reason) => write!(f, "ConnectionDied({reason})"),
            Self::Global {
                interface,
                name,
                version,
            } => write!(f, "Global({} name={name} v{version})", interface.name()),
            Self::GlobalRemoved { name } => write!(f, "GlobalRemoved({name})"),
            Self::InterfacesAnnounced => write!(f, "InterfacesAnnounced"),
            Self::OutputChanged(info) => write!(f, "OutputChanged({})", info.name),
            Self::StreamCreated { handle, node_id } => {
                write!(f, "StreamCreated({handle}, node={node_id})")
            }
            Self::StreamFailed { handle, error } => write!(f, "StreamFailed({handle}, {error})"),
            Self::StreamClosed { handle } => write!(f, "StreamClosed({handle})"),
        }
    }
}

/// Request side of the compositor protocol
///
/// Requests are fire-and-forget; results come back as [`ProtocolEvent`]s.
pub trait ProtocolClient: Send + Sync {
    /// Bind a `wl_output` global; metadata arrives as `OutputChanged`
    fn bind_output(&self, name: u32, version: u32) -> Result<()>;

    /// Drop a previously bound output
    fn release_output(&self, name: u32);

    /// Bind the fake input (virtual input) global
    fn bind_fake_input(&self, name: u32, version: u32) -> Result<()>;

    /// Bind the screencast global
    fn bind_screencast(&self, name: u32, version: u32) -> Result<()>;

    /// Bind the plasma window management global
    fn bind_window_management(&self, name: u32, version: u32) -> Result<()>;

    /// Request a stream of a bound output
    fn stream_output(&self, output: u32, cursor: CursorMode) -> Result<StreamHandle>;

    /// Request a stream of a window, by its window-management uuid
    fn stream_window(&self, window_uuid: &str, cursor: CursorMode) -> Result<StreamHandle>;

    /// Release a stream, pending or live
    fn close_stream(&self, handle: StreamHandle);

    /// Ask the compositor to trust this client with fake input
    fn authenticate(&self, application: &str, reason: &str);

    fn pointer_button(&self, button: u32, pressed: bool);

    fn pointer_motion(&self, dx: f64, dy: f64);

    fn pointer_motion_absolute(&self, x: f64, y: f64);

    fn pointer_axis(&self, orientation: Orientation, delta: f64);

    fn keyboard_key(&self, keycode: u32, pressed: bool);
}

/// Connection side of the compositor protocol, driven by the worker thread
pub trait Transport: Send + 'static {
    /// Perform the handshake and hand back the request side.
    ///
    /// Must not publish events; everything the compositor says goes out
    /// through `dispatch`, after `Connected` has been delivered.
    fn connect(&mut self, events: EventSink) -> Result<Arc<dyn ProtocolClient>>;

    /// Process protocol traffic until the connection dies or `shutdown` is set.
    ///
    /// `Ok` with `shutdown` unset means the compositor hung up cleanly.
    fn dispatch(&mut self, shutdown: &AtomicBool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_handles_are_unique() {
        let a = StreamHandle::new();
        let b = StreamHandle::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_interface_names() {
        assert_eq!(Interface::from_name("wl_output"), Interface::Output);
        assert_eq!(
            Interface::from_name("zkde_screencast_unstable_v1"),
            Interface::Screencast
        );
        assert_eq!(
            Interface::from_name("wl_seat"),
            Interface::Other("wl_seat".to_string())
        );
        assert_eq!(Interface::FakeInput.name(), "org_kde_kwin_fake_input");
    }
}
