//! The integration context
//!
//! [`Integration`] is the explicitly owned object the portal talks to. It
//! starts the compositor connection, routes protocol events into its state
//! and exposes the synchronous-looking capture and input vocabulary.
//!
//! All mutable state lives behind one lock. Protocol events are applied by
//! a router task on the consumer side; the connection thread never touches
//! it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use zbus::zvariant::OwnedValue;

use crate::capture::negotiation::wait_for_outcome;
use crate::capture::{CaptureSessionManager, CaptureTarget, CreatedOutcome, NegotiationOutcome};
use crate::config::IntegrationConfig;
use crate::connection::ProtocolConnection;
use crate::error::{PortalcastError, Result};
use crate::input::InputInjectionGate;
use crate::notify::{DbusNotifier, LogNotifier, Notification, Notifier};
use crate::outputs::{Output, OutputRegistry};
use crate::protocol::{EventSource, Interface, ProtocolClient, ProtocolEvent, StreamHandle, Transport};
use crate::streams::{StreamDescriptor, encode_streams};
use crate::types::{Capability, CursorMode, Orientation, PointF};

/// Integration events buffered per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State changes observers can subscribe to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationEvent {
    /// Handshake with the compositor completed
    Connected,
    /// Handshake failed; `init` may be called again
    ConnectionFailed(String),
    /// An established connection died; all state was dropped
    ConnectionLost(String),
    /// The initial registry burst has been processed
    RegistryReady,
    /// An output became visible or changed
    OutputChanged(u32),
    /// An output was retracted
    OutputRemoved(u32),
    /// Plasma window management was bound
    WindowManagementReady,
    /// The compositor ended a capture stream
    StreamClosed(u32),
}

/// Everything the router and the public API share
#[derive(Default)]
struct State {
    client: Option<Arc<dyn ProtocolClient>>,
    /// Bound capability -> registry name of its global
    capabilities: HashMap<Capability, u32>,
    registry_ready: bool,
    outputs: OutputRegistry,
    capture: CaptureSessionManager,
    input: InputInjectionGate,
}

/// The client, if `capability` is bound on it
fn bound<'a>(
    client: &'a Option<Arc<dyn ProtocolClient>>,
    capabilities: &HashMap<Capability, u32>,
    capability: Capability,
) -> Option<&'a dyn ProtocolClient> {
    if capabilities.contains_key(&capability) {
        client.as_deref()
    } else {
        None
    }
}

impl State {
    fn is_bound(&self, capability: Capability) -> bool {
        self.capabilities.contains_key(&capability)
    }

    fn fake_input(&self) -> Option<&dyn ProtocolClient> {
        bound(&self.client, &self.capabilities, Capability::FakeInput)
    }

    /// Apply one protocol event; returns what observers should hear about
    fn apply(&mut self, event: ProtocolEvent) -> Vec<IntegrationEvent> {
        let mut notices = Vec::new();

        match event {
            ProtocolEvent::Connected(client) => {
                self.client = Some(client);
                notices.push(IntegrationEvent::Connected);
            }
            ProtocolEvent::ConnectFailed(reason) => {
                self.lose_connection(&reason);
                notices.push(IntegrationEvent::ConnectionFailed(reason));
            }
            ProtocolEvent::ConnectionDied(reason) => {
                self.lose_connection(&reason);
                notices.push(IntegrationEvent::ConnectionLost(reason));
            }
            ProtocolEvent::Global {
                interface,
                name,
                version,
            } => self.bind_global(interface, name, version, &mut notices),
            ProtocolEvent::GlobalRemoved { name } => self.remove_global(name, &mut notices),
            ProtocolEvent::InterfacesAnnounced => {
                self.registry_ready = true;
                info!(
                    screencast = self.is_bound(Capability::Screencast),
                    fake_input = self.is_bound(Capability::FakeInput),
                    "Registry initialized"
                );
                notices.push(IntegrationEvent::RegistryReady);
            }
            ProtocolEvent::OutputChanged(info) => {
                let name = info.name;
                if self.outputs.on_changed(info).is_some() {
                    notices.push(IntegrationEvent::OutputChanged(name));
                }
            }
            ProtocolEvent::StreamCreated { handle, node_id } => {
                self.on_stream_created(handle, node_id);
            }
            ProtocolEvent::StreamFailed { handle, error } => {
                self.capture.on_failed(handle, error);
            }
            ProtocolEvent::StreamClosed { handle } => {
                if let Some(node_id) = self.capture.on_closed(self.client.as_deref(), handle) {
                    if self.capture.is_empty() {
                        self.input.disable();
                    }
                    notices.push(IntegrationEvent::StreamClosed(node_id));
                }
            }
        }

        notices
    }

    fn bind_global(
        &mut self,
        interface: Interface,
        name: u32,
        version: u32,
        notices: &mut Vec<IntegrationEvent>,
    ) {
        let Some(client) = self.client.clone() else {
            warn!(interface = interface.name(), "Global announced without a connection");
            return;
        };

        let (capability, result) = match interface {
            Interface::Output => {
                match client.bind_output(name, version) {
                    Ok(()) => self.outputs.announce(name, version),
                    Err(e) => warn!(name, "Failed to bind output: {}", e),
                }
                return;
            }
            Interface::FakeInput => (
                Capability::FakeInput,
                client.bind_fake_input(name, version),
            ),
            Interface::Screencast => (
                Capability::Screencast,
                client.bind_screencast(name, version),
            ),
            Interface::WindowManagement => (
                Capability::WindowManagement,
                client.bind_window_management(name, version),
            ),
            Interface::Other(other) => {
                trace!(interface = %other, "Ignoring global");
                return;
            }
        };

        match result {
            Ok(()) => {
                debug!(%capability, name, version, "Bound capability");
                self.capabilities.insert(capability, name);
                if capability == Capability::WindowManagement {
                    notices.push(IntegrationEvent::WindowManagementReady);
                }
            }
            Err(e) => warn!(%capability, "Failed to bind capability: {}", e),
        }
    }

    fn remove_global(&mut self, name: u32, notices: &mut Vec<IntegrationEvent>) {
        if self.outputs.remove(name) {
            if let Some(client) = &self.client {
                client.release_output(name);
            }
            notices.push(IntegrationEvent::OutputRemoved(name));
            return;
        }

        let retracted: Vec<Capability> = self
            .capabilities
            .iter()
            .filter(|(_, global)| **global == name)
            .map(|(capability, _)| *capability)
            .collect();
        for capability in retracted {
            warn!(%capability, "Compositor retracted capability");
            self.capabilities.remove(&capability);
        }
    }

    fn on_stream_created(&mut self, handle: StreamHandle, node_id: u32) {
        let outcome = self
            .capture
            .on_created(self.client.as_deref(), handle, node_id);

        if let CreatedOutcome::Recorded(target) = outcome {
            self.input.enable();
            // Only output captures define where absolute motion lands
            if let CaptureTarget::Output(_) = target {
                if let Some(session) = self.capture.sessions().get(node_id) {
                    self.input
                        .set_streamed_position(session.metadata.screen_position);
                }
            }
        }
    }

    fn stop_all(&mut self) -> usize {
        let stopped = self.capture.stop_all(self.client.as_deref());
        self.input.disable();
        stopped
    }

    fn lose_connection(&mut self, reason: &str) {
        self.client = None;
        self.capabilities.clear();
        self.registry_ready = false;
        self.outputs.clear();
        self.capture.reset(reason);
        self.input.disable();
    }
}

/// Apply protocol events until the connection's event channel closes
async fn route(
    mut source: EventSource,
    state: Arc<Mutex<State>>,
    connection: Arc<Mutex<Option<ProtocolConnection>>>,
    events: broadcast::Sender<IntegrationEvent>,
) {
    while let Some(event) = source.recv().await {
        trace!(?event, "Protocol event");
        let finished = matches!(
            event,
            ProtocolEvent::ConnectFailed(_) | ProtocolEvent::ConnectionDied(_)
        );

        // A dead connection leaves its slot under the state lock, before
        // subscribers hear of it, so `init` from a subscriber starts afresh
        let (notices, dead) = {
            let mut state = state.lock();
            let dead = if finished { connection.lock().take() } else { None };
            (state.apply(event), dead)
        };
        for notice in notices {
            // No subscribers is fine
            let _ = events.send(notice);
        }

        if let Some(mut connection) = dead {
            if tokio::task::spawn_blocking(move || connection.teardown())
                .await
                .is_err()
            {
                warn!("Connection teardown task failed");
            }
        }
    }
    debug!("Protocol event channel closed");
}

/// Withdraws a capture request whose caller stopped waiting for it
struct AbandonOnDrop {
    state: Arc<Mutex<State>>,
    handle: StreamHandle,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.state.lock().capture.abandon(self.handle) {
            debug!(handle = %self.handle, "Capture request dropped before it resolved");
        }
    }
}

/// Integration between the portal and the compositor protocol
pub struct Integration {
    config: IntegrationConfig,
    state: Arc<Mutex<State>>,
    connection: Arc<Mutex<Option<ProtocolConnection>>>,
    router: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<IntegrationEvent>,
    notifier: Arc<dyn Notifier>,
}

impl Integration {
    /// Create an integration that notifies through the desktop (or the log
    /// when notifications are disabled)
    pub fn new(config: IntegrationConfig) -> Self {
        let notifier: Arc<dyn Notifier> = if config.notifications {
            Arc::new(DbusNotifier::new(config.notification_app_name.clone()))
        } else {
            Arc::new(LogNotifier)
        };
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: IntegrationConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state: Arc::new(Mutex::new(State::default())),
            connection: Arc::new(Mutex::new(None)),
            router: Mutex::new(None),
            events,
            notifier,
        }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Connect to the compositor over `transport`.
    ///
    /// Returns once the connection thread is running; the outcome of the
    /// handshake is published as [`IntegrationEvent`]. Does nothing while a
    /// connection is alive. Must be called within a tokio runtime.
    pub fn init<T: Transport>(&self, transport: T) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PortalcastError::protocol(format!("init needs a tokio runtime: {}", e)))?;

        let mut slot = self.connection.lock();
        if slot.is_some() {
            debug!("Integration already initialized");
            return Ok(());
        }

        let (sink, source) = mpsc::unbounded_channel();
        *slot = Some(ProtocolConnection::connect(
            transport,
            sink,
            self.config.join_timeout,
        )?);
        drop(slot);

        let router = runtime.spawn(route(
            source,
            self.state.clone(),
            self.connection.clone(),
            self.events.clone(),
        ));
        if let Some(previous) = self.router.lock().replace(router) {
            // Router of a dead connection; its channel is already closed
            previous.abort();
        }
        Ok(())
    }

    /// Stop every capture, tear the connection down and drop all state.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let stopped = self.state.lock().stop_all();
        if stopped > 0 {
            info!(stopped, "Stopped capture sessions on shutdown");
        }

        let taken = self.connection.lock().take();
        if let Some(mut connection) = taken {
            connection.teardown();
        }
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
        self.state.lock().lose_connection("integration shut down");
    }

    /// Listen for state changes
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.events.subscribe()
    }

    /// Wait until the registry is ready and every bound output has
    /// described itself
    pub async fn wait_until_settled(&self, timeout: Duration) -> Result<()> {
        let mut events = self.subscribe();

        let settled = async {
            loop {
                {
                    let state = self.state.lock();
                    if state.registry_ready && state.outputs.is_settled() {
                        return Ok(());
                    }
                }
                if self.connection.lock().is_none() {
                    return Err(PortalcastError::NotConnected);
                }

                match events.recv().await {
                    Ok(IntegrationEvent::ConnectionFailed(reason))
                    | Ok(IntegrationEvent::ConnectionLost(reason)) => {
                        return Err(PortalcastError::ConnectionLost(reason));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(PortalcastError::NotConnected);
                    }
                }
            }
        };

        tokio::time::timeout(timeout, settled).await.map_err(|_| {
            PortalcastError::protocol(format!(
                "registry did not settle within {}ms",
                timeout.as_millis()
            ))
        })?
    }

    /// Request fake input authorization, once per process lifetime
    pub fn authorize(&self) -> Result<bool> {
        let mut guard = self.state.lock();
        let State {
            client,
            capabilities,
            input,
            ..
        } = &mut *guard;
        input.authorize(
            bound(client, capabilities, Capability::FakeInput),
            &self.config.application,
            &self.config.reason,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().client.is_some()
    }

    /// Whether any capture session is active
    pub fn is_streaming_enabled(&self) -> bool {
        !self.state.lock().capture.is_empty()
    }

    /// Whether the screencast capability is bound
    pub fn is_capture_available(&self) -> bool {
        self.state.lock().is_bound(Capability::Screencast)
    }

    pub fn is_registry_ready(&self) -> bool {
        self.state.lock().registry_ready
    }

    pub fn is_window_management_available(&self) -> bool {
        self.state.lock().is_bound(Capability::WindowManagement)
    }

    /// Whether input events are currently forwarded
    pub fn is_input_enabled(&self) -> bool {
        self.state.lock().input.is_enabled()
    }

    /// Forward input without a capture of our own
    pub fn start_input_streaming(&self) {
        self.state.lock().input.enable();
    }

    /// Capture an output; returns the PipeWire node id of the new stream
    pub async fn start_output_capture(&self, output: u32, cursor: CursorMode) -> Result<u32> {
        let (handle, rx) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let client = state.client.clone().ok_or(PortalcastError::NotConnected)?;
            if !state.is_bound(Capability::Screencast) {
                return Err(PortalcastError::CapabilityUnbound(Capability::Screencast));
            }
            let output = state
                .outputs
                .get(output)
                .ok_or(PortalcastError::UnknownOutput(output))?;
            state.capture.request_output(client.as_ref(), output, cursor)?
        };

        self.negotiate(handle, rx).await
    }

    /// Capture a window by its window-management uuid
    pub async fn start_window_capture(&self, window_uuid: &str) -> Result<u32> {
        let (handle, rx) = {
            let mut state = self.state.lock();
            let client = state.client.clone().ok_or(PortalcastError::NotConnected)?;
            if !state.is_bound(Capability::Screencast) {
                return Err(PortalcastError::CapabilityUnbound(Capability::Screencast));
            }
            state.capture.request_window(client.as_ref(), window_uuid)?
        };

        self.negotiate(handle, rx).await
    }

    async fn negotiate(
        &self,
        handle: StreamHandle,
        rx: oneshot::Receiver<NegotiationOutcome>,
    ) -> Result<u32> {
        let bound = self.config.negotiation_timeout;
        let state = self.state.clone();
        let _withdraw = AbandonOnDrop {
            state: self.state.clone(),
            handle,
        };

        let outcome = wait_for_outcome(rx, bound, |rx| {
            let mut state = state.lock();
            state.capture.abandon(handle);
            // The router may have resolved it right before we withdrew
            rx.try_recv().unwrap_or(NegotiationOutcome::TimedOut)
        })
        .await;

        match outcome {
            NegotiationOutcome::Created(node_id) => Ok(node_id),
            NegotiationOutcome::Failed(reason) => {
                self.notifier
                    .notify(Notification::screencast_failure(&reason));
                Err(PortalcastError::NegotiationFailed(reason))
            }
            NegotiationOutcome::ConnectionLost(reason) => {
                Err(PortalcastError::ConnectionLost(reason))
            }
            NegotiationOutcome::TimedOut => {
                warn!(%handle, timeout_ms = bound.as_millis() as u64, "Screencast negotiation timed out");
                Err(PortalcastError::NegotiationTimeout(bound))
            }
        }
    }

    /// Capture requests still waiting for a terminal event
    pub fn pending_negotiations(&self) -> usize {
        self.state.lock().capture.pending_count()
    }

    /// Stop one session; returns whether it was active
    pub fn stop_session(&self, node_id: u32) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let stopped = state.capture.stop_session(state.client.as_deref(), node_id);
        if state.capture.is_empty() {
            state.input.disable();
        }
        stopped
    }

    /// Stop every session and disable input forwarding
    pub fn stop_all_capture(&self) {
        let stopped = self.state.lock().stop_all();
        if stopped > 0 {
            info!(stopped, "Stopped all capture sessions");
        }
    }

    pub fn pointer_button_press(&self, button: u32) -> bool {
        let state = self.state.lock();
        state.input.pointer_button(state.fake_input(), button, true)
    }

    pub fn pointer_button_release(&self, button: u32) -> bool {
        let state = self.state.lock();
        state.input.pointer_button(state.fake_input(), button, false)
    }

    pub fn pointer_motion(&self, dx: f64, dy: f64) -> bool {
        let state = self.state.lock();
        state.input.pointer_motion(state.fake_input(), dx, dy)
    }

    /// Move the pointer to output-local coordinates of the streamed output
    pub fn pointer_motion_absolute(&self, x: f64, y: f64) -> bool {
        let state = self.state.lock();
        state
            .input
            .pointer_motion_absolute(state.fake_input(), PointF::new(x, y))
    }

    pub fn pointer_axis_discrete(&self, orientation: Orientation, delta: f64) -> bool {
        let state = self.state.lock();
        state
            .input
            .pointer_axis(state.fake_input(), orientation, delta)
    }

    pub fn keyboard_key(&self, keycode: i32, pressed: bool) -> bool {
        let Ok(keycode) = u32::try_from(keycode) else {
            debug!(keycode, "Dropping negative keycode");
            return false;
        };
        let state = self.state.lock();
        state.input.keyboard_key(state.fake_input(), keycode, pressed)
    }

    /// Snapshot of the known outputs, ordered by registry name
    pub fn screens(&self) -> BTreeMap<u32, Output> {
        self.state.lock().outputs.screens()
    }

    /// Descriptors of the active sessions, in creation order
    pub fn stream_descriptors(&self) -> Vec<StreamDescriptor> {
        self.state.lock().capture.descriptors()
    }

    /// Active sessions as the portal's `a(ua{sv})` value
    pub fn streams(&self) -> Result<OwnedValue> {
        encode_streams(&self.stream_descriptors())
    }
}

impl Drop for Integration {
    fn drop(&mut self) {
        self.shutdown();
    }
}
