//! Mock infrastructure for testing
//!
//! A scripted in-process compositor: [`MockCompositor`] is the test's remote
//! control, [`MockTransport`] is handed to `Integration::init`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use portalcast_core::config::IntegrationConfig;
use portalcast_core::error::{PortalcastError, Result};
use portalcast_core::notify::{Notification, Notifier};
use portalcast_core::protocol::{
    EventSink, Interface, OutputInfo, ProtocolClient, ProtocolEvent, StreamHandle, Transport,
};
use portalcast_core::types::{CursorMode, Orientation, Point, Size};
use portalcast_core::{Integration, IntegrationEvent};
use tokio::sync::broadcast;

pub const OUTPUT_NAME: u32 = 5;
pub const FAKE_INPUT_NAME: u32 = 10;
pub const SCREENCAST_NAME: u32 = 11;
pub const WINDOW_MANAGEMENT_NAME: u32 = 12;

/// How the compositor answers the next capture request
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Stream goes live on this node
    Create(u32),
    /// Stream goes live, but only after a delay
    CreateAfter(u32, Duration),
    /// Request is rejected
    Fail(String),
    /// Nothing ever comes back
    Silent,
}

/// Every request the integration made, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BindOutput(u32, u32),
    ReleaseOutput(u32),
    BindFakeInput,
    BindScreencast,
    BindWindowManagement,
    StreamOutput(u32, CursorMode),
    StreamWindow(String, CursorMode),
    CloseStream(StreamHandle),
    Authenticate(String, String),
    Button(u32, bool),
    Motion(f64, f64),
    Absolute(f64, f64),
    Axis(Orientation, f64),
    Key(u32, bool),
}

#[derive(Default)]
struct Inner {
    events: Mutex<Option<EventSink>>,
    calls: Mutex<Vec<Call>>,
    globals: Mutex<Vec<(Interface, u32, u32)>>,
    outputs: Mutex<HashMap<u32, OutputInfo>>,
    scripts: Mutex<VecDeque<StreamScript>>,
    handles: Mutex<Vec<StreamHandle>>,
    refuse: Mutex<Option<String>>,
    kill: Mutex<Option<String>>,
    dispatching: AtomicBool,
}

impl Inner {
    fn send(&self, event: ProtocolEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn answer(self: &Arc<Self>, handle: StreamHandle) {
        self.handles.lock().push(handle);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(StreamScript::Silent);

        match script {
            StreamScript::Create(node_id) => self.send(ProtocolEvent::StreamCreated { handle, node_id }),
            StreamScript::Fail(error) => self.send(ProtocolEvent::StreamFailed { handle, error }),
            StreamScript::CreateAfter(node_id, delay) => {
                let inner = self.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    inner.send(ProtocolEvent::StreamCreated { handle, node_id });
                });
            }
            StreamScript::Silent => {}
        }
    }
}

/// Remote control for the mock compositor
#[derive(Clone, Default)]
pub struct MockCompositor {
    inner: Arc<Inner>,
}

impl MockCompositor {
    /// A compositor with nothing announced
    pub fn empty() -> Self {
        Self::default()
    }

    /// KWin with one 1920x1080 HDMI output at the origin and every capability
    pub fn kde() -> Self {
        let compositor = Self::empty();
        compositor.add_output(
            OUTPUT_NAME,
            2,
            OutputInfo {
                name: OUTPUT_NAME,
                connector: "HDMI-A-1".to_string(),
                manufacturer: "Dell Inc.".to_string(),
                model: "U2720Q".to_string(),
                pixel_size: Size::new(1920, 1080),
                global_position: Point::new(0, 0),
            },
        );
        compositor.add_global(Interface::FakeInput, FAKE_INPUT_NAME, 4);
        compositor.add_global(Interface::Screencast, SCREENCAST_NAME, 3);
        compositor.add_global(Interface::WindowManagement, WINDOW_MANAGEMENT_NAME, 16);
        compositor
    }

    pub fn add_global(&self, interface: Interface, name: u32, version: u32) {
        self.inner.globals.lock().push((interface, name, version));
    }

    /// Announce an output that describes itself as soon as it is bound
    pub fn add_output(&self, name: u32, version: u32, info: OutputInfo) {
        self.inner.outputs.lock().insert(name, info);
        self.add_global(Interface::Output, name, version);
    }

    /// Queue the answer to the next capture request
    pub fn script(&self, script: StreamScript) {
        self.inner.scripts.lock().push_back(script);
    }

    /// Make the handshake fail
    pub fn refuse(&self, reason: &str) {
        *self.inner.refuse.lock() = Some(reason.to_string());
    }

    /// Drop the connection from the compositor side
    pub fn kill(&self, reason: &str) {
        *self.inner.kill.lock() = Some(reason.to_string());
    }

    /// Inject a raw protocol event
    pub fn emit(&self, event: ProtocolEvent) {
        self.inner.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    /// Handles of every capture request so far
    pub fn handles(&self) -> Vec<StreamHandle> {
        self.inner.handles.lock().clone()
    }

    pub fn is_dispatching(&self) -> bool {
        self.inner.dispatching.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            inner: self.inner.clone(),
        }
    }
}

/// Transport side of the mock compositor
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Transport for MockTransport {
    fn connect(&mut self, events: EventSink) -> Result<Arc<dyn ProtocolClient>> {
        if let Some(reason) = self.inner.refuse.lock().clone() {
            return Err(PortalcastError::protocol(reason));
        }
        *self.inner.events.lock() = Some(events);
        Ok(Arc::new(MockClient {
            inner: self.inner.clone(),
        }))
    }

    fn dispatch(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.inner.dispatching.store(true, Ordering::SeqCst);

        let globals = self.inner.globals.lock().clone();
        for (interface, name, version) in globals {
            self.inner.send(ProtocolEvent::Global {
                interface,
                name,
                version,
            });
        }
        self.inner.send(ProtocolEvent::InterfacesAnnounced);

        let outcome = loop {
            if shutdown.load(Ordering::SeqCst) {
                break Ok(());
            }
            if let Some(reason) = self.inner.kill.lock().take() {
                break Err(PortalcastError::protocol(reason));
            }
            std::thread::sleep(Duration::from_millis(5));
        };

        self.inner.dispatching.store(false, Ordering::SeqCst);
        *self.inner.events.lock() = None;
        outcome
    }
}

struct MockClient {
    inner: Arc<Inner>,
}

impl ProtocolClient for MockClient {
    fn bind_output(&self, name: u32, version: u32) -> Result<()> {
        self.inner.record(Call::BindOutput(name, version));
        let info = self.inner.outputs.lock().get(&name).cloned();
        if let Some(info) = info {
            self.inner.send(ProtocolEvent::OutputChanged(info));
        }
        Ok(())
    }

    fn release_output(&self, name: u32) {
        self.inner.record(Call::ReleaseOutput(name));
    }

    fn bind_fake_input(&self, _name: u32, _version: u32) -> Result<()> {
        self.inner.record(Call::BindFakeInput);
        Ok(())
    }

    fn bind_screencast(&self, _name: u32, _version: u32) -> Result<()> {
        self.inner.record(Call::BindScreencast);
        Ok(())
    }

    fn bind_window_management(&self, _name: u32, _version: u32) -> Result<()> {
        self.inner.record(Call::BindWindowManagement);
        Ok(())
    }

    fn stream_output(&self, output: u32, cursor: CursorMode) -> Result<StreamHandle> {
        self.inner.record(Call::StreamOutput(output, cursor));
        let handle = StreamHandle::new();
        self.inner.answer(handle);
        Ok(handle)
    }

    fn stream_window(&self, window_uuid: &str, cursor: CursorMode) -> Result<StreamHandle> {
        self.inner
            .record(Call::StreamWindow(window_uuid.to_string(), cursor));
        let handle = StreamHandle::new();
        self.inner.answer(handle);
        Ok(handle)
    }

    fn close_stream(&self, handle: StreamHandle) {
        self.inner.record(Call::CloseStream(handle));
    }

    fn authenticate(&self, application: &str, reason: &str) {
        self.inner.record(Call::Authenticate(
            application.to_string(),
            reason.to_string(),
        ));
    }

    fn pointer_button(&self, button: u32, pressed: bool) {
        self.inner.record(Call::Button(button, pressed));
    }

    fn pointer_motion(&self, dx: f64, dy: f64) {
        self.inner.record(Call::Motion(dx, dy));
    }

    fn pointer_motion_absolute(&self, x: f64, y: f64) {
        self.inner.record(Call::Absolute(x, y));
    }

    fn pointer_axis(&self, orientation: Orientation, delta: f64) {
        self.inner.record(Call::Axis(orientation, delta));
    }

    fn keyboard_key(&self, keycode: u32, pressed: bool) {
        self.inner.record(Call::Key(keycode, pressed));
    }
}

/// Notifier that keeps what it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.shown.lock().push(notification);
    }
}

/// Config with a short negotiation bound for tests that expect timeouts
pub fn fast_config() -> IntegrationConfig {
    IntegrationConfig::default()
        .with_negotiation_timeout(Duration::from_millis(100))
        .with_join_timeout(Duration::from_millis(500))
}

/// Connect an integration to `compositor` and wait for the registry
pub async fn connect(
    compositor: &MockCompositor,
    config: IntegrationConfig,
) -> (Integration, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let integration = Integration::with_notifier(config, notifier.clone());
    integration
        .init(compositor.transport())
        .expect("connection thread starts");
    integration
        .wait_until_settled(Duration::from_secs(2))
        .await
        .expect("registry settles");
    (integration, notifier)
}

/// Wait for the first event matching `wanted`
pub async fn wait_for<F>(events: &mut broadcast::Receiver<IntegrationEvent>, wanted: F) -> IntegrationEvent
where
    F: Fn(&IntegrationEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event arrives in time")
}

/// Poll `condition` until it holds
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition holds in time")
}
