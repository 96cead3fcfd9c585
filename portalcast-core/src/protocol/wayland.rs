//! KWin backend over `wayland-client`
//!
//! Binds `wl_output`, `zkde_screencast_unstable_v1`, `org_kde_kwin_fake_input`
//! and `org_kde_plasma_window_management` and forwards their traffic as
//! [`ProtocolEvent`]s.

use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{wl_output, wl_registry};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_protocols_plasma::fake_input::client::org_kde_kwin_fake_input::OrgKdeKwinFakeInput;
use wayland_protocols_plasma::plasma_window_management::client::org_kde_plasma_window_management::{
    self, OrgKdePlasmaWindowManagement,
};
use wayland_protocols_plasma::screencast::v1::client::zkde_screencast_stream_unstable_v1::{
    self, ZkdeScreencastStreamUnstableV1,
};
use wayland_protocols_plasma::screencast::v1::client::zkde_screencast_unstable_v1::ZkdeScreencastUnstableV1;

use crate::error::{PortalcastError, Result};
use crate::protocol::{
    EventSink, Interface, OutputInfo, ProtocolClient, ProtocolEvent, StreamHandle, Transport,
};
use crate::types::{Capability, CursorMode, Orientation, Point, Size};

/// How long one poll on the connection fd may block
const POLL_TIMEOUT_MS: libc::c_int = 100;

const OUTPUT_VERSION: u32 = 4;
const FAKE_INPUT_VERSION: u32 = 4;
const SCREENCAST_VERSION: u32 = 3;
const WINDOW_MANAGEMENT_VERSION: u32 = 10;

/// Protocol objects shared by the request side and the dispatch loop
#[derive(Default)]
struct Objects {
    outputs: HashMap<u32, wl_output::WlOutput>,
    screencast: Option<ZkdeScreencastUnstableV1>,
    fake_input: Option<OrgKdeKwinFakeInput>,
    window_management: Option<OrgKdePlasmaWindowManagement>,
    streams: HashMap<StreamHandle, ZkdeScreencastStreamUnstableV1>,
}

impl Objects {
    /// Forget a stream and destroy it on the compositor side
    fn release_stream(&mut self, handle: StreamHandle) -> bool {
        match self.streams.remove(&handle) {
            Some(stream) => {
                stream.close();
                true
            }
            None => false,
        }
    }
}

/// State owned by the dispatch loop
struct DispatchState {
    events: EventSink,
    objects: Arc<Mutex<Objects>>,
    /// Output metadata accumulated until `done`
    describing: HashMap<u32, OutputInfo>,
}

impl DispatchState {
    fn send(&self, event: ProtocolEvent) {
        if self.events.send(event).is_err() {
            trace!("Protocol event dropped, nobody is listening");
        }
    }
}

/// Transport connecting to the compositor named by `WAYLAND_DISPLAY`
#[derive(Default)]
pub struct WaylandTransport {
    connection: Option<Connection>,
    queue: Option<EventQueue<DispatchState>>,
    state: Option<DispatchState>,
}

impl WaylandTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WaylandTransport {
    fn connect(&mut self, events: EventSink) -> Result<Arc<dyn ProtocolClient>> {
        let connection = Connection::connect_to_env().map_err(|e| {
            PortalcastError::protocol(format!("Failed to connect to Wayland display: {}", e))
        })?;

        let queue: EventQueue<DispatchState> = connection.new_event_queue();
        let qh = queue.handle();
        let registry = connection.display().get_registry(&qh, ());
        let objects = Arc::new(Mutex::new(Objects::default()));

        let client = WaylandClient {
            connection: connection.clone(),
            qh,
            registry,
            objects: objects.clone(),
        };

        self.state = Some(DispatchState {
            events,
            objects,
            describing: HashMap::new(),
        });
        self.queue = Some(queue);
        self.connection = Some(connection);

        Ok(Arc::new(client))
    }

    fn dispatch(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let (Some(connection), Some(queue), Some(state)) =
            (&self.connection, &mut self.queue, &mut self.state)
        else {
            return Err(PortalcastError::protocol("dispatch called before connect"));
        };

        // Initial registry burst
        queue
            .roundtrip(state)
            .map_err(|e| PortalcastError::protocol(format!("Registry roundtrip failed: {}", e)))?;
        state.send(ProtocolEvent::InterfacesAnnounced);

        let fd = connection.as_fd();
        while !shutdown.load(Ordering::SeqCst) {
            connection
                .flush()
                .map_err(|e| PortalcastError::protocol(format!("Flush failed: {}", e)))?;

            if let Some(guard) = queue.prepare_read() {
                let mut pollfd = libc::pollfd {
                    fd: fd.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                };

                // SAFETY: `pollfd` is a valid, exclusively borrowed array of one entry
                let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
                if ready == 0 {
                    continue;
                }
                if ready < 0 {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err.into());
                }

                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        return Err(PortalcastError::protocol(format!("Read failed: {}", e)));
                    }
                }
            }

            queue
                .dispatch_pending(state)
                .map_err(|e| PortalcastError::protocol(format!("Dispatch failed: {}", e)))?;
        }

        Ok(())
    }
}

/// Request side handed to the integration
struct WaylandClient {
    connection: Connection,
    qh: QueueHandle<DispatchState>,
    registry: wl_registry::WlRegistry,
    objects: Arc<Mutex<Objects>>,
}

impl WaylandClient {
    fn flush(&self) {
        if let Err(e) = self.connection.flush() {
            debug!("Wayland flush failed: {}", e);
        }
    }

    fn with_fake_input(&self, request: impl FnOnce(&OrgKdeKwinFakeInput)) {
        let objects = self.objects.lock();
        match &objects.fake_input {
            Some(fake_input) => request(fake_input),
            None => trace!("Fake input not bound, dropping input event"),
        }
        drop(objects);
        self.flush();
    }

    fn register_stream(&self, handle: StreamHandle, stream: ZkdeScreencastStreamUnstableV1) -> StreamHandle {
        self.objects.lock().streams.insert(handle, stream);
        self.flush();
        handle
    }
}

impl ProtocolClient for WaylandClient {
    fn bind_output(&self, name: u32, version: u32) -> Result<()> {
        let output: wl_output::WlOutput =
            self.registry
                .bind(name, version.min(OUTPUT_VERSION), &self.qh, name);
        self.objects.lock().outputs.insert(name, output);
        self.flush();
        Ok(())
    }

    fn release_output(&self, name: u32) {
        if let Some(output) = self.objects.lock().outputs.remove(&name) {
            if output.version() >= 3 {
                output.release();
            }
        }
        self.flush();
    }

    fn bind_fake_input(&self, name: u32, version: u32) -> Result<()> {
        let fake_input: OrgKdeKwinFakeInput =
            self.registry
                .bind(name, version.min(FAKE_INPUT_VERSION), &self.qh, ());
        self.objects.lock().fake_input = Some(fake_input);
        self.flush();
        Ok(())
    }

    fn bind_screencast(&self, name: u32, version: u32) -> Result<()> {
        let screencast: ZkdeScreencastUnstableV1 =
            self.registry
                .bind(name, version.min(SCREENCAST_VERSION), &self.qh, ());
        self.objects.lock().screencast = Some(screencast);
        self.flush();
        Ok(())
    }

    fn bind_window_management(&self, name: u32, version: u32) -> Result<()> {
        let window_management: OrgKdePlasmaWindowManagement = self.registry.bind(
            name,
            version.min(WINDOW_MANAGEMENT_VERSION),
            &self.qh,
            (),
        );
        self.objects.lock().window_management = Some(window_management);
        self.flush();
        Ok(())
    }

    fn stream_output(&self, output: u32, cursor: CursorMode) -> Result<StreamHandle> {
        let handle = StreamHandle::new();
        let stream = {
            let objects = self.objects.lock();
            let screencast = objects
                .screencast
                .as_ref()
                .ok_or(PortalcastError::CapabilityUnbound(Capability::Screencast))?;
            let wl_output = objects
                .outputs
                .get(&output)
                .ok_or(PortalcastError::UnknownOutput(output))?;
            screencast.stream_output(wl_output, cursor.wire_value(), &self.qh, handle)
        };
        Ok(self.register_stream(handle, stream))
    }

    fn stream_window(&self, window_uuid: &str, cursor: CursorMode) -> Result<StreamHandle> {
        let handle = StreamHandle::new();
        let stream = {
            let objects = self.objects.lock();
            let screencast = objects
                .screencast
                .as_ref()
                .ok_or(PortalcastError::CapabilityUnbound(Capability::Screencast))?;
            screencast.stream_window(
                window_uuid.to_string(),
                cursor.wire_value(),
                &self.qh,
                handle,
            )
        };
        Ok(self.register_stream(handle, stream))
    }

    fn close_stream(&self, handle: StreamHandle) {
        self.objects.lock().release_stream(handle);
        self.flush();
    }

    fn authenticate(&self, application: &str, reason: &str) {
        self.with_fake_input(|fake_input| {
            fake_input.authenticate(application.to_string(), reason.to_string())
        });
    }

    fn pointer_button(&self, button: u32, pressed: bool) {
        self.with_fake_input(|fake_input| fake_input.button(button, u32::from(pressed)));
    }

    fn pointer_motion(&self, dx: f64, dy: f64) {
        self.with_fake_input(|fake_input| fake_input.pointer_motion(dx, dy));
    }

    fn pointer_motion_absolute(&self, x: f64, y: f64) {
        self.with_fake_input(|fake_input| {
            if fake_input.version() >= 3 {
                fake_input.pointer_motion_absolute(x, y);
            }
        });
    }

    fn pointer_axis(&self, orientation: Orientation, delta: f64) {
        self.with_fake_input(|fake_input| fake_input.axis(orientation.axis_value(), delta));
    }

    fn keyboard_key(&self, keycode: u32, pressed: bool) {
        self.with_fake_input(|fake_input| {
            if fake_input.version() >= 4 {
                fake_input.keyboard_key(keycode, u32::from(pressed));
            }
        });
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for DispatchState {
    fn event(
        state: &mut Self,
        _registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.send(ProtocolEvent::Global {
                interface: Interface::from_name(&interface),
                name,
                version,
            }),
            wl_registry::Event::GlobalRemove { name } => {
                state.describing.remove(&name);
                state.send(ProtocolEvent::GlobalRemoved { name });
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for DispatchState {
    fn event(
        state: &mut Self,
        _output: &wl_output::WlOutput,
        event: wl_output::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let info = state.describing.entry(*name).or_insert_with(|| OutputInfo {
            name: *name,
            ..OutputInfo::default()
        });

        match event {
            wl_output::Event::Geometry {
                x, y, make, model, ..
            } => {
                info.global_position = Point::new(x, y);
                info.manufacturer = make;
                info.model = model;
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                ..
            } => {
                if let WEnum::Value(flags) = flags {
                    if flags.contains(wl_output::Mode::Current) {
                        info.pixel_size = Size::new(width, height);
                    }
                }
            }
            wl_output::Event::Name { name } => info.connector = name,
            wl_output::Event::Done => {
                let info = info.clone();
                state.send(ProtocolEvent::OutputChanged(info));
            }
            _ => {}
        }
    }
}

impl Dispatch<ZkdeScreencastStreamUnstableV1, StreamHandle> for DispatchState {
    fn event(
        state: &mut Self,
        _stream: &ZkdeScreencastStreamUnstableV1,
        event: zkde_screencast_stream_unstable_v1::Event,
        handle: &StreamHandle,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let handle = *handle;
        match event {
            zkde_screencast_stream_unstable_v1::Event::Created { node } => {
                state.send(ProtocolEvent::StreamCreated {
                    handle,
                    node_id: node,
                });
            }
            zkde_screencast_stream_unstable_v1::Event::Failed { error } => {
                state.objects.lock().release_stream(handle);
                state.send(ProtocolEvent::StreamFailed { handle, error });
            }
            zkde_screencast_stream_unstable_v1::Event::Closed => {
                state.objects.lock().release_stream(handle);
                state.send(ProtocolEvent::StreamClosed { handle });
            }
            _ => {}
        }
    }
}

impl Dispatch<ZkdeScreencastUnstableV1, ()> for DispatchState {
    fn event(
        _state: &mut Self,
        _screencast: &ZkdeScreencastUnstableV1,
        _event: <ZkdeScreencastUnstableV1 as Proxy>::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // No events
    }
}

impl Dispatch<OrgKdeKwinFakeInput, ()> for DispatchState {
    fn event(
        _state: &mut Self,
        _fake_input: &OrgKdeKwinFakeInput,
        _event: <OrgKdeKwinFakeInput as Proxy>::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // No events
    }
}

impl Dispatch<OrgKdePlasmaWindowManagement, ()> for DispatchState {
    fn event(
        _state: &mut Self,
        _window_management: &OrgKdePlasmaWindowManagement,
        event: org_kde_plasma_window_management::Event,
        _: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Windows are addressed by uuid only; the window list is not tracked
        trace!(?event, "Window management event");
    }
}

impl Drop for WaylandTransport {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            let mut objects = state.objects.lock();
            let handles: Vec<StreamHandle> = objects.streams.keys().copied().collect();
            for handle in handles {
                objects.release_stream(handle);
            }
            if let Some(connection) = &self.connection {
                if let Err(e) = connection.flush() {
                    warn!("Failed to flush on teardown: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    /// Requests the client has written so far, as (object id, opcode)
    fn written_requests(server: &mut UnixStream) -> Vec<(u32, u16)> {
        server.set_nonblocking(true).unwrap();
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match server.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("read failed: {}", e),
            }
        }

        let word = |at: usize| u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap());
        let mut requests = Vec::new();
        let mut at = 0;
        while at + 8 <= bytes.len() {
            let header = word(at + 4);
            requests.push((word(at), (header & 0xffff) as u16));
            let size = (header >> 16) as usize;
            if size < 8 {
                break;
            }
            at += size;
        }
        requests
    }

    #[test]
    fn test_released_stream_is_destroyed() {
        let (client_end, mut server_end) = UnixStream::pair().unwrap();
        let connection = Connection::from_socket(client_end).unwrap();
        let queue: EventQueue<DispatchState> = connection.new_event_queue();
        let qh = queue.handle();
        let registry = connection.display().get_registry(&qh, ());
        let output: wl_output::WlOutput = registry.bind(1, 1, &qh, 1);
        let screencast: ZkdeScreencastUnstableV1 = registry.bind(2, 1, &qh, ());

        let handle = StreamHandle::new();
        let stream =
            screencast.stream_output(&output, CursorMode::Hidden.wire_value(), &qh, handle);
        let stream_id = stream.id().protocol_id();

        let mut objects = Objects::default();
        objects.streams.insert(handle, stream);
        assert!(objects.release_stream(handle));
        assert!(!objects.release_stream(handle));
        connection.flush().unwrap();

        // `close` is the stream's destructor, opcode 0
        let requests = written_requests(&mut server_end);
        assert!(requests.contains(&(stream_id, 0)));
    }
}
