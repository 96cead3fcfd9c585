//! Compositor connection lifecycle
//!
//! Runs a [`Transport`] on a dedicated worker thread. All protocol callbacks
//! happen there and are forwarded as events; nothing on the worker touches
//! integration state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{PortalcastError, Result};
use crate::protocol::{EventSink, ProtocolEvent, Transport};

/// Default bound on waiting for the worker thread to exit
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(3000);

/// Signals the owner when the worker exits, even if it panics
struct ExitNotice(mpsc::Sender<()>);

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Owner of the worker thread for one compositor connection
pub struct ProtocolConnection {
    /// Worker thread running the transport
    worker: Option<JoinHandle<()>>,
    /// Fires once the worker has left its loop
    exited_rx: mpsc::Receiver<()>,
    /// Asks the worker to leave its dispatch loop
    shutdown: Arc<AtomicBool>,
    /// Bound on waiting for the worker in `teardown`
    join_timeout: Duration,
}

impl ProtocolConnection {
    /// Start the worker thread and begin the handshake.
    ///
    /// Completion is reported on `events`: `Connected` or `ConnectFailed`,
    /// later `ConnectionDied` if the compositor goes away.
    pub fn connect<T: Transport>(
        mut transport: T,
        events: EventSink,
        join_timeout: Duration,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited_rx) = mpsc::channel();

        let shutdown_flag = shutdown.clone();
        let worker = std::thread::Builder::new()
            .name("portalcast-wayland".to_string())
            .spawn(move || {
                let _exit = ExitNotice(exited_tx);
                run_worker(&mut transport, &events, &shutdown_flag);
            })
            .map_err(|e| {
                PortalcastError::protocol(format!("Failed to spawn connection thread: {}", e))
            })?;

        info!("Compositor connection thread started");

        Ok(Self {
            worker: Some(worker),
            exited_rx,
            shutdown,
            join_timeout,
        })
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Stop the worker and wait for it, bounded by the join timeout.
    ///
    /// Returns `false` if the worker did not exit in time; it is then
    /// detached and left to finish on its own.
    pub fn teardown(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };

        self.shutdown.store(true, Ordering::SeqCst);

        match self.exited_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    error!("Compositor connection thread panicked");
                }
                debug!("Compositor connection thread joined");
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "Compositor connection thread did not exit in time, detaching it"
                );
                false
            }
        }
    }
}

impl Drop for ProtocolConnection {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Body of the worker thread
fn run_worker<T: Transport>(transport: &mut T, events: &EventSink, shutdown: &AtomicBool) {
    let client = match transport.connect(events.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to the compositor: {}", e);
            let _ = events.send(ProtocolEvent::ConnectFailed(e.to_string()));
            return;
        }
    };

    info!("Connected to the compositor");
    if events.send(ProtocolEvent::Connected(client)).is_err() {
        // Nobody is listening anymore
        return;
    }

    let outcome = transport.dispatch(shutdown);
    if shutdown.load(Ordering::SeqCst) {
        debug!("Compositor dispatch stopped on request");
        return;
    }

    let reason = match outcome {
        Ok(()) => "compositor closed the connection".to_string(),
        Err(e) => e.to_string(),
    };
    warn!("Compositor connection died: {}", reason);
    let _ = events.send(ProtocolEvent::ConnectionDied(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolClient;
    use std::time::Instant;
    use tokio::sync::mpsc::unbounded_channel;

    /// Transport whose handshake always fails
    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn connect(&mut self, _events: EventSink) -> Result<Arc<dyn ProtocolClient>> {
            Err(PortalcastError::protocol("no socket"))
        }

        fn dispatch(&mut self, _shutdown: &AtomicBool) -> Result<()> {
            unreachable!("dispatch after failed handshake")
        }
    }

    /// Transport that never returns from its handshake
    struct StuckTransport;

    impl Transport for StuckTransport {
        fn connect(&mut self, _events: EventSink) -> Result<Arc<dyn ProtocolClient>> {
            std::thread::sleep(Duration::from_millis(500));
            Err(PortalcastError::protocol("gave up"))
        }

        fn dispatch(&mut self, _shutdown: &AtomicBool) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handshake_failure_stops_worker() {
        let (tx, mut rx) = unbounded_channel();
        let mut connection =
            ProtocolConnection::connect(RefusingTransport, tx, DEFAULT_JOIN_TIMEOUT).unwrap();

        let event = rx.blocking_recv().expect("worker should report");
        assert!(matches!(event, ProtocolEvent::ConnectFailed(ref r) if r.contains("no socket")));

        assert!(connection.teardown());
        assert!(!connection.is_running());
    }

    #[test]
    fn test_teardown_is_bounded() {
        let (tx, _rx) = unbounded_channel();
        let mut connection =
            ProtocolConnection::connect(StuckTransport, tx, Duration::from_millis(50)).unwrap();

        let started = Instant::now();
        assert!(!connection.teardown());
        assert!(started.elapsed() < Duration::from_millis(400));

        // Second teardown has nothing left to wait for
        assert!(connection.teardown());
    }
}
