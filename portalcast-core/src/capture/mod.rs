//! Capture stream negotiation and session bookkeeping
//!
//! Per request the lifecycle is
//!
//! ```text
//! Requested ─┬─▶ Created ─▶ Active ─▶ Closed
//!            ├─▶ Failed
//!            └─▶ TimedOut
//! ```
//!
//! Only `Created` produces a session, and `Closed` (explicit stop or
//! compositor-side closure) is the only way out of the active set.

pub mod negotiation;
pub mod session;

pub use negotiation::{DEFAULT_NEGOTIATION_TIMEOUT, NegotiationOutcome};
pub use session::{CaptureSession, CaptureTarget, SessionSet};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::outputs::Output;
use crate::protocol::{ProtocolClient, StreamHandle};
use crate::streams::{StreamDescriptor, StreamMetadata};
use crate::types::CursorMode;
use negotiation::PendingNegotiations;

/// What a `created` event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedOutcome {
    /// A new session went live for this target
    Recorded(CaptureTarget),
    /// Nobody was waiting; the stream was released
    Orphaned,
    /// The node id is already active; the stream was released
    Duplicate,
}

/// Owner of the active session set and the in-flight requests
#[derive(Debug, Default)]
pub struct CaptureSessionManager {
    sessions: SessionSet,
    pending: PendingNegotiations,
}

impl CaptureSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue an output capture request
    pub fn request_output(
        &mut self,
        client: &dyn ProtocolClient,
        output: &Output,
        cursor: CursorMode,
    ) -> Result<(StreamHandle, oneshot::Receiver<NegotiationOutcome>)> {
        let handle = client.stream_output(output.name, cursor)?;
        debug!(%handle, output = output.name, ?cursor, "Requested output stream");

        let metadata = StreamMetadata::monitor(output.pixel_size, output.global_position);
        let rx = self
            .pending
            .register(handle, CaptureTarget::Output(output.name), metadata);
        Ok((handle, rx))
    }

    /// Issue a window capture request; windows are always captured without cursor
    pub fn request_window(
        &mut self,
        client: &dyn ProtocolClient,
        window_uuid: &str,
    ) -> Result<(StreamHandle, oneshot::Receiver<NegotiationOutcome>)> {
        let handle = client.stream_window(window_uuid, CursorMode::Hidden)?;
        debug!(%handle, window = window_uuid, "Requested window stream");

        let rx = self.pending.register(
            handle,
            CaptureTarget::Window(window_uuid.to_string()),
            StreamMetadata::window(),
        );
        Ok((handle, rx))
    }

    /// Handle `created` for a stream
    pub fn on_created(
        &mut self,
        client: Option<&dyn ProtocolClient>,
        handle: StreamHandle,
        node_id: u32,
    ) -> CreatedOutcome {
        let Some(pending) = self.pending.take(handle) else {
            debug!(%handle, node_id, "Stream created after its request was abandoned");
            if let Some(client) = client {
                client.close_stream(handle);
            }
            return CreatedOutcome::Orphaned;
        };

        let session = CaptureSession {
            node_id,
            target: pending.target.clone(),
            metadata: pending.metadata,
            handle,
        };
        if self.sessions.insert(session).is_err() {
            warn!(node_id, "Compositor reused an active node id, dropping the new stream");
            if let Some(client) = client {
                client.close_stream(handle);
            }
            pending.resolve(NegotiationOutcome::Failed(format!(
                "node {} is already being streamed",
                node_id
            )));
            return CreatedOutcome::Duplicate;
        }

        let target = pending.target.clone();
        if !pending.resolve(NegotiationOutcome::Created(node_id)) {
            // Requester went away between claiming and resolving
            self.sessions.remove(node_id);
            if let Some(client) = client {
                client.close_stream(handle);
            }
            return CreatedOutcome::Orphaned;
        }

        info!(node_id, %target, "Screencast stream created");
        CreatedOutcome::Recorded(target)
    }

    /// Handle `failed` for a stream; `true` if a requester was told
    pub fn on_failed(&mut self, handle: StreamHandle, error: String) -> bool {
        match self.pending.take(handle) {
            Some(pending) => {
                warn!(%handle, target = %pending.target, "failed to start streaming: {}", error);
                pending.resolve(NegotiationOutcome::Failed(error))
            }
            None => {
                debug!(%handle, "Ignoring failure of an abandoned request: {}", error);
                false
            }
        }
    }

    /// Handle `closed` for a stream; returns the node id that went away
    pub fn on_closed(&mut self, client: Option<&dyn ProtocolClient>, handle: StreamHandle) -> Option<u32> {
        let node_id = self.sessions.node_for(handle)?;
        self.stop_session(client, node_id).then_some(node_id)
    }

    /// Withdraw a request whose requester stopped waiting
    pub fn abandon(&mut self, handle: StreamHandle) -> bool {
        self.pending.take(handle).is_some()
    }

    /// Remove a session and release its stream.
    ///
    /// Once the set is empty every remaining stream is released as well.
    /// Removing an unknown node id is a no-op.
    pub fn stop_session(&mut self, client: Option<&dyn ProtocolClient>, node_id: u32) -> bool {
        let Some(session) = self.sessions.remove(node_id) else {
            return false;
        };

        info!(node_id, "Stopping screencast stream");
        if let Some(client) = client {
            client.close_stream(session.handle);
        }

        if self.sessions.is_empty() {
            self.stop_all(client);
        }
        true
    }

    /// Release every stream and clear the set; returns how many were active
    pub fn stop_all(&mut self, client: Option<&dyn ProtocolClient>) -> usize {
        let sessions = self.sessions.drain();
        for session in &sessions {
            if let Some(client) = client {
                client.close_stream(session.handle);
            }
        }
        sessions.len()
    }

    /// Forget everything after the connection died; nothing is released
    pub fn reset(&mut self, reason: &str) {
        self.pending
            .fail_all(NegotiationOutcome::ConnectionLost(reason.to_string()));
        let dropped = self.sessions.drain();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Dropping sessions of the lost connection");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> &SessionSet {
        &self.sessions
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Descriptors of the active set, in creation order
    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.sessions.iter().map(CaptureSession::descriptor).collect()
    }
}
