//! Bridging asynchronous stream events into one bounded result
//!
//! Each capture request gets a oneshot channel that is resolved at most once
//! by the event router. The requester races it against a timer; whichever
//! finishes first decides, and a late event finds no pending entry.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::capture::session::CaptureTarget;
use crate::protocol::StreamHandle;
use crate::streams::StreamMetadata;

/// Default bound on waiting for a terminal stream event
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_millis(3000);

/// Terminal result of one capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Stream is live and recorded as a session
    Created(u32),
    /// Compositor rejected the request
    Failed(String),
    /// Connection died while waiting
    ConnectionLost(String),
    /// Nothing arrived in time
    TimedOut,
}

/// A capture request waiting for its terminal event
#[derive(Debug)]
pub(crate) struct Pending {
    pub target: CaptureTarget,
    pub metadata: StreamMetadata,
    reply: oneshot::Sender<NegotiationOutcome>,
}

impl Pending {
    /// Resolve the request; `false` if the requester is gone
    pub fn resolve(self, outcome: NegotiationOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// In-flight capture requests keyed by stream handle
#[derive(Debug, Default)]
pub(crate) struct PendingNegotiations {
    pending: HashMap<StreamHandle, Pending>,
}

impl PendingNegotiations {
    pub fn register(
        &mut self,
        handle: StreamHandle,
        target: CaptureTarget,
        metadata: StreamMetadata,
    ) -> oneshot::Receiver<NegotiationOutcome> {
        let (reply, rx) = oneshot::channel();
        self.pending.insert(
            handle,
            Pending {
                target,
                metadata,
                reply,
            },
        );
        rx
    }

    /// Claim the pending request for `handle`, if it is still wanted
    pub fn take(&mut self, handle: StreamHandle) -> Option<Pending> {
        self.pending.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Resolve every request with the same outcome
    pub fn fail_all(&mut self, outcome: NegotiationOutcome) {
        for (_, pending) in self.pending.drain() {
            pending.resolve(outcome.clone());
        }
    }
}

/// Wait for the first of: the outcome, the sender going away, or `bound`.
///
/// On timeout `abandon` runs with the receiver; it must withdraw the
/// pending entry under the state lock and then check the receiver once
/// more, so an outcome delivered just before the withdrawal is not lost.
pub(crate) async fn wait_for_outcome<F>(
    mut rx: oneshot::Receiver<NegotiationOutcome>,
    bound: Duration,
    abandon: F,
) -> NegotiationOutcome
where
    F: FnOnce(&mut oneshot::Receiver<NegotiationOutcome>) -> NegotiationOutcome,
{
    match tokio::time::timeout(bound, &mut rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => NegotiationOutcome::ConnectionLost("negotiation abandoned".to_string()),
        Err(_) => abandon(&mut rx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn register(pending: &mut PendingNegotiations) -> (StreamHandle, oneshot::Receiver<NegotiationOutcome>) {
        let handle = StreamHandle::new();
        let rx = pending.register(
            handle,
            CaptureTarget::Window("win-1".to_string()),
            StreamMetadata::window(),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn test_created_wins() {
        let mut pending = PendingNegotiations::default();
        let (handle, rx) = register(&mut pending);

        assert!(pending.take(handle).unwrap().resolve(NegotiationOutcome::Created(9)));
        let outcome =
            wait_for_outcome(rx, Duration::from_secs(1), |_| NegotiationOutcome::TimedOut).await;
        assert_eq!(outcome, NegotiationOutcome::Created(9));
    }

    #[tokio::test]
    async fn test_timeout_runs_abandon() {
        let mut pending = PendingNegotiations::default();
        let (handle, rx) = register(&mut pending);

        let started = Instant::now();
        let outcome = wait_for_outcome(rx, Duration::from_millis(50), |rx| {
            assert!(pending.take(handle).is_some());
            assert!(rx.try_recv().is_err());
            NegotiationOutcome::TimedOut
        })
        .await;

        assert_eq!(outcome, NegotiationOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_reports_connection_loss() {
        let mut pending = PendingNegotiations::default();
        let (_, rx_a) = register(&mut pending);
        let (_, rx_b) = register(&mut pending);

        pending.fail_all(NegotiationOutcome::ConnectionLost("gone".to_string()));
        assert_eq!(pending.len(), 0);

        for rx in [rx_a, rx_b] {
            let outcome =
                wait_for_outcome(rx, Duration::from_secs(1), |_| NegotiationOutcome::TimedOut)
                    .await;
            assert_eq!(outcome, NegotiationOutcome::ConnectionLost("gone".to_string()));
        }
    }

    #[test]
    fn test_late_resolution_is_discarded() {
        let mut pending = PendingNegotiations::default();
        let (handle, rx) = register(&mut pending);
        drop(rx);

        // Requester gave up; resolving reports that nobody listened
        assert!(!pending.take(handle).unwrap().resolve(NegotiationOutcome::Created(1)));
        assert!(pending.take(handle).is_none());
    }
}
