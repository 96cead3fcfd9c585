//! Active capture sessions

use crate::protocol::StreamHandle;
use crate::streams::{StreamDescriptor, StreamMetadata};

/// What a capture request is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// A registry output, by name
    Output(u32),
    /// A window, by its window-management uuid
    Window(String),
}

impl std::fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureTarget::Output(name) => write!(f, "output {}", name),
            CaptureTarget::Window(uuid) => write!(f, "window {}", uuid),
        }
    }
}

/// A negotiated, live capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    /// PipeWire node id, unique across the active set
    pub node_id: u32,
    pub target: CaptureTarget,
    pub metadata: StreamMetadata,
    /// Protocol-side stream
    pub handle: StreamHandle,
}

impl CaptureSession {
    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            node_id: self.node_id,
            metadata: self.metadata,
        }
    }
}

/// Active sessions in creation order
///
/// The set stays tiny (one entry per shared screen), so lookups scan.
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: Vec<CaptureSession>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session; refused if its node id is already active
    pub fn insert(&mut self, session: CaptureSession) -> Result<(), CaptureSession> {
        if self.contains(session.node_id) {
            return Err(session);
        }
        self.sessions.push(session);
        Ok(())
    }

    pub fn contains(&self, node_id: u32) -> bool {
        self.sessions.iter().any(|s| s.node_id == node_id)
    }

    pub fn get(&self, node_id: u32) -> Option<&CaptureSession> {
        self.sessions.iter().find(|s| s.node_id == node_id)
    }

    /// Node id of the session backed by `handle`
    pub fn node_for(&self, handle: StreamHandle) -> Option<u32> {
        self.sessions
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| s.node_id)
    }

    pub fn remove(&mut self, node_id: u32) -> Option<CaptureSession> {
        let index = self.sessions.iter().position(|s| s.node_id == node_id)?;
        Some(self.sessions.remove(index))
    }

    /// Remove every session, oldest first
    pub fn drain(&mut self) -> Vec<CaptureSession> {
        std::mem::take(&mut self.sessions)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureSession> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(node_id: u32) -> CaptureSession {
        CaptureSession {
            node_id,
            target: CaptureTarget::Window(format!("win-{}", node_id)),
            metadata: StreamMetadata::window(),
            handle: StreamHandle::new(),
        }
    }

    #[test]
    fn test_duplicate_node_refused() {
        let mut set = SessionSet::new();
        set.insert(session(42)).unwrap();
        assert!(set.insert(session(42)).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_order_and_removal() {
        let mut set = SessionSet::new();
        for node in [3, 1, 2] {
            set.insert(session(node)).unwrap();
        }
        assert!(set.remove(1).is_some());
        assert!(set.remove(1).is_none());

        let order: Vec<u32> = set.iter().map(|s| s.node_id).collect();
        assert_eq!(order, vec![3, 2]);
    }

    #[test]
    fn test_lookup_by_handle() {
        let mut set = SessionSet::new();
        let s = session(7);
        let handle = s.handle;
        set.insert(s).unwrap();
        assert_eq!(set.node_for(handle), Some(7));
        assert_eq!(set.node_for(StreamHandle::new()), None);
    }
}
