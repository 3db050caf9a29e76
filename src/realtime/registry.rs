//! The live set of WebSocket clients and fan-out to all of them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::connection::{Connection, ConnectionId};

/// Result of one [`ConnectionRegistry::broadcast_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    /// Number of connections a delivery was attempted on.
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Tracks live connections by id.
///
/// Removal is driven only by the transport (the session ends); a failed send
/// during a broadcast never evicts a connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection`. Re-adding the same id replaces the previous entry.
    pub fn add(&self, connection: Arc<dyn Connection>) {
        let id = connection.id();
        if self.connections.write().insert(id, connection).is_some() {
            debug!(conn_id = %id, "connection re-registered");
        }
    }

    /// Removes the connection with `id`. Returns `false` if it was not present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.connections.write().remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Serializes `payload` once and offers it to every registered connection.
    ///
    /// Iterates a snapshot taken under the lock, so connections added or
    /// removed while sending neither deadlock nor disturb the iteration.
    pub fn broadcast_all<T>(&self, payload: &T) -> BroadcastReport
    where
        T: Serialize + ?Sized,
    {
        let text: Arc<str> = match serde_json::to_string(payload) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(error = %e, "failed to serialize broadcast payload");
                return BroadcastReport::default();
            }
        };

        let snapshot: Vec<Arc<dyn Connection>> =
            self.connections.read().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for conn in snapshot {
            match conn.send(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(conn_id = %conn.id(), error = %e, "failed to send to client");
                }
            }
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            bytes = text.len(),
            "broadcast complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::SendError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Weak;

    /// Records every payload it accepts.
    struct Recorder {
        id: ConnectionId,
        received: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().clone()
        }
    }

    impl Connection for Recorder {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
            self.received.lock().push(payload.to_string());
            Ok(())
        }
    }

    struct Broken(ConnectionId);

    impl Connection for Broken {
        fn id(&self) -> ConnectionId {
            self.0
        }

        fn send(&self, _payload: Arc<str>) -> Result<(), SendError> {
            Err(SendError::Closed)
        }
    }

    /// Removes a peer from the registry from inside `send`.
    struct Evictor {
        id: ConnectionId,
        registry: Weak<ConnectionRegistry>,
        victim: ConnectionId,
    }

    impl Connection for Evictor {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, _payload: Arc<str>) -> Result<(), SendError> {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.victim);
            }
            Ok(())
        }
    }

    #[test]
    fn add_and_remove() {
        let registry = ConnectionRegistry::new();
        let a = Recorder::new();
        let b = Recorder::new();
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a.id));
        assert!(!registry.contains(a.id));
        assert!(registry.contains(b.id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_add_collapses() {
        let registry = ConnectionRegistry::new();
        let a = Recorder::new();
        registry.add(a.clone());
        registry.add(a.clone());
        assert_eq!(registry.len(), 1);

        let report = registry.broadcast_all(&json!({"n": 1}));
        assert_eq!(report.delivered, 1);
        assert_eq!(a.received().len(), 1);
    }

    #[test]
    fn removing_unknown_id_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let a = Recorder::new();
        registry.add(a.clone());
        assert!(registry.remove(a.id));
        assert!(!registry.remove(a.id));
        assert!(!registry.remove(ConnectionId::new()));
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_reaches_exactly_the_live_set() {
        let registry = ConnectionRegistry::new();
        let kept = Recorder::new();
        let removed = Recorder::new();
        let never_added = Recorder::new();
        registry.add(kept.clone());
        registry.add(removed.clone());
        registry.remove(removed.id);

        let report = registry.broadcast_all(&json!({"opinionId": "42"}));
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 0 });
        assert_eq!(kept.received(), vec![r#"{"opinionId":"42"}"#.to_string()]);
        assert!(removed.received().is_empty());
        assert!(never_added.received().is_empty());
    }

    #[test]
    fn broadcast_to_empty_registry() {
        let registry = ConnectionRegistry::new();
        let report = registry.broadcast_all(&json!(null));
        assert_eq!(report.recipients(), 0);
    }

    #[test]
    fn one_failing_connection_does_not_block_the_others() {
        let registry = ConnectionRegistry::new();
        let first = Recorder::new();
        let broken = Arc::new(Broken(ConnectionId::new()));
        let third = Recorder::new();
        registry.add(first.clone());
        registry.add(broken.clone());
        registry.add(third.clone());

        let report = registry.broadcast_all(&json!(["x"]));

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 1 });
        assert_eq!(first.received(), vec![r#"["x"]"#.to_string()]);
        assert_eq!(third.received(), vec![r#"["x"]"#.to_string()]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(broken.0));
    }

    #[test]
    fn mutation_during_broadcast_uses_snapshot() {
        let registry = Arc::new(ConnectionRegistry::new());
        let victim = Recorder::new();
        let evictor = Arc::new(Evictor {
            id: ConnectionId::new(),
            registry: Arc::downgrade(&registry),
            victim: victim.id,
        });
        registry.add(evictor);
        registry.add(victim.clone());

        let report = registry.broadcast_all(&json!({"k": "v"}));

        assert_eq!(report.recipients(), 2);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(victim.id));
    }

    #[test]
    fn payload_is_serialized_compactly() {
        let registry = ConnectionRegistry::new();
        let a = Recorder::new();
        registry.add(a.clone());
        registry.broadcast_all(&json!({ "opinions": ["a", "b"] }));
        assert_eq!(a.received(), vec![r#"{"opinions":["a","b"]}"#.to_string()]);
    }
}
