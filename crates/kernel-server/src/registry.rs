//! Registry of attached viewers.
//!
//! Owned and mutated only by the broker task, so no locking.
//! Registration order is kept and is the delivery order of `broadcast`.

use kernel_core::OutboundMessage;
use tracing::{debug, warn};

use crate::types::{Connection, ConnectionId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry::default()
    }

    /// Append a connection. Registering the same connection twice
    /// keeps both entries.
    pub fn add(&mut self, conn: Connection) {
        self.connections.push(conn);
    }

    /// Remove every entry equal to `id`. Returns how many were removed.
    pub fn remove(&mut self, id: ConnectionId) -> usize {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        before - self.connections.len()
    }

    /// Deliver `msg` to every registered connection, in registry order.
    ///
    /// Fire-and-forget: a viewer whose queue is closed is skipped and
    /// the rest still receive the message. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&self, msg: &OutboundMessage) -> usize {
        let mut delivered = 0;
        for conn in &self.connections {
            if conn.send(msg.clone()) {
                delivered += 1;
            } else {
                warn!(connection = %conn.id, msg_type = %msg.msg_type, "viewer queue closed, message dropped");
            }
        }
        debug!(msg_type = %msg.msg_type, channel = %msg.channel, delivered, "broadcast");
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::translator::{acknowledge, ReplyContext};
    use kernel_core::{Header, Request};

    fn sample() -> OutboundMessage {
        let ctx = ReplyContext::new(Header::default(), "s");
        acknowledge(&ctx, &Request::execute(1, "x")).remove(0)
    }

    #[test]
    fn replays_adds_minus_removes() {
        let mut registry = ConnectionRegistry::new();
        let (a, _ra) = Connection::channel(ConnectionId(1));
        let (b, _rb) = Connection::channel(ConnectionId(2));

        registry.add(a.clone());
        registry.add(b.clone());
        registry.add(a.clone());
        assert_eq!(registry.len(), 3);

        // Removal is by identity and takes every duplicate with it.
        assert_eq!(registry.remove(ConnectionId(1)), 2);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(ConnectionId(1)));
        assert!(registry.contains(ConnectionId(2)));

        // Removing an absent connection is a no-op.
        assert_eq!(registry.remove(ConnectionId(99)), 0);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(ConnectionId(2)), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_skips_closed_viewers() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut ra) = Connection::channel(ConnectionId(1));
        let (b, rb) = Connection::channel(ConnectionId(2));
        let (c, mut rc) = Connection::channel(ConnectionId(3));
        registry.add(a);
        registry.add(b);
        registry.add(c);

        drop(rb);

        let msg = sample();
        assert_eq!(registry.broadcast(&msg), 2);
        assert_eq!(ra.try_recv().ok(), Some(msg.clone()));
        assert_eq!(rc.try_recv().ok(), Some(msg));
    }

    #[test]
    fn duplicate_registration_receives_twice() {
        let mut registry = ConnectionRegistry::new();
        let (a, mut ra) = Connection::channel(ConnectionId(1));
        registry.add(a.clone());
        registry.add(a);

        registry.broadcast(&sample());
        assert!(ra.try_recv().is_ok());
        assert!(ra.try_recv().is_ok());
        assert!(ra.try_recv().is_err());
    }
}
