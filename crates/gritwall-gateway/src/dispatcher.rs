use std::sync::Arc;

use tokio::sync::broadcast;

use gritwall_engine::fanout::Fanout;
use gritwall_types::events::GatewayEvent;

/// Fans gateway events out to every connected client. Room scoping happens at
/// the connection, not here: each connection filters the firehose against its
/// own room subscriptions via [`GatewayEvent::room_id`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fanout for Dispatcher {
    fn broadcast(&self, event: GatewayEvent) {
        Dispatcher::broadcast(self, event);
    }
}
