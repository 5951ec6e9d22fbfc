use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

use crate::{protos::pbft::v1::Envelope, types::Peer, types::PeerId};

/// Delivers envelopes to peers.
///
/// Best effort: the engine hands over one envelope per peer per broadcast and
/// never waits for, or retries, delivery.
pub trait PbftTransport: Send + Sync + 'static {
    fn send(&self, peer: &Peer, envelope: Envelope);
}

/// In-process transport routing envelopes over unbounded tokio channels,
/// one per registered peer.
#[derive(Default)]
pub struct ChannelTransport {
    routes: RwLock<HashMap<PeerId, mpsc::UnboundedSender<Envelope>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and return the receiving end of its inbox.
    /// Registering again replaces the previous inbox.
    pub fn register(&self, peer_id: PeerId) -> mpsc::UnboundedReceiver<Envelope> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes.write().insert(peer_id, sender);
        receiver
    }

    /// Stop routing to a peer; later sends to it are dropped.
    pub fn disconnect(&self, peer_id: &PeerId) {
        self.routes.write().remove(peer_id);
    }
}

impl PbftTransport for ChannelTransport {
    fn send(&self, peer: &Peer, envelope: Envelope) {
        let routes = self.routes.read();
        let Some(route) = routes.get(&peer.id) else {
            warn!("No route to peer {} ({}:{})", peer.name, peer.host, peer.port);
            return;
        };
        if route.send(envelope).is_err() {
            warn!("Inbox of peer {} is closed", peer.name);
        }
    }
}

/// Transport that only records what was sent.
#[derive(Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<(Peer, Envelope)>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far, in send order.
    pub fn sent(&self) -> Vec<(Peer, Envelope)> {
        self.sent.lock().clone()
    }

    /// Drain and return everything sent so far.
    pub fn take(&self) -> Vec<(Peer, Envelope)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl PbftTransport for InMemoryTransport {
    fn send(&self, peer: &Peer, envelope: Envelope) {
        self.sent.lock().push((peer.clone(), envelope));
    }
}
