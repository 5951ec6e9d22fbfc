use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    api::PbftEngineAPI,
    codec::wrap,
    config::PbftConfig,
    error::PbftError,
    events::{BroadcastEventBus, PbftEventBus},
    message::PbftMessage,
    operation::Operation,
    protos::pbft::v1::{Envelope, Request},
    replica::ReplicaState,
    transport::{ChannelTransport, PbftTransport},
    types::{OperationKey, Peer, PeerId},
};

/// Protocol engine of one node.
///
/// All protocol state lives in one [`ReplicaState`] behind a single mutex, so
/// messages from any number of inbound contexts are applied one at a time.
/// Committed events are published while the lock is held, which keeps them in
/// sequence order; broadcasts are handed to the transport after it is released.
pub struct PbftEngine<T, E>
where
    T: PbftTransport,
    E: PbftEventBus,
{
    self_id: PeerId,
    peers: Arc<[Peer]>,
    state: Arc<Mutex<ReplicaState>>,
    transport: Arc<T>,
    event_bus: E,
}

impl<T, E> Clone for PbftEngine<T, E>
where
    T: PbftTransport,
    E: PbftEventBus,
{
    fn clone(&self) -> Self {
        Self {
            self_id: self.self_id,
            peers: Arc::clone(&self.peers),
            state: Arc::clone(&self.state),
            transport: Arc::clone(&self.transport),
            event_bus: self.event_bus.clone(),
        }
    }
}

pub type DefaultPbftEngine = PbftEngine<ChannelTransport, BroadcastEventBus>;

impl DefaultPbftEngine {
    pub fn new(
        self_id: PeerId,
        peers: Vec<Peer>,
        transport: Arc<ChannelTransport>,
    ) -> Result<Self, PbftError> {
        Self::new_with_config(self_id, peers, PbftConfig::default(), transport)
    }

    pub fn new_with_config(
        self_id: PeerId,
        peers: Vec<Peer>,
        config: PbftConfig,
        transport: Arc<ChannelTransport>,
    ) -> Result<Self, PbftError> {
        config.validate()?;
        let event_bus = BroadcastEventBus::new(config.event_buffer);
        Self::new_with_components(self_id, peers, config, transport, event_bus)
    }
}

impl<T, E> PbftEngine<T, E>
where
    T: PbftTransport,
    E: PbftEventBus,
{
    /// Fails with [`PbftError::EmptyPeerSet`] when `peers` is empty and with
    /// [`PbftError::LocalPeerNotInPeerSet`] when `self_id` is not one of them.
    pub fn new_with_components(
        self_id: PeerId,
        peers: Vec<Peer>,
        config: PbftConfig,
        transport: Arc<T>,
        event_bus: E,
    ) -> Result<Self, PbftError> {
        let state = ReplicaState::new(self_id, peers.clone(), &config)?;
        Ok(Self {
            self_id,
            peers: peers.into(),
            state: Arc::new(Mutex::new(state)),
            transport,
            event_bus,
        })
    }

    pub fn self_id(&self) -> PeerId {
        self.self_id
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn subscribe_to_events(&self) -> E::Receiver {
        self.event_bus.subscribe()
    }

    /// Primary of the current view.
    pub fn primary(&self) -> Peer {
        self.state.lock().primary().clone()
    }

    /// Snapshot of the record for `(view, sequence, request)`, if tracked.
    pub fn get_operation(&self, view: u64, sequence: u64, request: &Request) -> Option<Operation> {
        let key = OperationKey::new(view, sequence, request);
        self.state.lock().operations().get(&key).cloned()
    }

    /// Slide the watermark window past `stable_sequence` and garbage collect
    /// everything below it. Only sequences already delivered may become stable.
    pub fn advance_watermarks(&self, stable_sequence: u64) -> Result<usize, PbftError> {
        self.state.lock().advance_watermarks(stable_sequence)
    }

    pub(crate) fn with_state<R>(&self, reader: impl FnOnce(&ReplicaState) -> R) -> R {
        let state = self.state.lock();
        reader(&state)
    }

    pub(crate) fn dispatch(&self, message: PbftMessage) -> Result<(), PbftError> {
        let broadcasts = {
            let mut state = self.state.lock();
            let effects = match state.handle(message) {
                Ok(effects) => effects,
                Err(err) => {
                    log_dropped(&err);
                    return Err(err);
                }
            };
            for event in effects.committed {
                self.event_bus.publish(event);
            }
            effects.broadcasts
        };

        for message in &broadcasts {
            self.broadcast(message);
        }
        Ok(())
    }

    fn broadcast(&self, message: &PbftMessage) {
        let envelope = wrap(message);
        for peer in self.peers.iter() {
            self.transport.send(peer, envelope.clone());
        }
    }

    /// Feed every envelope arriving on `inbox` into the engine until the
    /// channel closes. Rejected envelopes are logged and skipped.
    pub fn spawn_inbound_task(&self, mut inbox: mpsc::UnboundedReceiver<Envelope>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let _ = engine.handle_envelope(&envelope);
            }
            debug!("Inbox of {} closed", engine.self_id);
        })
    }
}

pub(crate) fn log_dropped(err: &PbftError) {
    if err.is_benign() {
        debug!("Dropping message: {err}");
    } else {
        warn!("Aborted processing of message: {err}");
    }
}
