//! Implementation of [`PbftEngineAPI`] for [`PbftEngine`].

use crate::{
    api::PbftEngineAPI,
    codec::{decode_envelope, unwrap},
    engine::{PbftEngine, log_dropped},
    error::PbftError,
    events::PbftEventBus,
    message::PbftMessage,
    protos::pbft::v1::{Envelope, Request},
    transport::PbftTransport,
};

impl<T, E> PbftEngineAPI for PbftEngine<T, E>
where
    T: PbftTransport,
    E: PbftEventBus,
{
    /// Order a client request.
    ///
    /// On the primary this assigns the next sequence number in the current view
    /// and broadcasts a pre-prepare to every peer, itself included. Any other
    /// node drops the request with [`PbftError::NotPrimary`]; no negative
    /// acknowledgement is sent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use pbft_core::{
    ///     api::PbftEngineAPI, engine::DefaultPbftEngine, protos::pbft::v1::Request,
    ///     transport::ChannelTransport, types::Peer,
    /// };
    /// use uuid::Uuid;
    ///
    /// let me = Uuid::new_v4();
    /// let peers = vec![Peer::new("127.0.0.1", 8081, "solo", me)];
    /// let transport = Arc::new(ChannelTransport::new());
    /// let _inbox = transport.register(me);
    ///
    /// let engine = DefaultPbftEngine::new(me, peers, transport).unwrap();
    /// engine.submit_request(Request::new("set x=1", "bob", 1)).unwrap();
    /// assert_eq!(engine.outstanding_operations_count(), 1);
    /// ```
    fn submit_request(&self, request: Request) -> Result<(), PbftError> {
        self.dispatch(PbftMessage::Request(request))
    }

    /// Apply a decoded protocol message of any kind.
    fn handle_message(&self, message: PbftMessage) -> Result<(), PbftError> {
        self.dispatch(message)
    }

    /// Unwrap a transport envelope and apply the message it carries.
    ///
    /// Envelopes for other protocols, undecodable payloads and unknown message
    /// types are dropped.
    fn handle_envelope(&self, envelope: &Envelope) -> Result<(), PbftError> {
        let message = unwrap(envelope).inspect_err(log_dropped)?;
        self.dispatch(message)
    }

    fn handle_bytes(&self, bytes: &[u8]) -> Result<(), PbftError> {
        let envelope = decode_envelope(bytes).inspect_err(log_dropped)?;
        self.handle_envelope(&envelope)
    }

    fn is_primary(&self) -> bool {
        self.with_state(|state| state.is_primary())
    }

    fn current_view(&self) -> u64 {
        self.with_state(|state| state.current_view())
    }

    /// Number of operations currently tracked in the operation log.
    fn outstanding_operations_count(&self) -> usize {
        self.with_state(|state| state.operations().count())
    }
}
