use crate::{
    error::PbftError,
    message::PbftMessage,
    protos::pbft::v1::{Envelope, Request},
};

/// Entry points through which collaborators drive a protocol engine.
///
/// Every method is synchronous: it applies the message, emits the resulting
/// broadcasts and returns. An `Err` means the message was dropped without any
/// state change (or, for [`PbftError::IllegalTransition`], that processing was
/// aborted); callers are expected to log it and move on.
pub trait PbftEngineAPI {
    fn submit_request(&self, request: Request) -> Result<(), PbftError>;

    fn handle_message(&self, message: PbftMessage) -> Result<(), PbftError>;

    fn handle_envelope(&self, envelope: &Envelope) -> Result<(), PbftError>;

    fn handle_bytes(&self, bytes: &[u8]) -> Result<(), PbftError>;

    fn is_primary(&self) -> bool;

    fn current_view(&self) -> u64;

    fn outstanding_operations_count(&self) -> usize;
}
