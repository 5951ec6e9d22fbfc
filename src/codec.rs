//! Boundary adapter between [`PbftMessage`] and the transport's generic envelope.

use prost::Message;

use crate::{
    error::PbftError,
    message::PbftMessage,
    protos::pbft::v1::{Envelope, PbftMsg},
};

/// Protocol identifier carried by every envelope this crate produces.
pub const PROTOCOL_ID: &str = "pbft";

/// Wrap a message into a `{protocol_id: "pbft", payload}` envelope.
pub fn wrap(message: &PbftMessage) -> Envelope {
    Envelope {
        protocol_id: PROTOCOL_ID.to_string(),
        payload: PbftMsg::from(message).encode_to_vec(),
    }
}

/// Inverse of [`wrap`].
///
/// Fails with [`PbftError::MalformedEnvelope`] when the protocol id is absent
/// or not ours, or the payload is not a well-formed protocol message, and with
/// [`PbftError::UnsupportedMessageType`] when the type tag is unknown.
pub fn unwrap(envelope: &Envelope) -> Result<PbftMessage, PbftError> {
    if envelope.protocol_id.is_empty() {
        return Err(PbftError::MalformedEnvelope(
            "missing protocol id".to_string(),
        ));
    }
    if envelope.protocol_id != PROTOCOL_ID {
        return Err(PbftError::MalformedEnvelope(format!(
            "unrecognized protocol id {:?}",
            envelope.protocol_id
        )));
    }
    let msg = PbftMsg::decode(envelope.payload.as_slice())
        .map_err(|e| PbftError::MalformedEnvelope(format!("undecodable payload: {e}")))?;
    PbftMessage::try_from(msg)
}

pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, PbftError> {
    Ok(Envelope::decode(bytes)?)
}
