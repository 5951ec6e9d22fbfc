use uuid::Uuid;

use crate::{
    error::PbftError,
    protos::pbft::v1::{MessageType, PbftMsg, Request},
    types::PeerId,
    utils::DIGEST_LEN,
};

/// A protocol message. The variant is always explicit, on the wire as well.
#[derive(Debug, Clone, PartialEq)]
pub enum PbftMessage {
    /// A client request; only the primary of the current view orders it.
    Request(Request),
    /// The primary's assignment of `(view, sequence)` to a request.
    Preprepare {
        view: u64,
        sequence: u64,
        request: Request,
        sender: PeerId,
    },
    Prepare {
        view: u64,
        sequence: u64,
        request_digest: Vec<u8>,
        sender: PeerId,
    },
    Commit {
        view: u64,
        sequence: u64,
        request_digest: Vec<u8>,
        sender: PeerId,
    },
}

impl PbftMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            PbftMessage::Request(_) => MessageType::Request,
            PbftMessage::Preprepare { .. } => MessageType::Preprepare,
            PbftMessage::Prepare { .. } => MessageType::Prepare,
            PbftMessage::Commit { .. } => MessageType::Commit,
        }
    }

    pub fn sender(&self) -> Option<PeerId> {
        match self {
            PbftMessage::Request(_) => None,
            PbftMessage::Preprepare { sender, .. }
            | PbftMessage::Prepare { sender, .. }
            | PbftMessage::Commit { sender, .. } => Some(*sender),
        }
    }
}

impl From<&PbftMessage> for PbftMsg {
    fn from(message: &PbftMessage) -> Self {
        let mut msg = PbftMsg {
            r#type: message.message_type() as i32,
            ..Default::default()
        };
        match message {
            PbftMessage::Request(request) => {
                msg.request = Some(request.clone());
            }
            PbftMessage::Preprepare {
                view,
                sequence,
                request,
                sender,
            } => {
                msg.view = *view;
                msg.sequence = *sequence;
                msg.request = Some(request.clone());
                msg.sender = sender.to_string();
            }
            PbftMessage::Prepare {
                view,
                sequence,
                request_digest,
                sender,
            }
            | PbftMessage::Commit {
                view,
                sequence,
                request_digest,
                sender,
            } => {
                msg.view = *view;
                msg.sequence = *sequence;
                msg.request_digest = request_digest.clone();
                msg.sender = sender.to_string();
            }
        }
        msg
    }
}

impl TryFrom<PbftMsg> for PbftMessage {
    type Error = PbftError;

    fn try_from(msg: PbftMsg) -> Result<Self, Self::Error> {
        let message_type = MessageType::try_from(msg.r#type)
            .map_err(|_| PbftError::UnsupportedMessageType(msg.r#type))?;

        match message_type {
            MessageType::Unspecified => Err(PbftError::UnsupportedMessageType(msg.r#type)),
            MessageType::Request => Ok(PbftMessage::Request(required_request(msg.request)?)),
            MessageType::Preprepare => Ok(PbftMessage::Preprepare {
                view: msg.view,
                sequence: msg.sequence,
                sender: parse_sender(&msg.sender)?,
                request: required_request(msg.request)?,
            }),
            MessageType::Prepare => Ok(PbftMessage::Prepare {
                view: msg.view,
                sequence: msg.sequence,
                sender: parse_sender(&msg.sender)?,
                request_digest: required_digest(msg.request_digest)?,
            }),
            MessageType::Commit => Ok(PbftMessage::Commit {
                view: msg.view,
                sequence: msg.sequence,
                sender: parse_sender(&msg.sender)?,
                request_digest: required_digest(msg.request_digest)?,
            }),
        }
    }
}

fn required_request(request: Option<Request>) -> Result<Request, PbftError> {
    request.ok_or_else(|| PbftError::MalformedEnvelope("missing request".to_string()))
}

fn parse_sender(sender: &str) -> Result<PeerId, PbftError> {
    Uuid::parse_str(sender)
        .map_err(|e| PbftError::MalformedEnvelope(format!("invalid sender id: {e}")))
}

fn required_digest(digest: Vec<u8>) -> Result<Vec<u8>, PbftError> {
    if digest.len() != DIGEST_LEN {
        return Err(PbftError::MalformedEnvelope(format!(
            "request digest must be {DIGEST_LEN} bytes, got {}",
            digest.len()
        )));
    }
    Ok(digest)
}
