use crate::operation::Phase;

#[derive(Debug, thiserror::Error)]
pub enum PbftError {
    #[error("Peer set must not be empty")]
    EmptyPeerSet,
    #[error("Local peer is not a member of the peer set")]
    LocalPeerNotInPeerSet,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Illegal phase transition: {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(i32),
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Stale or future view: message view {message_view}, current view {current_view}")]
    StaleView { message_view: u64, current_view: u64 },
    #[error("Sequence {sequence} outside watermarks [{low}, {high}]")]
    OutsideWatermarks { sequence: u64, low: u64, high: u64 },
    #[error("A different request was already accepted for view {view}, sequence {sequence}")]
    ConflictingPreprepare { view: u64, sequence: u64 },
    #[error("No pre-prepare accepted for view {view}, sequence {sequence}")]
    MissingPreprepare { view: u64, sequence: u64 },
    #[error("Request digest does not match the accepted pre-prepare")]
    DigestMismatch,
    #[error("Not the primary of the current view")]
    NotPrimary,
    #[error("Pre-prepare was not sent by the primary of its view")]
    NotFromPrimary,
    #[error("Sender is not a member of the peer set")]
    UnknownSender,
    #[error("No sequence number left inside the watermark window")]
    SequenceWindowExhausted,
    #[error("Invalid watermark: {0}")]
    InvalidWatermark(String),
}

impl PbftError {
    /// Whether the error is an expected drop caused by benign races or a faulty
    /// peer, as opposed to a construction failure or a local logic fault.
    pub fn is_benign(&self) -> bool {
        !matches!(
            self,
            PbftError::EmptyPeerSet
                | PbftError::LocalPeerNotInPeerSet
                | PbftError::InvalidConfiguration(_)
                | PbftError::IllegalTransition { .. }
                | PbftError::InvalidWatermark(_)
        )
    }
}
