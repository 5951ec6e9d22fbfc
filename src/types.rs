use uuid::Uuid;

use crate::{protos::pbft::v1::Request, utils::canonical_request_bytes};

/// Stable identity of a cluster member.
pub type PeerId = Uuid;

/// A cluster member. The ordered membership list is fixed for the lifetime of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    /// Network address the transport connects to.
    pub host: String,
    pub port: u16,
    /// Human readable name, only used in logs.
    pub name: String,
    pub id: PeerId,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>, id: PeerId) -> Self {
        Self {
            host: host.into(),
            port,
            name: name.into(),
            id,
        }
    }
}

impl Request {
    pub fn new(operation: impl Into<String>, client: impl Into<String>, timestamp: u64) -> Self {
        Self {
            operation: operation.into(),
            client: client.into(),
            timestamp,
        }
    }
}

/// A `(view, sequence)` slot, independent of the request it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogKey {
    pub view: u64,
    pub sequence: u64,
}

impl LogKey {
    pub fn new(view: u64, sequence: u64) -> Self {
        Self { view, sequence }
    }
}

/// Identity of one operation: ordered by view, then sequence, then the byte
/// order of the request's canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey {
    view: u64,
    sequence: u64,
    request_bytes: Vec<u8>,
}

impl OperationKey {
    pub fn new(view: u64, sequence: u64, request: &Request) -> Self {
        Self {
            view,
            sequence,
            request_bytes: canonical_request_bytes(request),
        }
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn log_key(&self) -> LogKey {
        LogKey::new(self.view, self.sequence)
    }

    /// Whether `request` is the request this key was built from.
    pub fn carries(&self, request: &Request) -> bool {
        self.request_bytes == canonical_request_bytes(request)
    }
}
