use prost::Message;
use sha2::{Digest, Sha256};

use crate::protos::pbft::v1::Request;

/// Length in bytes of a request digest.
pub const DIGEST_LEN: usize = 32;

/// Number of Byzantine peers a cluster of `n` tolerates: `floor((n - 1) / 3)`.
pub fn fault_tolerance(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Matching votes from distinct peers needed to certify a phase: `2f + 1`.
pub fn quorum_threshold(n: usize) -> usize {
    2 * fault_tolerance(n) + 1
}

/// Canonical encoding of a request. Two requests are the same operation iff
/// these bytes are identical.
pub fn canonical_request_bytes(request: &Request) -> Vec<u8> {
    request.encode_to_vec()
}

/// SHA-256 over the canonical encoding of a request.
pub fn compute_request_digest(request: &Request) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(canonical_request_bytes(request));
    hasher.finalize().to_vec()
}
