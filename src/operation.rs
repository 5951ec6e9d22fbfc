use std::collections::HashSet;

use crate::{
    error::PbftError,
    protos::pbft::v1::Request,
    types::{OperationKey, PeerId},
    utils::compute_request_digest,
};

/// Phase of a single operation. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Created, pre-prepare not yet accepted.
    PrePrepare,
    /// Pre-prepare accepted, collecting prepare votes.
    Prepare,
    /// Prepared certificate formed, collecting commit votes.
    Commit,
    /// Committed certificate formed. Terminal.
    Committed,
}

/// Evidence collected for one `(view, sequence, request)`.
#[derive(Debug, Clone)]
pub struct Operation {
    view: u64,
    sequence: u64,
    request: Request,
    digest: Vec<u8>,
    preprepare_seen: bool,
    /// Sets, so a peer voting twice is counted once.
    prepare_voters: HashSet<PeerId>,
    commit_voters: HashSet<PeerId>,
    phase: Phase,
    /// `2f + 1` for the membership this operation was created under.
    quorum: usize,
}

impl Operation {
    pub(crate) fn new(view: u64, sequence: u64, request: Request, quorum: usize) -> Self {
        let digest = compute_request_digest(&request);
        Self {
            view,
            sequence,
            request,
            digest,
            preprepare_seen: false,
            prepare_voters: HashSet::new(),
            commit_voters: HashSet::new(),
            phase: Phase::PrePrepare,
            quorum,
        }
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn key(&self) -> OperationKey {
        OperationKey::new(self.view, self.sequence, &self.request)
    }

    pub fn has_preprepare(&self) -> bool {
        self.preprepare_seen
    }

    pub fn prepare_votes(&self) -> usize {
        self.prepare_voters.len()
    }

    pub fn commit_votes(&self) -> usize {
        self.commit_voters.len()
    }

    pub fn record_preprepare(&mut self) {
        self.preprepare_seen = true;
    }

    /// Returns `false` when `sender` had already voted.
    pub fn record_prepare(&mut self, sender: PeerId) -> bool {
        self.prepare_voters.insert(sender)
    }

    /// Returns `false` when `sender` had already voted.
    pub fn record_commit(&mut self, sender: PeerId) -> bool {
        self.commit_voters.insert(sender)
    }

    pub fn is_prepared(&self) -> bool {
        self.preprepare_seen && self.prepare_voters.len() >= self.quorum
    }

    pub fn is_committed(&self) -> bool {
        self.is_prepared() && self.commit_voters.len() >= self.quorum
    }

    pub fn enter_prepare_phase(&mut self) -> Result<(), PbftError> {
        self.transition(Phase::PrePrepare, Phase::Prepare, self.preprepare_seen)
    }

    pub fn advance_to_commit_phase(&mut self) -> Result<(), PbftError> {
        self.transition(Phase::Prepare, Phase::Commit, self.is_prepared())
    }

    pub fn complete_commit_phase(&mut self) -> Result<(), PbftError> {
        self.transition(Phase::Commit, Phase::Committed, self.is_committed())
    }

    fn transition(&mut self, from: Phase, to: Phase, ready: bool) -> Result<(), PbftError> {
        if self.phase != from || !ready {
            return Err(PbftError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}
