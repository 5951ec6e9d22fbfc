//! Synchronous PBFT state machine of one replica.
//!
//! [`ReplicaState::handle`] consumes one protocol message and returns the
//! [`Effects`] it produced: messages to broadcast and committed requests that
//! became deliverable. It performs no I/O, so the engine can run it under a
//! single lock and emit the effects afterwards.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::{
    config::PbftConfig,
    error::PbftError,
    events::PbftEvent,
    message::PbftMessage,
    operation::Phase,
    operation_log::OperationLog,
    ordering::CommitOrderBuffer,
    protos::pbft::v1::Request,
    types::{LogKey, OperationKey, Peer, PeerId},
    utils::quorum_threshold,
};

/// View a replica starts in.
pub const INITIAL_VIEW: u64 = 1;
/// First sequence number a primary assigns.
pub const INITIAL_SEQUENCE: u64 = 1;

/// What handling one message produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Effects {
    /// Messages to send to every peer, self included.
    pub broadcasts: Vec<PbftMessage>,
    /// Committed requests, in strictly increasing sequence order.
    pub committed: Vec<PbftEvent>,
}

impl Effects {
    fn broadcast(message: PbftMessage) -> Self {
        Self {
            broadcasts: vec![message],
            committed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoteKind {
    Prepare,
    Commit,
}

/// A prepare or commit that arrived before its slot's pre-prepare.
#[derive(Debug, Clone)]
struct EarlyVote {
    kind: VoteKind,
    digest: Vec<u8>,
    sender: PeerId,
}

#[derive(Debug)]
pub struct ReplicaState {
    self_id: PeerId,
    peers: Vec<Peer>,
    current_view: u64,
    next_sequence: u64,
    low_watermark: u64,
    high_watermark: u64,
    watermark_window: u64,
    buffer_early_votes: bool,
    operations: OperationLog,
    /// First accepted pre-prepare per slot. The primary claims a slot when it
    /// assigns it, before its own pre-prepare comes back.
    accepted_preprepares: BTreeMap<LogKey, OperationKey>,
    /// Slots this replica assigned as primary whose own pre-prepare has not
    /// been delivered yet, so its prepare is still unsent.
    own_unprepared: BTreeSet<LogKey>,
    pending_votes: BTreeMap<LogKey, Vec<EarlyVote>>,
    delivery: CommitOrderBuffer<OperationKey>,
}

impl ReplicaState {
    pub fn new(self_id: PeerId, peers: Vec<Peer>, config: &PbftConfig) -> Result<Self, PbftError> {
        if peers.is_empty() {
            return Err(PbftError::EmptyPeerSet);
        }
        if !peers.iter().any(|peer| peer.id == self_id) {
            return Err(PbftError::LocalPeerNotInPeerSet);
        }
        config.validate()?;

        let quorum = quorum_threshold(peers.len());
        Ok(Self {
            self_id,
            peers,
            current_view: INITIAL_VIEW,
            next_sequence: INITIAL_SEQUENCE,
            low_watermark: INITIAL_SEQUENCE,
            high_watermark: INITIAL_SEQUENCE.saturating_add(config.watermark_window - 1),
            watermark_window: config.watermark_window,
            buffer_early_votes: config.buffer_early_votes,
            operations: OperationLog::new(quorum),
            accepted_preprepares: BTreeMap::new(),
            own_unprepared: BTreeSet::new(),
            pending_votes: BTreeMap::new(),
            delivery: CommitOrderBuffer::new(INITIAL_SEQUENCE),
        })
    }

    pub fn self_id(&self) -> PeerId {
        self.self_id
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn current_view(&self) -> u64 {
        self.current_view
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Inclusive `(low, high)` bounds of admissible sequence numbers.
    pub fn watermarks(&self) -> (u64, u64) {
        (self.low_watermark, self.high_watermark)
    }

    pub fn operations(&self) -> &OperationLog {
        &self.operations
    }

    /// Highest sequence number handed to the execution collaborator, 0 if none.
    pub fn last_delivered(&self) -> u64 {
        self.delivery.next_sequence().saturating_sub(1)
    }

    pub fn buffered_votes(&self) -> usize {
        self.pending_votes.values().map(Vec::len).sum()
    }

    /// Committed operations held back until a lower sequence commits.
    pub fn undelivered_commits(&self) -> usize {
        self.delivery.pending()
    }

    /// The primary of `view` is `peers[view mod n]`.
    pub fn primary_of(&self, view: u64) -> &Peer {
        let index = (view % self.peers.len() as u64) as usize;
        &self.peers[index]
    }

    pub fn primary(&self) -> &Peer {
        self.primary_of(self.current_view)
    }

    pub fn is_primary(&self) -> bool {
        self.primary().id == self.self_id
    }

    pub fn handle(&mut self, message: PbftMessage) -> Result<Effects, PbftError> {
        match message {
            PbftMessage::Request(request) => self.on_request(request),
            PbftMessage::Preprepare {
                view,
                sequence,
                request,
                sender,
            } => self.on_preprepare(view, sequence, request, sender),
            PbftMessage::Prepare {
                view,
                sequence,
                request_digest,
                sender,
            } => self.on_vote(VoteKind::Prepare, view, sequence, request_digest, sender),
            PbftMessage::Commit {
                view,
                sequence,
                request_digest,
                sender,
            } => self.on_vote(VoteKind::Commit, view, sequence, request_digest, sender),
        }
    }

    fn on_request(&mut self, request: Request) -> Result<Effects, PbftError> {
        if !self.is_primary() {
            return Err(PbftError::NotPrimary);
        }
        if self.next_sequence > self.high_watermark {
            return Err(PbftError::SequenceWindowExhausted);
        }

        let view = self.current_view;
        let sequence = self.next_sequence;
        let Some(next_sequence) = sequence.checked_add(1) else {
            return Err(PbftError::SequenceWindowExhausted);
        };

        let op = self.operations.find_or_create(view, sequence, &request);
        op.record_preprepare();
        if op.phase() == Phase::PrePrepare {
            op.enter_prepare_phase()?;
        }
        let key = op.key();
        let log_key = LogKey::new(view, sequence);
        self.accepted_preprepares.insert(log_key, key);
        self.own_unprepared.insert(log_key);
        self.next_sequence = next_sequence;

        debug!(
            "Assigned view {view}, sequence {sequence} to request from client {}",
            request.client
        );
        Ok(Effects::broadcast(PbftMessage::Preprepare {
            view,
            sequence,
            request,
            sender: self.self_id,
        }))
    }

    fn on_preprepare(
        &mut self,
        view: u64,
        sequence: u64,
        request: Request,
        sender: PeerId,
    ) -> Result<Effects, PbftError> {
        self.check_view(view)?;
        self.check_watermarks(sequence)?;
        if sender != self.primary_of(view).id {
            return Err(PbftError::NotFromPrimary);
        }

        let log_key = LogKey::new(view, sequence);
        if let Some(accepted) = self.accepted_preprepares.get(&log_key) {
            if !accepted.carries(&request) {
                return Err(PbftError::ConflictingPreprepare { view, sequence });
            }
            let key = accepted.clone();
            if !self.own_unprepared.remove(&log_key) {
                debug!("Ignoring repeated pre-prepare for view {view}, sequence {sequence}");
                return Ok(Effects::default());
            }
            return self.prepare_slot(log_key, &key);
        }
        // A primary only accepts pre-prepares for slots it assigned itself.
        if sender == self.self_id {
            return Err(PbftError::NotFromPrimary);
        }

        let op = self.operations.find_or_create(view, sequence, &request);
        op.record_preprepare();
        if op.phase() == Phase::PrePrepare {
            op.enter_prepare_phase()?;
        }
        let key = op.key();
        self.accepted_preprepares.insert(log_key, key.clone());
        debug!("Accepted pre-prepare for view {view}, sequence {sequence}");

        self.prepare_slot(log_key, &key)
    }

    /// Broadcast this replica's prepare for an accepted slot, then count the
    /// votes that were buffered while waiting for it.
    fn prepare_slot(&mut self, log_key: LogKey, key: &OperationKey) -> Result<Effects, PbftError> {
        let Some(op) = self.operations.get_mut(key) else {
            return Err(PbftError::MissingPreprepare {
                view: log_key.view,
                sequence: log_key.sequence,
            });
        };
        let digest = op.digest().to_vec();

        if let Some(votes) = self.pending_votes.remove(&log_key) {
            for vote in votes {
                if vote.digest != digest {
                    debug!(
                        "Discarding early vote from {} for a different request at sequence {}",
                        vote.sender, log_key.sequence
                    );
                    continue;
                }
                match vote.kind {
                    VoteKind::Prepare => op.record_prepare(vote.sender),
                    VoteKind::Commit => op.record_commit(vote.sender),
                };
            }
        }

        let mut effects = Effects::broadcast(PbftMessage::Prepare {
            view: log_key.view,
            sequence: log_key.sequence,
            request_digest: digest,
            sender: self.self_id,
        });
        self.drive(key, &mut effects)?;
        Ok(effects)
    }

    fn on_vote(
        &mut self,
        kind: VoteKind,
        view: u64,
        sequence: u64,
        digest: Vec<u8>,
        sender: PeerId,
    ) -> Result<Effects, PbftError> {
        self.check_view(view)?;
        self.check_watermarks(sequence)?;
        if !self.peers.iter().any(|peer| peer.id == sender) {
            return Err(PbftError::UnknownSender);
        }

        let log_key = LogKey::new(view, sequence);
        let Some(key) = self.accepted_preprepares.get(&log_key).cloned() else {
            if !self.buffer_early_votes {
                return Err(PbftError::MissingPreprepare { view, sequence });
            }
            self.buffer_vote(log_key, EarlyVote {
                kind,
                digest,
                sender,
            });
            return Ok(Effects::default());
        };
        let Some(op) = self.operations.get_mut(&key) else {
            return Err(PbftError::MissingPreprepare { view, sequence });
        };
        if op.digest() != digest.as_slice() {
            return Err(PbftError::DigestMismatch);
        }

        let counted = match kind {
            VoteKind::Prepare => op.record_prepare(sender),
            VoteKind::Commit => op.record_commit(sender),
        };
        if !counted {
            debug!("Ignoring repeated {kind:?} from {sender} for sequence {sequence}");
            return Ok(Effects::default());
        }

        let mut effects = Effects::default();
        self.drive(&key, &mut effects)?;
        Ok(effects)
    }

    fn buffer_vote(&mut self, log_key: LogKey, vote: EarlyVote) {
        let votes = self.pending_votes.entry(log_key).or_default();
        // One buffered vote per (kind, sender) keeps the buffer bounded by 2n per slot.
        if votes
            .iter()
            .any(|v| v.kind == vote.kind && v.sender == vote.sender)
        {
            return;
        }
        debug!(
            "Buffering {:?} from {} until pre-prepare for view {}, sequence {} arrives",
            vote.kind, vote.sender, log_key.view, log_key.sequence
        );
        votes.push(vote);
    }

    /// Advance the record's phase as far as its evidence allows.
    fn drive(&mut self, key: &OperationKey, effects: &mut Effects) -> Result<(), PbftError> {
        let Some(op) = self.operations.get_mut(key) else {
            return Ok(());
        };
        let (view, sequence) = (op.view(), op.sequence());

        // Passing this guard happens once per record, so the commit is broadcast once.
        if op.phase() == Phase::Prepare && op.is_prepared() {
            op.advance_to_commit_phase()?;
            debug!("Prepared view {view}, sequence {sequence}");
            effects.broadcasts.push(PbftMessage::Commit {
                view,
                sequence,
                request_digest: op.digest().to_vec(),
                sender: self.self_id,
            });
        }

        if op.phase() == Phase::Commit && op.is_committed() {
            op.complete_commit_phase()?;
            info!("Committed view {view}, sequence {sequence}");

            for (sequence, key) in self.delivery.push(sequence, key.clone()) {
                if let Some(op) = self.operations.get(&key) {
                    effects.committed.push(PbftEvent::Committed {
                        view: op.view(),
                        sequence,
                        request: op.request().clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Move the watermark window so that it starts right after `stable_sequence`,
    /// discarding all bookkeeping below it. Returns the number of pruned records.
    pub fn advance_watermarks(&mut self, stable_sequence: u64) -> Result<usize, PbftError> {
        let low = stable_sequence.saturating_add(1);
        if low <= self.low_watermark {
            return Ok(0);
        }
        if stable_sequence > self.last_delivered() {
            return Err(PbftError::InvalidWatermark(format!(
                "sequence {stable_sequence} has not been delivered yet (delivered through {})",
                self.last_delivered()
            )));
        }

        self.low_watermark = low;
        self.high_watermark = low.saturating_add(self.watermark_window - 1);
        let pruned = self.operations.prune_below(low);
        self.accepted_preprepares.retain(|key, _| key.sequence >= low);
        self.own_unprepared.retain(|key| key.sequence >= low);
        self.pending_votes.retain(|key, _| key.sequence >= low);

        info!(
            "Advanced watermarks to [{}, {}], pruned {pruned} operations",
            self.low_watermark, self.high_watermark
        );
        Ok(pruned)
    }

    fn check_view(&self, view: u64) -> Result<(), PbftError> {
        if view != self.current_view {
            return Err(PbftError::StaleView {
                message_view: view,
                current_view: self.current_view,
            });
        }
        Ok(())
    }

    fn check_watermarks(&self, sequence: u64) -> Result<(), PbftError> {
        if sequence < self.low_watermark || sequence > self.high_watermark {
            return Err(PbftError::OutsideWatermarks {
                sequence,
                low: self.low_watermark,
                high: self.high_watermark,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn cluster(n: usize) -> Vec<Peer> {
        (0..n)
            .map(|i| Peer::new("127.0.0.1", 8081 + i as u16, format!("name{i}"), Uuid::new_v4()))
            .collect()
    }

    fn replica(peers: &[Peer], me: usize, config: &PbftConfig) -> ReplicaState {
        ReplicaState::new(peers[me].id, peers.to_vec(), config).unwrap()
    }

    fn prepare(sequence: u64, request: &Request, sender: PeerId) -> PbftMessage {
        PbftMessage::Prepare {
            view: INITIAL_VIEW,
            sequence,
            request_digest: crate::utils::compute_request_digest(request),
            sender,
        }
    }

    fn commit(sequence: u64, request: &Request, sender: PeerId) -> PbftMessage {
        PbftMessage::Commit {
            view: INITIAL_VIEW,
            sequence,
            request_digest: crate::utils::compute_request_digest(request),
            sender,
        }
    }

    fn preprepare(peers: &[Peer], sequence: u64, request: &Request) -> PbftMessage {
        PbftMessage::Preprepare {
            view: INITIAL_VIEW,
            sequence,
            request: request.clone(),
            sender: peers[1].id,
        }
    }

    #[test]
    fn early_votes_count_once_preprepare_is_accepted() {
        let peers = cluster(4);
        let mut backup = replica(&peers, 2, &PbftConfig::default());
        let request = Request::new("set x=1", "bob", 1);

        for peer in &peers[..3] {
            let effects = backup.handle(prepare(1, &request, peer.id)).unwrap();
            assert!(effects.broadcasts.is_empty());
        }
        assert_eq!(backup.buffered_votes(), 3);
        assert_eq!(backup.operations().count(), 0, "votes never create records");

        let effects = backup.handle(preprepare(&peers, 1, &request)).unwrap();
        assert_eq!(effects.broadcasts.len(), 2);
        assert!(matches!(effects.broadcasts[0], PbftMessage::Prepare { .. }));
        assert!(matches!(effects.broadcasts[1], PbftMessage::Commit { .. }));
        assert_eq!(backup.buffered_votes(), 0);
    }

    #[test]
    fn early_votes_for_another_request_are_discarded() {
        let peers = cluster(4);
        let mut backup = replica(&peers, 2, &PbftConfig::default());
        let request = Request::new("set x=1", "bob", 1);
        let other = Request::new("set x=2", "bob", 1);

        backup.handle(prepare(1, &request, peers[0].id)).unwrap();
        backup.handle(prepare(1, &other, peers[3].id)).unwrap();
        backup.handle(commit(1, &other, peers[3].id)).unwrap();
        assert_eq!(backup.buffered_votes(), 3);

        let effects = backup.handle(preprepare(&peers, 1, &request)).unwrap();
        assert_eq!(effects.broadcasts.len(), 1, "only the local prepare");
        assert_eq!(backup.buffered_votes(), 0);

        let op = backup
            .operations()
            .get(&OperationKey::new(INITIAL_VIEW, 1, &request))
            .unwrap();
        assert_eq!(op.prepare_votes(), 1);
        assert_eq!(op.commit_votes(), 0);
    }

    #[test]
    fn early_votes_dropped_when_buffering_disabled() {
        let peers = cluster(4);
        let config = PbftConfig::builder()
            .with_early_vote_buffering(false)
            .build()
            .unwrap();
        let mut backup = replica(&peers, 2, &config);
        let request = Request::new("set x=1", "bob", 1);

        let err = backup.handle(prepare(1, &request, peers[0].id)).unwrap_err();
        assert!(matches!(err, PbftError::MissingPreprepare { view: 1, sequence: 1 }));
        assert_eq!(backup.buffered_votes(), 0);
    }

    #[test]
    fn commits_are_delivered_in_sequence_order() {
        let peers = cluster(1);
        let mut primary = replica(&peers, 0, &PbftConfig::default());
        let me = peers[0].id;
        let first = Request::new("set x=1", "bob", 1);
        let second = Request::new("set x=2", "bob", 2);

        primary.handle(PbftMessage::Request(first.clone())).unwrap();
        primary.handle(PbftMessage::Request(second.clone())).unwrap();

        // Drive sequence 2 to commit before sequence 1.
        for (sequence, request) in [(2, &second), (1, &first)] {
            primary
                .handle(PbftMessage::Preprepare {
                    view: INITIAL_VIEW,
                    sequence,
                    request: request.clone(),
                    sender: me,
                })
                .unwrap();
        }
        let effects = primary.handle(prepare(2, &second, me)).unwrap();
        assert!(effects.committed.is_empty());
        let effects = primary.handle(commit(2, &second, me)).unwrap();
        assert!(effects.committed.is_empty(), "sequence 1 has not committed");
        assert_eq!(primary.undelivered_commits(), 1);

        primary.handle(prepare(1, &first, me)).unwrap();
        let effects = primary.handle(commit(1, &first, me)).unwrap();
        let delivered: Vec<u64> = effects
            .committed
            .iter()
            .map(|PbftEvent::Committed { sequence, .. }| *sequence)
            .collect();
        assert_eq!(delivered, vec![1, 2]);
        assert_eq!(primary.last_delivered(), 2);
    }

    #[test]
    fn advance_watermarks_prunes_delivered_operations() {
        let peers = cluster(1);
        let config = PbftConfig::builder().with_watermark_window(2).build().unwrap();
        let mut primary = replica(&peers, 0, &config);
        let me = peers[0].id;
        let request = Request::new("set x=1", "bob", 1);

        primary.handle(PbftMessage::Request(request.clone())).unwrap();
        primary.handle(PbftMessage::Request(request.clone())).unwrap();
        let err = primary
            .handle(PbftMessage::Request(request.clone()))
            .unwrap_err();
        assert!(matches!(err, PbftError::SequenceWindowExhausted));

        assert!(matches!(
            primary.advance_watermarks(1),
            Err(PbftError::InvalidWatermark(_))
        ));

        primary
            .handle(PbftMessage::Preprepare {
                view: INITIAL_VIEW,
                sequence: 1,
                request: request.clone(),
                sender: me,
            })
            .unwrap();
        let effects = primary.handle(prepare(1, &request, me)).unwrap();
        assert_eq!(effects.committed.len(), 0);
        let effects = primary.handle(commit(1, &request, me)).unwrap();
        assert_eq!(effects.committed.len(), 1);

        assert_eq!(primary.advance_watermarks(1).unwrap(), 1);
        assert_eq!(primary.watermarks(), (2, 3));
        assert_eq!(primary.operations().count(), 1);
        assert_eq!(primary.advance_watermarks(1).unwrap(), 0);

        primary.handle(PbftMessage::Request(request)).unwrap();
        assert_eq!(primary.next_sequence(), 4);
    }

    #[test]
    fn unbounded_window_saturates_the_high_watermark() {
        let peers = cluster(1);
        let config = PbftConfig::builder()
            .with_watermark_window(u64::MAX)
            .build()
            .unwrap();
        let mut primary = replica(&peers, 0, &config);
        let me = peers[0].id;
        let request = Request::new("set x=1", "bob", 1);
        assert_eq!(primary.watermarks(), (1, u64::MAX));

        primary.handle(PbftMessage::Request(request.clone())).unwrap();
        primary
            .handle(PbftMessage::Preprepare {
                view: INITIAL_VIEW,
                sequence: 1,
                request: request.clone(),
                sender: me,
            })
            .unwrap();
        primary.handle(prepare(1, &request, me)).unwrap();
        primary.handle(commit(1, &request, me)).unwrap();

        assert_eq!(primary.advance_watermarks(1).unwrap(), 1);
        assert_eq!(primary.watermarks(), (2, u64::MAX));
        primary.handle(PbftMessage::Request(request)).unwrap();
        assert_eq!(primary.next_sequence(), 3);
    }
}
