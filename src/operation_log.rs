use std::collections::BTreeMap;

use crate::{operation::Operation, protos::pbft::v1::Request, types::OperationKey};

/// In-memory mapping from [`OperationKey`] to its [`Operation`] record.
///
/// Holds at most one record per key. Records are only removed by
/// [`OperationLog::prune_below`], which the engine calls when the low
/// watermark advances.
#[derive(Debug)]
pub struct OperationLog {
    operations: BTreeMap<OperationKey, Operation>,
    quorum: usize,
}

impl OperationLog {
    /// Create an empty log whose records certify phases at `quorum` votes.
    pub fn new(quorum: usize) -> Self {
        Self {
            operations: BTreeMap::new(),
            quorum,
        }
    }

    /// Return the record for `(view, sequence, request)`, creating it in the
    /// pre-prepare phase if it does not exist yet.
    pub fn find_or_create(&mut self, view: u64, sequence: u64, request: &Request) -> &mut Operation {
        let quorum = self.quorum;
        self.operations
            .entry(OperationKey::new(view, sequence, request))
            .or_insert_with(|| Operation::new(view, sequence, request.clone(), quorum))
    }

    pub fn get(&self, key: &OperationKey) -> Option<&Operation> {
        self.operations.get(key)
    }

    pub fn get_mut(&mut self, key: &OperationKey) -> Option<&mut Operation> {
        self.operations.get_mut(key)
    }

    /// Number of distinct operations currently tracked.
    pub fn count(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Drop every record whose sequence is below `sequence`. Returns how many were removed.
    pub fn prune_below(&mut self, sequence: u64) -> usize {
        let before = self.operations.len();
        self.operations.retain(|key, _| key.sequence() >= sequence);
        before - self.operations.len()
    }
}
