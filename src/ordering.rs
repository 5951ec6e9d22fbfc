use std::collections::BTreeMap;

/// Holds committed items until every lower sequence number has been released,
/// then hands them out in strictly increasing, gap-free sequence order.
#[derive(Debug)]
pub struct CommitOrderBuffer<T> {
    next: u64,
    ready: BTreeMap<u64, T>,
}

impl<T> CommitOrderBuffer<T> {
    /// `first` is the sequence number that must be released first.
    pub fn new(first: u64) -> Self {
        Self {
            next: first,
            ready: BTreeMap::new(),
        }
    }

    /// Sequence number the buffer waits for next.
    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    /// Highest sequence number released so far, `None` before the first release.
    pub fn last_released(&self) -> Option<u64> {
        self.next.checked_sub(1).filter(|last| *last > 0)
    }

    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// Insert a committed item and return everything that became contiguous.
    ///
    /// Items below the cursor or already buffered are ignored.
    pub fn push(&mut self, sequence: u64, item: T) -> Vec<(u64, T)> {
        if sequence < self.next {
            return Vec::new();
        }
        self.ready.entry(sequence).or_insert(item);

        let mut released = Vec::new();
        while let Some(item) = self.ready.remove(&self.next) {
            released.push((self.next, item));
            self.next += 1;
        }
        released
    }
}
