use crate::{
    engine::PbftEngine, events::PbftEventBus, operation::Phase, transport::PbftTransport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub current_view: u64,
    /// Next sequence number the primary would assign.
    pub next_sequence: u64,
    pub low_watermark: u64,
    pub high_watermark: u64,
    /// Total number of operations in the log.
    pub total_operations: usize,
    /// Operations still waiting for an accepted pre-prepare.
    pub pre_prepare: usize,
    /// Operations collecting prepare votes.
    pub preparing: usize,
    /// Prepared operations collecting commit votes.
    pub committing: usize,
    pub committed: usize,
    /// Highest sequence number delivered in order, 0 if none.
    pub last_delivered: u64,
    /// Votes held until their pre-prepare arrives.
    pub buffered_votes: usize,
}

impl<T, E> PbftEngine<T, E>
where
    T: PbftTransport,
    E: PbftEventBus,
{
    /// Get statistics about the operations this node tracks.
    ///
    /// Useful for monitoring and dashboards.
    pub fn stats(&self) -> EngineStats {
        self.with_state(|state| {
            let count = |phase: Phase| {
                state
                    .operations()
                    .iter()
                    .filter(|op| op.phase() == phase)
                    .count()
            };
            let (low_watermark, high_watermark) = state.watermarks();

            EngineStats {
                current_view: state.current_view(),
                next_sequence: state.next_sequence(),
                low_watermark,
                high_watermark,
                total_operations: state.operations().count(),
                pre_prepare: count(Phase::PrePrepare),
                preparing: count(Phase::Prepare),
                committing: count(Phase::Commit),
                committed: count(Phase::Committed),
                last_delivered: state.last_delivered(),
                buffered_votes: state.buffered_votes(),
            }
        })
    }
}
