use std::time::Duration;

use crate::node::lifecycle::NodeState;
use crate::transport::Rank;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeRole {
    Stage,
    FarmEmitter,
    FarmWorker,
    FarmCollector,
}

/// Timing of one item that reached a sink: `total` is the time since the item entered the
///  pipeline, `compute` the accumulated time stages spent processing it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ItemTiming {
    pub id: u64,
    pub total: Duration,
    pub compute: Duration,
}

impl ItemTiming {
    /// time spent outside of stages: in transit, in queues, waiting for demand
    pub fn io(&self) -> Duration {
        self.total.saturating_sub(self.compute)
    }
}

/// What a node did during its run. Returned by the node's lifecycle, and owned by the caller
///  afterwards.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub rank: Rank,
    pub role: NodeRole,
    /// every lifecycle state the node entered, in order
    pub states: Vec<NodeState>,
    pub items_processed: u64,
    pub items_emitted: u64,
    pub timings: Vec<ItemTiming>,
}

impl RunReport {
    pub fn new(rank: Rank, role: NodeRole) -> RunReport {
        RunReport {
            rank,
            role,
            states: vec![NodeState::Created],
            items_processed: 0,
            items_emitted: 0,
            timings: Vec::new(),
        }
    }

    pub fn final_state(&self) -> Option<NodeState> {
        self.states.last().copied()
    }

    pub fn times_entered(&self, state: NodeState) -> usize {
        self.states.iter()
            .filter(|s| **s == state)
            .count()
    }

    pub fn total_compute_time(&self) -> Duration {
        self.timings.iter()
            .map(|t| t.compute)
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_io_time() {
        let timing = ItemTiming { id: 0, total: Duration::from_millis(10), compute: Duration::from_millis(4) };
        assert_eq!(timing.io(), Duration::from_millis(6));

        let skewed = ItemTiming { id: 0, total: Duration::from_millis(1), compute: Duration::from_millis(4) };
        assert_eq!(skewed.io(), Duration::ZERO);
    }

    #[test]
    fn test_states() {
        let mut report = RunReport::new(2, NodeRole::FarmWorker);
        assert_eq!(report.final_state(), Some(NodeState::Created));
        report.states.push(NodeState::Started);
        report.states.push(NodeState::Stopped);
        assert_eq!(report.final_state(), Some(NodeState::Stopped));
        assert_eq!(report.times_entered(NodeState::Stopped), 1);
        assert_eq!(report.times_entered(NodeState::ReceivingMessages), 0);
    }
}
