use crate::transport::Rank;

/// Pipeline-wide settings that are not part of the topology itself.
#[derive(Debug, Clone)]
pub struct DsparConfig {
    /// the rank at which the pipeline's first element starts; ranks below it idle
    pub starting_rank: Rank,
    /// if set, every sink node records per-item timings (total, compute, io) in its run report
    pub collect_timings: bool,
}

impl DsparConfig {
    pub fn new() -> DsparConfig {
        DsparConfig {
            starting_rank: 0,
            collect_timings: false,
        }
    }
}

impl Default for DsparConfig {
    fn default() -> Self {
        DsparConfig::new()
    }
}
