use std::net::SocketAddr;
use std::time::Duration;

use crate::error::DsparError;
use crate::transport::Rank;

#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub rank: Rank,
    /// every rank's listening address, indexed by rank
    pub peers: Vec<SocketAddr>,

    pub connect_retry_interval: Duration,
    /// peers are started independently, so connecting is retried until this timeout expires
    pub connect_timeout: Duration,
    pub max_frame_len: u32,
}

impl TcpTransportConfig {
    pub fn new(rank: Rank, peers: Vec<SocketAddr>) -> TcpTransportConfig {
        TcpTransportConfig {
            rank,
            peers,
            connect_retry_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(30),
            max_frame_len: 256*1024*1024,
        }
    }

    pub fn group_size(&self) -> u32 {
        self.peers.len() as u32
    }

    pub fn peer_addr(&self, rank: Rank) -> anyhow::Result<SocketAddr> {
        self.peers.get(rank as usize)
            .copied()
            .ok_or_else(|| DsparError::configuration(format!("no address for rank {}", rank)))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.peers.is_empty() {
            return Err(DsparError::configuration("a TCP process group needs at least one peer address"));
        }
        if self.rank >= self.group_size() {
            return Err(DsparError::configuration(format!("rank {} is outside the process group of size {}", self.rank, self.group_size())));
        }
        if self.max_frame_len == 0 {
            return Err(DsparError::configuration("max_frame_len must be positive"));
        }
        Ok(())
    }
}
