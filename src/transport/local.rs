use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::protocol::channel::Channel;
use crate::transport::inbox::Inbox;
use crate::transport::{Rank, Transport};

/// An in-process process group: every rank lives in the same OS process (typically as a tokio
///  task), and records are handed over through the ranks' inboxes without any copying.
pub struct LocalGroup {
    inboxes: Arc<Vec<Arc<Inbox>>>,
}

impl LocalGroup {
    pub fn new(group_size: u32) -> LocalGroup {
        LocalGroup {
            inboxes: Arc::new((0..group_size).map(|_| Arc::new(Inbox::new())).collect()),
        }
    }

    pub fn group_size(&self) -> u32 {
        self.inboxes.len() as u32
    }

    pub fn transport(&self, rank: Rank) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            rank,
            inboxes: self.inboxes.clone(),
        })
    }

    pub fn transports(&self) -> Vec<Arc<LocalTransport>> {
        (0..self.group_size())
            .map(|rank| self.transport(rank))
            .collect()
    }
}

pub struct LocalTransport {
    rank: Rank,
    inboxes: Arc<Vec<Arc<Inbox>>>,
}

impl LocalTransport {
    fn inbox(&self, rank: Rank) -> anyhow::Result<&Inbox> {
        self.inboxes.get(rank as usize)
            .map(|inbox| inbox.as_ref())
            .ok_or_else(|| anyhow!("rank {} is outside the process group of size {}", rank, self.inboxes.len()))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn group_size(&self) -> u32 {
        self.inboxes.len() as u32
    }

    async fn send(&self, to: Rank, channel: Channel, buf: Bytes) -> anyhow::Result<()> {
        trace!("rank {} -> rank {}: {} bytes on {:?}", self.rank, to, buf.len(), channel);
        self.inbox(to)?.deliver(self.rank, channel, buf);
        Ok(())
    }

    async fn recv_any(&self, channel: Channel) -> anyhow::Result<(Rank, Bytes)> {
        self.inbox(self.rank)?.recv_any(channel).await
    }

    async fn recv_from(&self, from: Rank, channel: Channel) -> anyhow::Result<Bytes> {
        self.inbox(self.rank)?.recv_from(from, channel).await
    }

    fn abort(&self, reason: &str) {
        let reason = format!("rank {}: {}", self.rank, reason);
        for inbox in self.inboxes.iter() {
            inbox.abort(&reason);
        }
    }
}
