use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

use crate::protocol::channel::Channel;

pub mod inbox;
pub mod local;
pub mod pending_request;
pub mod tcp;

/// A process's index within the process group, 0-based
pub type Rank = u32;

/// The raw point-to-point transport between the ranks of a fixed-size process group.
///
/// Records are opaque byte buffers tagged with a [Channel]. Order is preserved per
///  (sender, channel); there is no ordering guarantee across senders. All receives block
///  until a matching record arrives or the group is aborted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn rank(&self) -> Rank;

    fn group_size(&self) -> u32;

    async fn send(&self, to: Rank, channel: Channel, buf: Bytes) -> anyhow::Result<()>;

    /// receive the next record on `channel`, regardless of its sender
    async fn recv_any(&self, channel: Channel) -> anyhow::Result<(Rank, Bytes)>;

    async fn recv_from(&self, from: Rank, channel: Channel) -> anyhow::Result<Bytes>;

    /// Wait until every rank of the group has reached the barrier
    async fn barrier(&self) -> anyhow::Result<()> {
        rank_zero_barrier(self).await
    }

    /// Bring down the whole process group: every pending and future receive on every rank
    ///  fails with [crate::error::DsparError::GroupAborted].
    fn abort(&self, reason: &str);
}

/// Rank 0 collects one barrier record per peer, then releases them all.
pub(crate) async fn rank_zero_barrier<T: Transport + ?Sized>(transport: &T) -> anyhow::Result<()> {
    let group_size = transport.group_size();
    if transport.rank() == 0 {
        for _ in 1..group_size {
            transport.recv_any(Channel::Barrier).await?;
        }
        for peer in 1..group_size {
            transport.send(peer, Channel::Barrier, Bytes::new()).await?;
        }
    }
    else {
        transport.send(0, Channel::Barrier, Bytes::new()).await?;
        transport.recv_from(0, Channel::Barrier).await?;
    }
    Ok(())
}
