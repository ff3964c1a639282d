use std::sync::Arc;

use anyhow::bail;

use crate::protocol::communicator::Communicator;
use crate::protocol::demand_signal::DemandSignal;
use crate::protocol::message_header::MessageHeader;
use crate::serializer::Wire;
use crate::transport::{Rank, Transport};

/// Plays the part of a neighbouring node by hand, so that a single node can be driven and
///  observed message by message.
pub struct FakePeer {
    comm: Communicator,
}

impl FakePeer {
    pub fn new(transport: Arc<dyn Transport>) -> FakePeer {
        FakePeer {
            comm: Communicator::new(transport),
        }
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    pub async fn send_data<T: Wire>(&self, target: Rank, id: u64, value: T) -> anyhow::Result<()> {
        let header = MessageHeader::data(self.rank(), target, id);
        self.comm.send_header(&header).await?;
        value.send_to(&self.comm, &header).await
    }

    pub async fn send_stop(&self, target: Rank) -> anyhow::Result<()> {
        self.comm.send_stop_to(target).await
    }

    pub async fn send_demand(&self, target: Rank) -> anyhow::Result<()> {
        self.comm.send_demand_to(target, 1).await
    }

    pub async fn receive_header(&self) -> anyhow::Result<MessageHeader> {
        self.comm.receive_header().await
    }

    pub async fn receive_data<T: Wire>(&self) -> anyhow::Result<(MessageHeader, T)> {
        let header = self.comm.receive_header().await?;
        if header.is_stop() {
            bail!("expected data, received STOP from rank {}", header.sender);
        }
        let value = T::receive_from(&self.comm, &header).await?;
        Ok((header, value))
    }

    /// all DATA messages up to the next STOP, as (id, value)
    pub async fn receive_until_stop<T: Wire>(&self) -> anyhow::Result<Vec<(u64, T)>> {
        let mut result = Vec::new();
        loop {
            let header = self.comm.receive_header().await?;
            if header.is_stop() {
                return Ok(result);
            }
            result.push((header.id, T::receive_from(&self.comm, &header).await?));
        }
    }

    pub async fn receive_demand(&self) -> anyhow::Result<DemandSignal> {
        self.comm.receive_demand().await
    }
}
