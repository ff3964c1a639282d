use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{error, trace, warn};

use crate::error::DsparError;
use crate::protocol::channel::Channel;
use crate::protocol::demand_signal::DemandSignal;
use crate::protocol::message_header::MessageHeader;
use crate::transport::pending_request::PendingRequest;
use crate::transport::{Rank, Transport};

/// The control-plane protocol on top of a [Transport]: headers, payload transfers and demand
///  signals on their separate channels, and the producer's message id counter.
///
/// Every receive checks the size of what arrived against what was expected. A mismatch means
///  that sender and receiver disagree about the protocol, so it aborts the whole process group.
pub struct Communicator {
    transport: Arc<dyn Transport>,
    messages_sent: AtomicU64,
}

impl Communicator {
    pub fn new(transport: Arc<dyn Transport>) -> Communicator {
        Communicator {
            transport,
            messages_sent: AtomicU64::new(0),
        }
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    /// a fresh id for a free-running emission
    pub fn next_message_id(&self) -> u64 {
        self.messages_sent.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send_header(&self, header: &MessageHeader) -> anyhow::Result<()> {
        trace!("sending {:?}", header);
        let mut buf = BytesMut::with_capacity(MessageHeader::SERIALIZED_LEN);
        header.ser(&mut buf);
        self.transport.send(header.target, Channel::Header, buf.freeze()).await
    }

    /// NB: a STOP header carries the next message id without consuming it
    pub async fn send_stop_to(&self, target: Rank) -> anyhow::Result<()> {
        let id = self.messages_sent.load(Ordering::Relaxed);
        self.send_header(&MessageHeader::stop(self.rank(), target, id)).await
    }

    /// blocks until the next header arrives from any source
    pub async fn receive_header(&self) -> anyhow::Result<MessageHeader> {
        let (sender, buf) = self.transport.recv_any(Channel::Header).await?;
        self.check_size(sender, MessageHeader::SERIALIZED_LEN, buf.len())?;

        let mut header = MessageHeader::deser(&mut buf.as_ref())?;
        if header.sender != sender {
            warn!("header from rank {} claims to be from rank {} - using the actual sender", sender, header.sender);
            header.sender = sender;
        }
        trace!("received {:?}", header);
        Ok(header)
    }

    pub fn receive_header_async(self: &Arc<Self>) -> PendingRequest<MessageHeader> {
        let comm = self.clone();
        PendingRequest::spawn(async move { comm.receive_header().await })
    }

    /// sends one payload transfer belonging to a DATA header to the header's target
    pub async fn send_payload(&self, header: &MessageHeader, buf: Bytes) -> anyhow::Result<()> {
        trace!("sending {} payload bytes for message {} to rank {}", buf.len(), header.id, header.target);
        self.transport.send(header.target, Channel::Payload, buf).await
    }

    /// receives one payload transfer belonging to a DATA header from the header's sender
    pub async fn receive_payload(&self, header: &MessageHeader, expected_len: usize) -> anyhow::Result<Bytes> {
        let buf = self.transport.recv_from(header.sender, Channel::Payload).await?;
        self.check_size(header.sender, expected_len, buf.len())?;
        Ok(buf)
    }

    pub async fn send_demand_to(&self, target: Rank, amount: u32) -> anyhow::Result<()> {
        let signal = DemandSignal {
            sender: self.rank(),
            target,
            amount,
        };
        trace!("sending {:?}", signal);

        let mut buf = BytesMut::with_capacity(DemandSignal::SERIALIZED_LEN);
        signal.ser(&mut buf);
        self.transport.send(target, Channel::Demand, buf.freeze()).await
    }

    pub fn send_demand_to_async(self: &Arc<Self>, target: Rank, amount: u32) -> PendingRequest<()> {
        let comm = self.clone();
        PendingRequest::spawn(async move { comm.send_demand_to(target, amount).await })
    }

    /// blocks until a demand signal arrives from any consumer
    pub async fn receive_demand(&self) -> anyhow::Result<DemandSignal> {
        let (sender, buf) = self.transport.recv_any(Channel::Demand).await?;
        self.check_size(sender, DemandSignal::SERIALIZED_LEN, buf.len())?;

        let mut signal = DemandSignal::deser(&mut buf.as_ref())?;
        signal.sender = sender;
        trace!("received {:?}", signal);
        Ok(signal)
    }

    fn check_size(&self, from: Rank, expected: usize, actual: usize) -> anyhow::Result<()> {
        if expected == actual {
            return Ok(());
        }

        let err = DsparError::ProtocolSizeMismatch { from, expected, actual };
        error!("{} - aborting the process group", err);
        self.transport.abort(&err.to_string());
        Err(err.into())
    }
}

#[cfg(test)]
mod test {
    use mockall::predicate::eq;

    use crate::transport::local::LocalGroup;
    use crate::transport::MockTransport;

    use super::*;

    fn mock_transport(rank: Rank) -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_rank().return_const(rank);
        transport
    }

    #[tokio::test]
    async fn test_send_stop_does_not_consume_id() {
        let mut transport = mock_transport(1);
        transport.expect_send()
            .withf(|to, channel, buf| {
                let header = MessageHeader::deser(&mut buf.as_ref()).unwrap();
                *to == 3 && *channel == Channel::Header && header == MessageHeader::stop(1, 3, 2)
            })
            .times(2)
            .returning(|_, _, _| Ok(()));

        let comm = Communicator::new(Arc::new(transport));
        assert_eq!(comm.next_message_id(), 0);
        assert_eq!(comm.next_message_id(), 1);
        comm.send_stop_to(3).await.unwrap();
        comm.send_stop_to(3).await.unwrap();
        assert_eq!(comm.next_message_id(), 2);
    }

    #[tokio::test]
    async fn test_send_demand() {
        let mut transport = mock_transport(2);
        transport.expect_send()
            .with(eq(0), eq(Channel::Demand), eq(Bytes::from_static(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1])))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let comm = Communicator::new(Arc::new(transport));
        comm.send_demand_to(0, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_payload_size_mismatch_aborts() {
        let mut transport = mock_transport(1);
        transport.expect_recv_from()
            .with(eq(0), eq(Channel::Payload))
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(&[1, 2, 3, 4])));
        transport.expect_abort()
            .times(1)
            .return_const(());

        let comm = Communicator::new(Arc::new(transport));
        let err = comm.receive_payload(&MessageHeader::data(0, 1, 5), 8).await.unwrap_err();
        match err.downcast_ref::<DsparError>() {
            Some(DsparError::ProtocolSizeMismatch { from, expected, actual }) => {
                assert_eq!((*from, *expected, *actual), (0, 8, 4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_header_aborts() {
        let mut transport = mock_transport(1);
        transport.expect_recv_any()
            .with(eq(Channel::Header))
            .times(1)
            .returning(|_| Ok((0, Bytes::from_static(&[0, 0, 0, 0]))));
        transport.expect_abort()
            .times(1)
            .return_const(());

        let comm = Communicator::new(Arc::new(transport));
        assert!(comm.receive_header().await.is_err());
    }

    #[tokio::test]
    async fn test_size_mismatch_brings_down_peers() {
        let group = LocalGroup::new(2);
        let sender = Communicator::new(group.transport(0));
        let receiver = Communicator::new(group.transport(1));

        let header = MessageHeader::data(0, 1, sender.next_message_id());
        sender.send_header(&header).await.unwrap();
        sender.send_payload(&header, Bytes::from_static(b"abc")).await.unwrap();

        let received = receiver.receive_header().await.unwrap();
        assert_eq!(received, header);
        assert!(receiver.receive_payload(&received, 8).await.is_err());

        let err = sender.receive_demand().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DsparError>(), Some(DsparError::GroupAborted(_))));
    }

    #[tokio::test]
    async fn test_async_requests() {
        let group = LocalGroup::new(2);
        let producer = Arc::new(Communicator::new(group.transport(0)));
        let consumer = Arc::new(Communicator::new(group.transport(1)));

        let pending_header = consumer.receive_header_async();
        consumer.send_demand_to_async(0, 1).wait().await.unwrap();

        let demand = producer.receive_demand().await.unwrap();
        assert_eq!(demand, DemandSignal { sender: 1, target: 0, amount: 1 });

        producer.send_stop_to(demand.sender).await.unwrap();
        assert!(pending_header.wait().await.unwrap().is_stop());
    }
}
