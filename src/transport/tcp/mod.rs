use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, Instrument, Span};

use crate::protocol::channel::Channel;
use crate::transport::inbox::Inbox;
use crate::transport::tcp::tcp_config::TcpTransportConfig;
use crate::transport::tcp::tcp_receiver::TcpReceiver;
use crate::transport::tcp::tcp_sender::TcpSender;
use crate::transport::{rank_zero_barrier, Rank, Transport};

pub mod tcp_config;
pub mod tcp_frame;
pub mod tcp_receiver;
pub mod tcp_sender;

/// A process group spread over separate OS processes (typically on separate machines), connected
///  as a full mesh of simplex TCP connections.
///
/// Every rank listens on its own address from [TcpTransportConfig::peers] and opens one
///  connection to each peer. Start-up completes once all outgoing connections are established.
pub struct TcpTransport {
    rank: Rank,
    group_size: u32,
    inbox: Arc<Inbox>,
    senders: Vec<Option<Arc<TcpSender>>>,
    accept_loop: JoinHandle<()>,
}

impl TcpTransport {
    pub async fn start(config: TcpTransportConfig) -> anyhow::Result<Arc<TcpTransport>> {
        config.validate()?;
        let listener = TcpListener::bind(config.peer_addr(config.rank)?).await?;
        TcpTransport::start_with_listener(config, listener).await
    }

    /// for callers that bind the listener themselves, e.g. on an ephemeral port
    #[instrument(name = "tcp_transport", skip_all, fields(rank = config.rank))]
    pub async fn start_with_listener(config: TcpTransportConfig, listener: TcpListener) -> anyhow::Result<Arc<TcpTransport>> {
        config.validate()?;
        info!("listening on {}", listener.local_addr()?);

        let inbox = Arc::new(Inbox::new());
        let accept_loop = tokio::spawn(
            accept_loop(listener, inbox.clone(), config.group_size(), config.max_frame_len)
                .instrument(Span::current())
        );

        let mut senders = Vec::new();
        for peer in 0..config.group_size() {
            if peer == config.rank {
                senders.push(None);
            }
            else {
                match TcpSender::connect(&config, peer).await {
                    Ok(sender) => senders.push(Some(Arc::new(sender))),
                    Err(e) => {
                        accept_loop.abort();
                        return Err(e);
                    }
                }
            }
        }
        info!("connected to all {} peers", config.group_size() - 1);

        Ok(Arc::new(TcpTransport {
            rank: config.rank,
            group_size: config.group_size(),
            inbox,
            senders,
            accept_loop,
        }))
    }

    fn sender(&self, to: Rank) -> anyhow::Result<&Arc<TcpSender>> {
        self.senders.get(to as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| anyhow!("no connection to rank {}", to))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn accept_loop(listener: TcpListener, inbox: Arc<Inbox>, group_size: u32, max_frame_len: u32) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accepting connections failed: {}", e);
                inbox.abort(&format!("listener failed: {}", e));
                return;
            }
        };

        let inbox = inbox.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(addr, stream, &inbox, group_size, max_frame_len).await {
                error!("connection from {} broke: {}", addr, e);
                inbox.abort(&format!("connection from {} broke: {}", addr, e));
            }
        }.instrument(Span::current()));
    }
}

#[instrument(name = "accepted_connection", skip_all, fields(addr = %addr))]
async fn handle_connection(addr: SocketAddr, stream: TcpStream, inbox: &Inbox, group_size: u32, max_frame_len: u32) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let receiver = TcpReceiver::new(stream, group_size, max_frame_len).await?;
    debug!("connection is from rank {}", receiver.peer());
    receiver.receive_loop(inbox).await
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }

    async fn send(&self, to: Rank, channel: Channel, buf: Bytes) -> anyhow::Result<()> {
        if to == self.rank {
            self.inbox.deliver(self.rank, channel, buf);
            return Ok(());
        }
        self.sender(to)?
            .send_frame(channel, &buf)
            .await
    }

    async fn recv_any(&self, channel: Channel) -> anyhow::Result<(Rank, Bytes)> {
        self.inbox.recv_any(channel).await
    }

    async fn recv_from(&self, from: Rank, channel: Channel) -> anyhow::Result<Bytes> {
        self.inbox.recv_from(from, channel).await
    }

    /// After the barrier, every rank tells its peers that it is leaving, so they can tell a
    ///  regular shutdown from a crashed process when the connection closes.
    async fn barrier(&self) -> anyhow::Result<()> {
        rank_zero_barrier(self).await?;
        for sender in self.senders.iter().flatten() {
            if let Err(e) = sender.send_frame(Channel::Leave, &[]).await {
                debug!("could not say goodbye to rank {}: {}", sender.peer(), e);
            }
        }
        Ok(())
    }

    fn abort(&self, reason: &str) {
        let already_aborted = self.inbox.is_aborted();
        self.inbox.abort(reason);
        if already_aborted {
            return;
        }

        // best effort: peers that do not get the abort frame see the connection close without
        //  a goodbye when this process exits, and abort as well
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let body = Bytes::from(reason.to_string());
            for sender in self.senders.iter().flatten() {
                let sender = sender.clone();
                let body = body.clone();
                runtime.spawn(async move {
                    if let Err(e) = sender.send_frame(Channel::Abort, &body).await {
                        debug!("could not forward abort to rank {}: {}", sender.peer(), e);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;

    use crate::error::DsparError;
    use crate::test_util::loopback::loopback_tcp_group;
    use crate::transport::tcp::tcp_frame::{FrameHeader, InitMsg};

    use super::*;

    async fn start_group(group_size: u32) -> Vec<Arc<TcpTransport>> {
        loopback_tcp_group(group_size).await.unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let group = start_group(3).await;

        group[0].send(2, Channel::Header, Bytes::from_static(b"h0")).await.unwrap();
        group[1].send(2, Channel::Payload, Bytes::from_static(b"p1")).await.unwrap();
        group[0].send(2, Channel::Payload, Bytes::from_static(b"p0")).await.unwrap();
        group[2].send(2, Channel::Demand, Bytes::from_static(b"self")).await.unwrap();

        assert_eq!(group[2].recv_any(Channel::Header).await.unwrap(), (0, Bytes::from_static(b"h0")));
        assert_eq!(group[2].recv_from(0, Channel::Payload).await.unwrap(), Bytes::from_static(b"p0"));
        assert_eq!(group[2].recv_from(1, Channel::Payload).await.unwrap(), Bytes::from_static(b"p1"));
        assert_eq!(group[2].recv_any(Channel::Demand).await.unwrap(), (2, Bytes::from_static(b"self")));
    }

    #[tokio::test]
    async fn test_barrier() {
        let group = start_group(3).await;
        let handles: Vec<_> = group.into_iter()
            .map(|t| tokio::spawn(async move { t.barrier().await }))
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_abort_is_forwarded() {
        let group = start_group(2).await;
        group[0].abort("stage failed");

        let err = group[1].recv_any(Channel::Header).await.unwrap_err();
        match err.downcast_ref::<DsparError>() {
            Some(DsparError::GroupAborted(reason)) => assert!(reason.contains("stage failed")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_crashed_peer_aborts_group() {
        let mut group = start_group(2).await;
        let survivor = group.pop().unwrap();
        drop(group);

        let result = tokio::time::timeout(Duration::from_secs(5), survivor.recv_any(Channel::Header)).await.unwrap();
        match result.unwrap_err().downcast_ref::<DsparError>() {
            Some(DsparError::GroupAborted(reason)) => assert!(reason.contains("without leaving the group")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_leaving_after_barrier_does_not_abort() {
        let group = start_group(2).await;
        let handles: Vec<_> = group.into_iter()
            .map(|t| tokio::spawn(async move { t.barrier().await.map(|_| t) }))
            .collect();
        let mut group = Vec::new();
        for handle in handles {
            group.push(handle.await.unwrap().unwrap());
        }

        let survivor = group.pop().unwrap();
        drop(group);

        assert!(tokio::time::timeout(Duration::from_millis(200), survivor.recv_any(Channel::Header)).await.is_err());
        assert!(!survivor.inbox.is_aborted());
    }

    #[tokio::test]
    async fn test_corrupt_frame_aborts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = TcpTransport::start_with_listener(TcpTransportConfig::new(0, vec![addr]), listener).await.unwrap();

        let mut raw = TcpStream::connect(addr).await.unwrap();
        let mut buf = BytesMut::new();
        InitMsg { sender: 0, group_size: 1 }.ser(&mut buf);
        let mut header = FrameHeader::for_body(Channel::Header, b"abc", 3);
        header.checksum += 1;
        header.ser(&mut buf);
        raw.write_all(&buf).await.unwrap();
        raw.write_all(b"abc").await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), transport.recv_any(Channel::Header)).await.unwrap();
        assert!(matches!(result.unwrap_err().downcast_ref::<DsparError>(), Some(DsparError::GroupAborted(_))));
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peers = vec![listener.local_addr().unwrap(), unused.local_addr().unwrap()];
        drop(unused);

        let mut config = TcpTransportConfig::new(0, peers);
        config.connect_timeout = Duration::from_millis(200);
        config.connect_retry_interval = Duration::from_millis(20);

        assert!(TcpTransport::start_with_listener(config, listener).await.is_err());
    }
}
