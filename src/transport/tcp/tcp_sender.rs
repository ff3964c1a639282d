use anyhow::bail;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::protocol::channel::Channel;
use crate::transport::tcp::tcp_config::TcpTransportConfig;
use crate::transport::tcp::tcp_frame::{FrameHeader, InitMsg};
use crate::transport::Rank;
use crate::util::safe_converter::PrecheckedCast;

/// The outgoing TCP connection to a peer, used in simplex mode: records to the peer go through
///  this connection, records from the peer arrive through a separate connection that the peer
///  opened.
pub struct TcpSender {
    stream: Mutex<TcpStream>,
    peer: Rank,
    max_frame_len: u32,
}

impl TcpSender {
    pub async fn connect(config: &TcpTransportConfig, peer: Rank) -> anyhow::Result<TcpSender> {
        let peer_addr = config.peer_addr(peer)?;
        let deadline = Instant::now() + config.connect_timeout;

        let mut stream = loop {
            match TcpStream::connect(peer_addr).await {
                Ok(stream) => break stream,
                Err(e) => {
                    if Instant::now() >= deadline {
                        bail!("could not connect to rank {} at {} within {:?}: {}", peer, peer_addr, config.connect_timeout, e);
                    }
                    debug!("rank {} at {} is not reachable yet ({}) - retrying", peer, peer_addr, e);
                    sleep(config.connect_retry_interval).await;
                }
            }
        };
        stream.set_nodelay(true)?;

        let mut buf = BytesMut::with_capacity(InitMsg::SERIALIZED_LEN);
        InitMsg {
            sender: config.rank,
            group_size: config.group_size(),
        }
            .ser(&mut buf);
        stream.write_all(&buf).await?;
        debug!("connected to rank {} at {}", peer, peer_addr);

        Ok(TcpSender {
            stream: Mutex::new(stream),
            peer,
            max_frame_len: config.max_frame_len,
        })
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    pub async fn send_frame(&self, channel: Channel, body: &[u8]) -> anyhow::Result<()> {
        if body.len() > self.max_frame_len as usize {
            bail!("record of {} bytes for rank {} exceeds the configured maximum of {}", body.len(), self.peer, self.max_frame_len);
        }

        let mut header_buf = BytesMut::with_capacity(FrameHeader::SERIALIZED_LEN);
        FrameHeader::for_body(channel, body, body.len().prechecked_cast())
            .ser(&mut header_buf);

        let mut stream = self.stream.lock().await;
        stream.write_all(&header_buf).await?;
        stream.write_all(body).await?;
        Ok(())
    }
}
