use std::io::ErrorKind;

use anyhow::bail;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::protocol::channel::Channel;
use crate::transport::inbox::Inbox;
use crate::transport::tcp::tcp_frame::{FrameHeader, InitMsg};
use crate::transport::Rank;
use crate::util::safe_converter::SafeCast;

/// The receiving end of a peer's simplex connection: reads frames and delivers them to the inbox
pub struct TcpReceiver {
    stream: TcpStream,
    peer: Rank,
    max_frame_len: u32,
}

impl TcpReceiver {
    pub async fn new(mut stream: TcpStream, group_size: u32, max_frame_len: u32) -> anyhow::Result<TcpReceiver> {
        let mut init_buf = [0u8; InitMsg::SERIALIZED_LEN];
        stream.read_exact(&mut init_buf).await?;
        let init_msg = InitMsg::deser(&mut init_buf.as_ref())?;

        if init_msg.group_size != group_size {
            bail!("peer rank {} was started with group size {}, this rank with {}", init_msg.sender, init_msg.group_size, group_size);
        }
        if init_msg.sender >= group_size {
            bail!("connecting peer claims rank {} which is outside the group", init_msg.sender);
        }

        Ok(TcpReceiver {
            stream,
            peer: init_msg.sender,
            max_frame_len,
        })
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Returns when the peer closes the connection after leaving the group. A connection that
    ///  closes without a preceding [Channel::Leave] frame means the peer died, and is an error.
    pub async fn receive_loop(mut self, inbox: &Inbox) -> anyhow::Result<()> {
        let mut header_buf = [0u8; FrameHeader::SERIALIZED_LEN];
        let mut has_left = false;

        loop {
            match self.stream.read_exact(&mut header_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    if !has_left {
                        bail!("rank {} closed the connection without leaving the group", self.peer);
                    }
                    debug!("rank {} closed the connection", self.peer);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let header = FrameHeader::deser(&mut header_buf.as_ref())?;
            if header.len > self.max_frame_len {
                bail!("received a frame of {} bytes, more than the configured maximum of {} - the connection is apparently compromised", header.len, self.max_frame_len);
            }

            let mut body = vec![0u8; header.len.safe_cast()];
            self.stream.read_exact(&mut body).await?;
            header.verify(&body)?;
            trace!("received {} bytes on {:?} from rank {}", body.len(), header.channel, self.peer);

            if header.channel == Channel::Abort {
                let reason = String::from_utf8_lossy(&body);
                inbox.abort(&format!("rank {}: {}", self.peer, reason));
                return Ok(());
            }
            if header.channel == Channel::Leave {
                debug!("rank {} left the group", self.peer);
                has_left = true;
                continue;
            }
            inbox.deliver(self.peer, header.channel, Bytes::from(body));
        }
    }
}
