use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut};
use crc::{Crc, CRC_32_ISCSI};

use crate::protocol::channel::Channel;
use crate::transport::Rank;

const CHECKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// The first record on every connection, identifying the connecting rank
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InitMsg {
    pub sender: Rank,
    pub group_size: u32,
}

impl InitMsg {
    pub const MAGIC: u32 = 0x4453_5052;
    pub const SERIALIZED_LEN: usize = 12;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(Self::MAGIC);
        buf.put_u32(self.sender);
        buf.put_u32(self.group_size);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<InitMsg> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("init message is too short");
        }
        let magic = buf.get_u32();
        if magic != Self::MAGIC {
            bail!("connection does not start with the expected magic number: {:x}", magic);
        }
        Ok(InitMsg {
            sender: buf.get_u32(),
            group_size: buf.get_u32(),
        })
    }
}

/// Precedes every record on a connection: the channel, the body's length and its CRC-32 checksum
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameHeader {
    pub channel: Channel,
    pub len: u32,
    pub checksum: u32,
}

impl FrameHeader {
    pub const SERIALIZED_LEN: usize = 1 + 4 + 4;

    /// NB: the caller must ensure that the body's length fits into a u32
    pub fn for_body(channel: Channel, body: &[u8], len: u32) -> FrameHeader {
        FrameHeader {
            channel,
            len,
            checksum: CHECKSUM.checksum(body),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.channel.into());
        buf.put_u32(self.len);
        buf.put_u32(self.checksum);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<FrameHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("frame header is too short");
        }
        let raw_channel = buf.get_u8();
        let channel = Channel::try_from(raw_channel)
            .map_err(|_| anyhow!("frame for unknown channel {}", raw_channel))?;
        Ok(FrameHeader {
            channel,
            len: buf.get_u32(),
            checksum: buf.get_u32(),
        })
    }

    pub fn verify(&self, body: &[u8]) -> anyhow::Result<()> {
        let actual = CHECKSUM.checksum(body);
        if actual != self.checksum {
            bail!("checksum mismatch on {:?} frame: expected {:x}, was {:x}", self.channel, self.checksum, actual);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_init_msg() {
        let mut buf = BytesMut::new();
        InitMsg { sender: 3, group_size: 5 }.ser(&mut buf);
        assert_eq!(&buf[..4], &[0x44, 0x53, 0x50, 0x52]);
        assert_eq!(InitMsg::deser(&mut buf.freeze()).unwrap(), InitMsg { sender: 3, group_size: 5 });
    }

    #[test]
    fn test_init_msg_wrong_magic() {
        let raw = [0u8, 0, 0, 1, 0, 0, 0, 3, 0, 0, 0, 5];
        assert!(InitMsg::deser(&mut raw.as_slice()).is_err());
    }

    #[test]
    fn test_frame_header() {
        let body = b"some payload";
        let header = FrameHeader::for_body(Channel::Payload, body, body.len() as u32);

        let mut buf = BytesMut::new();
        header.ser(&mut buf);
        assert_eq!(buf.len(), FrameHeader::SERIALIZED_LEN);
        assert_eq!(buf[0], 2);

        let deser = FrameHeader::deser(&mut buf.freeze()).unwrap();
        assert_eq!(deser, header);
        deser.verify(body).unwrap();
    }

    #[rstest]
    #[case::flipped_bit(b"some paylaod".as_slice())]
    #[case::truncated(b"some".as_slice())]
    #[case::empty(b"".as_slice())]
    fn test_frame_checksum_mismatch(#[case] received: &[u8]) {
        let header = FrameHeader::for_body(Channel::Header, b"some payload", 12);
        assert!(header.verify(received).is_err());
    }

    #[test]
    fn test_frame_unknown_channel() {
        let raw = [17u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(FrameHeader::deser(&mut raw.as_slice()).is_err());
    }
}
