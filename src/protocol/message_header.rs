use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::transport::Rank;

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Data = 0,
    Stop = 1,
}

/// The fixed-size control record that precedes every payload and announces end-of-stream.
///
/// `id` identifies a data item along its path through the pipeline. `origin_nanos` is the
///  wall-clock time (nanos since the epoch) at which the item entered the pipeline, and
///  `compute_nanos` accumulates the time spent processing it in stages.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MessageHeader {
    pub sender: Rank,
    pub target: Rank,
    pub message_type: MessageType,
    pub id: u64,
    pub origin_nanos: u64,
    pub compute_nanos: u64,
}

impl MessageHeader {
    pub const SERIALIZED_LEN: usize = 4 + 4 + 1 + 8 + 8 + 8;

    pub fn data(sender: Rank, target: Rank, id: u64) -> MessageHeader {
        MessageHeader {
            sender,
            target,
            message_type: MessageType::Data,
            id,
            origin_nanos: 0,
            compute_nanos: 0,
        }
    }

    pub fn stop(sender: Rank, target: Rank, id: u64) -> MessageHeader {
        MessageHeader {
            message_type: MessageType::Stop,
            ..MessageHeader::data(sender, target, id)
        }
    }

    pub fn with_timing(self, origin_nanos: u64, compute_nanos: u64) -> MessageHeader {
        MessageHeader {
            origin_nanos,
            compute_nanos,
            ..self
        }
    }

    pub fn is_stop(&self) -> bool {
        self.message_type == MessageType::Stop
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender);
        buf.put_u32(self.target);
        buf.put_u8(self.message_type.into());
        buf.put_u64(self.id);
        buf.put_u64(self.origin_nanos);
        buf.put_u64(self.compute_nanos);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<MessageHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("message header needs {} bytes, got {}", Self::SERIALIZED_LEN, buf.remaining());
        }

        let sender = buf.get_u32();
        let target = buf.get_u32();
        let raw_type = buf.get_u8();
        let message_type = MessageType::try_from(raw_type)
            .map_err(|_| anyhow!("invalid message type {}", raw_type))?;
        let id = buf.get_u64();
        let origin_nanos = buf.get_u64();
        let compute_nanos = buf.get_u64();

        Ok(MessageHeader {
            sender,
            target,
            message_type,
            id,
            origin_nanos,
            compute_nanos,
        })
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_ser_layout() {
        let header = MessageHeader::stop(2, 7, 0x0102).with_timing(3, 4);
        let mut buf = BytesMut::new();
        header.ser(&mut buf);

        assert_eq!(buf.len(), MessageHeader::SERIALIZED_LEN);
        assert_eq!(&buf[..], &[
            0, 0, 0, 2,
            0, 0, 0, 7,
            1,
            0, 0, 0, 0, 0, 0, 1, 2,
            0, 0, 0, 0, 0, 0, 0, 3,
            0, 0, 0, 0, 0, 0, 0, 4,
        ]);

        let deser = MessageHeader::deser(&mut buf.freeze()).unwrap();
        assert_eq!(deser, header);
        assert!(deser.is_stop());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::truncated(vec![0; MessageHeader::SERIALIZED_LEN - 1])]
    #[case::invalid_type(vec![0, 0, 0, 1,  0, 0, 0, 2,  9,  0, 0, 0, 0, 0, 0, 0, 0,  0, 0, 0, 0, 0, 0, 0, 0,  0, 0, 0, 0, 0, 0, 0, 0])]
    fn test_deser_invalid(#[case] raw: Vec<u8>) {
        assert!(MessageHeader::deser(&mut raw.as_slice()).is_err());
    }
}
