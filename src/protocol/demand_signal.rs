use anyhow::bail;
use bytes::{Buf, BufMut};

use crate::transport::Rank;

/// A consumer's request to its producer for `amount` more data items.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DemandSignal {
    pub sender: Rank,
    pub target: Rank,
    pub amount: u32,
}

impl DemandSignal {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender);
        buf.put_u32(self.target);
        buf.put_u32(self.amount);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<DemandSignal> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("demand signal needs {} bytes, got {}", Self::SERIALIZED_LEN, buf.remaining());
        }
        Ok(DemandSignal {
            sender: buf.get_u32(),
            target: buf.get_u32(),
            amount: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_ser_deser() {
        let signal = DemandSignal { sender: 4, target: 0, amount: 1 };
        let mut buf = BytesMut::new();
        signal.ser(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(DemandSignal::deser(&mut buf.freeze()).unwrap(), signal);
    }

    #[test]
    fn test_deser_truncated() {
        assert!(DemandSignal::deser(&mut [0u8; 11].as_slice()).is_err());
    }
}
