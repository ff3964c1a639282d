use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DsparError;
use crate::protocol::communicator::Communicator;
use crate::protocol::message_header::MessageHeader;
use crate::serializer::{Nothing, NothingSerializer, Serializer, WireSerializer};
use crate::util::safe_converter::{wire_len_to_usize, SafeCast};

/// A payload type that knows how to transfer itself as a sequence of payload records.
///
/// Fixed-size types use a single transfer of exactly their size. Variable-size types send an
///  8-byte length first, followed (if non-empty) by one transfer of exactly the announced size.
#[async_trait]
pub trait Wire: Send + Sized + 'static {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()>;

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self>;

    /// the serializer used for edges carrying this type; override to plug in a custom [Serializer]
    fn serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(WireSerializer::<Self>::new())
    }
}

/// Fixed-size values that can be laid out back to back, e.g. as elements of a `Vec`
pub trait Pod: Copy + Send + Sync + 'static {
    const SIZE: usize;

    fn put(&self, buf: &mut BytesMut);
    fn get(buf: &mut Bytes) -> Self;
}

macro_rules! wire_pod {
    ($t:ty, $put:ident, $get:ident) => {
        impl Pod for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn put(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn get(buf: &mut Bytes) -> Self {
                buf.$get()
            }
        }

        #[async_trait]
        impl Wire for $t {
            async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
                let mut buf = BytesMut::with_capacity(<$t as Pod>::SIZE);
                self.put(&mut buf);
                comm.send_payload(header, buf.freeze()).await
            }

            async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
                let mut buf = comm.receive_payload(header, <$t as Pod>::SIZE).await?;
                Ok(<$t as Pod>::get(&mut buf))
            }
        }
    };
}

wire_pod!(u8, put_u8, get_u8);
wire_pod!(i8, put_i8, get_i8);
wire_pod!(u16, put_u16, get_u16);
wire_pod!(i16, put_i16, get_i16);
wire_pod!(u32, put_u32, get_u32);
wire_pod!(i32, put_i32, get_i32);
wire_pod!(u64, put_u64, get_u64);
wire_pod!(i64, put_i64, get_i64);
wire_pod!(f32, put_f32, get_f32);
wire_pod!(f64, put_f64, get_f64);

#[async_trait]
impl Wire for bool {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        (self as u8).send_to(comm, header).await
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        Ok(u8::receive_from(comm, header).await? != 0)
    }
}

async fn send_len(comm: &Communicator, header: &MessageHeader, len: usize) -> anyhow::Result<()> {
    let len: u64 = len.safe_cast();
    len.send_to(comm, header).await
}

async fn receive_len(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<usize> {
    wire_len_to_usize(u64::receive_from(comm, header).await?)
}

async fn send_sized(comm: &Communicator, header: &MessageHeader, buf: Bytes) -> anyhow::Result<()> {
    send_len(comm, header, buf.len()).await?;
    if !buf.is_empty() {
        comm.send_payload(header, buf).await?;
    }
    Ok(())
}

async fn receive_sized(comm: &Communicator, header: &MessageHeader, element_size: usize) -> anyhow::Result<(usize, Bytes)> {
    let len = receive_len(comm, header).await?;
    if len == 0 {
        return Ok((0, Bytes::new()));
    }
    let num_bytes = len.checked_mul(element_size)
        .ok_or_else(|| anyhow!("announced payload of {} elements does not fit into memory", len))?;
    Ok((len, comm.receive_payload(header, num_bytes).await?))
}

#[async_trait]
impl Wire for Bytes {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        send_sized(comm, header, self).await
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        Ok(receive_sized(comm, header, 1).await?.1)
    }
}

#[async_trait]
impl Wire for String {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        send_sized(comm, header, Bytes::from(self.into_bytes())).await
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        let (_, buf) = receive_sized(comm, header, 1).await?;
        Ok(String::from_utf8(buf.to_vec())?)
    }
}

#[async_trait]
impl<T: Pod> Wire for Vec<T> {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(self.len() * T::SIZE);
        for element in &self {
            element.put(&mut buf);
        }
        send_len(comm, header, self.len()).await?;
        if !self.is_empty() {
            comm.send_payload(header, buf.freeze()).await?;
        }
        Ok(())
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        let (len, mut buf) = receive_sized(comm, header, T::SIZE).await?;
        Ok((0..len).map(|_| T::get(&mut buf)).collect())
    }
}

impl<T: Pod, const N: usize> Pod for [T; N] {
    const SIZE: usize = N * T::SIZE;

    fn put(&self, buf: &mut BytesMut) {
        for element in self {
            element.put(buf);
        }
    }

    fn get(buf: &mut Bytes) -> Self {
        std::array::from_fn(|_| T::get(buf))
    }
}

/// a fixed-size array travels in a single transfer, like a scalar
#[async_trait]
impl<T: Pod, const N: usize> Wire for [T; N] {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(<Self as Pod>::SIZE);
        self.put(&mut buf);
        comm.send_payload(header, buf.freeze()).await
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        let mut buf = comm.receive_payload(header, <Self as Pod>::SIZE).await?;
        Ok(<Self as Pod>::get(&mut buf))
    }
}

/// A ragged 2-D buffer: the row lengths, followed by all elements back to back in a single
///  sized transfer.
#[async_trait]
impl<T: Pod> Wire for Vec<Vec<T>> {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        let row_lens: Vec<u64> = self.iter().map(|row| row.len().safe_cast()).collect();
        row_lens.send_to(comm, header).await?;

        let num_elements: usize = self.iter().map(Vec::len).sum();
        let mut buf = BytesMut::with_capacity(num_elements * T::SIZE);
        for element in self.iter().flatten() {
            element.put(&mut buf);
        }
        send_len(comm, header, num_elements).await?;
        if num_elements > 0 {
            comm.send_payload(header, buf.freeze()).await?;
        }
        Ok(())
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        let row_lens = Vec::<u64>::receive_from(comm, header).await?
            .into_iter()
            .map(wire_len_to_usize)
            .collect::<anyhow::Result<Vec<usize>>>()?;
        let (num_elements, mut buf) = receive_sized(comm, header, T::SIZE).await?;

        let expected = row_lens.iter()
            .try_fold(0usize, |acc, &len| acc.checked_add(len));
        if expected != Some(num_elements) {
            return Err(anyhow!("rows announce {:?} elements, but {} were sent", expected, num_elements));
        }

        Ok(row_lens.into_iter()
            .map(|len| (0..len).map(|_| T::get(&mut buf)).collect())
            .collect())
    }
}

#[async_trait]
impl<A: Wire, B: Wire> Wire for (A, B) {
    async fn send_to(self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<()> {
        self.0.send_to(comm, header).await?;
        self.1.send_to(comm, header).await
    }

    async fn receive_from(comm: &Communicator, header: &MessageHeader) -> anyhow::Result<Self> {
        let a = A::receive_from(comm, header).await?;
        let b = B::receive_from(comm, header).await?;
        Ok((a, b))
    }
}

#[async_trait]
impl Wire for Nothing {
    async fn send_to(self, _comm: &Communicator, _header: &MessageHeader) -> anyhow::Result<()> {
        Err(DsparError::InvalidCapabilityUse("sending a value of a stage without output").into())
    }

    async fn receive_from(_comm: &Communicator, _header: &MessageHeader) -> anyhow::Result<Self> {
        Err(DsparError::InvalidCapabilityUse("receiving a value for a stage without input").into())
    }

    fn serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(NothingSerializer)
    }
}
