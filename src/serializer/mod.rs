use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DsparError;
use crate::protocol::communicator::Communicator;
use crate::protocol::message_header::MessageHeader;

pub mod wire;

pub use wire::{Pod, Wire};

/// The payload type of a pipeline's open ends: a source has no input, a sink has no output.
///  Its serializer fails on every use.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Nothing;

/// Transfers values of one payload type between the sender and the receiver of a DATA header.
///
/// `send` runs on the producer after the header was sent; `receive` runs on the consumer after
///  the header was received. Both sides must perform the same sequence of payload transfers, and
///  the receiving side must state the exact size it expects for each of them.
#[async_trait]
pub trait Serializer<T>: Send + Sync + 'static {
    /// one-time initialization, called at most once through a [SerializerHandle]
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send(&self, comm: &Communicator, header: &MessageHeader, value: T) -> anyhow::Result<()>;

    async fn receive(&self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<T>;
}

/// The default serializer for every [Wire] type
pub struct WireSerializer<T> {
    _type: PhantomData<fn() -> T>,
}

impl<T> WireSerializer<T> {
    pub fn new() -> WireSerializer<T> {
        WireSerializer { _type: PhantomData }
    }
}

impl<T> Default for WireSerializer<T> {
    fn default() -> Self {
        WireSerializer::new()
    }
}

#[async_trait]
impl<T: Wire> Serializer<T> for WireSerializer<T> {
    async fn send(&self, comm: &Communicator, header: &MessageHeader, value: T) -> anyhow::Result<()> {
        value.send_to(comm, header).await
    }

    async fn receive(&self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<T> {
        T::receive_from(comm, header).await
    }
}

pub struct NothingSerializer;

#[async_trait]
impl Serializer<Nothing> for NothingSerializer {
    async fn send(&self, _comm: &Communicator, _header: &MessageHeader, _value: Nothing) -> anyhow::Result<()> {
        Err(DsparError::InvalidCapabilityUse("send on the serializer of a stage without output").into())
    }

    async fn receive(&self, _comm: &Communicator, _header: &MessageHeader) -> anyhow::Result<Nothing> {
        Err(DsparError::InvalidCapabilityUse("receive on the serializer of a stage without input").into())
    }
}

/// A shared reference to a serializer that runs its [Serializer::on_start] exactly once, no
///  matter how many clones of the handle are started.
pub struct SerializerHandle<T> {
    inner: Arc<dyn Serializer<T>>,
    started: Arc<AtomicBool>,
}

impl<T> Clone for SerializerHandle<T> {
    fn clone(&self) -> Self {
        SerializerHandle {
            inner: self.inner.clone(),
            started: self.started.clone(),
        }
    }
}

impl<T: Send + 'static> SerializerHandle<T> {
    pub fn new(inner: Arc<dyn Serializer<T>>) -> SerializerHandle<T> {
        SerializerHandle {
            inner,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn for_wire() -> SerializerHandle<T> where T: Wire {
        SerializerHandle::new(T::serializer())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.on_start().await
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn send(&self, comm: &Communicator, header: &MessageHeader, value: T) -> anyhow::Result<()> {
        self.inner.send(comm, header, value).await
    }

    pub async fn receive(&self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<T> {
        self.inner.receive(comm, header).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use crate::transport::local::LocalGroup;

    use super::*;

    struct CountingSerializer {
        num_starts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Serializer<u32> for CountingSerializer {
        async fn on_start(&self) -> anyhow::Result<()> {
            self.num_starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, comm: &Communicator, header: &MessageHeader, value: u32) -> anyhow::Result<()> {
            value.send_to(comm, header).await
        }

        async fn receive(&self, comm: &Communicator, header: &MessageHeader) -> anyhow::Result<u32> {
            u32::receive_from(comm, header).await
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let num_starts = Arc::new(AtomicUsize::new(0));
        let handle = SerializerHandle::<u32>::new(Arc::new(CountingSerializer { num_starts: num_starts.clone() }));
        let cloned = handle.clone();
        assert!(!cloned.is_started());

        handle.start().await.unwrap();
        handle.start().await.unwrap();
        cloned.start().await.unwrap();

        assert_eq!(num_starts.load(Ordering::SeqCst), 1);
        assert!(cloned.is_started());
    }

    #[tokio::test]
    async fn test_nothing_serializer_rejects_use() {
        let group = LocalGroup::new(2);
        let comm = Communicator::new(group.transport(0));
        let header = MessageHeader::data(0, 1, 0);

        let handle = SerializerHandle::<Nothing>::for_wire();
        handle.start().await.unwrap();

        let err = handle.send(&comm, &header, Nothing).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DsparError>(), Some(DsparError::InvalidCapabilityUse(_))));
        let err = handle.receive(&comm, &header).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DsparError>(), Some(DsparError::InvalidCapabilityUse(_))));
    }
}
