//! The application-facing stage contract. A stage is one of three capability variants:
//!
//! * [Emitter]: no input, free-running item generation in [Emitter::produce]
//! * [Worker]: input and output, one [Worker::process] call per delivered item
//! * [Collector]: input only, the end of a pipeline
//!
//! Stages reach the outside world only through the context they are handed: a [StageContext]
//!  lets stages with output emit items, and both contexts let them defer work until the current
//!  message is fully handled.

use async_trait::async_trait;

use crate::transport::Rank;

pub mod factory;
pub mod library;

pub use factory::{sink, source, worker, StageFactory, StageKind};
pub use library::{discard, map, pass_through};

/// A callback registered during message handling, run after the message is fully processed
pub type Deferred = Box<dyn FnOnce() + Send>;

/// Where a node's emitted items go. The node implements this with its flow-control policy.
#[async_trait]
pub trait Outlet<O>: Send {
    async fn emit(&mut self, item: O) -> anyhow::Result<()>;
}

pub struct StageContext<'a, O> {
    outlet: &'a mut dyn Outlet<O>,
    deferred: &'a mut Vec<Deferred>,
    rank: Rank,
}

impl<'a, O: Send + 'static> StageContext<'a, O> {
    pub fn new(outlet: &'a mut dyn Outlet<O>, deferred: &'a mut Vec<Deferred>, rank: Rank) -> StageContext<'a, O> {
        StageContext {
            outlet,
            deferred,
            rank,
        }
    }

    /// Send one item downstream through the node's flow-control policy. This may block until a
    ///  consumer asks for work.
    pub async fn emit(&mut self, item: O) -> anyhow::Result<()> {
        self.outlet.emit(item).await
    }

    /// Register a callback to run after the current message is handled. Callbacks run in reverse
    ///  order of registration.
    pub fn defer(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.deferred.push(Box::new(callback));
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    fn sink(&mut self) -> SinkContext<'_> {
        SinkContext {
            deferred: &mut *self.deferred,
            rank: self.rank,
        }
    }
}

/// The context of a stage without output
pub struct SinkContext<'a> {
    deferred: &'a mut Vec<Deferred>,
    rank: Rank,
}

impl SinkContext<'_> {
    pub fn defer(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.deferred.push(Box::new(callback));
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }
}

/// A stage without input that generates its items in [Emitter::produce].
///
/// `start`, `produce` and `end` are each called exactly once, in that order.
#[async_trait]
pub trait Emitter<O: Send + 'static>: Send + 'static {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn produce(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()>;

    async fn end(&mut self, _ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A stage with input and output
#[async_trait]
pub trait Worker<I: Send + 'static, O: Send + 'static>: Send + 'static {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// called with the first delivered item, before it is processed
    fn on_first_item(&mut self, _item: &I) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(&mut self, item: I, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()>;

    /// called after the last item was processed; the stage may still emit
    async fn end(&mut self, _ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A stage with input but without output
#[async_trait]
pub trait Collector<I: Send + 'static>: Send + 'static {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_first_item(&mut self, _item: &I) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(&mut self, item: I, ctx: &mut SinkContext<'_>) -> anyhow::Result<()>;

    async fn end(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
