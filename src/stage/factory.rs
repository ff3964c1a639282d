use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DsparError;
use crate::serializer::Nothing;
use crate::stage::{Collector, Emitter, StageContext, Worker};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StageKind {
    Source,
    Worker,
    Sink,
}

/// The uniform view of a stage that a node drives, regardless of its capability variant.
///  Capabilities a variant does not have fail with [DsparError::InvalidCapabilityUse].
#[async_trait]
pub(crate) trait NodeStage<I, O>: Send {
    fn kind(&self) -> StageKind;

    async fn start(&mut self) -> anyhow::Result<()>;

    async fn produce(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()>;

    fn on_first_item(&mut self, item: &I) -> anyhow::Result<()>;

    async fn process(&mut self, item: I, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()>;

    async fn end(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()>;
}

struct EmitterStage<E>(E);

#[async_trait]
impl<O: Send + 'static, E: Emitter<O>> NodeStage<Nothing, O> for EmitterStage<E> {
    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        self.0.start().await
    }

    async fn produce(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        self.0.produce(ctx).await
    }

    fn on_first_item(&mut self, _item: &Nothing) -> anyhow::Result<()> {
        Err(DsparError::InvalidCapabilityUse("an emitter has no input").into())
    }

    async fn process(&mut self, _item: Nothing, _ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        Err(DsparError::InvalidCapabilityUse("an emitter has no input to process").into())
    }

    async fn end(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        self.0.end(ctx).await
    }
}

struct WorkerStage<W>(W);

#[async_trait]
impl<I: Send + 'static, O: Send + 'static, W: Worker<I, O>> NodeStage<I, O> for WorkerStage<W> {
    fn kind(&self) -> StageKind {
        StageKind::Worker
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        self.0.start().await
    }

    async fn produce(&mut self, _ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_first_item(&mut self, item: &I) -> anyhow::Result<()> {
        self.0.on_first_item(item)
    }

    async fn process(&mut self, item: I, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        self.0.process(item, ctx).await
    }

    async fn end(&mut self, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        self.0.end(ctx).await
    }
}

struct CollectorStage<C>(C);

#[async_trait]
impl<I: Send + 'static, C: Collector<I>> NodeStage<I, Nothing> for CollectorStage<C> {
    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        self.0.start().await
    }

    async fn produce(&mut self, _ctx: &mut StageContext<'_, Nothing>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_first_item(&mut self, item: &I) -> anyhow::Result<()> {
        self.0.on_first_item(item)
    }

    async fn process(&mut self, item: I, ctx: &mut StageContext<'_, Nothing>) -> anyhow::Result<()> {
        self.0.process(item, &mut ctx.sink()).await
    }

    async fn end(&mut self, _ctx: &mut StageContext<'_, Nothing>) -> anyhow::Result<()> {
        self.0.end().await
    }
}

/// Creates a fresh stage instance for every rank that runs it. Each worker replica of a farm
///  gets its own instance, and so does every rank of a pipeline running inside a single process.
pub struct StageFactory<I, O> {
    make: Arc<dyn Fn() -> Box<dyn NodeStage<I, O>> + Send + Sync>,
    kind: StageKind,
}

impl<I, O> Clone for StageFactory<I, O> {
    fn clone(&self) -> Self {
        StageFactory {
            make: self.make.clone(),
            kind: self.kind,
        }
    }
}

impl<I, O> StageFactory<I, O> {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub(crate) fn instantiate(&self) -> Box<dyn NodeStage<I, O>> {
        (self.make)()
    }
}

pub fn source<O, E, F>(make: F) -> StageFactory<Nothing, O>
where
    O: Send + 'static,
    E: Emitter<O>,
    F: Fn() -> E + Send + Sync + 'static,
{
    StageFactory {
        make: Arc::new(move || -> Box<dyn NodeStage<Nothing, O>> { Box::new(EmitterStage(make())) }),
        kind: StageKind::Source,
    }
}

pub fn worker<I, O, W, F>(make: F) -> StageFactory<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    W: Worker<I, O>,
    F: Fn() -> W + Send + Sync + 'static,
{
    StageFactory {
        make: Arc::new(move || -> Box<dyn NodeStage<I, O>> { Box::new(WorkerStage(make())) }),
        kind: StageKind::Worker,
    }
}

pub fn sink<I, C, F>(make: F) -> StageFactory<I, Nothing>
where
    I: Send + 'static,
    C: Collector<I>,
    F: Fn() -> C + Send + Sync + 'static,
{
    StageFactory {
        make: Arc::new(move || -> Box<dyn NodeStage<I, Nothing>> { Box::new(CollectorStage(make())) }),
        kind: StageKind::Sink,
    }
}
