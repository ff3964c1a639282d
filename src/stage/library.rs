use std::marker::PhantomData;

use async_trait::async_trait;

use crate::serializer::Nothing;
use crate::stage::{sink, worker, Collector, SinkContext, StageContext, StageFactory, Worker};

/// Emits every item unchanged. Emitted items keep the id of the item they were received with.
pub struct PassThrough<T> {
    _type: PhantomData<fn(T)>,
}

#[async_trait]
impl<T: Send + 'static> Worker<T, T> for PassThrough<T> {
    async fn process(&mut self, item: T, ctx: &mut StageContext<'_, T>) -> anyhow::Result<()> {
        ctx.emit(item).await
    }
}

/// Emits the result of applying a function to every item
pub struct Map<F, I> {
    f: F,
    _type: PhantomData<fn(I)>,
}

#[async_trait]
impl<I, O, F> Worker<I, O> for Map<F, I>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + 'static,
{
    async fn process(&mut self, item: I, ctx: &mut StageContext<'_, O>) -> anyhow::Result<()> {
        ctx.emit((self.f)(item)).await
    }
}

/// Drops every item
pub struct Discard<T> {
    _type: PhantomData<fn(T)>,
}

#[async_trait]
impl<T: Send + 'static> Collector<T> for Discard<T> {
    async fn process(&mut self, _item: T, _ctx: &mut SinkContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn pass_through<T: Send + 'static>() -> StageFactory<T, T> {
    worker(|| PassThrough { _type: PhantomData })
}

pub fn map<I, O, F>(f: F) -> StageFactory<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Clone + Send + Sync + 'static,
{
    worker(move || Map { f: f.clone(), _type: PhantomData })
}

pub fn discard<T: Send + 'static>() -> StageFactory<T, Nothing> {
    sink(|| Discard { _type: PhantomData })
}
