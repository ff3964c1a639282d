use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::serializer::Nothing;
use crate::stage::{sink, source, Collector, Emitter, SinkContext, StageContext, StageFactory};

/// Emits the numbers of a range, in order
pub struct RangeSource {
    range: Range<u64>,
}

#[async_trait]
impl Emitter<u64> for RangeSource {
    async fn produce(&mut self, ctx: &mut StageContext<'_, u64>) -> anyhow::Result<()> {
        for i in self.range.clone() {
            ctx.emit(i).await?;
        }
        Ok(())
    }
}

pub fn range_source(range: Range<u64>) -> StageFactory<Nothing, u64> {
    source(move || RangeSource { range: range.clone() })
}

/// Stores every item it receives. All instances created by one factory share their storage.
pub struct CollectingSink<T> {
    items: Arc<RwLock<Vec<T>>>,
}

#[async_trait]
impl<T: Send + Sync + 'static> Collector<T> for CollectingSink<T> {
    async fn process(&mut self, item: T, _ctx: &mut SinkContext<'_>) -> anyhow::Result<()> {
        self.items.write().await.push(item);
        Ok(())
    }
}

#[derive(Clone)]
pub struct Collected<T> {
    items: Arc<RwLock<Vec<T>>>,
}

impl<T: Clone> Collected<T> {
    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.clone()
    }
}

pub fn collecting_sink<T: Send + Sync + 'static>() -> (StageFactory<T, Nothing>, Collected<T>) {
    let items = Arc::new(RwLock::new(Vec::new()));
    let factory = {
        let items = items.clone();
        sink(move || CollectingSink { items: items.clone() })
    };
    (factory, Collected { items })
}
