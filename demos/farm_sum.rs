use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dspar::serializer::Nothing;
use dspar::skeleton::{Farm, Pipeline};
use dspar::stage::{sink, source, worker, Collector, Emitter, SinkContext, StageContext, StageFactory, Worker};
use tracing::{info, Level};

struct Numbers {
    count: u64,
}

#[async_trait]
impl Emitter<u64> for Numbers {
    async fn produce(&mut self, ctx: &mut StageContext<'_, u64>) -> anyhow::Result<()> {
        for i in 0..self.count {
            ctx.emit(i).await?;
        }
        Ok(())
    }
}

struct Doubler;

#[async_trait]
impl Worker<u64, u64> for Doubler {
    async fn process(&mut self, item: u64, ctx: &mut StageContext<'_, u64>) -> anyhow::Result<()> {
        ctx.emit(2 * item).await
    }
}

struct Sum {
    total: Arc<AtomicU64>,
}

#[async_trait]
impl Collector<u64> for Sum {
    async fn process(&mut self, item: u64, _ctx: &mut SinkContext<'_>) -> anyhow::Result<()> {
        self.total.fetch_add(item, Ordering::AcqRel);
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init()
        .ok();

    let total = Arc::new(AtomicU64::new(0));

    let emitter: StageFactory<Nothing, u64> = source(|| Numbers { count: 10 });
    let doubler: StageFactory<u64, u64> = worker(|| Doubler);
    let collector: StageFactory<u64, Nothing> = {
        let total = total.clone();
        sink(move || Sum { total: total.clone() })
    };

    let pipeline = Pipeline::new(
        Farm::new(emitter, doubler, collector)
            .workers(2)
            .on_demand(true)
            .ordered(true)
    );
    info!("topology:\n{}", pipeline.describe()?);

    let reports = pipeline.run_local().await?;
    for report in reports.into_iter().flatten() {
        info!("rank {} ({:?}): processed {}, emitted {}", report.rank, report.role, report.items_processed, report.items_emitted);
    }

    println!("sum: {}", total.load(Ordering::Acquire));
    Ok(())
}
