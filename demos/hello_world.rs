use async_trait::async_trait;
use dspar::serializer::Nothing;
use dspar::skeleton::{Farm, Pipeline, PipelineStage};
use dspar::stage::{pass_through, sink, worker, Collector, SinkContext, StageContext, StageFactory, Worker};
use dspar::test_util::stages::range_source;
use tracing::Level;

struct Greeter;

#[async_trait]
impl Worker<u64, String> for Greeter {
    async fn process(&mut self, item: u64, ctx: &mut StageContext<'_, String>) -> anyhow::Result<()> {
        let greeting = format!("hello #{} from rank {}", item, ctx.rank());
        ctx.emit(greeting).await
    }
}

struct Printer;

#[async_trait]
impl Collector<String> for Printer {
    async fn process(&mut self, item: String, ctx: &mut SinkContext<'_>) -> anyhow::Result<()> {
        println!("rank {} received: {}", ctx.rank(), item);
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .try_init()
        .ok();

    let greeter: StageFactory<u64, String> = worker(|| Greeter);
    let printer: StageFactory<String, Nothing> = sink(|| Printer);

    let pipeline = Pipeline::new(PipelineStage::new(range_source(0..8)))
        .then(Farm::new(pass_through::<u64>(), greeter, pass_through::<String>()).workers(3).ordered(true))
        .then(PipelineStage::new(printer));

    println!("{}", pipeline.describe()?);
    pipeline.run_local().await?;
    Ok(())
}
