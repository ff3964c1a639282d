//! Runs one rank of a farm over TCP. Start one process per rank with the same peer list, e.g.
//!
//! ```text
//! tcp_farm --rank 0 --peer 127.0.0.1:9810 --peer 127.0.0.1:9811 --peer 127.0.0.1:9812 --peer 127.0.0.1:9813
//! tcp_farm --rank 1 --peer 127.0.0.1:9810 ...
//! ```

use std::net::SocketAddr;

use anyhow::anyhow;
use clap::Parser;
use clap_derive::Parser;
use dspar::config::DsparConfig;
use dspar::serializer::Nothing;
use dspar::skeleton::{Farm, Pipeline};
use dspar::stage::{map, sink, Collector, SinkContext, StageFactory};
use dspar::test_util::stages::range_source;
use dspar::transport::tcp::tcp_config::TcpTransportConfig;
use dspar::transport::tcp::TcpTransport;
use tracing::{info, Level};

#[derive(Parser)]
struct Args {
    #[clap(long)]
    rank: u32,

    #[clap(long)]
    peer: Vec<String>,

    #[clap(long, default_value_t = 100)]
    items: u64,

    #[clap(long, default_value_t = false)]
    on_demand: bool,

    #[clap(long, default_value_t = false)]
    ordered: bool,

    #[clap(long, default_value_t = false)]
    timings: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

struct Summary {
    count: u64,
    sum: u64,
}

#[async_trait::async_trait]
impl Collector<u64> for Summary {
    async fn process(&mut self, item: u64, _ctx: &mut SinkContext<'_>) -> anyhow::Result<()> {
        self.count += 1;
        self.sum += item;
        Ok(())
    }

    async fn end(&mut self) -> anyhow::Result<()> {
        println!("collected {} items, sum {}", self.count, self.sum);
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    if args.peer.len() < 3 {
        return Err(anyhow!("a farm needs at least three ranks"));
    }
    let mut peers = Vec::new();
    for p in &args.peer {
        let peer: SocketAddr = p.parse()?;
        peers.push(peer);
    }

    let collector: StageFactory<u64, Nothing> = sink(|| Summary { count: 0, sum: 0 });
    let farm = Farm::new(range_source(0..args.items), map(|i: u64| i * i), collector)
        .workers(peers.len() as u32 - 2)
        .on_demand(args.on_demand)
        .ordered(args.ordered);
    let pipeline = Pipeline::new(farm)
        .with_config(DsparConfig { collect_timings: args.timings, ..DsparConfig::new() });
    info!("topology:\n{}", pipeline.describe()?);

    let transport = TcpTransport::start(TcpTransportConfig::new(args.rank, peers)).await?;
    if let Some(report) = pipeline.run(transport).await? {
        info!("{:?} done: processed {}, emitted {}", report.role, report.items_processed, report.items_emitted);
        if !report.timings.is_empty() {
            let n = report.timings.len() as u32;
            let total: std::time::Duration = report.timings.iter().map(|t| t.total).sum();
            info!("average per item: total {:?}, compute {:?}", total / n, report.total_compute_time() / n);
        }
    }
    Ok(())
}
