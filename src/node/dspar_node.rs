use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::DsparError;
use crate::node::lifecycle::{run_lifecycle, AfterStart, NodeLifecycle, NodeState, StopResponse};
use crate::node::node_configuration::NodeConfiguration;
use crate::node::reorder_buffer::ReorderBuffer;
use crate::node::run_report::{ItemTiming, NodeRole, RunReport};
use crate::protocol::communicator::Communicator;
use crate::protocol::message_header::MessageHeader;
use crate::serializer::SerializerHandle;
use crate::stage::factory::NodeStage;
use crate::stage::{Deferred, Outlet, StageContext};
use crate::transport::pending_request::PendingRequest;
use crate::transport::Rank;
use crate::util::round_robin::RoundRobinSet;
use crate::util::safe_converter::PrecheckedCast;

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().prechecked_cast())
        .unwrap_or(0)
}

fn nanos(d: std::time::Duration) -> u64 {
    d.as_nanos().prechecked_cast()
}

/// Where the item currently being processed came from. Items emitted while processing it
///  inherit its id and origin.
#[derive(Debug, Clone, Copy)]
struct Provenance {
    id: u64,
    origin_nanos: u64,
    compute_nanos: u64,
    started: Instant,
}

/// The sending half of a node: picks a target per emission according to the flow-control
///  policy, and runs the downstream half of the termination protocol.
struct Downstream<O> {
    comm: Arc<Communicator>,
    output: SerializerHandle<O>,
    targets: RoundRobinSet<Rank>,
    wait_for_demand: bool,
    provenance: Option<Provenance>,
    items_emitted: u64,
}

impl<O: Send + 'static> Downstream<O> {
    async fn next_target(&mut self) -> anyhow::Result<Rank> {
        if self.wait_for_demand {
            let demand = self.comm.receive_demand().await?;
            if !self.targets.contains(&demand.sender) {
                warn!("demand from rank {} which is not a target - serving it anyway", demand.sender);
            }
            Ok(demand.sender)
        }
        else {
            self.targets.next()
                .ok_or_else(|| DsparError::InvalidCapabilityUse("emit on a node without targets").into())
        }
    }

    async fn stop_targets(&mut self) -> anyhow::Result<()> {
        if self.wait_for_demand {
            // consumers keep asking until they are told to stop, so every remaining target
            //  gets its STOP in response to a demand
            while !self.targets.is_empty() {
                let demand = self.comm.receive_demand().await?;
                debug!("answering demand from rank {} with STOP", demand.sender);
                self.comm.send_stop_to(demand.sender).await?;
                if !self.targets.remove(&demand.sender) {
                    warn!("demand from rank {} which is not a target", demand.sender);
                }
            }
        }
        else {
            for &target in self.targets.members() {
                debug!("sending STOP to rank {}", target);
                self.comm.send_stop_to(target).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<O: Send + 'static> Outlet<O> for Downstream<O> {
    async fn emit(&mut self, item: O) -> anyhow::Result<()> {
        if self.targets.is_empty() {
            return Err(DsparError::InvalidCapabilityUse("emit on a node without targets").into());
        }

        let target = self.next_target().await?;
        let rank = self.comm.rank();
        let header = match &self.provenance {
            Some(p) => MessageHeader::data(rank, target, p.id)
                .with_timing(p.origin_nanos, p.compute_nanos + nanos(p.started.elapsed())),
            None => MessageHeader::data(rank, target, self.comm.next_message_id())
                .with_timing(now_nanos(), 0),
        };

        self.comm.send_header(&header).await?;
        self.output.send(&self.comm, &header, item).await?;
        self.items_emitted += 1;
        Ok(())
    }
}

/// One process's node: a stage bound to its sources and targets and driven through the
///  lifecycle, with the flow-control policy of its [NodeConfiguration].
pub(crate) struct DsparNode<I, O> {
    comm: Arc<Communicator>,
    stage: Box<dyn NodeStage<I, O>>,
    input: SerializerHandle<I>,
    downstream: Downstream<O>,
    sources: RoundRobinSet<Rank>,
    config: NodeConfiguration,

    reorder_buffer: ReorderBuffer<I>,
    current_id: u64,
    first_item_seen: bool,
    deferred: Vec<Deferred>,
    pending_demand: Option<PendingRequest<()>>,

    collect_timings: bool,
    report: RunReport,
}

impl<I: Send + 'static, O: Send + 'static> DsparNode<I, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comm: Arc<Communicator>,
        stage: Box<dyn NodeStage<I, O>>,
        input: SerializerHandle<I>,
        output: SerializerHandle<O>,
        sources: Vec<Rank>,
        targets: Vec<Rank>,
        config: NodeConfiguration,
        role: NodeRole,
    ) -> DsparNode<I, O> {
        let report = RunReport::new(comm.rank(), role);
        DsparNode {
            downstream: Downstream {
                comm: comm.clone(),
                output,
                targets: targets.into(),
                wait_for_demand: config.wait_for_demand_downstream,
                provenance: None,
                items_emitted: 0,
            },
            comm,
            stage,
            input,
            sources: sources.into(),
            config,
            reorder_buffer: ReorderBuffer::new(),
            current_id: 0,
            first_item_seen: false,
            deferred: Vec::new(),
            pending_demand: None,
            collect_timings: false,
            report,
        }
    }

    pub fn with_timings(mut self, collect_timings: bool) -> DsparNode<I, O> {
        self.collect_timings = collect_timings;
        self
    }

    #[instrument(name = "node", skip_all, fields(rank = self.comm.rank(), role = ?self.report.role))]
    pub async fn run(mut self) -> anyhow::Result<RunReport> {
        info!("starting node with sources {:?} and targets {:?}, {:?}", self.sources.members(), self.downstream.targets.members(), self.config);
        run_lifecycle(&mut self).await?;
        info!("node stopped after processing {} and emitting {} items", self.report.items_processed, self.report.items_emitted);
        Ok(self.report)
    }

    /// Request one more item from the next source. The request is sent asynchronously, and the
    ///  previous request is completed first so that at most one is outstanding.
    async fn ask_for_demand(&mut self) -> anyhow::Result<()> {
        if let Some(pending) = self.pending_demand.take() {
            pending.wait().await?;
        }
        if let Some(source) = self.sources.next() {
            trace!("asking rank {} for demand", source);
            self.pending_demand = Some(self.comm.send_demand_to_async(source, 1));
        }
        Ok(())
    }

    async fn process_input(&mut self, header: MessageHeader, item: I) -> anyhow::Result<()> {
        if !self.first_item_seen {
            self.first_item_seen = true;
            self.stage.on_first_item(&item)?;
        }

        let started = Instant::now();
        self.downstream.provenance = Some(Provenance {
            id: header.id,
            origin_nanos: header.origin_nanos,
            compute_nanos: header.compute_nanos,
            started,
        });
        let rank = self.comm.rank();
        let result = {
            let mut ctx = StageContext::new(&mut self.downstream, &mut self.deferred, rank);
            self.stage.process(item, &mut ctx).await
        };
        self.downstream.provenance = None;
        result?;

        self.report.items_processed += 1;
        if self.collect_timings && self.downstream.targets.is_empty() {
            let compute_nanos = header.compute_nanos + nanos(started.elapsed());
            self.report.timings.push(ItemTiming {
                id: header.id,
                total: std::time::Duration::from_nanos(now_nanos().saturating_sub(header.origin_nanos)),
                compute: std::time::Duration::from_nanos(compute_nanos),
            });
        }

        if self.config.ask_for_demand_upstream {
            self.ask_for_demand().await?;
        }
        Ok(())
    }

    async fn reorder_and_process(&mut self, header: MessageHeader, item: I) -> anyhow::Result<()> {
        if header.id > self.current_id {
            trace!("buffering message {} while waiting for message {}", header.id, self.current_id);
            self.reorder_buffer.push(header, item);
            return Ok(());
        }

        self.process_input(header, item).await?;
        self.current_id += 1;

        while let Some((header, item)) = self.reorder_buffer.pop_ready(self.current_id) {
            self.process_input(header, item).await?;
            self.current_id += 1;
        }
        Ok(())
    }

    /// Once all sources stopped, no gap in the message ids can close any more: process what is
    ///  left in id order, while the node is still receiving.
    async fn flush_reorder_buffer(&mut self) -> anyhow::Result<()> {
        if self.reorder_buffer.is_empty() {
            return Ok(());
        }
        warn!("all sources stopped with {} buffered items, still waiting for message {} - processing them in id order", self.reorder_buffer.len(), self.current_id);
        for (header, item) in self.reorder_buffer.drain_ordered() {
            self.current_id = header.id + 1;
            self.process_input(header, item).await?;
            self.run_deferred();
        }
        Ok(())
    }
}

#[async_trait]
impl<I: Send + 'static, O: Send + 'static> NodeLifecycle for DsparNode<I, O> {
    fn enter_state(&mut self, state: NodeState) {
        debug!("{:?} -> {:?}", self.report.final_state(), state);
        self.report.states.push(state);
    }

    async fn on_start(&mut self) -> anyhow::Result<AfterStart> {
        self.input.start().await?;
        self.downstream.output.start().await?;
        self.stage.start().await?;

        let rank = self.comm.rank();
        {
            let mut ctx = StageContext::new(&mut self.downstream, &mut self.deferred, rank);
            self.stage.produce(&mut ctx).await?;
        }

        if self.config.ask_for_demand_upstream {
            self.ask_for_demand().await?;
        }

        if self.sources.is_empty() {
            Ok(AfterStart::StopNode)
        }
        else {
            Ok(AfterStart::ReceiveMessages)
        }
    }

    async fn receive_header(&mut self) -> anyhow::Result<MessageHeader> {
        self.comm.receive_header().await
    }

    async fn on_receive_message(&mut self, header: MessageHeader) -> anyhow::Result<()> {
        let item = self.input.receive(&self.comm, &header).await?;
        if self.config.ordered {
            self.reorder_and_process(header, item).await
        }
        else {
            self.process_input(header, item).await
        }
    }

    async fn on_receive_stop(&mut self, header: MessageHeader) -> anyhow::Result<StopResponse> {
        debug!("STOP from rank {}", header.sender);
        if !self.sources.remove(&header.sender) {
            warn!("STOP from rank {} which is not a source", header.sender);
        }

        if self.sources.is_empty() {
            self.flush_reorder_buffer().await?;
            return Ok(StopResponse::Stop);
        }

        // the outstanding request may have gone to the source that just stopped
        if self.config.ask_for_demand_upstream {
            self.ask_for_demand().await?;
        }
        Ok(StopResponse::Ignore)
    }

    async fn on_stop(&mut self) -> anyhow::Result<()> {
        let rank = self.comm.rank();
        {
            let mut ctx = StageContext::new(&mut self.downstream, &mut self.deferred, rank);
            self.stage.end(&mut ctx).await?;
        }

        if let Some(pending) = self.pending_demand.take() {
            pending.wait().await?;
        }
        self.downstream.stop_targets().await?;
        self.report.items_emitted = self.downstream.items_emitted;
        Ok(())
    }

    fn run_deferred(&mut self) {
        while let Some(callback) = self.deferred.pop() {
            callback();
        }
    }
}
