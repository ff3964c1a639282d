//! The farm skeleton: one emitter distributing work to a pool of identical workers, and one
//!  collector gathering their results.
//!
//! The rank layout inside a farm is fixed: the farm's starting rank is the emitter, the next rank
//!  is the collector, and the workers follow. Every process derives its role from its rank alone.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::DsparConfig;
use crate::error::DsparError;
use crate::node::dspar_node::DsparNode;
use crate::node::node_configuration::NodeConfiguration;
use crate::node::run_report::{NodeRole, RunReport};
use crate::protocol::communicator::Communicator;
use crate::serializer::{SerializerHandle, Wire};
use crate::skeleton::element::{PipelineElement, TypedElement};
use crate::skeleton::plan::{ElementShape, Plan};
use crate::stage::StageFactory;
use crate::transport::{Rank, Transport};

/// A rank's role inside a farm, with the peers that role talks to
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FarmRole {
    Emitter { workers: Vec<Rank> },
    Collector { workers: Vec<Rank> },
    Worker { emitter: Rank, collector: Rank },
}

impl FarmRole {
    pub fn emitter_rank(starting_rank: Rank) -> Rank {
        starting_rank
    }

    pub fn collector_rank(starting_rank: Rank) -> Rank {
        starting_rank + 1
    }

    pub fn worker_ranks(starting_rank: Rank, num_workers: u32) -> Vec<Rank> {
        (starting_rank + 2..starting_rank + 2 + num_workers).collect()
    }

    /// The role of `rank` in a farm with `num_workers` workers starting at `starting_rank`, or
    ///  None if the rank is not part of the farm.
    pub fn for_rank(rank: Rank, starting_rank: Rank, num_workers: u32) -> Option<FarmRole> {
        let workers = Self::worker_ranks(starting_rank, num_workers);
        if rank == Self::emitter_rank(starting_rank) {
            Some(FarmRole::Emitter { workers })
        }
        else if rank == Self::collector_rank(starting_rank) {
            Some(FarmRole::Collector { workers })
        }
        else if workers.contains(&rank) {
            Some(FarmRole::Worker {
                emitter: Self::emitter_rank(starting_rank),
                collector: Self::collector_rank(starting_rank),
            })
        }
        else {
            None
        }
    }
}

/// Emitter → workers → collector, with payload types `I` (farm input), `EO` (emitter output),
///  `WO` (worker output) and `O` (farm output).
pub struct Farm<I, EO, WO, O> {
    emitter: StageFactory<I, EO>,
    worker: StageFactory<EO, WO>,
    collector: StageFactory<WO, O>,

    input: SerializerHandle<I>,
    emitter_to_workers: SerializerHandle<EO>,
    workers_to_collector: SerializerHandle<WO>,
    output: SerializerHandle<O>,

    num_emitters: u32,
    num_workers: u32,
    ordered: bool,
    on_demand: bool,
}

impl<I: Wire, EO: Wire, WO: Wire, O: Wire> Farm<I, EO, WO, O> {
    pub fn new(emitter: StageFactory<I, EO>, worker: StageFactory<EO, WO>, collector: StageFactory<WO, O>) -> Farm<I, EO, WO, O> {
        Farm {
            emitter,
            worker,
            collector,
            input: SerializerHandle::for_wire(),
            emitter_to_workers: SerializerHandle::for_wire(),
            workers_to_collector: SerializerHandle::for_wire(),
            output: SerializerHandle::for_wire(),
            num_emitters: 1,
            num_workers: 1,
            ordered: false,
            on_demand: false,
        }
    }
}

impl<I, EO, WO, O> Farm<I, EO, WO, O>
where
    I: Send + 'static,
    EO: Send + 'static,
    WO: Send + 'static,
    O: Send + 'static,
{
    pub fn workers(self, num_workers: u32) -> Self {
        Farm { num_workers, ..self }
    }

    /// A farm supports exactly one emitter; any other value is rejected when the pipeline is
    ///  validated.
    pub fn emitters(self, num_emitters: u32) -> Self {
        Farm { num_emitters, ..self }
    }

    /// the collector processes the workers' results in message id order
    pub fn ordered(self, ordered: bool) -> Self {
        Farm { ordered, ..self }
    }

    /// demand-driven scheduling: the emitter sends an item only to a worker that asked for one
    pub fn on_demand(self, on_demand: bool) -> Self {
        Farm { on_demand, ..self }
    }

    /// the serializer for items entering the farm, from the upstream element to the emitter
    pub fn with_input(self, input: SerializerHandle<I>) -> Self {
        Farm { input, ..self }
    }

    pub fn with_emitter_to_workers(self, emitter_to_workers: SerializerHandle<EO>) -> Self {
        Farm { emitter_to_workers, ..self }
    }

    pub fn with_workers_to_collector(self, workers_to_collector: SerializerHandle<WO>) -> Self {
        Farm { workers_to_collector, ..self }
    }

    /// the serializer for the collector's results, towards the downstream element
    pub fn with_output(self, output: SerializerHandle<O>) -> Self {
        Farm { output, ..self }
    }

    pub fn num_workers(&self) -> u32 {
        self.num_workers
    }

    fn emitter_config(&self) -> NodeConfiguration {
        NodeConfiguration::round_robin()
            .with_wait_for_demand_downstream(self.on_demand)
    }

    fn worker_config(&self) -> NodeConfiguration {
        NodeConfiguration::round_robin()
            .with_ask_for_demand_upstream(self.on_demand)
    }

    fn collector_config(&self) -> NodeConfiguration {
        NodeConfiguration::round_robin()
            .with_ordered(self.ordered)
    }

    fn comm(transport: Arc<dyn Transport>) -> Arc<Communicator> {
        Arc::new(Communicator::new(transport))
    }
}

#[async_trait]
impl<I, EO, WO, O> PipelineElement for Farm<I, EO, WO, O>
where
    I: Send + 'static,
    EO: Send + 'static,
    WO: Send + 'static,
    O: Send + 'static,
{
    fn shape(&self) -> ElementShape {
        ElementShape {
            processes_needed: self.num_workers + 2,
            input_offset_ranks: vec![0],
            output_offset_ranks: vec![1],
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.num_emitters != 1 {
            return Err(DsparError::configuration(format!("a farm needs exactly one emitter, not {}", self.num_emitters)));
        }
        if self.num_workers == 0 {
            return Err(DsparError::configuration("a farm needs at least one worker"));
        }
        Ok(())
    }

    async fn run(&self, transport: Arc<dyn Transport>, plan: &Plan, config: &DsparConfig) -> anyhow::Result<RunReport> {
        let rank = transport.rank();
        let role = FarmRole::for_rank(rank, plan.starting_rank, self.num_workers)
            .ok_or_else(|| DsparError::configuration(format!("rank {} is not part of the farm at {:?}", rank, plan.rank_range())))?;
        info!("rank {} runs as farm {:?}", rank, role);

        // the serializers are shared by all roles, but each is started only once
        self.input.start().await?;
        self.emitter_to_workers.start().await?;
        self.workers_to_collector.start().await?;
        self.output.start().await?;

        match role {
            FarmRole::Emitter { workers } => {
                DsparNode::new(
                    Self::comm(transport),
                    self.emitter.instantiate(),
                    self.input.clone(),
                    self.emitter_to_workers.clone(),
                    plan.sources.clone(),
                    workers,
                    self.emitter_config(),
                    NodeRole::FarmEmitter,
                ).with_timings(config.collect_timings).run().await
            }
            FarmRole::Worker { emitter, collector } => {
                DsparNode::new(
                    Self::comm(transport),
                    self.worker.instantiate(),
                    self.emitter_to_workers.clone(),
                    self.workers_to_collector.clone(),
                    vec![emitter],
                    vec![collector],
                    self.worker_config(),
                    NodeRole::FarmWorker,
                ).with_timings(config.collect_timings).run().await
            }
            FarmRole::Collector { workers } => {
                DsparNode::new(
                    Self::comm(transport),
                    self.collector.instantiate(),
                    self.workers_to_collector.clone(),
                    self.output.clone(),
                    workers,
                    plan.targets.clone(),
                    self.collector_config(),
                    NodeRole::FarmCollector,
                ).with_timings(config.collect_timings).run().await
            }
        }
    }

    fn describe(&self, plan: &Plan) -> String {
        let start = plan.starting_rank;
        let mut result = format!("farm @ ranks {:?}{}{}: sources {:?}, targets {:?}",
                                 plan.rank_range(),
                                 if self.on_demand { ", on demand" } else { "" },
                                 if self.ordered { ", ordered" } else { "" },
                                 plan.sources,
                                 plan.targets,
        );
        let _ = write!(result, "\n  emitter ({:?}) @ rank {}", self.emitter.kind(), FarmRole::emitter_rank(start));
        let _ = write!(result, "\n  workers ({:?}) @ ranks {:?}", self.worker.kind(), FarmRole::worker_ranks(start, self.num_workers));
        let _ = write!(result, "\n  collector ({:?}) @ rank {}", self.collector.kind(), FarmRole::collector_rank(start));
        result
    }
}

impl<I, EO, WO, O> TypedElement for Farm<I, EO, WO, O>
where
    I: Send + 'static,
    EO: Send + 'static,
    WO: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::serializer::Nothing;
    use crate::stage::{map, pass_through};
    use crate::test_util::stages::{collecting_sink, range_source};

    use super::*;

    #[rstest]
    #[case::emitter(0, Some(FarmRole::Emitter { workers: vec![2, 3, 4] }))]
    #[case::collector(1, Some(FarmRole::Collector { workers: vec![2, 3, 4] }))]
    #[case::first_worker(2, Some(FarmRole::Worker { emitter: 0, collector: 1 }))]
    #[case::last_worker(4, Some(FarmRole::Worker { emitter: 0, collector: 1 }))]
    #[case::outside(5, None)]
    fn test_roles(#[case] rank: Rank, #[case] expected: Option<FarmRole>) {
        assert_eq!(FarmRole::for_rank(rank, 0, 3), expected);
    }

    #[rstest]
    #[case::below(4, None)]
    #[case::emitter(5, Some(FarmRole::Emitter { workers: vec![7, 8] }))]
    #[case::collector(6, Some(FarmRole::Collector { workers: vec![7, 8] }))]
    #[case::worker(8, Some(FarmRole::Worker { emitter: 5, collector: 6 }))]
    #[case::above(9, None)]
    fn test_roles_with_offset(#[case] rank: Rank, #[case] expected: Option<FarmRole>) {
        assert_eq!(FarmRole::for_rank(rank, 5, 2), expected);
    }

    fn farm() -> Farm<Nothing, u64, u64, Nothing> {
        let (collector, _) = collecting_sink::<u64>();
        Farm::new(range_source(0..10), pass_through::<u64>(), collector)
    }

    #[test]
    fn test_shape() {
        let shape = farm().workers(3).shape();
        assert_eq!(shape, ElementShape {
            processes_needed: 5,
            input_offset_ranks: vec![0],
            output_offset_ranks: vec![1],
        });
    }

    #[rstest]
    #[case::default(1, 1, true)]
    #[case::two_emitters(2, 1, false)]
    #[case::no_emitter(0, 1, false)]
    #[case::no_workers(1, 0, false)]
    fn test_validate(#[case] emitters: u32, #[case] workers: u32, #[case] valid: bool) {
        let result = farm().emitters(emitters).workers(workers).validate();
        assert_eq!(result.is_ok(), valid);
        if let Err(e) = result {
            assert!(matches!(e.downcast_ref::<DsparError>(), Some(DsparError::Configuration(_))));
        }
    }

    #[rstest]
    #[case::push(false, false)]
    #[case::push_ordered(false, true)]
    #[case::on_demand(true, false)]
    #[case::on_demand_ordered(true, true)]
    fn test_node_configurations(#[case] on_demand: bool, #[case] ordered: bool) {
        let farm = farm().on_demand(on_demand).ordered(ordered);

        assert_eq!(farm.emitter_config(), NodeConfiguration {
            ask_for_demand_upstream: false,
            wait_for_demand_downstream: on_demand,
            ordered: false,
        });
        assert_eq!(farm.worker_config(), NodeConfiguration {
            ask_for_demand_upstream: on_demand,
            wait_for_demand_downstream: false,
            ordered: false,
        });
        assert_eq!(farm.collector_config(), NodeConfiguration {
            ask_for_demand_upstream: false,
            wait_for_demand_downstream: false,
            ordered,
        });
    }

    #[test]
    fn test_describe() {
        let farm = farm().workers(2).on_demand(true);
        let plan = Plan {
            element_index: 1,
            starting_rank: 3,
            processes: 4,
            sources: vec![2],
            targets: vec![],
        };
        assert_eq!(farm.describe(&plan), "farm @ ranks 3..7, on demand: sources [2], targets []\n  emitter (Source) @ rank 3\n  workers (Worker) @ ranks [5, 6]\n  collector (Sink) @ rank 4");
    }

    #[test]
    fn test_map_worker_type() {
        let (collector, _) = collecting_sink::<String>();
        let farm: Farm<Nothing, u64, String, Nothing> = Farm::new(range_source(0..1), map(|i: u64| i.to_string()), collector);
        assert_eq!(farm.num_workers(), 1);
    }
}
