use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::DsparConfig;
use crate::error::DsparError;
use crate::node::run_report::RunReport;
use crate::serializer::Nothing;
use crate::skeleton::element::{PipelineElement, TypedElement};
use crate::skeleton::plan::{compute_plans, select_plan, total_processes_needed, ElementShape, Plan};
use crate::transport::local::LocalGroup;
use crate::transport::Transport;

/// A sequence of pipeline elements, each consuming the previous element's output. `O` is the
///  output type of the last element; only a pipeline that ends in a sink (`O = Nothing`) can run.
pub struct Pipeline<O> {
    elements: Vec<Arc<dyn PipelineElement>>,
    config: DsparConfig,
    _output: PhantomData<fn() -> O>,
}

impl<O: Send + 'static> Pipeline<O> {
    pub fn new<E: TypedElement<Input = Nothing, Output = O>>(first: E) -> Pipeline<O> {
        Pipeline {
            elements: vec![Arc::new(first)],
            config: DsparConfig::new(),
            _output: PhantomData,
        }
    }

    pub fn then<E: TypedElement<Input = O>>(self, next: E) -> Pipeline<E::Output> {
        let mut elements = self.elements;
        elements.push(Arc::new(next));
        Pipeline {
            elements,
            config: self.config,
            _output: PhantomData,
        }
    }

    pub fn with_config(self, config: DsparConfig) -> Pipeline<O> {
        Pipeline {
            config,
            ..self
        }
    }

    pub fn config(&self) -> &DsparConfig {
        &self.config
    }

    fn shapes(&self) -> Vec<ElementShape> {
        self.elements.iter()
            .map(|e| e.shape())
            .collect()
    }

    /// validates every element and computes the topology
    pub fn plans(&self) -> anyhow::Result<Vec<Plan>> {
        for element in &self.elements {
            element.validate()?;
        }
        compute_plans(&self.shapes(), self.config.starting_rank)
    }

    /// the number of ranks the elements occupy, not counting ranks below the starting rank
    pub fn total_processes_needed(&self) -> u32 {
        total_processes_needed(&self.shapes())
    }

    /// the smallest process group that can run this pipeline
    pub fn required_group_size(&self) -> u32 {
        self.config.starting_rank + self.total_processes_needed()
    }

    /// renders the planned topology, one element after the other
    pub fn describe(&self) -> anyhow::Result<String> {
        let plans = self.plans()?;
        let lines: Vec<String> = plans.iter()
            .map(|plan| format!("[{}] {}", plan.element_index, self.elements[plan.element_index].describe(plan)))
            .collect();
        Ok(lines.join("\n"))
    }
}

impl Pipeline<Nothing> {
    /// Runs this process's part of the pipeline: the node that the topology assigns to the
    ///  transport's rank, or nothing if the rank is outside the topology. All ranks meet in a
    ///  barrier at the end.
    ///
    /// Every rank of the group must call this with an identical pipeline. If the node fails,
    ///  the whole group is aborted.
    #[instrument(name = "pipeline", skip_all, fields(rank = transport.rank()))]
    pub async fn run(&self, transport: Arc<dyn Transport>) -> anyhow::Result<Option<RunReport>> {
        let plans = self.plans()?;
        if transport.group_size() < self.required_group_size() {
            return Err(DsparError::configuration(format!(
                "the pipeline needs {} ranks, but the process group has only {}", self.required_group_size(), transport.group_size())));
        }

        let rank = transport.rank();
        let report = match select_plan(&plans, rank) {
            Some(plan) => {
                info!("running element {} of the pipeline", plan.element_index);
                match self.elements[plan.element_index].run(transport.clone(), plan, &self.config).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!("node failed, aborting the process group: {:#}", e);
                        transport.abort(&format!("{:#}", e));
                        return Err(e);
                    }
                }
            }
            None => {
                warn!("rank {} is not part of the topology - idling until all nodes are done", rank);
                None
            }
        };

        transport.barrier().await?;
        Ok(report)
    }

    /// Runs the complete pipeline inside this OS process, one tokio task per rank.
    pub async fn run_local(self) -> anyhow::Result<Vec<Option<RunReport>>> {
        let group_size = self.required_group_size();
        self.run_local_with_group_size(group_size).await
    }

    /// Like [Pipeline::run_local], with a process group of the given size. The reports are
    ///  returned in rank order.
    pub async fn run_local_with_group_size(self, group_size: u32) -> anyhow::Result<Vec<Option<RunReport>>> {
        self.plans()?;

        let group = LocalGroup::new(group_size);
        let pipeline = Arc::new(self);
        let handles: Vec<_> = group.transports()
            .into_iter()
            .map(|transport| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.run(transport).await })
            })
            .collect();

        let mut reports = Vec::new();
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await? {
                Ok(report) => reports.push(report),
                Err(e) => errors.push(e),
            }
        }

        // an aborted group fails on every rank; the interesting error is the one that caused it
        if let Some(idx) = errors.iter().position(|e| !matches!(e.downcast_ref::<DsparError>(), Some(DsparError::GroupAborted(_)))) {
            return Err(errors.swap_remove(idx));
        }
        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}
