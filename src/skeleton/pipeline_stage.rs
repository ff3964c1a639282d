use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DsparConfig;
use crate::node::dspar_node::DsparNode;
use crate::node::node_configuration::NodeConfiguration;
use crate::node::run_report::{NodeRole, RunReport};
use crate::protocol::communicator::Communicator;
use crate::serializer::{SerializerHandle, Wire};
use crate::skeleton::element::{PipelineElement, TypedElement};
use crate::skeleton::plan::{ElementShape, Plan};
use crate::stage::StageFactory;
use crate::transport::Transport;

/// A single stage running on a single rank, pushing its output round robin.
pub struct PipelineStage<I, O> {
    stage: StageFactory<I, O>,
    input: SerializerHandle<I>,
    output: SerializerHandle<O>,
    ordered: bool,
}

impl<I: Wire, O: Wire> PipelineStage<I, O> {
    pub fn new(stage: StageFactory<I, O>) -> PipelineStage<I, O> {
        PipelineStage::with_serializers(stage, SerializerHandle::for_wire(), SerializerHandle::for_wire())
    }
}

impl<I: Send + 'static, O: Send + 'static> PipelineStage<I, O> {
    pub fn with_serializers(stage: StageFactory<I, O>, input: SerializerHandle<I>, output: SerializerHandle<O>) -> PipelineStage<I, O> {
        PipelineStage {
            stage,
            input,
            output,
            ordered: false,
        }
    }

    /// process the input in message id order
    pub fn ordered(self, ordered: bool) -> PipelineStage<I, O> {
        PipelineStage {
            ordered,
            ..self
        }
    }
}

#[async_trait]
impl<I: Send + 'static, O: Send + 'static> PipelineElement for PipelineStage<I, O> {
    fn shape(&self) -> ElementShape {
        ElementShape::single()
    }

    async fn run(&self, transport: Arc<dyn Transport>, plan: &Plan, config: &DsparConfig) -> anyhow::Result<RunReport> {
        let node = DsparNode::new(
            Arc::new(Communicator::new(transport)),
            self.stage.instantiate(),
            self.input.clone(),
            self.output.clone(),
            plan.sources.clone(),
            plan.targets.clone(),
            NodeConfiguration::round_robin().with_ordered(self.ordered),
            NodeRole::Stage,
        );
        node.with_timings(config.collect_timings)
            .run()
            .await
    }

    fn describe(&self, plan: &Plan) -> String {
        format!("stage ({:?}{}) @ rank {}: sources {:?}, targets {:?}",
                self.stage.kind(),
                if self.ordered { ", ordered" } else { "" },
                plan.starting_rank,
                plan.sources,
                plan.targets,
        )
    }
}

impl<I: Send + 'static, O: Send + 'static> TypedElement for PipelineStage<I, O> {
    type Input = I;
    type Output = O;
}
