use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DsparConfig;
use crate::node::run_report::RunReport;
use crate::skeleton::plan::{ElementShape, Plan};
use crate::transport::Transport;

/// A building block of a pipeline, occupying a contiguous range of ranks.
#[async_trait]
pub trait PipelineElement: Send + Sync + 'static {
    fn shape(&self) -> ElementShape;

    /// checks the element's own configuration, before any node starts
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs the node that the element assigns to the transport's rank. The caller guarantees
    ///  that the rank lies inside the plan's rank range.
    async fn run(&self, transport: Arc<dyn Transport>, plan: &Plan, config: &DsparConfig) -> anyhow::Result<RunReport>;

    /// a human-readable rendering of the element's placement in the topology
    fn describe(&self, plan: &Plan) -> String;
}

/// An element with statically known input and output payload types. Composition through
///  [crate::skeleton::pipeline::Pipeline::then] matches these at compile time.
pub trait TypedElement: PipelineElement {
    type Input: Send + 'static;
    type Output: Send + 'static;
}
