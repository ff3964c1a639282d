//! Skeletons are the parallel patterns an application composes its pipeline from. Their topology
//!  is computed statically, so every process derives the same plan and picks its own role from
//!  its rank without any coordination.

pub mod element;
pub mod farm;
pub mod pipeline;
pub mod pipeline_stage;
pub mod plan;

pub use farm::Farm;
pub use pipeline::Pipeline;
pub use pipeline_stage::PipelineStage;
