pub mod aggregator;
pub mod normalizer;
pub mod orchestrator;

pub use aggregator::Aggregator;
pub use normalizer::{partition_rows, NormalizeReport, Normalizer};
pub use orchestrator::{Orchestrator, RunContext, RunFailure, RunReport, RunStage, RunState, StageCounts};
