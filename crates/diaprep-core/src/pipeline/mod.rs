pub mod config;
mod orchestrator;
mod state;
mod types;

pub use config::RunParameters;
pub use orchestrator::{run_pipeline, Pipeline};
pub use state::PipelineState;
pub use types::{NoOpReporter, PhaseError, PipelineStage, ProgressReporter, RunReport};
