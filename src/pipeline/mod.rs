//! Pipeline components: channels, stage workers, per-item timeout, wiring.

pub mod context;
pub mod orchestrator;
pub mod timeout;
pub mod worker;

pub use context::{
    ItemOutcome, PipelineChannels, PipelineHandles, WorkerContext, create_pipeline_channels,
    is_killed,
};
pub use orchestrator::{PipelineTuning, run_pipeline};
pub use timeout::{execute_with_timeout, panic_to_error};
pub use worker::spawn_stage_workers;
