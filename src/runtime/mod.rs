//! The preview pipeline: observed-file context, cached results, debounced
//! build tasks, the orchestrator tying them together, and the agent that
//! manages one orchestrator per watched project.

pub use agent::Agent;
pub use build_task::{BuildOutcome, BuildPhase, BuildTarget, BuildTask, DEFAULT_DEBOUNCE};
pub use cache::{CachedPreviewSet, PreviewCache};
pub use context::{placeholder_fingerprint, PreviewContext};
pub use orchestrator::{
    split_path, Orchestrator, OrchestratorSettings, PipelineStatus, DEFAULT_SOURCE_EXTENSION,
    DEFAULT_SOURCE_ROOT,
};
pub use project::{project_root, WatchedProject};

mod agent;
mod build_task;
mod cache;
mod context;
mod orchestrator;
mod project;
