//! Orchestration layer: language-model backends, the execution engine and
//! the multi-instance launcher.

mod chat;
mod command;
mod engine;
mod launcher;

pub use chat::{ChatBackend, DEFAULT_BASE_URL};
pub use command::{CommandBackend, CommandOutcome, DEFAULT_TIMEOUT_SECS};
pub use engine::{EngineEvent, EngineOptions, ExecutionEngine, RunReport};
pub use launcher::{cancel_on_ctrl_c, LaunchSummary, Launcher, ProcessOutcome, INSTANCE_ENV};
