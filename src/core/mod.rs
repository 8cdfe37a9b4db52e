//! Core domain models for the idea generation pipeline.
//!
//! This module contains the fundamental data structures: task declarations,
//! the definition table, the execution plan and the run transcript.

pub mod dag;
pub mod table;
pub mod task;
pub mod transcript;

pub use dag::ExecutionPlan;
pub use table::{FinalizedTable, FinalizedTask, TaskTable};
pub use task::{DynamicParam, TaskDefinition, TaskKind, TaskNode, TaskResult, TaskStatus};
pub use transcript::{
    JsonSink, MarkdownFileSink, MemorySink, RunId, RunTranscript, TranscriptRecord,
    TranscriptSink, TranscriptStatus,
};
